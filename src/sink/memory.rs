//! In-memory sink that keeps every delivery, for tests and demos.

use crate::sink::{Sink, SinkError};

#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    deliveries: Vec<(String, Vec<Vec<String>>)>,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries in the order they were received.
    pub fn deliveries(&self) -> &[(String, Vec<Vec<String>>)] {
        &self.deliveries
    }

    /// Rows delivered for `subject`, header included.
    pub fn rows_for(&self, subject: &str) -> Option<&[Vec<String>]> {
        self.deliveries
            .iter()
            .find(|(s, _)| s == subject)
            .map(|(_, rows)| rows.as_slice())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Sink for MemorySink {
    fn deliver(&mut self, subject: &str, rows: &[Vec<String>]) -> Result<(), SinkError> {
        self.deliveries.push((subject.to_string(), rows.to_vec()));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.finished = true;
        Ok(())
    }
}
