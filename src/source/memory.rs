//! In-memory event source.
//!
//! Holds pre-built batches keyed by capture identifier. Used by tests and the
//! demo so the pipeline can run without any files on disk.

use crate::source::{EventSource, RawRecord, SourceError, SubjectBatches};
use std::collections::HashMap;

/// A source serving batches that were registered up front.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    captures: HashMap<String, SubjectBatches>,
    extracted: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one subject's batch for a capture, appending to any records
    /// already registered for that subject.
    pub fn insert(
        &mut self,
        identifier: impl Into<String>,
        subject: impl Into<String>,
        records: Vec<RawRecord>,
    ) -> &mut Self {
        self.captures
            .entry(identifier.into())
            .or_default()
            .entry(subject.into())
            .or_default()
            .extend(records);
        self
    }

    /// Number of successful extractions served so far.
    pub fn extracted(&self) -> usize {
        self.extracted
    }
}

impl EventSource for MemorySource {
    fn extract(&mut self, identifier: &str) -> Result<SubjectBatches, SourceError> {
        let batches = self
            .captures
            .get(identifier)
            .cloned()
            .ok_or_else(|| SourceError::MissingCapture(identifier.to_string()))?;
        self.extracted += 1;
        Ok(batches)
    }
}
