//! Output sinks for completed subject tables.
//!
//! A sink receives each subject's rows once, at the end of a run. The first
//! row is always the header.

pub mod csv;
pub mod json;
pub mod memory;

use std::path::PathBuf;
use thiserror::Error;

pub use self::csv::{CsvLayout, CsvSink};
pub use self::json::JsonSink;
pub use self::memory::MemorySink;

/// Destination for rendered subject tables.
pub trait Sink {
    /// Receive the header and rows of one subject.
    fn deliver(&mut self, subject: &str, rows: &[Vec<String>]) -> Result<(), SinkError>;

    /// Called once after the last delivery.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn deliver(&mut self, subject: &str, rows: &[Vec<String>]) -> Result<(), SinkError> {
        (**self).deliver(subject, rows)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// Errors raised while writing output.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// File-system safe name for a subject identifier.
pub fn file_stem_for(subject: &str) -> String {
    let stem: String = subject
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        format!("subject{stem}")
    } else {
        stem
    }
}
