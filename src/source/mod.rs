//! Event sources for the binning pipeline.
//!
//! A source turns one capture file identifier into per-subject batches of
//! [`RawRecord`]s with file-relative timestamps. The pipeline never looks
//! inside capture containers itself.

pub mod json;
pub mod memory;
pub mod types;

use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

// Re-export commonly used types
pub use json::JsonSource;
pub use memory::MemorySource;
pub use types::{RawEvent, RawRecord, Transition, ENGAGED_CODE};

/// Per-subject record batches extracted from one capture file.
///
/// Keyed by subject identifier; each batch is in capture order.
pub type SubjectBatches = BTreeMap<String, Vec<RawRecord>>;

/// Something that can extract raw telemetry for a capture file.
pub trait EventSource {
    /// Extract every subject's batch for the capture identified by `identifier`.
    fn extract(&mut self, identifier: &str) -> Result<SubjectBatches, SourceError>;
}

impl<S: EventSource + ?Sized> EventSource for &mut S {
    fn extract(&mut self, identifier: &str) -> Result<SubjectBatches, SourceError> {
        (**self).extract(identifier)
    }
}

/// Errors raised while extracting events.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("capture not found: {0}")]
    MissingCapture(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
