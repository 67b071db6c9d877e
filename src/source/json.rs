//! Pre-extracted JSON capture source.
//!
//! Each capture lives in `<dir>/<identifier>.json`:
//!
//! ```json
//! { "subjects": { "S1": [[1, 0.0, 120.5, 0, 36.9, "0x01"], ...] } }
//! ```
//!
//! Records may be positional arrays or objects with named fields.

use crate::core::timebase::{order_captures, CaptureFile};
use crate::error::BinnerError;
use crate::source::{EventSource, SourceError, SubjectBatches};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CaptureDocument {
    subjects: SubjectBatches,
}

/// Reads capture batches from a directory of JSON documents.
#[derive(Debug, Clone)]
pub struct JsonSource {
    dir: PathBuf,
}

impl JsonSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List the captures in `dir`, ordered by timebase origin.
    pub fn discover(dir: &Path) -> Result<Vec<CaptureFile>, BinnerError> {
        let entries = std::fs::read_dir(dir).map_err(|source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let identifiers: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect();

        order_captures(identifiers)
    }

    /// `<identifier>.json`, the name `discover` derives identifiers from.
    /// Falls back to the identifier's file stem so `<stem>.hdf5` resolves to
    /// `<stem>.json` when that is the only file present.
    fn capture_path(&self, identifier: &str) -> PathBuf {
        let base = identifier.strip_suffix(".json").unwrap_or(identifier);
        let exact = self.dir.join(format!("{base}.json"));
        if exact.exists() {
            return exact;
        }

        match Path::new(base).file_stem().and_then(|s| s.to_str()) {
            Some(stem) if stem != base => self.dir.join(format!("{stem}.json")),
            _ => exact,
        }
    }
}

impl EventSource for JsonSource {
    fn extract(&mut self, identifier: &str) -> Result<SubjectBatches, SourceError> {
        let path = self.capture_path(identifier);
        if !path.exists() {
            return Err(SourceError::MissingCapture(identifier.to_string()));
        }

        debug!(path = %path.display(), "reading capture");
        let content = std::fs::read_to_string(&path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let document: CaptureDocument =
            serde_json::from_str(&content).map_err(|source| SourceError::Parse {
                path: path.clone(),
                source,
            })?;

        Ok(document.subjects)
    }
}
