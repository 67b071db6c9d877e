//! JSON sink: one `<subject>.json` array of rows per subject.

use crate::sink::{file_stem_for, Sink, SinkError};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct JsonSink {
    dir: PathBuf,
}

impl JsonSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl Sink for JsonSink {
    fn deliver(&mut self, subject: &str, rows: &[Vec<String>]) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| SinkError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(format!("{}.json", file_stem_for(subject)));
        let json = serde_json::to_string_pretty(rows)?;
        info!(subject, path = %path.display(), "saving subject");
        std::fs::write(&path, json).map_err(|source| SinkError::Io { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_rows_as_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonSink::new(dir.path().join("json"));

        let rows = vec![
            vec!["subject".to_string(), "time".to_string()],
            vec!["S1".to_string(), "2015-06-08 09:53:23.990+00:00".to_string()],
        ];
        sink.deliver("S1", &rows).unwrap();

        let content = std::fs::read_to_string(dir.path().join("json").join("S1.json")).unwrap();
        let parsed: Vec<Vec<String>> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, rows);
    }
}
