//! CSV sink.

use crate::sink::{file_stem_for, Sink, SinkError};
use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where CSV output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvLayout {
    /// Every subject, header included, appended to one file
    Combined(PathBuf),
    /// One `<subject>.csv` per subject in a directory
    PerSubject(PathBuf),
}

/// Writes subject tables as CSV.
#[derive(Debug)]
pub struct CsvSink {
    layout: CsvLayout,
    combined: Option<Writer<File>>,
    written: Vec<PathBuf>,
}

impl CsvSink {
    pub fn new(layout: CsvLayout) -> Self {
        Self {
            layout,
            combined: None,
            written: Vec::new(),
        }
    }

    /// Files created so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn open(&mut self, path: &Path) -> Result<Writer<File>, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let writer = WriterBuilder::new()
            .flexible(true)
            .from_path(path)?;
        self.written.push(path.to_path_buf());
        Ok(writer)
    }
}

fn write_rows(writer: &mut Writer<File>, rows: &[Vec<String>]) -> Result<(), SinkError> {
    for row in rows {
        writer.write_record(row)?;
    }
    Ok(())
}

impl Sink for CsvSink {
    fn deliver(&mut self, subject: &str, rows: &[Vec<String>]) -> Result<(), SinkError> {
        match self.layout.clone() {
            CsvLayout::Combined(path) => {
                if self.combined.is_none() {
                    info!(path = %path.display(), "saving the data");
                    self.combined = Some(self.open(&path)?);
                }
                if let Some(writer) = self.combined.as_mut() {
                    write_rows(writer, rows)?;
                }
            }
            CsvLayout::PerSubject(dir) => {
                let path = dir.join(format!("{}.csv", file_stem_for(subject)));
                info!(subject, path = %path.display(), "saving subject");
                let mut writer = self.open(&path)?;
                write_rows(&mut writer, rows)?;
                writer.flush().map_err(|source| SinkError::Io { path, source })?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.combined.take() {
            writer.flush().map_err(|source| SinkError::Io {
                path: match &self.layout {
                    CsvLayout::Combined(p) | CsvLayout::PerSubject(p) => p.clone(),
                },
                source,
            })?;
        }
        Ok(())
    }
}
