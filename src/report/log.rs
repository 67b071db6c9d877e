//! Run log.
//!
//! Counts what a binning run consumed and produced. Counters are atomic so
//! subject drains running on separate threads can record into one log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Counters for one binning run.
#[derive(Debug)]
pub struct RunLog {
    run_id: Uuid,
    /// Capture files fully ingested
    files_processed: AtomicU64,
    /// Events appended to subject buffers
    events_ingested: AtomicU64,
    /// Bins completed and aggregated
    bins_completed: AtomicU64,
    /// Subjects whose rows reached the sink
    subjects_delivered: AtomicU64,
    /// Trailing events dropped at end of run
    events_discarded: AtomicU64,
    /// Trailing events emitted as final partial bins
    events_flushed: AtomicU64,
    started_at: DateTime<Utc>,
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            files_processed: AtomicU64::new(0),
            events_ingested: AtomicU64::new(0),
            bins_completed: AtomicU64::new(0),
            subjects_delivered: AtomicU64::new(0),
            events_discarded: AtomicU64::new(0),
            events_flushed: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn record_file_processed(&self) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_events_ingested(&self, count: u64) {
        self.events_ingested.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_bin_completed(&self) {
        self.bins_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subject_delivered(&self) {
        self.subjects_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_events_discarded(&self, count: u64) {
        self.events_discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_events_flushed(&self, count: u64) {
        self.events_flushed.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> RunStats {
        RunStats {
            run_id: self.run_id,
            files_processed: self.files_processed.load(Ordering::Relaxed),
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            bins_completed: self.bins_completed.load(Ordering::Relaxed),
            subjects_delivered: self.subjects_delivered.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            events_flushed: self.events_flushed.load(Ordering::Relaxed),
            started_at: self.started_at,
            duration_ms: (Utc::now() - self.started_at).num_milliseconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run Statistics ({}):\n\
             - Capture files processed: {}\n\
             - Events ingested: {}\n\
             - Bins completed: {}\n\
             - Subjects written: {}\n\
             - Trailing events discarded: {}\n\
             - Trailing events flushed: {}\n\
             - Run duration: {} ms",
            stats.run_id,
            stats.files_processed,
            stats.events_ingested,
            stats.bins_completed,
            stats.subjects_delivered,
            stats.events_discarded,
            stats.events_flushed,
            stats.duration_ms
        )
    }

    /// Write the current statistics as JSON.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.stats()).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of run statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub files_processed: u64,
    pub events_ingested: u64,
    pub bins_completed: u64,
    pub subjects_delivered: u64,
    pub events_discarded: u64,
    pub events_flushed: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Run log shared between drain threads.
pub type SharedRunLog = Arc<RunLog>;

pub fn create_shared_log() -> SharedRunLog {
    Arc::new(RunLog::new())
}
