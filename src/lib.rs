//! Homecage Binner - time-binned behavioral summaries from RFID tracking.
//!
//! Home-cage tracking systems record, per subject, a stream of antenna
//! readings along with distance travelled, separation from cage mates, body
//! temperature and engagement transitions. Each capture file holds a slice of
//! those streams with timestamps relative to the capture. This library merges
//! the captures onto one absolute timeline, cuts every subject's stream into
//! fixed-duration bins and emits one summary row per completed bin.
//!
//! # Guarantees
//!
//! - **No partial bins by default**: a bin is emitted only once an event at or
//!   past its end boundary has been seen
//! - **Carry-over**: events left at the end of one capture join the first bin
//!   of the next
//! - **Fail-fast ordering**: an event earlier than its predecessor aborts the
//!   run
//! - **Up-front validation**: unknown columns are rejected before any capture
//!   is read
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Homecage Binner                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Source    │──▶│  TimeBase   │──▶│ EventBuffer │         │
//! │  │ (per file)  │   │  (origin)   │   │ (per subj.) │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                                             │                 │
//! │                                             ▼                 │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │    Sink     │◀──│ Aggregator  │◀──│   Metrics   │         │
//! │  │ (CSV/JSON)  │   │ (per subj.) │   │ (registry)  │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │         │                                                     │
//! │         ▼                                                     │
//! │  ┌─────────────┐                                              │
//! │  │   RunLog    │                                              │
//! │  └─────────────┘                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use homecage_binner::{
//!     ColumnSchema, MemorySink, MemorySource, Pipeline, PipelineOptions, RawRecord,
//! };
//!
//! let record = |offset: i64| RawRecord {
//!     antenna_id: 6,
//!     distance: 1.5,
//!     separation: 120.0,
//!     time_offset_ms: offset,
//!     temperature: 37.0,
//!     transition_code: "0x01".to_string(),
//! };
//!
//! let mut source = MemorySource::new();
//! source.insert("1000_a_0", "S1", vec![record(0), record(400), record(1200)]);
//!
//! let options = PipelineOptions::new(1000, chrono_tz::UTC);
//! let pipeline = Pipeline::new(options, ColumnSchema::standard().unwrap()).unwrap();
//!
//! let mut sink = MemorySink::new();
//! let outcome = pipeline.run(&mut source, &mut sink, ["1000_a_0"]).unwrap();
//! assert_eq!(outcome.rows_per_subject["S1"], 1);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod sink;
pub mod source;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, OutputFormat};
pub use core::{
    ColumnSchema, EventBuffer, MetricDef, MetricRegistry, SubjectAggregator, TimeBase,
    DEFAULT_COLUMNS,
};
pub use error::{BinnerError, Result};
pub use pipeline::{DrainMode, Pipeline, PipelineOptions, RunOutcome, TrailingPolicy};
pub use report::{RunLog, RunStats, SharedRunLog};
pub use sink::{CsvLayout, CsvSink, JsonSink, MemorySink, Sink, SinkError};
pub use source::{EventSource, JsonSource, MemorySource, RawRecord, SourceError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
