//! Errors produced by the binning core and pipeline.

use crate::sink::SinkError;
use crate::source::SourceError;
use thiserror::Error;

/// All errors that abort a binning run.
#[derive(Debug, Error)]
pub enum BinnerError {
    /// A requested column has no registered metric.
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// A column was requested more than once.
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    /// Metric dependencies loop back on themselves.
    #[error("metric dependency cycle through: {0}")]
    DependencyCycle(String),

    /// The schema has no columns at all.
    #[error("column schema is empty")]
    EmptySchema,

    /// A capture identifier does not carry a parseable timebase.
    #[error("invalid capture identifier: {0}")]
    InvalidIdentifier(String),

    /// An event arrived earlier than the subject's previous event.
    #[error("out-of-order event for subject {subject}: {time_ms}ms after {previous_ms}ms")]
    OutOfOrderEvent {
        subject: String,
        previous_ms: i64,
        time_ms: i64,
    },

    /// A record's offset pushes its absolute time past the representable range.
    #[error("timestamp overflow: offset {offset_ms}ms from origin {origin_ms}ms")]
    TimestampOverflow { origin_ms: i64, offset_ms: i64 },

    /// Bin durations must be strictly positive.
    #[error("invalid bin duration: {0}ms")]
    InvalidBinDuration(i64),

    /// The timezone name is not in the IANA database.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BinnerError>;
