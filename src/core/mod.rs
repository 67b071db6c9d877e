//! Core binning engine.
//!
//! This module contains:
//! - Timebase resolution for capture identifiers
//! - Per-subject event buffers and bin extraction
//! - The metric registry and column schema
//! - Per-subject row aggregation

pub mod aggregator;
pub mod metrics;
pub mod schema;
pub mod timebase;
pub mod windowing;

// Re-export commonly used types
pub use aggregator::{format_timestamp, OutputRow, SubjectAggregator};
pub use metrics::{
    antenna_dwell, columns, AntennaVector, MetricDef, MetricRegistry, MetricValue, ANTENNA_COUNT,
};
pub use schema::{ColumnSchema, DEFAULT_COLUMNS};
pub use timebase::{order_captures, resolve_origin, CaptureFile, TimeBase};
pub use windowing::{Bin, EventBuffer};
