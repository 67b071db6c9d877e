//! Run reporting.
//!
//! Tracks how many captures, events and bins a run handled and how many
//! trailing events were left without a closing bin boundary.

pub mod log;

// Re-export commonly used types
pub use log::{create_shared_log, RunLog, RunStats, SharedRunLog};
