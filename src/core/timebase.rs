//! Capture timebase resolution.
//!
//! Capture files are named `<start_ms>_..._<elapsed_ms>[.ext]`, for example
//! `1433757203990_000167_AOD12Week1Part2_0000601200000.hdf5`. The first token
//! is the recording start in epoch milliseconds and the last token is the
//! elapsed time preceding this part. Their sum is the absolute origin added to
//! every event offset in the file.

use crate::error::{BinnerError, Result};
use serde::Serialize;
use std::path::Path;

/// The absolute time origin of one capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeBase {
    /// Recording start in epoch milliseconds
    pub start_ms: i64,
    /// Elapsed milliseconds preceding this capture part
    pub elapsed_ms: i64,
}

impl TimeBase {
    /// Parse the timebase tokens out of a capture identifier.
    pub fn parse(identifier: &str) -> Result<Self> {
        let invalid = || BinnerError::InvalidIdentifier(identifier.to_string());

        let stem = Path::new(identifier)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(invalid)?;

        let tokens: Vec<&str> = stem.split('_').collect();
        if tokens.len() < 2 {
            return Err(invalid());
        }

        let start_ms = parse_token(tokens[0]).ok_or_else(invalid)?;
        let elapsed_ms = parse_token(tokens[tokens.len() - 1]).ok_or_else(invalid)?;

        let timebase = Self {
            start_ms,
            elapsed_ms,
        };
        timebase.checked_origin().ok_or_else(invalid)?;
        Ok(timebase)
    }

    /// Absolute origin in epoch milliseconds.
    pub fn origin(&self) -> i64 {
        self.start_ms.saturating_add(self.elapsed_ms)
    }

    fn checked_origin(&self) -> Option<i64> {
        self.start_ms.checked_add(self.elapsed_ms)
    }
}

fn parse_token(token: &str) -> Option<i64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// Resolve the absolute origin for a capture identifier.
pub fn resolve_origin(identifier: &str) -> Result<i64> {
    TimeBase::parse(identifier).map(|tb| tb.origin())
}

/// A capture identifier together with its resolved timebase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureFile {
    pub identifier: String,
    pub timebase: TimeBase,
}

/// Resolve every identifier and sort ascending by origin.
///
/// Fails on the first identifier that carries no timebase. Ties keep their
/// input order.
pub fn order_captures<I, S>(identifiers: I) -> Result<Vec<CaptureFile>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut captures = identifiers
        .into_iter()
        .map(|id| {
            let identifier = id.into();
            TimeBase::parse(&identifier).map(|timebase| CaptureFile {
                identifier,
                timebase,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    captures.sort_by_key(|c| c.timebase.origin());
    Ok(captures)
}
