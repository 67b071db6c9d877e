//! Telemetry event types shared by event sources and the binning core.
//!
//! Sources deliver [`RawRecord`]s whose times are relative to the start of a
//! capture file. The core works on [`RawEvent`]s carrying absolute times.

use crate::error::{BinnerError, Result};
use serde::{Deserialize, Serialize};

/// Transition code marking an antenna engagement.
pub const ENGAGED_CODE: &str = "0x01";

/// Antenna transition state reported with every reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The subject has just engaged an antenna
    Engaged,
    /// No transition on this reading
    Clear,
}

impl Transition {
    /// Decode a textual transition code.
    ///
    /// `0x01` (any case, with or without padding) and `1` mean engaged; every
    /// other code is treated as clear.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        let digits = code
            .strip_prefix("0x")
            .or_else(|| code.strip_prefix("0X"))
            .unwrap_or(code);

        match u8::from_str_radix(digits, 16) {
            Ok(1) => Transition::Engaged,
            _ => Transition::Clear,
        }
    }

    pub fn is_engaged(self) -> bool {
        self == Transition::Engaged
    }
}

/// One reading as delivered by an event source.
///
/// Deserializes from either a JSON object or a positional array
/// `[antenna_id, distance, separation, time_offset_ms, temperature, transition_code]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub antenna_id: i64,
    pub distance: f64,
    pub separation: f64,
    /// Milliseconds since the start of the capture file
    pub time_offset_ms: i64,
    pub temperature: f64,
    pub transition_code: String,
}

impl RawRecord {
    /// Convert to an absolute-time event using the file's timebase origin.
    pub fn normalize(&self, origin_ms: i64) -> Result<RawEvent> {
        let time_ms = origin_ms.checked_add(self.time_offset_ms).ok_or(
            BinnerError::TimestampOverflow {
                origin_ms,
                offset_ms: self.time_offset_ms,
            },
        )?;

        Ok(RawEvent {
            antenna_id: self.antenna_id,
            distance: self.distance,
            separation: self.separation,
            time_ms,
            temperature: self.temperature,
            transition: Transition::from_code(&self.transition_code),
        })
    }
}

/// A normalized reading on a subject's continuous timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub antenna_id: i64,
    pub distance: f64,
    pub separation: f64,
    /// Absolute time in epoch milliseconds
    pub time_ms: i64,
    pub temperature: f64,
    pub transition: Transition,
}

impl RawEvent {
    /// Convenience constructor used by tests and demos.
    pub fn at(time_ms: i64, antenna_id: i64) -> Self {
        Self {
            antenna_id,
            distance: 0.0,
            separation: 0.0,
            time_ms,
            temperature: 0.0,
            transition: Transition::Clear,
        }
    }
}
