//! Per-subject event buffering and bin extraction.
//!
//! Events from consecutive capture files are appended to one buffer per
//! subject. A bin `[t0, t0 + W)` starts at the oldest buffered event and is
//! only closed once an event at or past `t0 + W` has been seen, so binning
//! resumes across file boundaries as more data arrives.

use crate::error::{BinnerError, Result};
use crate::source::RawEvent;
use serde::Serialize;
use std::collections::VecDeque;

/// A completed window of one subject's events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    /// Time of the first event (inclusive window start)
    pub start_ms: i64,
    /// Exclusive window end
    pub end_ms: i64,
    /// Events inside the window, in time order
    pub events: Vec<RawEvent>,
}

impl Bin {
    /// Build a bin covering `events`, which must be non-empty.
    fn new(events: Vec<RawEvent>, window_ms: i64) -> Option<Self> {
        let start_ms = events.first()?.time_ms;
        Some(Self {
            start_ms,
            end_ms: start_ms.saturating_add(window_ms),
            events,
        })
    }

    /// Number of events in the bin.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Ordered, append-only event queue for one subject.
#[derive(Debug, Clone)]
pub struct EventBuffer {
    subject: String,
    events: VecDeque<RawEvent>,
    /// Time of the last event ever appended, consumed or not
    last_time_ms: Option<i64>,
}

impl EventBuffer {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            events: VecDeque::new(),
            last_time_ms: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Append a batch to the tail.
    ///
    /// Times must not go backwards, neither within the batch nor relative to
    /// anything appended earlier. On violation nothing from the batch is kept.
    pub fn append<I>(&mut self, events: I) -> Result<usize>
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let staged: Vec<RawEvent> = events.into_iter().collect();
        self.check(&staged)?;

        if let Some(last) = staged.last() {
            self.last_time_ms = Some(last.time_ms);
        }
        let count = staged.len();
        self.events.extend(staged);
        Ok(count)
    }

    /// Verify that `events` could be appended, without changing the buffer.
    pub fn check(&self, events: &[RawEvent]) -> Result<()> {
        let mut last = self.last_time_ms;
        for event in events {
            if let Some(previous_ms) = last {
                if event.time_ms < previous_ms {
                    return Err(BinnerError::OutOfOrderEvent {
                        subject: self.subject.clone(),
                        previous_ms,
                        time_ms: event.time_ms,
                    });
                }
            }
            last = Some(event.time_ms);
        }
        Ok(())
    }

    /// Remove and return the next complete bin, if one is available.
    ///
    /// Returns `None` when the buffer is empty or when no buffered event lies
    /// at or beyond `t0 + window_ms`; the buffer is left untouched in that case.
    pub fn take_next_complete_bin(&mut self, window_ms: i64) -> Option<Bin> {
        let t0 = self.events.front()?.time_ms;
        let boundary = t0.saturating_add(window_ms);

        let split = self.events.partition_point(|e| e.time_ms < boundary);
        if split == self.events.len() {
            return None;
        }

        let events: Vec<RawEvent> = self.events.drain(..split).collect();
        Bin::new(events, window_ms)
    }

    /// Remove everything still buffered as one partial bin.
    pub fn take_remaining(&mut self, window_ms: i64) -> Option<Bin> {
        let events: Vec<RawEvent> = self.events.drain(..).collect();
        Bin::new(events, window_ms)
    }

    /// Number of events waiting for a bin boundary.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(times: &[i64]) -> Vec<RawEvent> {
        times.iter().map(|&t| RawEvent::at(t, 1)).collect()
    }

    fn drain(buffer: &mut EventBuffer, window_ms: i64) -> Vec<Bin> {
        std::iter::from_fn(|| buffer.take_next_complete_bin(window_ms)).collect()
    }

    #[test]
    fn test_trailing_events_never_form_a_bin() {
        let mut buffer = EventBuffer::new("S1");
        buffer.append(events(&[0, 50, 5000])).unwrap();

        let bins = drain(&mut buffer, 1000);
        assert_eq!(bins.len(), 1);
        assert_eq!(bins[0].events.len(), 2);
        assert_eq!(bins[0].start_ms, 0);
        assert_eq!(bins[0].end_ms, 1000);

        // The 5000ms event starts a bin that nothing closes.
        assert_eq!(buffer.len(), 1);
        assert!(buffer.take_next_complete_bin(1000).is_none());
    }

    #[test]
    fn test_boundary_event_belongs_to_next_bin() {
        let mut buffer = EventBuffer::new("S1");
        buffer.append(events(&[0, 999, 1000, 1999, 2000])).unwrap();

        let bins = drain(&mut buffer, 1000);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].events.len(), 2);
        assert_eq!(bins[1].start_ms, 1000);
        assert_eq!(bins[1].events.len(), 2);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_bins_start_at_head_event_not_grid() {
        let mut buffer = EventBuffer::new("S1");
        buffer.append(events(&[0, 100, 1500, 2600])).unwrap();

        let bins = drain(&mut buffer, 1000);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[1].start_ms, 1500);
        assert_eq!(bins[1].end_ms, 2500);
    }

    #[test]
    fn test_not_available_leaves_buffer_untouched() {
        let mut buffer = EventBuffer::new("S1");
        buffer.append(events(&[0, 10, 20])).unwrap();

        assert!(buffer.take_next_complete_bin(1000).is_none());
        assert_eq!(buffer.len(), 3);

        // More data closes the window later.
        buffer.append(events(&[1000])).unwrap();
        let bin = buffer.take_next_complete_bin(1000).unwrap();
        assert_eq!(bin.len(), 3);
    }

    #[test]
    fn test_empty_buffer() {
        let mut buffer = EventBuffer::new("S1");
        assert!(buffer.take_next_complete_bin(1000).is_none());
        assert!(buffer.take_remaining(1000).is_none());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut buffer = EventBuffer::new("S1");
        buffer.append(events(&[0, 500])).unwrap();

        let err = buffer.append(events(&[600, 400])).unwrap_err();
        assert!(matches!(
            err,
            BinnerError::OutOfOrderEvent { previous_ms: 600, time_ms: 400, .. }
        ));
        // Rejected batch is not partially kept.
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_order_checked_against_consumed_events() {
        let mut buffer = EventBuffer::new("S1");
        buffer.append(events(&[0, 2000])).unwrap();
        assert!(buffer.take_next_complete_bin(1000).is_some());

        assert!(buffer.append(events(&[100])).is_err());
        assert!(buffer.append(events(&[2000])).is_ok());
    }

    #[test]
    fn test_check_does_not_modify_buffer() {
        let mut buffer = EventBuffer::new("S1");
        buffer.append(events(&[0, 500])).unwrap();

        assert!(buffer.check(&events(&[700])).is_ok());
        assert!(buffer.check(&events(&[100])).is_err());
        assert_eq!(buffer.len(), 2);

        // A passed check does not advance the ordering watermark.
        assert!(buffer.append(events(&[600])).is_ok());
    }

    #[test]
    fn test_take_remaining() {
        let mut buffer = EventBuffer::new("S1");
        buffer.append(events(&[10, 20])).unwrap();

        let bin = buffer.take_remaining(1000).unwrap();
        assert_eq!(bin.start_ms, 10);
        assert_eq!(bin.len(), 2);
        assert!(buffer.is_empty());
    }
}
