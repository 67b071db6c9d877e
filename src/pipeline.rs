//! Capture-by-capture binning pipeline.
//!
//! For every capture, in order: extract the per-subject batches, shift them
//! onto the absolute timeline, append them to each subject's buffer, then
//! drain every complete bin into that subject's aggregator. Draining right
//! after each capture keeps at most about one capture's worth of unconsumed
//! events per subject in memory.

use crate::core::aggregator::SubjectAggregator;
use crate::core::schema::ColumnSchema;
use crate::core::timebase::TimeBase;
use crate::core::windowing::EventBuffer;
use crate::error::{BinnerError, Result};
use crate::report::{create_shared_log, RunLog, RunStats, SharedRunLog};
use crate::sink::Sink;
use crate::source::{EventSource, SubjectBatches};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What happens to events still buffered after the last capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailingPolicy {
    /// Drop them; they never reached a bin boundary
    #[default]
    Discard,
    /// Emit them as one final partial bin per subject
    Flush,
}

/// How subjects are drained after each capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainMode {
    #[default]
    Sequential,
    /// One scoped thread per subject with pending events
    Parallel,
}

/// Run-wide pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub bin_duration_ms: i64,
    pub include_antennas: bool,
    /// Used only to format the `time` column
    pub timezone: Tz,
    pub trailing: TrailingPolicy,
    pub drain: DrainMode,
}

impl PipelineOptions {
    pub fn new(bin_duration_ms: i64, timezone: Tz) -> Self {
        Self {
            bin_duration_ms,
            include_antennas: true,
            timezone,
            trailing: TrailingPolicy::default(),
            drain: DrainMode::default(),
        }
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| BinnerError::InvalidTimezone(name.to_string()))
}

/// Buffer and (once a bin completes) aggregator for one subject.
#[derive(Debug)]
struct SubjectState {
    buffer: EventBuffer,
    aggregator: Option<SubjectAggregator>,
}

impl SubjectState {
    fn new(subject: &str) -> Self {
        Self {
            buffer: EventBuffer::new(subject),
            aggregator: None,
        }
    }

    fn aggregator_mut(&mut self, schema: &Arc<ColumnSchema>, timezone: Tz) -> &mut SubjectAggregator {
        let subject = self.buffer.subject();
        self.aggregator
            .get_or_insert_with(|| SubjectAggregator::new(subject, Arc::clone(schema), timezone))
    }

    /// Move every complete bin into the aggregator.
    fn drain(&mut self, window_ms: i64, schema: &Arc<ColumnSchema>, timezone: Tz, log: &RunLog) -> usize {
        let mut completed = 0;
        while let Some(bin) = self.buffer.take_next_complete_bin(window_ms) {
            self.aggregator_mut(schema, timezone).add_record(&bin);
            log.record_bin_completed();
            completed += 1;
        }
        if completed > 0 {
            debug!(
                subject = self.buffer.subject(),
                completed,
                pending = self.buffer.len(),
                "drained bins"
            );
        }
        completed
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Rows (excluding header) delivered per subject
    pub rows_per_subject: BTreeMap<String, usize>,
    pub stats: RunStats,
}

/// The binning orchestrator. Owns every subject's buffer and aggregator.
#[derive(Debug)]
pub struct Pipeline {
    options: PipelineOptions,
    schema: Arc<ColumnSchema>,
    subjects: BTreeMap<String, SubjectState>,
    log: SharedRunLog,
}

impl Pipeline {
    /// Create a pipeline. The antenna flag of `options` decides whether the
    /// antenna columns are emitted.
    pub fn new(options: PipelineOptions, schema: ColumnSchema) -> Result<Self> {
        if options.bin_duration_ms <= 0 {
            return Err(BinnerError::InvalidBinDuration(options.bin_duration_ms));
        }

        let schema = Arc::new(schema.with_antennas(options.include_antennas));
        Ok(Self {
            options,
            schema,
            subjects: BTreeMap::new(),
            log: create_shared_log(),
        })
    }

    /// Record into an existing run log instead of a fresh one.
    pub fn with_log(mut self, log: SharedRunLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> &SharedRunLog {
        &self.log
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// Process every capture in order, then deliver to `sink`.
    pub fn run<S, K, I>(mut self, source: &mut S, sink: &mut K, identifiers: I) -> Result<RunOutcome>
    where
        S: EventSource + ?Sized,
        K: Sink + ?Sized,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        info!(run_id = %self.log.run_id(), "processing the data");
        for identifier in identifiers {
            self.process_capture(source, identifier.as_ref())?;
        }
        self.finish(sink)
    }

    /// Extract one capture from `source` and ingest it.
    ///
    /// The identifier's timebase is resolved before the source is touched.
    pub fn process_capture<S>(&mut self, source: &mut S, identifier: &str) -> Result<usize>
    where
        S: EventSource + ?Sized,
    {
        let timebase = TimeBase::parse(identifier)?;
        info!(identifier, origin_ms = timebase.origin(), "dumping the data");
        let batches = source.extract(identifier)?;
        self.ingest(timebase, batches)
    }

    /// Append a capture's batches and drain all complete bins.
    ///
    /// Every subject's batch is normalized and order-checked before any is
    /// appended, so a rejected capture leaves all buffers unchanged.
    /// Returns the number of bins completed.
    pub fn ingest(&mut self, timebase: TimeBase, batches: SubjectBatches) -> Result<usize> {
        let origin = timebase.origin();

        let mut staged = Vec::with_capacity(batches.len());
        for (subject, records) in batches {
            let events = records
                .iter()
                .map(|r| r.normalize(origin))
                .collect::<Result<Vec<_>>>()?;
            match self.subjects.get(&subject) {
                Some(state) => state.buffer.check(&events)?,
                None => EventBuffer::new(subject.as_str()).check(&events)?,
            }
            staged.push((subject, events));
        }

        for (subject, events) in staged {
            let state = self
                .subjects
                .entry(subject)
                .or_insert_with_key(|s| SubjectState::new(s));
            let appended = state.buffer.append(events)?;
            self.log.record_events_ingested(appended as u64);
        }

        let completed = self.drain_all();
        self.log.record_file_processed();
        Ok(completed)
    }

    fn drain_all(&mut self) -> usize {
        let window_ms = self.options.bin_duration_ms;
        let timezone = self.options.timezone;
        let schema = &self.schema;
        let log: &RunLog = &self.log;
        let pending = self.subjects.values_mut().filter(|s| !s.buffer.is_empty());

        match self.options.drain {
            DrainMode::Sequential => pending
                .map(|state| state.drain(window_ms, schema, timezone, log))
                .sum(),
            DrainMode::Parallel => std::thread::scope(|scope| {
                let handles: Vec<_> = pending
                    .map(|state| scope.spawn(move || state.drain(window_ms, schema, timezone, log)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                    .sum()
            }),
        }
    }

    /// Apply the trailing policy and deliver every subject that completed at
    /// least one bin, in subject order.
    pub fn finish<K>(mut self, sink: &mut K) -> Result<RunOutcome>
    where
        K: Sink + ?Sized,
    {
        let window_ms = self.options.bin_duration_ms;
        let mut rows_per_subject = BTreeMap::new();

        for (subject, state) in self.subjects.iter_mut() {
            let leftover = state.buffer.len() as u64;
            match self.options.trailing {
                TrailingPolicy::Discard => {
                    if leftover > 0 {
                        debug!(subject = subject.as_str(), leftover, "discarding trailing events");
                    }
                    state.buffer.take_remaining(window_ms);
                    self.log.record_events_discarded(leftover);
                }
                TrailingPolicy::Flush => {
                    if let Some(bin) = state.buffer.take_remaining(window_ms) {
                        state
                            .aggregator_mut(&self.schema, self.options.timezone)
                            .add_record(&bin);
                        self.log.record_bin_completed();
                        self.log.record_events_flushed(leftover);
                    }
                }
            }

            let Some(aggregator) = state.aggregator.as_ref() else {
                debug!(subject = subject.as_str(), "no complete bin, nothing to write");
                continue;
            };

            sink.deliver(subject, &aggregator.get_rows())?;
            self.log.record_subject_delivered();
            rows_per_subject.insert(subject.clone(), aggregator.row_count());
        }
        sink.finish()?;

        let stats = self.log.stats();
        info!(
            subjects = stats.subjects_delivered,
            bins = stats.bins_completed,
            discarded = stats.events_discarded,
            "run complete"
        );
        Ok(RunOutcome {
            rows_per_subject,
            stats,
        })
    }

    /// The aggregator of `subject`, once it has completed a bin.
    pub fn aggregator(&self, subject: &str) -> Option<&SubjectAggregator> {
        self.subjects.get(subject)?.aggregator.as_ref()
    }

    /// Number of subjects with an aggregator.
    pub fn aggregator_count(&self) -> usize {
        self.subjects
            .values()
            .filter(|s| s.aggregator.is_some())
            .count()
    }

    /// Events of `subject` still waiting for a bin boundary.
    pub fn buffered(&self, subject: &str) -> usize {
        self.subjects.get(subject).map_or(0, |s| s.buffer.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metrics::MetricRegistry;
    use crate::sink::MemorySink;
    use crate::source::{MemorySource, RawRecord};

    fn record(offset: i64, antenna_id: i64) -> RawRecord {
        RawRecord {
            antenna_id,
            distance: 1.0,
            separation: 100.0,
            time_offset_ms: offset,
            temperature: 37.0,
            transition_code: "0x00".to_string(),
        }
    }

    fn records(offsets: &[i64]) -> Vec<RawRecord> {
        offsets.iter().map(|&o| record(o, 1)).collect()
    }

    fn pipeline(options: PipelineOptions) -> Pipeline {
        let schema = ColumnSchema::build(&["subject", "distance"], &MetricRegistry::standard()).unwrap();
        Pipeline::new(options, schema).unwrap()
    }

    fn options() -> PipelineOptions {
        let mut options = PipelineOptions::new(1000, chrono_tz::UTC);
        options.include_antennas = false;
        options
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let schema = ColumnSchema::standard().unwrap();
        let err = Pipeline::new(PipelineOptions::new(0, chrono_tz::UTC), schema).unwrap_err();
        assert!(matches!(err, BinnerError::InvalidBinDuration(0)));
    }

    #[test]
    fn test_parse_timezone() {
        assert_eq!(parse_timezone("Europe/London").unwrap(), chrono_tz::Europe::London);
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(BinnerError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_antenna_flag_controls_columns() {
        let schema = ColumnSchema::build(&["subject"], &MetricRegistry::standard()).unwrap();
        let pipeline = Pipeline::new(PipelineOptions::new(1000, chrono_tz::UTC), schema).unwrap();
        assert_eq!(pipeline.schema().columns(), &["subject", "antennas"]);
    }

    #[test]
    fn test_invalid_identifier_fails_before_extraction() {
        let mut source = MemorySource::new();
        source.insert("not-a-capture", "S1", records(&[0]));

        let mut pipeline = pipeline(options());
        let err = pipeline.process_capture(&mut source, "not-a-capture").unwrap_err();
        assert!(matches!(err, BinnerError::InvalidIdentifier(_)));
        assert_eq!(source.extracted(), 0);
    }

    #[test]
    fn test_carry_over_between_captures() {
        let mut source = MemorySource::new();
        source.insert("1000_a_0", "S1", records(&[0, 300]));
        source.insert("1000_b_600", "S1", records(&[0, 900]));

        let mut pipeline = pipeline(options());
        assert_eq!(pipeline.process_capture(&mut source, "1000_a_0").unwrap(), 0);
        assert_eq!(pipeline.aggregator_count(), 0);
        assert_eq!(pipeline.buffered("S1"), 2);

        // Second capture lands at 1600 and 2500, closing [1000, 2000).
        assert_eq!(pipeline.process_capture(&mut source, "1000_b_600").unwrap(), 1);
        assert_eq!(pipeline.aggregator("S1").unwrap().row_count(), 1);
        assert_eq!(pipeline.buffered("S1"), 1);
    }

    #[test]
    fn test_out_of_order_across_captures() {
        let mut source = MemorySource::new();
        source.insert("1000_a_5000", "S1", records(&[0]));
        source.insert("1000_b_0", "S1", records(&[0]));

        let mut sink = MemorySink::new();
        let err = pipeline(options())
            .run(&mut source, &mut sink, ["1000_a_5000", "1000_b_0"])
            .unwrap_err();
        assert!(matches!(err, BinnerError::OutOfOrderEvent { .. }));
        assert!(sink.deliveries().is_empty());
    }

    #[test]
    fn test_rejected_capture_leaves_buffers_unchanged() {
        let mut source = MemorySource::new();
        source.insert("0_a_0", "S1", records(&[0, 100]));
        source.insert("0_a_0", "S2", records(&[500, 100]));
        source.insert("0_b_1000", "S1", records(&[0, 2000]));

        let mut pipeline = pipeline(options());
        let err = pipeline.process_capture(&mut source, "0_a_0").unwrap_err();
        assert!(matches!(
            err,
            BinnerError::OutOfOrderEvent { ref subject, .. } if subject == "S2"
        ));
        assert_eq!(pipeline.buffered("S1"), 0);
        assert_eq!(pipeline.buffered("S2"), 0);
        assert_eq!(pipeline.log().stats().events_ingested, 0);

        // The pipeline stays usable after the rejected capture.
        assert_eq!(pipeline.process_capture(&mut source, "0_b_1000").unwrap(), 1);
        assert_eq!(pipeline.buffered("S1"), 1);
    }

    #[test]
    fn test_timestamp_overflow_is_an_error() {
        let identifier = format!("{}_x_0", i64::MAX - 10);
        let mut source = MemorySource::new();
        source.insert(identifier.as_str(), "S1", records(&[1000]));

        let mut sink = MemorySink::new();
        let err = pipeline(options())
            .run(&mut source, &mut sink, [identifier.as_str()])
            .unwrap_err();
        assert!(matches!(err, BinnerError::TimestampOverflow { offset_ms: 1000, .. }));
        assert!(sink.deliveries().is_empty());
    }

    #[test]
    fn test_flush_policy_adds_final_partial_bin() {
        let mut source = MemorySource::new();
        source.insert("0_a_0", "S1", records(&[0, 50, 5000, 5100]));
        source.insert("0_a_0", "S2", records(&[0, 10]));

        let mut discard_sink = MemorySink::new();
        let discarded = pipeline(options())
            .run(&mut source, &mut discard_sink, ["0_a_0"])
            .unwrap();
        assert_eq!(discarded.rows_per_subject.get("S1"), Some(&1));
        assert!(discard_sink.rows_for("S2").is_none());
        assert_eq!(discarded.stats.events_discarded, 4);

        let mut flush_options = options();
        flush_options.trailing = TrailingPolicy::Flush;
        let mut flush_sink = MemorySink::new();
        let flushed = pipeline(flush_options)
            .run(&mut source, &mut flush_sink, ["0_a_0"])
            .unwrap();
        assert_eq!(flushed.rows_per_subject.get("S1"), Some(&2));
        assert_eq!(flushed.rows_per_subject.get("S2"), Some(&1));
        assert_eq!(flushed.stats.events_flushed, 4);
        assert_eq!(flush_sink.rows_for("S1").unwrap()[2], vec!["S1", "2"]);
    }
}
