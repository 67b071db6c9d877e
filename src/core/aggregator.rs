//! Per-subject row accumulation.
//!
//! Every completed bin becomes one [`OutputRow`] holding the full computed
//! row, antenna dwell vector included. Rows are projected onto the schema's
//! emitted columns only when they are rendered.

use crate::core::metrics::{evaluate, BinContext, ComputedRow, MetricValue, ANTENNA_COUNT};
use crate::core::schema::ColumnSchema;
use crate::core::windowing::Bin;
use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;

/// Layout used for the localized `time` cell.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f%:z";

/// All computed values for one bin.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    values: ComputedRow,
}

impl OutputRow {
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values.get(name)
    }

    pub fn values(&self) -> &ComputedRow {
        &self.values
    }

    /// Render the cells named by `schema`, in schema order.
    pub fn project(&self, schema: &ColumnSchema, timezone: Tz) -> Vec<String> {
        let mut cells = Vec::with_capacity(schema.width());
        for column in schema.columns() {
            match self.values.get(column) {
                Some(value) => cells.extend(render_value(value, timezone)),
                None => cells.push(String::new()),
            }
        }
        cells
    }
}

/// Accumulates the rows of one subject.
#[derive(Debug, Clone)]
pub struct SubjectAggregator {
    subject: String,
    schema: Arc<ColumnSchema>,
    timezone: Tz,
    rows: Vec<OutputRow>,
}

impl SubjectAggregator {
    pub fn new(subject: impl Into<String>, schema: Arc<ColumnSchema>, timezone: Tz) -> Self {
        Self {
            subject: subject.into(),
            schema,
            timezone,
            rows: Vec::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Compute one row for `bin` and append it.
    pub fn add_record(&mut self, bin: &Bin) -> &OutputRow {
        let ctx = BinContext {
            subject: &self.subject,
            events: &bin.events,
        };
        let values = evaluate(self.schema.plan(), &ctx);

        self.rows.push(OutputRow { values });
        &self.rows[self.rows.len() - 1]
    }

    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn header(&self) -> Vec<String> {
        self.schema.header()
    }

    /// Header followed by every row, rendered as text.
    pub fn get_rows(&self) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(self.header());
        out.extend(
            self.rows
                .iter()
                .map(|row| row.project(&self.schema, self.timezone)),
        );
        out
    }
}

/// Render one value as one cell, or twelve for the antenna vector.
pub fn render_value(value: &MetricValue, timezone: Tz) -> Vec<String> {
    match value {
        MetricValue::Text(s) => vec![s.clone()],
        MetricValue::Count(n) => vec![n.to_string()],
        MetricValue::Number(n) => vec![n.to_string()],
        MetricValue::Timestamp(ms) => vec![format_timestamp(*ms, timezone)],
        MetricValue::Antennas(dwell) => {
            debug_assert_eq!(dwell.len(), ANTENNA_COUNT);
            dwell.iter().map(|d| d.to_string()).collect()
        }
    }
}

/// Format epoch milliseconds in `timezone`.
///
/// Falls back to the raw millisecond value when it is outside chrono's range.
pub fn format_timestamp(ms: i64, timezone: Tz) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(utc) => utc
            .with_timezone(&timezone)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
        None => ms.to_string(),
    }
}
