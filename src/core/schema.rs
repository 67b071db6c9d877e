//! Output column schema.
//!
//! A schema is validated against the metric registry before any capture is
//! read. Its evaluation plan always contains the antenna dwell vector, even
//! when the `antennas` column itself is not emitted, because zone metrics are
//! derived from it.

use crate::core::metrics::{columns, MetricDef, MetricRegistry, ANTENNA_COUNT};
use crate::error::{BinnerError, Result};
use std::collections::HashSet;

/// Columns emitted when none are configured.
pub const DEFAULT_COLUMNS: &[&str] = &[
    columns::SUBJECT,
    columns::TIME,
    columns::TEMPERATURE,
    columns::TRANSITIONS,
    columns::DISTANCE,
    columns::SEPARATION,
    columns::ISOLATION,
    columns::ANTENNAS,
];

/// A validated, ordered list of output columns and how to compute them.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    columns: Vec<&'static str>,
    plan: Vec<MetricDef>,
}

impl ColumnSchema {
    /// Validate `names` against `registry` and build the evaluation plan.
    pub fn build<S: AsRef<str>>(names: &[S], registry: &MetricRegistry) -> Result<Self> {
        if names.is_empty() {
            return Err(BinnerError::EmptySchema);
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            let def = registry
                .get(name)
                .ok_or_else(|| BinnerError::UnknownColumn(name.to_string()))?;
            if !seen.insert(def.name) {
                return Err(BinnerError::DuplicateColumn(name.to_string()));
            }
            columns.push(def.name);
        }

        // Antennas first, unconditionally, then the requested columns.
        let mut requested: Vec<&str> = Vec::with_capacity(columns.len() + 1);
        if registry.contains(columns::ANTENNAS) {
            requested.push(columns::ANTENNAS);
        }
        requested.extend(columns.iter().copied());
        let plan = registry.evaluation_plan(&requested)?;

        Ok(Self { columns, plan })
    }

    /// The default schema over the standard registry.
    pub fn standard() -> Result<Self> {
        Self::build(DEFAULT_COLUMNS, &MetricRegistry::standard())
    }

    /// Ensure the `antennas` column is emitted (appended if absent) or
    /// removed. Computation is unaffected.
    pub fn with_antennas(mut self, include: bool) -> Self {
        let present = self.includes(columns::ANTENNAS);
        let computable = self.plan.iter().any(|d| d.name == columns::ANTENNAS);

        if include && !present && computable {
            self.columns.push(columns::ANTENNAS);
        } else if !include {
            self.columns.retain(|c| *c != columns::ANTENNAS);
        }
        self
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Metrics in dependency order, covering every emitted column.
    pub fn plan(&self) -> &[MetricDef] {
        &self.plan
    }

    pub fn includes(&self, name: &str) -> bool {
        self.columns.iter().any(|c| *c == name)
    }

    /// Header cells, with `antennas` expanded to `antenna1..antenna12`.
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.width());
        for column in &self.columns {
            if *column == columns::ANTENNAS {
                header.extend((1..=ANTENNA_COUNT).map(|n| format!("antenna{n}")));
            } else {
                header.push(column.to_string());
            }
        }
        header
    }

    /// Number of emitted cells per row.
    pub fn width(&self) -> usize {
        self.columns
            .iter()
            .map(|c| if *c == columns::ANTENNAS { ANTENNA_COUNT } else { 1 })
            .sum()
    }
}
