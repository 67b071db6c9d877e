//! Metric registry: named, pure computations over a bin's events.
//!
//! Each metric declares the columns it depends on. The evaluation plan built
//! from a column list always places dependencies first, so zone metrics can
//! read the antenna dwell vector computed earlier in the same row.

use crate::error::{BinnerError, Result};
use crate::source::RawEvent;
use std::collections::HashSet;

/// Number of antennas (zones) on the tracking baseplate.
pub const ANTENNA_COUNT: usize = 12;

/// Dwell time in seconds per antenna, index 0 is antenna 1.
pub type AntennaVector = [f64; ANTENNA_COUNT];

/// Separation above which a subject counts as isolated.
pub const ISOLATION_SEPARATION_THRESHOLD: f64 = 200.0;

/// Antennas in the two central cells of the 3x4 grid.
pub const CENTRAL_ANTENNAS: [i64; 2] = [6, 7];

/// Antennas on the perimeter of the 3x4 grid.
pub const PERIPHERAL_ANTENNAS: [i64; 10] = [1, 2, 3, 4, 5, 8, 9, 10, 11, 12];

/// Registered column names.
pub mod columns {
    pub const SUBJECT: &str = "subject";
    pub const TIME: &str = "time";
    pub const TEMPERATURE: &str = "temperature";
    pub const TRANSITIONS: &str = "transitions";
    pub const DISTANCE: &str = "distance";
    pub const SEPARATION: &str = "separation";
    pub const ISOLATION: &str = "isolation";
    pub const MOBILE: &str = "mobile";
    pub const ANTENNAS: &str = "antennas";
    pub const THIGMOTACTIC: &str = "thigmotactic";
    pub const CENTRE_ZONE: &str = "centre-zone";
}

/// A computed cell value before text rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Text(String),
    Count(u64),
    Number(f64),
    /// Absolute epoch milliseconds
    Timestamp(i64),
    Antennas(AntennaVector),
}

/// The inputs every metric sees for one bin.
#[derive(Debug, Clone, Copy)]
pub struct BinContext<'a> {
    pub subject: &'a str,
    pub events: &'a [RawEvent],
}

/// Values computed so far for one row, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputedRow {
    values: Vec<(&'static str, MetricValue)>,
}

impl ComputedRow {
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }

    /// The antenna dwell vector, if it has been computed.
    pub fn antennas(&self) -> Option<&AntennaVector> {
        match self.get(columns::ANTENNAS) {
            Some(MetricValue::Antennas(v)) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &MetricValue)> {
        self.values.iter().map(|(n, v)| (*n, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn push(&mut self, name: &'static str, value: MetricValue) {
        self.values.push((name, value));
    }
}

/// Signature shared by all metric functions.
pub type MetricFn = fn(&BinContext<'_>, &ComputedRow) -> MetricValue;

/// One registry entry.
#[derive(Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    /// Columns that must be computed before this one
    pub requires: &'static [&'static str],
    pub description: &'static str,
    compute: MetricFn,
}

impl MetricDef {
    pub const fn new(
        name: &'static str,
        requires: &'static [&'static str],
        description: &'static str,
        compute: MetricFn,
    ) -> Self {
        Self {
            name,
            requires,
            description,
            compute,
        }
    }

    pub fn compute(&self, ctx: &BinContext<'_>, row: &ComputedRow) -> MetricValue {
        (self.compute)(ctx, row)
    }
}

impl std::fmt::Debug for MetricDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricDef")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .finish()
    }
}

/// Name-keyed collection of metric definitions.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    defs: Vec<MetricDef>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl MetricRegistry {
    /// A registry with no metrics.
    pub fn empty() -> Self {
        Self { defs: Vec::new() }
    }

    /// The built-in home-cage metrics.
    pub fn standard() -> Self {
        use columns::*;

        let mut registry = Self::empty();
        registry
            .register(MetricDef::new(SUBJECT, &[], "subject identifier", subject))
            .register(MetricDef::new(TIME, &[], "time of the bin's first event", time))
            .register(MetricDef::new(TEMPERATURE, &[], "mean temperature", temperature))
            .register(MetricDef::new(TRANSITIONS, &[], "number of antenna engagements", transitions))
            .register(MetricDef::new(DISTANCE, &[], "total distance", distance))
            .register(MetricDef::new(SEPARATION, &[], "mean separation", separation))
            .register(MetricDef::new(
                ISOLATION,
                &[],
                "seconds spent with separation above 200",
                isolation,
            ))
            .register(MetricDef::new(MOBILE, &[], "seconds spent moving", mobile))
            .register(MetricDef::new(ANTENNAS, &[], "dwell seconds per antenna", antennas))
            .register(MetricDef::new(
                THIGMOTACTIC,
                &[ANTENNAS],
                "dwell seconds on peripheral antennas",
                thigmotactic,
            ))
            .register(MetricDef::new(
                CENTRE_ZONE,
                &[ANTENNAS],
                "dwell seconds on central antennas",
                centre_zone,
            ));
        registry
    }

    /// Add or replace a definition.
    pub fn register(&mut self, def: MetricDef) -> &mut Self {
        match self.defs.iter_mut().find(|d| d.name == def.name) {
            Some(existing) => *existing = def,
            None => self.defs.push(def),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&MetricDef> {
        self.defs.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn definitions(&self) -> &[MetricDef] {
        &self.defs
    }

    /// Order `names` and their dependencies so every metric follows the
    /// metrics it requires. Each metric appears once.
    pub fn evaluation_plan(&self, names: &[&str]) -> Result<Vec<MetricDef>> {
        let mut plan = Vec::new();
        let mut done = HashSet::new();
        let mut visiting = HashSet::new();

        for name in names {
            self.visit(name, &mut plan, &mut done, &mut visiting)?;
        }
        Ok(plan)
    }

    fn visit(
        &self,
        name: &str,
        plan: &mut Vec<MetricDef>,
        done: &mut HashSet<&'static str>,
        visiting: &mut HashSet<&'static str>,
    ) -> Result<()> {
        let def = *self
            .get(name)
            .ok_or_else(|| BinnerError::UnknownColumn(name.to_string()))?;

        if done.contains(def.name) {
            return Ok(());
        }
        if !visiting.insert(def.name) {
            return Err(BinnerError::DependencyCycle(def.name.to_string()));
        }

        for dep in def.requires {
            self.visit(dep, plan, done, visiting)?;
        }

        visiting.remove(def.name);
        done.insert(def.name);
        plan.push(def);
        Ok(())
    }
}

/// Evaluate a plan over one bin.
pub fn evaluate(plan: &[MetricDef], ctx: &BinContext<'_>) -> ComputedRow {
    let mut row = ComputedRow::default();
    for def in plan {
        let value = def.compute(ctx, &row);
        row.push(def.name, value);
    }
    row
}

fn subject(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    MetricValue::Text(ctx.subject.to_string())
}

fn time(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    MetricValue::Timestamp(ctx.events.first().map_or(0, |e| e.time_ms))
}

fn temperature(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    MetricValue::Number(mean(ctx.events.iter().map(|e| e.temperature)))
}

fn transitions(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    let count = ctx
        .events
        .iter()
        .filter(|e| e.transition.is_engaged())
        .count();
    MetricValue::Count(count as u64)
}

fn distance(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    MetricValue::Number(ctx.events.iter().map(|e| e.distance).sum())
}

fn separation(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    MetricValue::Number(mean(ctx.events.iter().map(|e| e.separation)))
}

fn isolation(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    MetricValue::Number(seconds_where(ctx.events, |e| {
        e.separation > ISOLATION_SEPARATION_THRESHOLD
    }))
}

fn mobile(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    MetricValue::Number(seconds_where(ctx.events, |e| e.distance > 0.0))
}

fn antennas(ctx: &BinContext<'_>, _: &ComputedRow) -> MetricValue {
    MetricValue::Antennas(antenna_dwell(ctx.events))
}

fn thigmotactic(_: &BinContext<'_>, row: &ComputedRow) -> MetricValue {
    MetricValue::Number(zone_sum(row, &PERIPHERAL_ANTENNAS))
}

fn centre_zone(_: &BinContext<'_>, row: &ComputedRow) -> MetricValue {
    MetricValue::Number(zone_sum(row, &CENTRAL_ANTENNAS))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Sum, over consecutive event pairs, of the gap in seconds leading up to
/// every event matching `predicate`. The first event contributes nothing.
fn seconds_where(events: &[RawEvent], predicate: impl Fn(&RawEvent) -> bool) -> f64 {
    let Some(first) = events.first() else {
        return 0.0;
    };

    let mut last_time = first.time_ms;
    let mut total = 0.0;
    for event in events {
        let gap_ms = event.time_ms - last_time;
        last_time = event.time_ms;
        if predicate(event) {
            total += gap_ms as f64 / 1000.0;
        }
    }
    total
}

/// Dwell seconds per antenna.
///
/// Whenever the antenna id changes, the time since the previous change is
/// credited to the antenna being left. The segment still open at the end of
/// the bin is not credited. Ids outside `1..=12` are never credited.
pub fn antenna_dwell(events: &[RawEvent]) -> AntennaVector {
    let mut dwell = [0.0; ANTENNA_COUNT];
    let Some(first) = events.first() else {
        return dwell;
    };

    let mut last_antenna = first.antenna_id;
    let mut last_time = first.time_ms;
    for event in events {
        if event.antenna_id == last_antenna {
            continue;
        }
        if let Some(slot) = antenna_slot(last_antenna) {
            dwell[slot] += (event.time_ms - last_time) as f64 / 1000.0;
        }
        last_antenna = event.antenna_id;
        last_time = event.time_ms;
    }
    dwell
}

fn antenna_slot(antenna_id: i64) -> Option<usize> {
    usize::try_from(antenna_id)
        .ok()
        .filter(|id| (1..=ANTENNA_COUNT).contains(id))
        .map(|id| id - 1)
}

fn zone_sum(row: &ComputedRow, zone: &[i64]) -> f64 {
    let Some(dwell) = row.antennas() else {
        return 0.0;
    };
    zone.iter()
        .filter_map(|&id| antenna_slot(id))
        .map(|slot| dwell[slot])
        .sum()
}
