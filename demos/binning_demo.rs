//! Demonstration of the home-cage binning pipeline.
//!
//! This example shows how to:
//! 1. Resolve and order capture identifiers by their timebase
//! 2. Feed per-subject batches from an in-memory source
//! 3. Carry unfinished bins over from one capture to the next
//! 4. Print the subject tables and the run statistics
//!
//! Run with: cargo run --example binning_demo

use homecage_binner::{
    core::{order_captures, MetricRegistry},
    pipeline::{Pipeline, PipelineOptions, TrailingPolicy},
    sink::MemorySink,
    source::{MemorySource, RawRecord},
    ColumnSchema,
};

const RECORDING_START_MS: i64 = 1_433_757_203_990;

fn reading(offset_ms: i64, antenna_id: i64, separation: f64, engaged: bool) -> RawRecord {
    RawRecord {
        antenna_id,
        distance: if antenna_id % 2 == 0 { 12.5 } else { 0.0 },
        separation,
        time_offset_ms: offset_ms,
        temperature: 36.8 + (offset_ms / 7_000 % 7) as f64 * 0.1,
        transition_code: if engaged { "0x01" } else { "0x00" }.to_string(),
    }
}

/// Two subjects wandering across the grid, one reading every 7 seconds.
fn synthetic_capture(elapsed_ms: i64) -> Vec<(&'static str, Vec<RawRecord>)> {
    let shift = elapsed_ms / 60_000;
    let walk = |seed: i64| -> Vec<RawRecord> {
        (0..40)
            .map(|n| {
                let antenna = ((n + seed + shift) % 12) + 1;
                let separation = if (n + seed) % 5 == 0 { 320.0 } else { 90.0 };
                reading(n * 7_000, antenna, separation, n % 3 == 0)
            })
            .collect()
    };
    vec![("M-01", walk(0)), ("M-02", walk(5))]
}

fn main() {
    println!("Homecage Binner - Binning Demo");
    println!("==============================");
    println!();

    // Two consecutive parts of the same recording, listed out of order
    let identifiers = [
        format!("{RECORDING_START_MS}_000167_Cage1Part2_0000000300000.hdf5"),
        format!("{RECORDING_START_MS}_000167_Cage1Part1_0000000000000.hdf5"),
    ];

    let captures = match order_captures(identifiers.iter().cloned()) {
        Ok(captures) => captures,
        Err(e) => {
            eprintln!("Could not resolve capture timebases: {e}");
            return;
        }
    };

    let mut source = MemorySource::new();
    for capture in &captures {
        println!(
            "Capture {} starts at {} ms",
            capture.identifier,
            capture.timebase.origin()
        );
        for (subject, records) in synthetic_capture(capture.timebase.elapsed_ms) {
            source.insert(capture.identifier.clone(), subject, records);
        }
    }
    println!();

    let schema = match ColumnSchema::build(
        &[
            "subject",
            "time",
            "temperature",
            "transitions",
            "distance",
            "isolation",
            "thigmotactic",
            "centre-zone",
        ],
        &MetricRegistry::standard(),
    ) {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("Invalid schema: {e}");
            return;
        }
    };

    let mut options = PipelineOptions::new(60_000, chrono_tz::Europe::London);
    options.include_antennas = false;
    options.trailing = TrailingPolicy::Discard;

    let pipeline = match Pipeline::new(options, schema) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Could not create pipeline: {e}");
            return;
        }
    };
    let log = pipeline.log().clone();

    let mut sink = MemorySink::new();
    let identifiers: Vec<&str> = captures.iter().map(|c| c.identifier.as_str()).collect();
    if let Err(e) = pipeline.run(&mut source, &mut sink, identifiers) {
        eprintln!("Run failed: {e}");
        return;
    }

    for (subject, rows) in sink.deliveries() {
        println!("Subject {subject}");
        for row in rows {
            println!("  {}", row.join(" | "));
        }
        println!();
    }

    println!("{}", log.summary());
}
