//! End-to-end tests for the binning pipeline.
//!
//! Run with: cargo test --test pipeline_test

use homecage_binner::{
    config::Config,
    core::MetricRegistry,
    pipeline::{DrainMode, Pipeline, PipelineOptions, TrailingPolicy},
    report::RunStats,
    sink::{CsvLayout, CsvSink, JsonSink, MemorySink},
    source::{JsonSource, MemorySource, RawRecord},
    BinnerError, ColumnSchema,
};
use std::path::Path;

fn record(offset: i64, antenna_id: i64) -> RawRecord {
    RawRecord {
        antenna_id,
        distance: 1.0,
        separation: 150.0,
        time_offset_ms: offset,
        temperature: 37.0,
        transition_code: "0x00".to_string(),
    }
}

fn options(bin_duration_ms: i64) -> PipelineOptions {
    let mut options = PipelineOptions::new(bin_duration_ms, chrono_tz::UTC);
    options.include_antennas = false;
    options
}

fn schema(columns: &[&str]) -> ColumnSchema {
    ColumnSchema::build(columns, &MetricRegistry::standard()).unwrap()
}

fn write_capture(dir: &Path, identifier: &str, body: &str) {
    std::fs::write(dir.join(format!("{identifier}.json")), body).unwrap();
}

#[test]
fn test_json_captures_to_combined_csv() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    // Listed out of order on purpose; discovery sorts by origin.
    write_capture(
        input.path(),
        "0_cage_1500",
        r#"{"subjects": {
            "S1": [[7, 0.0, 100.0, 0, 36.0, "0x01"], [7, 1.0, 100.0, 1000, 36.0, "0x00"]],
            "S2": [[1, 1.0, 50.0, 0, 37.0, "0x00"]]
        }}"#,
    );
    write_capture(
        input.path(),
        "0_cage_0",
        r#"{"subjects": {
            "S1": [[6, 1.0, 250.0, 0, 37.0, "0x01"], [6, 2.0, 250.0, 500, 38.0, "0x00"]]
        }}"#,
    );

    let captures = JsonSource::discover(input.path()).unwrap();
    let identifiers: Vec<&str> = captures.iter().map(|c| c.identifier.as_str()).collect();
    assert_eq!(identifiers, vec!["0_cage_0", "0_cage_1500"]);

    let csv_path = output.path().join("binned.csv");
    let mut sink = CsvSink::new(CsvLayout::Combined(csv_path.clone()));
    let mut source = JsonSource::new(input.path());

    let pipeline = Pipeline::new(
        options(1000),
        schema(&[
            "subject",
            "time",
            "temperature",
            "transitions",
            "distance",
            "separation",
            "isolation",
        ]),
    )
    .unwrap();
    let outcome = pipeline.run(&mut source, &mut sink, identifiers).unwrap();

    // S2 never reaches a bin boundary and gets no output.
    assert_eq!(outcome.rows_per_subject.len(), 1);
    assert_eq!(outcome.stats.files_processed, 2);
    assert_eq!(outcome.stats.events_ingested, 5);
    assert_eq!(outcome.stats.events_discarded, 2);

    let content = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(
        content,
        "subject,time,temperature,transitions,distance,separation,isolation\n\
         S1,1970-01-01 00:00:00.000+00:00,37.5,1,3,250,0.5\n\
         S1,1970-01-01 00:00:01.500+00:00,36,1,0,100,0\n"
    );
}

#[test]
fn test_carry_over_uses_one_aggregator() {
    let mut source = MemorySource::new();
    source.insert("1000_a_0", "S1", vec![record(0, 1), record(900, 1)]);
    source.insert("1000_b_1000", "S1", vec![record(100, 2), record(1500, 2)]);
    source.insert("1000_c_3000", "S1", vec![record(600, 3)]);

    let mut pipeline = Pipeline::new(options(1000), schema(&["subject", "distance"])).unwrap();
    for identifier in ["1000_a_0", "1000_b_1000", "1000_c_3000"] {
        pipeline.process_capture(&mut source, identifier).unwrap();
    }

    // Timeline: 1000, 1900 | 2100 | 3500 | 4600 (pending)
    assert_eq!(pipeline.aggregator_count(), 1);
    assert_eq!(pipeline.aggregator("S1").unwrap().row_count(), 3);
    assert_eq!(pipeline.buffered("S1"), 1);

    let mut sink = MemorySink::new();
    pipeline.finish(&mut sink).unwrap();
    let rows = sink.rows_for("S1").unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1], vec!["S1", "2"]);
    assert!(sink.is_finished());
}

#[test]
fn test_trailing_events_never_form_a_bin() {
    let mut source = MemorySource::new();
    source.insert("0_x_0", "S1", vec![record(0, 1), record(50, 1), record(5000, 1)]);

    let mut sink = MemorySink::new();
    let outcome = Pipeline::new(options(1000), schema(&["subject", "distance"]))
        .unwrap()
        .run(&mut source, &mut sink, ["0_x_0"])
        .unwrap();

    assert_eq!(outcome.rows_per_subject["S1"], 1);
    assert_eq!(sink.rows_for("S1").unwrap()[1], vec!["S1", "2"]);
    assert_eq!(outcome.stats.events_discarded, 1);
}

#[test]
fn test_unknown_column_fails_before_any_read() {
    let mut source = MemorySource::new();
    source.insert("0_a_0", "S1", vec![record(0, 1), record(120_000, 1)]);
    let mut sink = MemorySink::new();

    let run = |config: &Config, source: &mut MemorySource, sink: &mut MemorySink| {
        config
            .validate(&MetricRegistry::standard())
            .and_then(|(options, schema)| Pipeline::new(options, schema))
            .and_then(|pipeline| pipeline.run(source, sink, ["0_a_0"]))
    };

    let config = Config {
        columns: vec!["subject".to_string(), "velocity".to_string()],
        ..Config::default()
    };
    let err = run(&config, &mut source, &mut sink).unwrap_err();
    assert!(matches!(err, BinnerError::UnknownColumn(ref c) if c == "velocity"));
    assert_eq!(source.extracted(), 0);
    assert!(sink.deliveries().is_empty());
    assert!(!sink.is_finished());

    // The same path with valid columns does read and deliver.
    let config = Config {
        columns: vec!["subject".to_string()],
        ..Config::default()
    };
    run(&config, &mut source, &mut sink).unwrap();
    assert_eq!(source.extracted(), 1);
    assert_eq!(sink.deliveries().len(), 1);
}

#[test]
fn test_identical_runs_produce_identical_rows() {
    let mut source = MemorySource::new();
    source.insert(
        "5000_a_0",
        "S1",
        vec![record(0, 1), record(400, 6), record(700, 7), record(1300, 2)],
    );

    let run = |source: &mut MemorySource| {
        let mut options = PipelineOptions::new(1000, chrono_tz::Europe::London);
        options.trailing = TrailingPolicy::Flush;
        let mut sink = MemorySink::new();
        Pipeline::new(options, ColumnSchema::standard().unwrap())
            .unwrap()
            .run(source, &mut sink, ["5000_a_0"])
            .unwrap();
        sink.deliveries().to_vec()
    };

    assert_eq!(run(&mut source), run(&mut source));
}

#[test]
fn test_parallel_drain_matches_sequential() {
    let mut source = MemorySource::new();
    for (i, subject) in ["S1", "S2", "S3", "S4"].iter().enumerate() {
        let step = 300 + 100 * i as i64;
        let first: Vec<RawRecord> = (0..10).map(|n| record(n * step, (n % 12) + 1)).collect();
        let second: Vec<RawRecord> = (0..10).map(|n| record(n * step, 12 - (n % 12))).collect();
        source.insert("1000_a_0", *subject, first);
        source.insert("1000_b_10000", *subject, second);
    }
    let identifiers = ["1000_a_0", "1000_b_10000"];

    let mut run = |drain: DrainMode| {
        let mut options = PipelineOptions::new(1000, chrono_tz::UTC);
        options.drain = drain;
        let mut sink = MemorySink::new();
        let outcome = Pipeline::new(options, ColumnSchema::standard().unwrap())
            .unwrap()
            .run(&mut source, &mut sink, identifiers)
            .unwrap();
        (sink.deliveries().to_vec(), outcome.stats.bins_completed)
    };

    let sequential = run(DrainMode::Sequential);
    let parallel = run(DrainMode::Parallel);
    assert_eq!(sequential, parallel);
    assert_eq!(sequential.0.len(), 4);
}

#[test]
fn test_zone_columns_without_antenna_columns() {
    let mut source = MemorySource::new();
    source.insert(
        "0_z_0",
        "S1",
        vec![
            record(0, 1),
            record(0, 1),
            record(1000, 2),
            record(2000, 2),
            record(2500, 6),
        ],
    );

    let mut options = options(10_000);
    options.trailing = TrailingPolicy::Flush;
    let mut sink = MemorySink::new();
    Pipeline::new(options, schema(&["subject", "thigmotactic", "centre-zone"]))
        .unwrap()
        .run(&mut source, &mut sink, ["0_z_0"])
        .unwrap();

    let rows = sink.rows_for("S1").unwrap();
    assert_eq!(rows[0], vec!["subject", "thigmotactic", "centre-zone"]);
    assert_eq!(rows[1], vec!["S1", "2.5", "0"]);
}

#[test]
fn test_antenna_columns_expand_in_output() {
    let mut source = MemorySource::new();
    source.insert(
        "0_z_0",
        "S1",
        vec![record(0, 1), record(0, 1), record(1000, 2), record(2000, 2), record(2500, 3)],
    );

    let mut options = PipelineOptions::new(10_000, chrono_tz::UTC);
    options.trailing = TrailingPolicy::Flush;
    let mut sink = MemorySink::new();
    Pipeline::new(options, schema(&["subject"]))
        .unwrap()
        .run(&mut source, &mut sink, ["0_z_0"])
        .unwrap();

    let rows = sink.rows_for("S1").unwrap();
    assert_eq!(rows[0].len(), 13);
    assert_eq!(rows[0][1], "antenna1");
    assert_eq!(rows[0][12], "antenna12");
    assert_eq!(&rows[1][..4], &["S1", "1", "1.5", "0"]);
}

#[test]
fn test_per_subject_outputs_and_report() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_capture(
        input.path(),
        "0_cage_0",
        r#"{"subjects": {
            "S1": [{"antenna_id": 1, "distance": 1.0, "separation": 10.0,
                    "time_offset_ms": 0, "temperature": 37.0, "transition_code": "0x01"},
                   [1, 1.0, 10.0, 2000, 37.0, "0x00"]],
            "S2": [[2, 0.5, 10.0, 0, 37.0, "0x00"], [2, 0.5, 10.0, 1000, 37.0, "0x00"]]
        }}"#,
    );

    let captures = JsonSource::discover(input.path()).unwrap();
    let identifiers: Vec<String> = captures.into_iter().map(|c| c.identifier).collect();

    let csv_dir = output.path().join("csv");
    let mut csv_sink = CsvSink::new(CsvLayout::PerSubject(csv_dir.clone()));
    let pipeline = Pipeline::new(options(1000), schema(&["subject", "transitions"])).unwrap();
    let log = pipeline.log().clone();
    pipeline
        .run(&mut JsonSource::new(input.path()), &mut csv_sink, &identifiers)
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(csv_dir.join("S1.csv")).unwrap(),
        "subject,transitions\nS1,1\n"
    );
    assert_eq!(
        std::fs::read_to_string(csv_dir.join("S2.csv")).unwrap(),
        "subject,transitions\nS2,0\n"
    );

    let json_dir = output.path().join("json");
    let mut json_sink = JsonSink::new(json_dir.clone());
    Pipeline::new(options(1000), schema(&["subject", "transitions"]))
        .unwrap()
        .run(&mut JsonSource::new(input.path()), &mut json_sink, &identifiers)
        .unwrap();
    let rows: Vec<Vec<String>> =
        serde_json::from_str(&std::fs::read_to_string(json_dir.join("S1.json")).unwrap())
            .unwrap();
    assert_eq!(rows, vec![vec!["subject", "transitions"], vec!["S1", "1"]]);

    let report_path = output.path().join("run.json");
    log.save(&report_path).unwrap();
    let stats: RunStats =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(stats.subjects_delivered, 2);
    assert_eq!(stats.bins_completed, 2);
}

#[test]
fn test_missing_capture_is_a_source_error() {
    let input = tempfile::tempdir().unwrap();
    let mut sink = MemorySink::new();

    let err = Pipeline::new(options(1000), schema(&["subject"]))
        .unwrap()
        .run(&mut JsonSource::new(input.path()), &mut sink, ["0_missing_0"])
        .unwrap_err();

    assert!(matches!(err, BinnerError::Source(_)));
    assert!(sink.deliveries().is_empty());
}
