//! Homecage Binner CLI
//!
//! Time-binned behavioral summaries from home-cage RFID tracking telemetry.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use homecage_binner::{
    config::{parse_columns, Config, OutputFormat},
    core::{format_timestamp, MetricRegistry, TimeBase},
    pipeline::{parse_timezone, DrainMode, Pipeline, TrailingPolicy},
    report::create_shared_log,
    sink::{CsvLayout, CsvSink, JsonSink, Sink},
    source::JsonSource,
    VERSION,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "homecage-binner")]
#[command(version = VERSION)]
#[command(about = "Time-binned behavioral summaries from home-cage RFID tracking", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bin every capture in a directory and write the subject tables
    Process {
        /// Directory holding `<identifier>.json` captures
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Output file (csv) or directory (csv-per-subject, json)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Bin duration in seconds
        #[arg(long)]
        bin_secs: Option<u64>,

        /// IANA timezone for the time column
        #[arg(long)]
        timezone: Option<String>,

        /// Comma-separated output columns
        #[arg(long)]
        columns: Option<String>,

        /// Leave out the twelve antenna dwell columns
        #[arg(long)]
        no_antennas: bool,

        /// Emit leftover events as one final partial bin per subject
        #[arg(long)]
        flush_trailing: bool,

        /// Drain subjects on separate threads
        #[arg(long)]
        parallel: bool,

        /// Output format (csv, csv-per-subject or json)
        #[arg(long)]
        format: Option<String>,

        /// Enable debug logging
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the available columns
    Columns,

    /// Show the timebase carried by capture identifiers
    Inspect {
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Show configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            output,
            bin_secs,
            timezone,
            columns,
            no_antennas,
            flush_trailing,
            parallel,
            format,
            verbose,
        } => {
            init_tracing(verbose);

            let mut config = load_config(cli.config.as_ref())?;
            if let Some(input) = input {
                config.input_dir = input;
            }
            if let Some(output) = output {
                config.output = output;
            }
            if let Some(secs) = bin_secs {
                config.bin_duration = Duration::from_secs(secs);
            }
            if let Some(timezone) = timezone {
                config.timezone = timezone;
            }
            if let Some(columns) = columns {
                config.columns = parse_columns(&columns);
            }
            if let Some(format) = format {
                config.output_format = format.parse()?;
            }
            if no_antennas {
                config.include_antennas = false;
            }
            if flush_trailing {
                config.trailing = TrailingPolicy::Flush;
            }
            if parallel {
                config.drain = DrainMode::Parallel;
            }

            cmd_process(&config)
        }
        Commands::Columns => {
            cmd_columns();
            Ok(())
        }
        Commands::Inspect { identifiers } => cmd_inspect(&identifiers),
        Commands::Config => cmd_config(cli.config.as_ref()),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("could not load configuration from {}", path.display())),
        None => Ok(Config::load()?),
    }
}

fn cmd_process(config: &Config) -> anyhow::Result<()> {
    println!("Homecage Binner v{VERSION}");
    println!();

    // Reject bad columns, timezones and durations before touching any capture
    let registry = MetricRegistry::standard();
    let (options, schema) = config.validate(&registry)?;

    let captures = JsonSource::discover(&config.input_dir)
        .with_context(|| format!("could not list captures in {}", config.input_dir.display()))?;
    if captures.is_empty() {
        bail!("no captures found in {}", config.input_dir.display());
    }

    println!("Input: {} ({} captures)", config.input_dir.display(), captures.len());
    println!("Output: {} ({:?})", config.output.display(), config.output_format);
    println!("  Bin duration: {}s", config.bin_duration.as_secs());
    println!("  Timezone: {}", config.timezone);
    println!(
        "  Trailing events: {}",
        match config.trailing {
            TrailingPolicy::Discard => "discarded",
            TrailingPolicy::Flush => "flushed",
        }
    );
    println!();

    let mut sink: Box<dyn Sink> = match config.output_format {
        OutputFormat::Csv => Box::new(CsvSink::new(CsvLayout::Combined(config.output.clone()))),
        OutputFormat::CsvPerSubject => {
            Box::new(CsvSink::new(CsvLayout::PerSubject(config.output.clone())))
        }
        OutputFormat::Json => Box::new(JsonSink::new(config.output.clone())),
    };

    let run_log = create_shared_log();
    let pipeline = Pipeline::new(options, schema)?.with_log(run_log.clone());
    info!(columns = ?pipeline.schema().columns(), "schema ready");

    let mut source = JsonSource::new(&config.input_dir);
    let outcome = pipeline.run(
        &mut source,
        sink.as_mut(),
        captures.iter().map(|c| c.identifier.as_str()),
    )?;

    if outcome.rows_per_subject.is_empty() {
        warn!("no subject completed a bin, nothing was written");
    }
    for (subject, rows) in &outcome.rows_per_subject {
        println!("  {subject}: {rows} rows");
    }

    if let Some(report_path) = &config.report_path {
        run_log
            .save(report_path)
            .with_context(|| format!("could not write run report to {}", report_path.display()))?;
        println!("Run report saved to {}", report_path.display());
    }

    println!();
    println!("{}", run_log.summary());
    Ok(())
}

fn cmd_columns() {
    let registry = MetricRegistry::standard();

    println!("Available columns");
    println!("=================");
    println!();
    for def in registry.definitions() {
        if def.requires.is_empty() {
            println!("  {:<14} {}", def.name, def.description);
        } else {
            println!(
                "  {:<14} {} (uses {})",
                def.name,
                def.description,
                def.requires.join(", ")
            );
        }
    }
}

fn cmd_inspect(identifiers: &[String]) -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    let timezone = parse_timezone(&config.timezone)?;

    for identifier in identifiers {
        let timebase = TimeBase::parse(identifier)?;
        println!("{identifier}");
        println!("  Start: {} ms", timebase.start_ms);
        println!("  Elapsed: {} ms", timebase.elapsed_ms);
        println!(
            "  Origin: {} ({})",
            timebase.origin(),
            format_timestamp(timebase.origin(), timezone)
        );
    }
    Ok(())
}

fn cmd_config(path: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = load_config(path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!(
        "Config file: {:?}",
        path.cloned().unwrap_or_else(Config::config_path)
    );
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
