//! Configuration for the binner.

use crate::core::metrics::MetricRegistry;
use crate::core::schema::{ColumnSchema, DEFAULT_COLUMNS};
use crate::error::BinnerError;
use crate::pipeline::{parse_timezone, DrainMode, PipelineOptions, TrailingPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for a binning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Duration of each bin
    #[serde(with = "duration_serde")]
    pub bin_duration: Duration,

    /// IANA timezone used to format the `time` column
    pub timezone: String,

    /// Output columns, in order
    pub columns: Vec<String>,

    /// Whether the twelve antenna dwell columns are emitted
    pub include_antennas: bool,

    /// Handling of events left without a closing bin boundary
    pub trailing: TrailingPolicy,

    /// Sequential or per-subject parallel draining
    pub drain: DrainMode,

    /// Directory holding the capture files
    pub input_dir: PathBuf,

    /// Output file (combined CSV) or directory (per-subject layouts)
    pub output: PathBuf,

    pub output_format: OutputFormat,

    /// Where to write the run statistics, if anywhere
    pub report_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bin_duration: Duration::from_secs(60),
            timezone: "Europe/London".to_string(),
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            include_antennas: true,
            trailing: TrailingPolicy::Discard,
            drain: DrainMode::Sequential,
            input_dir: PathBuf::from("."),
            output: PathBuf::from("output.csv"),
            output_format: OutputFormat::Csv,
            report_path: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("homecage-binner")
            .join("config.json")
    }

    /// Bin duration in milliseconds.
    pub fn bin_duration_ms(&self) -> i64 {
        i64::try_from(self.bin_duration.as_millis()).unwrap_or(i64::MAX)
    }

    /// Validate the schema against `registry` and build pipeline options.
    ///
    /// Everything that can be rejected up front is rejected here, before any
    /// capture is read.
    pub fn validate(
        &self,
        registry: &MetricRegistry,
    ) -> Result<(PipelineOptions, ColumnSchema), BinnerError> {
        let schema = ColumnSchema::build(self.columns.as_slice(), registry)?;
        let timezone = parse_timezone(&self.timezone)?;
        if self.bin_duration.is_zero() {
            return Err(BinnerError::InvalidBinDuration(0));
        }

        let options = PipelineOptions {
            bin_duration_ms: self.bin_duration_ms(),
            include_antennas: self.include_antennas,
            timezone,
            trailing: self.trailing,
            drain: self.drain,
        };
        Ok((options, schema))
    }
}

/// Output layouts supported by the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// One CSV file with every subject
    #[default]
    Csv,
    /// One CSV file per subject
    CsvPerSubject,
    /// One JSON file per subject
    Json,
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "csv-per-subject" => Ok(OutputFormat::CsvPerSubject),
            "json" => Ok(OutputFormat::Json),
            other => Err(ConfigError::Parse(format!("unknown output format: {other}"))),
        }
    }
}

/// Parse a comma-separated column list.
pub fn parse_columns(s: &str) -> Vec<String> {
    s.split(',')
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bin_duration, Duration::from_secs(60));
        assert_eq!(config.bin_duration_ms(), 60_000);
        assert_eq!(config.timezone, "Europe/London");
        assert!(config.include_antennas);
        assert_eq!(config.trailing, TrailingPolicy::Discard);
    }

    #[test]
    fn test_parse_columns() {
        assert_eq!(
            parse_columns("Subject, time,,centre-zone "),
            vec!["subject", "time", "centre-zone"]
        );
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!(
            "CSV-per-subject".parse::<OutputFormat>().unwrap(),
            OutputFormat::CsvPerSubject
        );
        assert!("parquet".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_column_and_timezone() {
        let registry = MetricRegistry::standard();

        let mut config = Config::default();
        config.columns.push("speed".to_string());
        assert!(matches!(
            config.validate(&registry),
            Err(BinnerError::UnknownColumn(_))
        ));

        let config = Config {
            timezone: "Nowhere/Special".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(&registry),
            Err(BinnerError::InvalidTimezone(_))
        ));

        let config = Config {
            bin_duration: Duration::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(&registry),
            Err(BinnerError::InvalidBinDuration(0))
        ));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = Config {
            bin_duration: Duration::from_secs(300),
            trailing: TrailingPolicy::Flush,
            output_format: OutputFormat::Json,
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"bin_duration\": 300"));
        assert!(content.contains("\"trailing\": \"flush\""));

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.bin_duration, Duration::from_secs(300));
        assert_eq!(loaded.output_format, OutputFormat::Json);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"timezone": "UTC"}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.timezone, "UTC");
        assert_eq!(loaded.bin_duration, Duration::from_secs(60));
    }
}
