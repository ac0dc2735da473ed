//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `CONDUIT_LOG` environment variable (e.g. "debug", "conduit=trace")
//! 2. `LogConfig::filter`
//! 3. default to `info`

use crate::errors::ConduitError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Environment variable overriding the configured filter.
pub const LOG_ENV: &str = "CONDUIT_LOG";

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `CONDUIT_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Also write a per-run log file, in `directory` or `~/.conduit/logs`.
    #[serde(default)]
    pub to_file: bool,
    /// Directory for the per-run log file. Setting it turns on file output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
            to_file: false,
            directory: None,
        }
    }
}

impl LogConfig {
    /// Sets the filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Writes logs to a timestamped file in `directory`.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Writes logs to a timestamped file in [`default_log_directory`].
    #[must_use]
    pub fn with_file_output(mut self) -> Self {
        self.to_file = true;
        self
    }

    /// The directory the log file goes to, or `None` for stdout only.
    #[must_use]
    pub fn log_directory(&self) -> Option<PathBuf> {
        match &self.directory {
            Some(directory) => Some(directory.clone()),
            None if self.to_file => default_log_directory(),
            None => None,
        }
    }
}

/// `~/.conduit/logs`, if a home directory is known.
#[must_use]
pub fn default_log_directory() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".conduit").join("logs"))
}

/// Initialise the global logging subscriber.
///
/// Returns the path of the log file when one was opened. Call once at startup.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log file cannot be
/// created, or a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<Option<PathBuf>, ConduitError> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| ConduitError::Config(format!("invalid log filter '{}': {e}", config.filter)))?;

    let log_file = match config.log_directory() {
        Some(directory) => {
            std::fs::create_dir_all(&directory)?;
            let name = format!("{}.log", chrono::Local::now().format("%Y-%b-%d_%H-%M-%S"));
            let path = directory.join(name);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Some((path, file))
        }
        None => None,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let (installed, path) = match (config.format, log_file) {
        (LogFormat::Text, None) => (builder.try_init(), None),
        (LogFormat::Json, None) => (builder.json().try_init(), None),
        (LogFormat::Text, Some((path, file))) => (
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
            Some(path),
        ),
        (LogFormat::Json, Some((path, file))) => {
            (builder.json().with_writer(Mutex::new(file)).try_init(), Some(path))
        }
    };

    installed.map_err(|e| ConduitError::Config(format!("failed to install tracing subscriber: {e}")))?;
    Ok(path)
}

/// A span for one public call, tagged with a fresh `call_id` so that all
/// lines a call produces can be grepped together.
#[must_use]
pub fn call_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!("call", operation, call_id = %Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Text);
        assert!(config.directory.is_none());
        assert!(config.log_directory().is_none());
    }

    #[test]
    fn test_file_output_defaults_to_home_logs() {
        let config = LogConfig::default().with_file_output();
        assert_eq!(config.log_directory(), default_log_directory());
        if let Some(directory) = config.log_directory() {
            assert!(directory.ends_with(".conduit/logs"));
        }
    }

    #[test]
    fn test_explicit_directory_wins() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig::default().with_file_output().with_directory(dir.path());
        assert_eq!(config.log_directory(), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_log_config_deserialize() {
        let config: LogConfig =
            serde_json::from_str(r#"{ "filter": "conduit=debug", "format": "json", "to_file": true }"#).unwrap();
        assert_eq!(config.filter, "conduit=debug");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.to_file);
    }

    #[test]
    fn test_call_span_is_usable_without_subscriber() {
        let span = call_span("run_sequence");
        let _entered = span.enter();
    }
}
