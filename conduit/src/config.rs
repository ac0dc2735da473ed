//! Configuration for the orchestrator, the dashboard adapter and logging.
//!
//! Durations are stored as fractional seconds, matching the JSON files
//! operators write by hand, and exposed as [`Duration`] accessors.

use crate::errors::ConduitError;
use crate::observability::LogConfig;
use crate::pipeline::WaitLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

fn check_seconds(field: &str, value: f64, allow_zero: bool) -> Result<(), ConduitError> {
    if !value.is_finite() || value < 0.0 || (!allow_zero && value == 0.0) {
        return Err(ConduitError::Config(format!(
            "{field} must be a {} number of seconds, got {value}",
            if allow_zero { "non-negative" } else { "positive" }
        )));
    }
    Ok(())
}

/// Optional bounds on a babysitter's recovery loop.
///
/// Both are unset by default: a babysitter keeps retrying until its window
/// passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryBounds {
    /// Give up after this many recovery attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Give up once the babysitter has been running this long.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_seconds: Option<f64>,
}

impl RecoveryBounds {
    /// No bounds.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Sets the maximum number of recovery attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the maximum lifetime.
    #[must_use]
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration_seconds = Some(duration.as_secs_f64());
        self
    }

    /// Returns the maximum lifetime, if any.
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_seconds.map(seconds)
    }
}

/// Timing for the sequence executor, babysitters and the shutdown barrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Seconds between babysitter polls.
    #[serde(default = "default_sitter_poll_interval")]
    pub sitter_poll_interval_seconds: f64,
    /// Seconds between checks of the active babysitter count in `quit`.
    #[serde(default = "default_quit_poll_interval")]
    pub quit_poll_interval_seconds: f64,
    /// Upper bound for a minimum-completion-stage wait.
    #[serde(default = "default_stage_wait_timeout")]
    pub stage_wait_timeout_seconds: f64,
    /// Seconds between polls while waiting for a stage.
    #[serde(default = "default_stage_wait_poll_interval")]
    pub stage_wait_poll_interval_seconds: f64,
    /// Bounds on babysitter recovery.
    #[serde(default)]
    pub recovery: RecoveryBounds,
}

fn default_sitter_poll_interval() -> f64 {
    10.0
}

fn default_quit_poll_interval() -> f64 {
    1.0
}

fn default_stage_wait_timeout() -> f64 {
    3600.0
}

fn default_stage_wait_poll_interval() -> f64 {
    10.0
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sitter_poll_interval_seconds: default_sitter_poll_interval(),
            quit_poll_interval_seconds: default_quit_poll_interval(),
            stage_wait_timeout_seconds: default_stage_wait_timeout(),
            stage_wait_poll_interval_seconds: default_stage_wait_poll_interval(),
            recovery: RecoveryBounds::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the babysitter poll interval.
    #[must_use]
    pub fn with_sitter_poll_interval(mut self, interval: Duration) -> Self {
        self.sitter_poll_interval_seconds = interval.as_secs_f64();
        self
    }

    /// Sets the quit poll interval.
    #[must_use]
    pub fn with_quit_poll_interval(mut self, interval: Duration) -> Self {
        self.quit_poll_interval_seconds = interval.as_secs_f64();
        self
    }

    /// Sets the stage wait timeout.
    #[must_use]
    pub fn with_stage_wait_timeout(mut self, timeout: Duration) -> Self {
        self.stage_wait_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the stage wait poll interval.
    #[must_use]
    pub fn with_stage_wait_poll_interval(mut self, interval: Duration) -> Self {
        self.stage_wait_poll_interval_seconds = interval.as_secs_f64();
        self
    }

    /// Sets the recovery bounds.
    #[must_use]
    pub fn with_recovery(mut self, bounds: RecoveryBounds) -> Self {
        self.recovery = bounds;
        self
    }

    /// Gets the babysitter poll interval.
    #[must_use]
    pub fn sitter_poll_interval(&self) -> Duration {
        seconds(self.sitter_poll_interval_seconds)
    }

    /// Gets the quit poll interval.
    #[must_use]
    pub fn quit_poll_interval(&self) -> Duration {
        seconds(self.quit_poll_interval_seconds)
    }

    /// Gets the limits for minimum-completion-stage waits.
    #[must_use]
    pub fn wait_limits(&self) -> WaitLimits {
        WaitLimits::new(
            seconds(self.stage_wait_timeout_seconds),
            seconds(self.stage_wait_poll_interval_seconds),
        )
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for negative, non-finite or zero intervals.
    pub fn validate(&self) -> Result<(), ConduitError> {
        check_seconds("sitter_poll_interval_seconds", self.sitter_poll_interval_seconds, false)?;
        check_seconds("quit_poll_interval_seconds", self.quit_poll_interval_seconds, false)?;
        check_seconds("stage_wait_timeout_seconds", self.stage_wait_timeout_seconds, false)?;
        check_seconds(
            "stage_wait_poll_interval_seconds",
            self.stage_wait_poll_interval_seconds,
            false,
        )?;
        if let Some(max) = self.recovery.max_duration_seconds {
            check_seconds("recovery.max_duration_seconds", max, true)?;
        }
        Ok(())
    }
}

/// Where the CI dashboard lives and how patient to be with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Base URL of the dashboard, e.g. `http://ci.example.com:8153/go`.
    pub base_url: String,
    /// Path of the login page below the base URL.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Path of the pipelines dashboard below the base URL.
    #[serde(default = "default_dashboard_path")]
    pub dashboard_path: String,
    /// Seconds to wait for an element to become visible.
    #[serde(default = "default_element_timeout")]
    pub element_timeout_seconds: f64,
    /// Seconds to wait for a page title after navigating.
    #[serde(default = "default_title_timeout")]
    pub title_timeout_seconds: f64,
    /// Browser whose stored session is used, for error messages.
    #[serde(default = "default_browser")]
    pub browser: String,
    /// Pipeline that creates the per-branch pipelines.
    #[serde(default = "default_branch_config_pipeline")]
    pub branch_config_pipeline: String,
    /// Name prefix of the per-branch build pipeline.
    #[serde(default = "default_build_pipeline_prefix")]
    pub build_pipeline_prefix: String,
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_dashboard_path() -> String {
    "/pipelines".to_string()
}

fn default_element_timeout() -> f64 {
    30.0
}

fn default_title_timeout() -> f64 {
    5.0
}

fn default_browser() -> String {
    "firefox".to_string()
}

fn default_branch_config_pipeline() -> String {
    "ConfigureFeatureBranchBuild".to_string()
}

fn default_build_pipeline_prefix() -> String {
    "BuildSE".to_string()
}

impl DashboardConfig {
    /// Creates a configuration for the dashboard at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            login_path: default_login_path(),
            dashboard_path: default_dashboard_path(),
            element_timeout_seconds: default_element_timeout(),
            title_timeout_seconds: default_title_timeout(),
            browser: default_browser(),
            branch_config_pipeline: default_branch_config_pipeline(),
            build_pipeline_prefix: default_build_pipeline_prefix(),
        }
    }

    /// Sets the element timeout.
    #[must_use]
    pub fn with_element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Sets the title timeout.
    #[must_use]
    pub fn with_title_timeout(mut self, timeout: Duration) -> Self {
        self.title_timeout_seconds = timeout.as_secs_f64();
        self
    }

    /// Full URL of the login page.
    #[must_use]
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_path)
    }

    /// Full URL of the pipelines dashboard.
    #[must_use]
    pub fn dashboard_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.dashboard_path)
    }

    /// Gets the element timeout.
    #[must_use]
    pub fn element_timeout(&self) -> Duration {
        seconds(self.element_timeout_seconds)
    }

    /// Gets the title timeout.
    #[must_use]
    pub fn title_timeout(&self) -> Duration {
        seconds(self.title_timeout_seconds)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for a non-http base URL or invalid timeouts.
    pub fn validate(&self) -> Result<(), ConduitError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConduitError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        check_seconds("element_timeout_seconds", self.element_timeout_seconds, false)?;
        check_seconds("title_timeout_seconds", self.title_timeout_seconds, false)?;
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConduitConfig {
    /// The dashboard to drive.
    pub dashboard: DashboardConfig,
    /// Orchestrator timing.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LogConfig,
}

impl ConduitConfig {
    /// Creates a configuration with defaults for everything but the dashboard.
    #[must_use]
    pub fn new(dashboard: DashboardConfig) -> Self {
        Self {
            dashboard,
            orchestrator: OrchestratorConfig::default(),
            logging: LogConfig::default(),
        }
    }

    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConduitError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConduitError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConduitError::Config(format!("reading config file at {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> Result<(), ConduitError> {
        self.dashboard.validate()?;
        self.orchestrator.validate()?;
        Ok(())
    }
}
