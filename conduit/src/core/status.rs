//! Stage state and status types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The state of one stage as shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Stage has not started.
    Pending,
    /// Stage is running.
    Building,
    /// Stage completed successfully.
    Passed,
    /// Stage failed.
    Failed,
}

impl Default for StageState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Building => write!(f, "building"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for StageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "passed" => Ok(Self::Passed),
            "failed" => Ok(Self::Failed),
            "building" => Ok(Self::Building),
            // GoCD renders unknown/not-yet-run/cancelled stages without a
            // terminal state; all of them count as not passed.
            "pending" | "unknown" | "cancelled" | "" => Ok(Self::Pending),
            other => Err(format!("Unknown stage state: {other}")),
        }
    }
}

impl StageState {
    /// Returns true if the stage passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// The status of one stage, read fresh on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageStatus {
    /// The stage name, lowercased.
    pub name: String,
    /// The stage state.
    pub state: StageState,
}

impl StageStatus {
    /// Creates a new stage status. The name is stored lowercased.
    #[must_use]
    pub fn new(name: impl Into<String>, state: StageState) -> Self {
        Self {
            name: name.into().to_lowercase(),
            state,
        }
    }

    /// Shorthand for a passed stage.
    #[must_use]
    pub fn passed(name: impl Into<String>) -> Self {
        Self::new(name, StageState::Passed)
    }

    /// Shorthand for a failed stage.
    #[must_use]
    pub fn failed(name: impl Into<String>) -> Self {
        Self::new(name, StageState::Failed)
    }

    /// Shorthand for a building stage.
    #[must_use]
    pub fn building(name: impl Into<String>) -> Self {
        Self::new(name, StageState::Building)
    }

    /// Shorthand for a pending stage.
    #[must_use]
    pub fn pending(name: impl Into<String>) -> Self {
        Self::new(name, StageState::Pending)
    }

    /// Case-insensitive prefix match on the stage name.
    ///
    /// Configured stage names are often shortened, e.g. `compile` for
    /// `compileandpackage`.
    #[must_use]
    pub fn matches(&self, stage: &str) -> bool {
        self.name.starts_with(&stage.to_lowercase())
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_state_display() {
        assert_eq!(StageState::Passed.to_string(), "passed");
        assert_eq!(StageState::Failed.to_string(), "failed");
        assert_eq!(StageState::Building.to_string(), "building");
        assert_eq!(StageState::Pending.to_string(), "pending");
    }

    #[test]
    fn test_stage_state_from_str() {
        assert_eq!("Passed".parse::<StageState>().unwrap(), StageState::Passed);
        assert_eq!(" failed ".parse::<StageState>().unwrap(), StageState::Failed);
        assert_eq!("Unknown".parse::<StageState>().unwrap(), StageState::Pending);
        assert!("exploded".parse::<StageState>().is_err());
    }

    #[test]
    fn test_stage_status_lowercases_name() {
        let status = StageStatus::passed("CompileAndPackage");
        assert_eq!(status.name, "compileandpackage");
        assert_eq!(status.to_string(), "compileandpackage (passed)");
    }

    #[test]
    fn test_stage_status_matches_prefix() {
        let status = StageStatus::building("destroybuildagents");
        assert!(status.matches("DestroyBuild"));
        assert!(status.matches("destroybuildagents"));
        assert!(!status.matches("build"));
    }

    #[test]
    fn test_stage_state_serialize() {
        let json = serde_json::to_string(&StageState::Building).unwrap();
        assert_eq!(json, r#""building""#);

        let deserialized: StageState = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageState::Building);
    }
}
