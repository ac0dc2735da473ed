//! Error types for conduit.
//!
//! Main-path errors (element lookup, waits, authentication) propagate to the
//! caller of a sequence. Recovery errors raised inside a babysitter are
//! converted to [`ConduitError::RecoveryAction`], logged and dropped.

use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The main error type for conduit operations.
#[derive(Debug, Error)]
pub enum ConduitError {
    /// A UI element never became visible within its bound.
    #[error("Element not found: {locator}")]
    ElementNotFound {
        /// The locator that was searched for.
        locator: String,
    },

    /// A wait for some state ran past its bound.
    #[error("Timed out after {waited:?} waiting for {operation}")]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// How long the wait lasted.
        waited: Duration,
    },

    /// An element disappeared between being located and being acted on.
    #[error("Stale element: {locator}")]
    StaleElement {
        /// The locator of the element that went stale.
        locator: String,
    },

    /// Login did not succeed, even after injecting session cookies.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A babysitter's retrigger attempt failed.
    #[error("Recovery action failed for pipeline '{pipeline}': {reason}")]
    RecoveryAction {
        /// The pipeline being recovered.
        pipeline: String,
        /// The reason for failure.
        reason: String,
    },

    /// The automation driver reported an error.
    #[error("Driver error: {0}")]
    Driver(String),

    /// Credentials could not be read.
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConduitError {
    /// Creates an element not found error.
    #[must_use]
    pub fn element_not_found(locator: impl Into<String>) -> Self {
        Self::ElementNotFound {
            locator: locator.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            waited,
        }
    }

    /// Creates a stale element error.
    #[must_use]
    pub fn stale_element(locator: impl Into<String>) -> Self {
        Self::StaleElement {
            locator: locator.into(),
        }
    }

    /// Creates a recovery action error.
    #[must_use]
    pub fn recovery_action(pipeline: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::RecoveryAction {
            pipeline: pipeline.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for [`ConduitError::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if a read that failed this way is worth repeating on the
    /// next poll (the page may simply not have rendered yet).
    #[must_use]
    pub fn is_retryable_read(&self) -> bool {
        matches!(
            self,
            Self::ElementNotFound { .. } | Self::Timeout { .. } | Self::StaleElement { .. } | Self::Driver(_)
        )
    }

    /// Returns a stable name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ElementNotFound { .. } => "ElementNotFound",
            Self::Timeout { .. } => "Timeout",
            Self::StaleElement { .. } => "StaleElement",
            Self::Authentication(_) => "AuthenticationFailure",
            Self::RecoveryAction { .. } => "RecoveryActionFailure",
            Self::Driver(_) => "Driver",
            Self::Credentials(_) => "Credentials",
            Self::Config(_) => "Config",
            Self::Serialization(_) => "Serialization",
            Self::Io(_) => "Io",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));

        match self {
            Self::ElementNotFound { locator } | Self::StaleElement { locator } => {
                map.insert("locator".to_string(), serde_json::json!(locator));
            }
            Self::Timeout { operation, waited } => {
                map.insert("operation".to_string(), serde_json::json!(operation));
                map.insert("waited_ms".to_string(), serde_json::json!(waited.as_millis() as u64));
            }
            Self::RecoveryAction { pipeline, reason } => {
                map.insert("pipeline".to_string(), serde_json::json!(pipeline));
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            _ => {}
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

impl From<serde_json::Error> for ConduitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = ConduitError::timeout("stage 'build' of 'buildse'", Duration::from_secs(5));
        assert!(err.is_timeout());
        assert!(err.to_string().contains("stage 'build' of 'buildse'"));
    }

    #[test]
    fn test_retryable_reads() {
        assert!(ConduitError::element_not_found("//h3").is_retryable_read());
        assert!(ConduitError::stale_element("//a").is_retryable_read());
        assert!(!ConduitError::Authentication("login".into()).is_retryable_read());
        assert!(!ConduitError::Config("bad".into()).is_retryable_read());
    }

    #[test]
    fn test_to_dict() {
        let err = ConduitError::recovery_action("deploydbs", "session refused");
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "RecoveryActionFailure");
        assert_eq!(dict.get("pipeline").unwrap(), "deploydbs");
        assert!(dict.contains_key("message"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: ConduitError = parse.unwrap_err().into();
        assert_eq!(err.kind(), "Serialization");
    }
}
