//! Instance number identifying one run of a pipeline family.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier tying a run to a trigger/branch context.
///
/// On the dashboard it is the suffix shared by every pipeline created for a
/// branch, e.g. `42` in `DeployApps-feature-x-42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceNumber(String);

impl InstanceNumber {
    /// Creates a new instance number, trimming surrounding whitespace.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    /// Returns the instance number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceNumber {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InstanceNumber {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_number_trims() {
        let instance = InstanceNumber::new(" 42 ");
        assert_eq!(instance.as_str(), "42");
        assert_eq!(instance.to_string(), "42");
    }

    #[test]
    fn test_instance_number_serializes_as_string() {
        let instance = InstanceNumber::from("17");
        assert_eq!(serde_json::to_string(&instance).unwrap(), r#""17""#);
    }
}
