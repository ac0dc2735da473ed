//! Parsing of dashboard text.

use crate::core::{InstanceNumber, StageState, StageStatus};
use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static STAGE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<name>.*?)\s*\((?P<state>[^()]*)\)\s*$").expect("stage title pattern is valid")
});

/// Parses a stage link title such as `"Deploy (failed)"`.
///
/// A title without a state suffix is a stage that has not run yet.
#[must_use]
pub fn parse_stage_title(title: &str) -> StageStatus {
    match STAGE_TITLE.captures(title) {
        Some(caps) => {
            let state = caps["state"].parse().unwrap_or(StageState::Pending);
            StageStatus::new(&caps["name"], state)
        }
        None => StageStatus::pending(title.trim()),
    }
}

/// Removes the first occurrence of `part` from `text`.
#[must_use]
pub fn subtract_strings(text: &str, part: &str) -> String {
    if part.is_empty() {
        return text.to_string();
    }
    text.replacen(part, "", 1)
}

/// Extracts the instance number from a build heading such as
/// `"BuildSE-feature-x-17"`.
#[must_use]
pub fn instance_from_heading(heading: &str, prefix: &str, branch: &str) -> InstanceNumber {
    InstanceNumber::from(subtract_strings(heading.trim(), &format!("{prefix}-{branch}-")))
}

/// Shortens a pipeline heading of a branch instance to the pipeline name.
#[must_use]
pub fn pipeline_from_heading(heading: &str, branch: &str, instance: &InstanceNumber) -> String {
    subtract_strings(heading.trim(), &format!("-{branch}-{instance}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage_title() {
        assert_eq!(parse_stage_title("Deploy (failed)"), StageStatus::failed("deploy"));
        assert_eq!(
            parse_stage_title("CompileAndPackage (Passed)"),
            StageStatus::passed("compileandpackage")
        );
        assert_eq!(parse_stage_title("  Smoke Test (building) "), StageStatus::building("smoke test"));
    }

    #[test]
    fn test_parse_stage_title_without_state() {
        assert_eq!(parse_stage_title("Publish"), StageStatus::pending("publish"));
        assert_eq!(parse_stage_title("Publish (unknown)").state, StageState::Pending);
    }

    #[test]
    fn test_subtract_strings() {
        assert_eq!(subtract_strings("BuildSE-feat-12", "BuildSE-feat-"), "12");
        assert_eq!(subtract_strings("abc", "x"), "abc");
        assert_eq!(subtract_strings("abc", ""), "abc");
    }

    #[test]
    fn test_heading_helpers() {
        let instance = instance_from_heading("BuildSE-feature-login-17", "BuildSE", "feature-login");
        assert_eq!(instance.as_str(), "17");

        assert_eq!(pipeline_from_heading("DeployDBs-feature-login-17", "feature-login", &instance), "DeployDBs");
    }
}
