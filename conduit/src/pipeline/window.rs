//! Stage window evaluation for babysitters.

use crate::core::{StageState, StageStatus};

/// What a babysitter should do with the current stage window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowVerdict {
    /// Every stage in the window passed.
    AllPassed,
    /// The first stage that has not passed failed.
    Failed(StageStatus),
    /// The first stage that has not passed is still pending or building.
    InProgress(StageStatus),
    /// The window holds no stages: the stage list is empty or the completion
    /// stage was not found.
    Empty,
}

impl WindowVerdict {
    /// Returns true when the babysitter is done.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::AllPassed)
    }
}

/// Returns the stages up to and including the completion stage.
///
/// Without a completion stage the whole list is the window. A completion
/// stage that matches nothing yields an empty window.
#[must_use]
pub fn stage_window<'a>(stages: &'a [StageStatus], completion_stage: Option<&str>) -> &'a [StageStatus] {
    match completion_stage {
        None => stages,
        Some(stage) => match stages.iter().position(|s| s.matches(stage)) {
            Some(index) => &stages[..=index],
            None => &[],
        },
    }
}

/// Evaluates the window for one poll.
#[must_use]
pub fn evaluate_window(stages: &[StageStatus], completion_stage: Option<&str>) -> WindowVerdict {
    let window = stage_window(stages, completion_stage);
    if window.is_empty() {
        return WindowVerdict::Empty;
    }

    match window.iter().find(|s| !s.state.is_passed()) {
        None => WindowVerdict::AllPassed,
        Some(stage) if stage.state == StageState::Failed => WindowVerdict::Failed(stage.clone()),
        Some(stage) => WindowVerdict::InProgress(stage.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn buildse() -> Vec<StageStatus> {
        vec![
            StageStatus::passed("compileandpackage"),
            StageStatus::passed("unittest"),
            StageStatus::failed("destroybuildagents"),
            StageStatus::pending("publish"),
        ]
    }

    #[test]
    fn test_window_without_completion_stage() {
        let stages = buildse();
        assert_eq!(stage_window(&stages, None).len(), 4);
    }

    #[test]
    fn test_window_is_inclusive() {
        let stages = buildse();
        let window = stage_window(&stages, Some("unittest"));
        assert_eq!(window.len(), 2);
        assert_eq!(window[1].name, "unittest");
    }

    #[test]
    fn test_window_unknown_completion_stage_is_empty() {
        let stages = buildse();
        assert!(stage_window(&stages, Some("nosuchstage")).is_empty());
        assert_eq!(evaluate_window(&stages, Some("nosuchstage")), WindowVerdict::Empty);
        assert_eq!(evaluate_window(&[], None), WindowVerdict::Empty);
    }

    #[test]
    fn test_all_passed_within_window() {
        let stages = buildse();
        assert!(evaluate_window(&stages, Some("unit")).is_done());
    }

    #[test]
    fn test_first_failure_in_window() {
        let stages = buildse();
        assert_eq!(
            evaluate_window(&stages, Some("destroybuildagents")),
            WindowVerdict::Failed(StageStatus::failed("destroybuildagents"))
        );
    }

    #[test]
    fn test_building_stage_before_failure_wins() {
        let stages = vec![
            StageStatus::building("deploy"),
            StageStatus::failed("smoketest"),
        ];
        assert_eq!(
            evaluate_window(&stages, None),
            WindowVerdict::InProgress(StageStatus::building("deploy"))
        );
    }
}
