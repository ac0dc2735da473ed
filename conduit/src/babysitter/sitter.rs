//! The babysitter state machine.
//!
//! A babysitter polls one pipeline instance on a fixed interval. Each poll
//! evaluates the stage window (the stages up to the completion stage):
//!
//! - all passed: the babysitter is done and stops its guard
//! - first not-passed stage failed: wait the policy delay, then rerun the
//!   stage or the pipeline in a freshly acquired session
//! - anything else (building, pending, empty window, read error): poll again
//!
//! Recovery errors are logged and never leave the babysitter.

use super::SitterGuard;
use crate::config::RecoveryBounds;
use crate::core::{InstanceNumber, StageStatus};
use crate::errors::ConduitError;
use crate::pipeline::{
    evaluate_window, with_session, PipelineControl, PipelineSpec, RerunStrategy, SessionProvider,
    WindowVerdict,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitterState {
    /// Nothing to do yet; poll again.
    Polling,
    /// The given stage failed and should be recovered.
    Recovering(StageStatus),
    /// Every stage in the window passed.
    Done,
}

/// How a babysitter ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitterOutcome {
    /// The window passed.
    Done {
        /// Polls performed.
        polls: u32,
        /// Recovery attempts made.
        recoveries: u32,
    },
    /// The babysitter gave up before the window passed.
    Abandoned {
        /// Polls performed.
        polls: u32,
        /// Recovery attempts made.
        recoveries: u32,
        /// Why it gave up.
        reason: String,
    },
}

impl SitterOutcome {
    /// Returns true if the window passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Returns the number of recovery attempts made.
    #[must_use]
    pub fn recoveries(&self) -> u32 {
        match self {
            Self::Done { recoveries, .. } | Self::Abandoned { recoveries, .. } => *recoveries,
        }
    }
}

/// Watches one pipeline instance until its window passes.
pub struct Babysitter {
    instance: InstanceNumber,
    spec: PipelineSpec,
    control: Arc<dyn PipelineControl>,
    sessions: Arc<dyn SessionProvider>,
    poll_interval: Duration,
    bounds: RecoveryBounds,
}

impl Babysitter {
    /// Creates a babysitter polling through `control` and recovering through
    /// sessions from `sessions`.
    #[must_use]
    pub fn new(
        instance: InstanceNumber,
        spec: PipelineSpec,
        control: Arc<dyn PipelineControl>,
        sessions: Arc<dyn SessionProvider>,
    ) -> Self {
        Self {
            instance,
            spec,
            control,
            sessions,
            poll_interval: Duration::from_secs(10),
            bounds: RecoveryBounds::default(),
        }
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the recovery bounds.
    #[must_use]
    pub fn with_bounds(mut self, bounds: RecoveryBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Returns the name used for tracking and logs.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}@{}", self.spec.pipeline_name, self.instance)
    }

    /// Polls until the window passes or a bound is hit, then stops `guard`.
    ///
    /// The first poll happens one interval after the start, giving the
    /// trigger that follows a babysitter's spawn time to show up.
    pub async fn run(self, guard: SitterGuard) -> SitterOutcome {
        let started = Instant::now();
        let max_duration = self.bounds.max_duration();
        let mut polls = 0;
        let mut recoveries = 0;

        let outcome = loop {
            tokio::time::sleep(self.poll_interval).await;

            if let Some(max) = max_duration {
                if started.elapsed() >= max {
                    break SitterOutcome::Abandoned {
                        polls,
                        recoveries,
                        reason: format!("still not passed after {max:?}"),
                    };
                }
            }

            polls += 1;
            match self.poll().await {
                SitterState::Done => break SitterOutcome::Done { polls, recoveries },
                SitterState::Recovering(stage) => {
                    if let Some(max) = self.bounds.max_attempts {
                        if recoveries >= max {
                            break SitterOutcome::Abandoned {
                                polls,
                                recoveries,
                                reason: format!("stage '{}' still failed after {max} recovery attempts", stage.name),
                            };
                        }
                    }
                    recoveries += 1;
                    self.recover(&stage, recoveries).await;
                }
                SitterState::Polling => {}
            }

            trace!(pipeline = %self.spec.pipeline_name, "Not passed stages exist, polling again");
        };

        match &outcome {
            SitterOutcome::Done { polls, recoveries } => info!(
                pipeline = %self.spec.pipeline_name,
                instance = %self.instance,
                polls,
                recoveries,
                "Pipeline passed, babysitter stopping"
            ),
            SitterOutcome::Abandoned { reason, .. } => warn!(
                pipeline = %self.spec.pipeline_name,
                instance = %self.instance,
                reason = %reason,
                "Babysitter giving up"
            ),
        }

        guard.stop();
        outcome
    }

    /// Reads the stages once and decides the next state.
    pub async fn poll(&self) -> SitterState {
        let stages = match self.control.list_stages(&self.instance, &self.spec.pipeline_name).await {
            Ok(stages) => stages,
            Err(e) => {
                warn!(pipeline = %self.spec.pipeline_name, error = %e, "Failed to read stages");
                return SitterState::Polling;
            }
        };

        match evaluate_window(&stages, self.spec.completion_stage.as_deref()) {
            WindowVerdict::AllPassed => SitterState::Done,
            WindowVerdict::Failed(stage) => {
                if self.spec.babysitter.is_some() {
                    debug!(pipeline = %self.spec.pipeline_name, stage = %stage.name, "First stage not passed was a failed stage");
                    SitterState::Recovering(stage)
                } else {
                    warn!(pipeline = %self.spec.pipeline_name, stage = %stage.name, "Stage failed and no rerun policy is set");
                    SitterState::Polling
                }
            }
            WindowVerdict::InProgress(stage) => {
                trace!(pipeline = %self.spec.pipeline_name, stage = %stage, "First stage not passed");
                SitterState::Polling
            }
            WindowVerdict::Empty => {
                debug!(
                    pipeline = %self.spec.pipeline_name,
                    completion_stage = ?self.spec.completion_stage,
                    stages = stages.len(),
                    "Stage window is empty"
                );
                SitterState::Polling
            }
        }
    }

    async fn recover(&self, stage: &StageStatus, attempt: u32) {
        let Some(policy) = self.spec.babysitter else {
            return;
        };

        if !policy.delay().is_zero() {
            debug!(pipeline = %self.spec.pipeline_name, delay = ?policy.delay(), "Waiting before rerun");
            tokio::time::sleep(policy.delay()).await;
        }

        info!(
            pipeline = %self.spec.pipeline_name,
            instance = %self.instance,
            stage = %stage.name,
            strategy = %policy.rerun_strategy,
            attempt,
            "Babysitter rerunning"
        );

        let result = with_session(self.sessions.as_ref(), |session| async move {
            match policy.rerun_strategy {
                RerunStrategy::RerunPipeline => session.trigger(&self.instance, &self.spec.pipeline_name).await,
                RerunStrategy::RerunStage => {
                    session
                        .retrigger_stage(&self.instance, &self.spec.pipeline_name, &stage.name)
                        .await
                }
            }
        })
        .await
        .map_err(|e| ConduitError::recovery_action(&self.spec.pipeline_name, e.to_string()));

        if let Err(e) = result {
            warn!(error = %e, attempt, "Recovery attempt failed");
        }
    }
}

impl std::fmt::Debug for Babysitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Babysitter")
            .field("instance", &self.instance)
            .field("pipeline", &self.spec.pipeline_name)
            .field("poll_interval", &self.poll_interval)
            .field("bounds", &self.bounds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::babysitter::SitterTracker;
    use crate::pipeline::BabysitterPolicy;
    use crate::testing::{DashboardAction, FakeDashboard, FakeSessions};
    use pretty_assertions::assert_eq;

    fn sitter(dashboard: &FakeDashboard, sessions: &Arc<FakeSessions>, spec: PipelineSpec) -> Babysitter {
        Babysitter::new(
            InstanceNumber::from("12"),
            spec,
            Arc::new(dashboard.clone()),
            Arc::clone(sessions) as Arc<dyn SessionProvider>,
        )
    }

    async fn run(sitter: Babysitter) -> (SitterOutcome, Arc<SitterTracker>) {
        let tracker = Arc::new(SitterTracker::default());
        let guard = tracker.start(sitter.name());
        let outcome = sitter.run(guard).await;
        (outcome, tracker)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reruns_failed_stage_once_then_stops() {
        let dashboard = FakeDashboard::new();
        dashboard.script_stages(
            "deploy",
            vec![vec![StageStatus::failed("deploy")], vec![StageStatus::passed("deploy")]],
        );
        let sessions = Arc::new(FakeSessions::new(dashboard.clone()));
        let spec = PipelineSpec::new("deploy").with_babysitter(BabysitterPolicy::new(RerunStrategy::RerunStage));

        let (outcome, tracker) = run(sitter(&dashboard, &sessions, spec)).await;

        assert_eq!(outcome, SitterOutcome::Done { polls: 2, recoveries: 1 });
        assert_eq!(
            dashboard.recovery_actions(),
            vec![DashboardAction::RetriggerStage {
                pipeline: "deploy".into(),
                stage: "deploy".into()
            }]
        );
        assert_eq!(sessions.acquired(), 1);
        assert_eq!(sessions.released(), 1);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.stopped_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_pipeline_strategy_triggers_pipeline() {
        let dashboard = FakeDashboard::new();
        dashboard.script_stages(
            "deploydbs",
            vec![
                vec![StageStatus::passed("prepare"), StageStatus::failed("deploydatabases")],
                vec![StageStatus::passed("prepare"), StageStatus::passed("deploydatabases")],
            ],
        );
        let sessions = Arc::new(FakeSessions::new(dashboard.clone()));
        let spec = PipelineSpec::new("deploydbs").with_babysitter(
            BabysitterPolicy::new(RerunStrategy::RerunPipeline).with_delay_seconds(30),
        );

        let before = Instant::now();
        let (outcome, _) = run(sitter(&dashboard, &sessions, spec)).await;

        assert!(outcome.is_done());
        assert!(before.elapsed() >= Duration::from_secs(30));
        assert_eq!(
            dashboard.recovery_actions(),
            vec![DashboardAction::Trigger { pipeline: "deploydbs".into() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_are_ignored() {
        let dashboard = FakeDashboard::new();
        dashboard.set_stages(
            "buildse",
            vec![
                StageStatus::passed("compileandpackage"),
                StageStatus::passed("destroybuildagents"),
                StageStatus::failed("publish"),
            ],
        );
        let sessions = Arc::new(FakeSessions::new(dashboard.clone()));
        let spec = PipelineSpec::new("buildse")
            .with_completion_stage("destroybuildagents")
            .with_babysitter(BabysitterPolicy::new(RerunStrategy::RerunStage));

        let (outcome, _) = run(sitter(&dashboard, &sessions, spec)).await;

        assert_eq!(outcome, SitterOutcome::Done { polls: 1, recoveries: 0 });
        assert!(dashboard.recovery_actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_errors_are_swallowed() {
        let dashboard = FakeDashboard::new();
        dashboard.script_stages(
            "runat",
            vec![
                vec![StageStatus::failed("acceptancetest")],
                vec![StageStatus::failed("acceptancetest")],
                vec![StageStatus::passed("acceptancetest")],
            ],
        );
        let sessions = Arc::new(FakeSessions::new(dashboard.clone()));
        sessions.fail_acquire("browser would not start");
        let spec = PipelineSpec::new("runat").with_babysitter(BabysitterPolicy::new(RerunStrategy::RerunStage));

        let (outcome, tracker) = run(sitter(&dashboard, &sessions, spec)).await;

        assert_eq!(outcome, SitterOutcome::Done { polls: 3, recoveries: 2 });
        assert_eq!(sessions.acquired(), 2);
        assert!(tracker.is_quiescent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_window_keeps_polling_without_recovery() {
        let dashboard = FakeDashboard::new();
        dashboard.script_stages(
            "updatedns",
            vec![vec![], vec![StageStatus::building("updatedns")], vec![StageStatus::passed("updatedns")]],
        );
        let sessions = Arc::new(FakeSessions::new(dashboard.clone()));
        let spec = PipelineSpec::new("updatedns").with_babysitter(BabysitterPolicy::new(RerunStrategy::RerunPipeline));

        let (outcome, _) = run(sitter(&dashboard, &sessions, spec)).await;

        assert_eq!(outcome, SitterOutcome::Done { polls: 3, recoveries: 0 });
        assert_eq!(sessions.acquired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_bound() {
        let dashboard = FakeDashboard::new();
        dashboard.set_stages("deployapps", vec![StageStatus::failed("createapp")]);
        let sessions = Arc::new(FakeSessions::new(dashboard.clone()));
        let spec = PipelineSpec::new("deployapps").with_babysitter(BabysitterPolicy::new(RerunStrategy::RerunStage));

        let sitter = sitter(&dashboard, &sessions, spec).with_bounds(RecoveryBounds::default().with_max_attempts(2));
        let (outcome, tracker) = run(sitter).await;

        assert!(matches!(outcome, SitterOutcome::Abandoned { recoveries: 2, .. }));
        assert_eq!(dashboard.recovery_actions().len(), 2);
        assert_eq!(tracker.stopped_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_duration_bound() {
        let dashboard = FakeDashboard::new();
        dashboard.set_stages("updateapi", vec![StageStatus::building("updateapigw")]);
        let sessions = Arc::new(FakeSessions::new(dashboard.clone()));
        let spec = PipelineSpec::new("updateapi");

        let sitter = sitter(&dashboard, &sessions, spec)
            .with_bounds(RecoveryBounds::default().with_max_duration(Duration::from_secs(60)));
        let (outcome, _) = run(sitter).await;

        assert!(matches!(outcome, SitterOutcome::Abandoned { recoveries: 0, .. }));
        assert_eq!(dashboard.stage_reads("updateapi"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_policy_never_reruns() {
        let dashboard = FakeDashboard::new();
        dashboard.script_stages(
            "deployapigw",
            vec![vec![StageStatus::failed("createapigw")], vec![StageStatus::passed("createapigw")]],
        );
        let sessions = Arc::new(FakeSessions::new(dashboard.clone()));

        let (outcome, _) = run(sitter(&dashboard, &sessions, PipelineSpec::new("deployapigw"))).await;

        assert_eq!(outcome, SitterOutcome::Done { polls: 2, recoveries: 0 });
        assert_eq!(sessions.acquired(), 0);
    }
}
