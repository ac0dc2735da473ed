//! The orchestrator facade.
//!
//! Owns the main control session, the recovery session provider and the
//! babysitter tracker, and runs every public call inside its own span.

use crate::auth::CredentialProvider;
use crate::babysitter::{QuiescenceReport, SitterTracker};
use crate::config::{ConduitConfig, OrchestratorConfig};
use crate::core::{InstanceNumber, StageStatus};
use crate::driver::{DriverFactory, DriverSessionProvider};
use crate::errors::ConduitError;
use crate::observability::call_span;
use crate::pipeline::{PipelineControl, PipelineSequence, PipelineSpec, SessionProvider};
use crate::sequence::SequenceExecutor;
use std::sync::Arc;
use tracing::{info, Instrument};

/// Entry point for running pipeline sequences with babysitting.
pub struct Orchestrator {
    control: Arc<dyn PipelineControl>,
    executor: SequenceExecutor,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Creates an orchestrator over an open control session.
    #[must_use]
    pub fn new(
        control: Arc<dyn PipelineControl>,
        sessions: Arc<dyn SessionProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        let tracker = Arc::new(SitterTracker::new(config.quit_poll_interval()));
        let executor = SequenceExecutor::new(Arc::clone(&control), sessions, tracker, config.clone());
        Self {
            control,
            executor,
            config,
        }
    }

    /// Opens a logged-in browser session on the dashboard and builds an
    /// orchestrator around it. Babysitters recover through fresh browser
    /// sessions from the same factory.
    ///
    /// # Errors
    ///
    /// Returns a config error for an invalid configuration, or the error
    /// from opening the main session.
    pub async fn connect(
        factory: Arc<dyn DriverFactory>,
        credentials: Arc<dyn CredentialProvider>,
        config: &ConduitConfig,
    ) -> Result<Self, ConduitError> {
        config.validate()?;
        let provider = DriverSessionProvider::new(factory, credentials, config.dashboard.clone());
        let control = provider
            .open()
            .instrument(call_span("connect"))
            .await?;
        info!(base_url = %config.dashboard.base_url, "Connected to dashboard");
        Ok(Self::new(Arc::new(control), Arc::new(provider), config.orchestrator.clone()))
    }

    /// Runs `sequence` on `instance`. See [`SequenceExecutor::run_sequence`].
    ///
    /// # Errors
    ///
    /// Returns the first error of the walk.
    pub async fn run_sequence(
        &self,
        instance: &InstanceNumber,
        sequence: &PipelineSequence,
    ) -> Result<(), ConduitError> {
        self.executor
            .run_sequence(instance, sequence)
            .instrument(call_span("run_sequence"))
            .await
    }

    /// Triggers one pipeline and, if `minimum_completion_stage` is given,
    /// waits for it to pass. No babysitter is started.
    ///
    /// # Errors
    ///
    /// Returns the trigger error or a wait timeout.
    pub async fn trigger_pipeline(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
        minimum_completion_stage: Option<&str>,
    ) -> Result<(), ConduitError> {
        async {
            self.executor.trigger_pipeline(instance, pipeline).await?;
            if let Some(stage) = minimum_completion_stage {
                self.control
                    .wait_for_stage(instance, pipeline, stage, self.config.wait_limits())
                    .await?;
            }
            Ok(())
        }
        .instrument(call_span("trigger_pipeline"))
        .await
    }

    /// Reads the current stages of a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::ElementNotFound`] if the pipeline is not shown.
    pub async fn get_stages(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
    ) -> Result<Vec<StageStatus>, ConduitError> {
        self.control
            .list_stages(instance, pipeline)
            .instrument(call_span("get_stages"))
            .await
    }

    /// Starts a babysitter for an already running pipeline.
    pub fn babysit(&self, instance: &InstanceNumber, spec: &PipelineSpec) {
        self.executor.spawn_babysitter(instance, spec);
    }

    /// Returns the number of active babysitters.
    #[must_use]
    pub fn active_sitters(&self) -> usize {
        self.executor.tracker().active_count()
    }

    /// Returns the babysitter tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<SitterTracker> {
        self.executor.tracker()
    }

    /// Waits until every babysitter has stopped.
    pub async fn quit(&self) -> QuiescenceReport {
        let report = self.executor.tracker().quit().instrument(call_span("quit")).await;
        info!(started = report.started, stopped = report.stopped, "All babysitters stopped");
        report
    }

    /// Waits for quiescence, then closes the main session.
    ///
    /// # Errors
    ///
    /// Returns the error from closing the main session.
    pub async fn shutdown(self) -> Result<QuiescenceReport, ConduitError> {
        let report = self.quit().await;
        self.control.close().await?;
        Ok(report)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("executor", &self.executor)
            .finish()
    }
}
