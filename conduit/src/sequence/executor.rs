//! Walks a pipeline sequence.
//!
//! Each pipeline gets a babysitter before it is triggered. A step is done
//! once every member's minimum completion stage has passed; babysitters keep
//! running in the background after that. Errors abort the walk and are
//! returned as-is. Nothing already triggered or spawned is undone.

use crate::babysitter::{Babysitter, SitterTracker};
use crate::config::OrchestratorConfig;
use crate::core::InstanceNumber;
use crate::errors::ConduitError;
use crate::observability::call_span;
use crate::pipeline::{PipelineControl, PipelineSequence, PipelineSpec, PipelineStep, SessionProvider};
use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Runs pipeline sequences against one control session.
pub struct SequenceExecutor {
    control: Arc<dyn PipelineControl>,
    sessions: Arc<dyn SessionProvider>,
    tracker: Arc<SitterTracker>,
    config: OrchestratorConfig,
}

impl SequenceExecutor {
    /// Creates an executor.
    ///
    /// `control` triggers and waits on the main path and is shared with every
    /// babysitter for polling. `sessions` supplies the isolated sessions
    /// babysitters recover through.
    #[must_use]
    pub fn new(
        control: Arc<dyn PipelineControl>,
        sessions: Arc<dyn SessionProvider>,
        tracker: Arc<SitterTracker>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            control,
            sessions,
            tracker,
            config,
        }
    }

    /// Returns the tracker babysitters are registered with.
    #[must_use]
    pub fn tracker(&self) -> &Arc<SitterTracker> {
        &self.tracker
    }

    /// Runs `sequence` on `instance`.
    ///
    /// Returns once every step reached its minimum completion stage.
    ///
    /// # Errors
    ///
    /// Returns a config error for an invalid sequence before anything is
    /// triggered, otherwise the first trigger or wait error.
    pub async fn run_sequence(
        &self,
        instance: &InstanceNumber,
        sequence: &PipelineSequence,
    ) -> Result<(), ConduitError> {
        sequence.validate()?;
        info!(instance = %instance, steps = sequence.len(), "Running pipeline sequence");

        for (index, step) in sequence.steps().iter().enumerate() {
            match step {
                PipelineStep::Serial(spec) => {
                    debug!(step = index, pipeline = %spec.pipeline_name, "Running pipeline");
                    self.start_pipeline(instance, spec).await?;
                    self.await_minimum_stage(instance, spec).await?;
                }
                PipelineStep::Parallel(specs) => {
                    debug!(step = index, members = specs.len(), "Running pipelines in parallel");
                    // Every member is started even if a sibling's trigger fails.
                    join_all(specs.iter().map(|spec| self.start_pipeline(instance, spec)))
                        .await
                        .into_iter()
                        .collect::<Result<Vec<()>, ConduitError>>()?;
                    try_join_all(specs.iter().map(|spec| self.await_minimum_stage(instance, spec))).await?;
                }
            }
            debug!(step = index, "Step finished");
        }

        info!(instance = %instance, "Pipeline sequence finished");
        Ok(())
    }

    /// Spawns a babysitter for `spec` and triggers the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the trigger error. The babysitter keeps running.
    pub async fn start_pipeline(&self, instance: &InstanceNumber, spec: &PipelineSpec) -> Result<(), ConduitError> {
        self.spawn_babysitter(instance, spec);
        self.trigger_pipeline(instance, &spec.pipeline_name).await
    }

    /// Triggers `pipeline` on the main session.
    ///
    /// # Errors
    ///
    /// Returns the control's trigger error.
    pub async fn trigger_pipeline(&self, instance: &InstanceNumber, pipeline: &str) -> Result<(), ConduitError> {
        self.control.trigger(instance, pipeline).await?;
        debug!(pipeline, instance = %instance, "Triggered pipeline");
        Ok(())
    }

    /// Starts a babysitter for `spec` in the background.
    pub fn spawn_babysitter(&self, instance: &InstanceNumber, spec: &PipelineSpec) {
        let sitter = Babysitter::new(
            instance.clone(),
            spec.clone(),
            Arc::clone(&self.control),
            Arc::clone(&self.sessions),
        )
        .with_poll_interval(self.config.sitter_poll_interval())
        .with_bounds(self.config.recovery);

        let span = call_span("babysit");
        debug!(pipeline = %spec.pipeline_name, "Starting babysitter");
        self.tracker
            .spawn(sitter.name(), move |guard| sitter.run(guard).instrument(span));
    }

    async fn await_minimum_stage(&self, instance: &InstanceNumber, spec: &PipelineSpec) -> Result<(), ConduitError> {
        let Some(stage) = spec.minimum_completion_stage.as_deref() else {
            return Ok(());
        };

        debug!(pipeline = %spec.pipeline_name, stage, "Waiting for minimum completion stage");
        self.control
            .wait_for_stage(instance, &spec.pipeline_name, stage, self.config.wait_limits())
            .await?;
        debug!(pipeline = %spec.pipeline_name, stage, "Minimum completion stage passed");
        Ok(())
    }
}

impl std::fmt::Debug for SequenceExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceExecutor")
            .field("tracker", &self.tracker)
            .field("config", &self.config)
            .finish()
    }
}
