//! Ports to the dashboard: reading stages, triggering pipelines and
//! acquiring isolated automation sessions.
//!
//! The orchestrator only talks to these traits. The dashboard adapter
//! implements them over an automation driver; tests implement them with
//! in-memory fakes.

use super::wait::{await_stage_passed, WaitLimits};
use crate::core::{InstanceNumber, StageStatus};
use crate::errors::ConduitError;
use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

/// Reads the current stage statuses of a pipeline instance.
#[async_trait]
pub trait StageReader: Send + Sync {
    /// Returns the stages of `pipeline` on `instance` in declared order.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::ElementNotFound`] if the pipeline is not shown.
    async fn list_stages(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
    ) -> Result<Vec<StageStatus>, ConduitError>;
}

/// Issues run actions.
#[async_trait]
pub trait PipelineTrigger: Send + Sync {
    /// Starts a run of `pipeline` on `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::StaleElement`] if the trigger control
    /// disappeared between lookup and click.
    async fn trigger(&self, instance: &InstanceNumber, pipeline: &str) -> Result<(), ConduitError>;

    /// Reruns the failed jobs of `stage`.
    async fn retrigger_stage(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
        stage: &str,
    ) -> Result<(), ConduitError>;
}

/// A full control session over the dashboard.
#[async_trait]
pub trait PipelineControl: StageReader + PipelineTrigger {
    /// Blocks until `stage` of `pipeline` is observed passed.
    ///
    /// The default polls [`StageReader::list_stages`].
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Timeout`] once `limits.timeout` elapses.
    async fn wait_for_stage(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
        stage: &str,
        limits: WaitLimits,
    ) -> Result<(), ConduitError> {
        await_stage_passed(self, instance, pipeline, stage, limits).await
    }

    /// Releases whatever the session holds.
    async fn close(&self) -> Result<(), ConduitError> {
        Ok(())
    }
}

/// Hands out isolated control sessions for recovery attempts.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Acquires a fresh session.
    async fn acquire(&self) -> Result<Arc<dyn PipelineControl>, ConduitError>;

    /// Releases a session. Errors are logged and suppressed.
    async fn release(&self, session: Arc<dyn PipelineControl>) {
        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close automation session");
        }
    }
}

/// Runs `f` with a freshly acquired session and releases it afterwards,
/// whether `f` succeeds, fails or panics.
pub async fn with_session<F, Fut, T>(provider: &dyn SessionProvider, f: F) -> Result<T, ConduitError>
where
    F: FnOnce(Arc<dyn PipelineControl>) -> Fut,
    Fut: Future<Output = Result<T, ConduitError>>,
{
    let session = provider.acquire().await?;
    let outcome = AssertUnwindSafe(f(Arc::clone(&session))).catch_unwind().await;
    provider.release(session).await;

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
