//! Bounded waits.

use super::ports::StageReader;
use crate::core::InstanceNumber;
use crate::errors::ConduitError;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Bounds for waiting on a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitLimits {
    /// Give up after this long.
    pub timeout: Duration,
    /// Time between polls.
    pub poll_interval: Duration,
}

impl Default for WaitLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_secs(10),
        }
    }
}

impl WaitLimits {
    /// Creates new wait limits.
    #[must_use]
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

/// Runs a future with a timeout, mapping expiry to [`ConduitError::Timeout`].
pub async fn run_with_timeout<T, F>(duration: Duration, operation: &str, future: F) -> Result<T, ConduitError>
where
    F: Future<Output = Result<T, ConduitError>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ConduitError::timeout(operation, duration)),
    }
}

/// Polls `reader` until `stage` of `pipeline` shows passed.
///
/// Reads that fail in a way a later poll may fix (element not rendered yet,
/// stale element) are retried until the deadline; other errors end the wait.
pub async fn await_stage_passed<R>(
    reader: &R,
    instance: &InstanceNumber,
    pipeline: &str,
    stage: &str,
    limits: WaitLimits,
) -> Result<(), ConduitError>
where
    R: StageReader + ?Sized,
{
    let operation = format!("stage '{stage}' of pipeline '{pipeline}' on instance {instance} to pass");

    run_with_timeout(limits.timeout, &operation, async {
        loop {
            match reader.list_stages(instance, pipeline).await {
                Ok(stages) => {
                    if stages.iter().any(|s| s.matches(stage) && s.state.is_passed()) {
                        debug!(pipeline, stage, instance = %instance, "Stage passed");
                        return Ok(());
                    }
                    trace!(pipeline, stage, "Stage not passed yet");
                }
                Err(e) if e.is_retryable_read() => {
                    trace!(pipeline, stage, error = %e, "Stage read failed, polling again");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(limits.poll_interval).await;
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use crate::testing::FakeDashboard;

    fn limits() -> WaitLimits {
        WaitLimits::new(Duration::from_secs(60), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_once_stage_passes() {
        let dashboard = FakeDashboard::new();
        dashboard.script_stages(
            "buildse",
            vec![
                vec![StageStatus::building("compileandpackage")],
                vec![StageStatus::passed("compileandpackage")],
            ],
        );

        let result = await_stage_passed(&dashboard, &"9".into(), "buildse", "compile", limits()).await;

        assert!(result.is_ok());
        assert_eq!(dashboard.stage_reads("buildse"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let dashboard = FakeDashboard::new();
        dashboard.set_stages("buildse", vec![StageStatus::failed("compileandpackage")]);

        let result = await_stage_passed(&dashboard, &"9".into(), "buildse", "compile", limits()).await;

        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pipeline_keeps_polling_until_deadline() {
        let dashboard = FakeDashboard::new();

        let result = await_stage_passed(&dashboard, &"9".into(), "ghost", "build", limits()).await;

        assert!(result.unwrap_err().is_timeout());
        assert!(dashboard.stage_reads("ghost") > 1);
    }

    #[tokio::test]
    async fn test_run_with_timeout_passes_through_errors() {
        let result: Result<(), _> = run_with_timeout(Duration::from_secs(1), "noop", async {
            Err(ConduitError::Authentication("nope".into()))
        })
        .await;

        assert!(matches!(result, Err(ConduitError::Authentication(_))));
    }
}
