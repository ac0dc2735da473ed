//! Pipeline control over a browser session.

use super::locators;
use super::parse::parse_stage_title;
use crate::auth::{ensure_logged_in, CredentialProvider};
use crate::config::DashboardConfig;
use crate::core::{InstanceNumber, StageStatus};
use crate::driver::{wait_until_title, AutomationDriver, ElementHandle, Locator};
use crate::errors::ConduitError;
use crate::pipeline::{run_with_timeout, PipelineControl, PipelineTrigger, StageReader, WaitLimits};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Reads and drives pipelines on the dashboard through one browser session.
pub struct DashboardControl {
    driver: Arc<dyn AutomationDriver>,
    config: DashboardConfig,
    session_id: Uuid,
}

impl DashboardControl {
    /// Wraps a driver without touching the page.
    #[must_use]
    pub fn new(driver: Arc<dyn AutomationDriver>, config: DashboardConfig) -> Self {
        Self {
            driver,
            config,
            session_id: Uuid::new_v4(),
        }
    }

    /// Wraps a driver and prepares the page.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`DashboardControl::prepare`].
    pub async fn open(
        driver: Arc<dyn AutomationDriver>,
        credentials: &dyn CredentialProvider,
        config: DashboardConfig,
    ) -> Result<Self, ConduitError> {
        let control = Self::new(driver, config);
        control.prepare(credentials).await?;
        Ok(control)
    }

    /// Logs in if needed, loads the dashboard and hides the tab strip.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Authentication`] if the session cannot be
    /// logged in, or a driver error if the dashboard does not load.
    pub async fn prepare(&self, credentials: &dyn CredentialProvider) -> Result<(), ConduitError> {
        debug!(session = %self.session_id, "Preparing dashboard session");
        ensure_logged_in(self.driver.as_ref(), credentials, &self.config).await?;

        self.driver.navigate(&self.config.dashboard_url()).await?;
        self.locate(&Locator::css(locators::DASHBOARD_TABS)).await?;
        self.driver.execute_script(locators::HIDE_TABS_SCRIPT).await?;
        trace!(session = %self.session_id, "Dashboard ready");
        Ok(())
    }

    /// Returns the underlying driver.
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn AutomationDriver> {
        &self.driver
    }

    /// Returns the dashboard configuration.
    #[must_use]
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Returns the id used to tell sessions apart in logs.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub(crate) async fn locate(&self, locator: &Locator) -> Result<ElementHandle, ConduitError> {
        self.driver
            .locate_once_visible(locator, self.config.element_timeout())
            .await
    }

    pub(crate) async fn click(&self, locator: &Locator) -> Result<(), ConduitError> {
        trace!(locator = %locator, "Clicking");
        let element = self.locate(locator).await?;
        self.driver.click(&element).await
    }
}

#[async_trait]
impl StageReader for DashboardControl {
    async fn list_stages(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
    ) -> Result<Vec<StageStatus>, ConduitError> {
        let locator = locators::stages(pipeline, instance);
        self.locate(&locator).await?;

        let mut stages = Vec::new();
        for element in self.driver.find_all(&locator).await? {
            match self.driver.attribute(&element, "title").await? {
                Some(title) => stages.push(parse_stage_title(&title)),
                None => trace!(element = %element.id, "Stage element without title"),
            }
        }

        debug!(pipeline, instance = %instance, stages = ?stages, "Read stages");
        Ok(stages)
    }
}

#[async_trait]
impl PipelineTrigger for DashboardControl {
    async fn trigger(&self, instance: &InstanceNumber, pipeline: &str) -> Result<(), ConduitError> {
        self.click(&locators::play_button(pipeline, instance)).await?;
        debug!(pipeline, instance = %instance, session = %self.session_id, "Clicked pipeline play button");
        Ok(())
    }

    async fn retrigger_stage(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
        stage: &str,
    ) -> Result<(), ConduitError> {
        self.click(&locators::failed_stage(pipeline, instance, stage)).await?;
        debug!(pipeline, stage, "Stage link clicked");

        wait_until_title(self.driver.as_ref(), self.config.element_timeout(), |title| {
            title.contains(locators::STAGE_DETAIL_TITLE)
        })
        .await?;

        self.click(&Locator::xpath(locators::JOBS_TAB)).await?;
        self.click(&Locator::xpath(locators::RERUN_FAILED)).await?;
        debug!(pipeline, stage, instance = %instance, session = %self.session_id, "Rerun failed clicked");
        Ok(())
    }
}

#[async_trait]
impl PipelineControl for DashboardControl {
    /// Waits for a passed link of `stage` on a run dated today.
    ///
    /// Older runs of the same pipeline also show passed stages, so the date
    /// on the card decides whether the pass belongs to this trigger.
    async fn wait_for_stage(
        &self,
        instance: &InstanceNumber,
        pipeline: &str,
        stage: &str,
        limits: WaitLimits,
    ) -> Result<(), ConduitError> {
        let operation = format!("stage '{stage}' of pipeline '{pipeline}' on instance {instance} to pass");

        run_with_timeout(limits.timeout, &operation, async {
            loop {
                let today = chrono::Local::now().date_naive();
                let locator = locators::passed_stage_on(pipeline, instance, stage, today);
                if !self.driver.find_all(&locator).await?.is_empty() {
                    debug!(pipeline, stage, "Stage completed");
                    return Ok(());
                }
                trace!(pipeline, stage, "Waiting for stage to complete");
                tokio::time::sleep(limits.poll_interval).await;
            }
        })
        .await
    }

    async fn close(&self) -> Result<(), ConduitError> {
        trace!(session = %self.session_id, "Quitting driver");
        self.driver.quit().await
    }
}

impl std::fmt::Debug for DashboardControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardControl")
            .field("base_url", &self.config.base_url)
            .field("session_id", &self.session_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentialProvider;
    use crate::testing::FakeDriver;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const BASE: &str = "http://ci.example.com:8153/go";

    fn control(driver: &FakeDriver) -> DashboardControl {
        DashboardControl::new(Arc::new(driver.clone()), DashboardConfig::new(BASE))
    }

    #[tokio::test]
    async fn test_list_stages_parses_titles() {
        let driver = FakeDriver::new();
        let locator = locators::stages("DeployDBs", &"5".into());
        driver.add_element(&locator, "s1", &[("title", "Prepare (passed)")], "");
        driver.add_element(&locator, "s2", &[("title", "DeployDatabases (failed)")], "");
        driver.add_element(&locator, "s3", &[], "");

        let stages = control(&driver).list_stages(&"5".into(), "DeployDBs").await.unwrap();

        assert_eq!(
            stages,
            vec![StageStatus::passed("prepare"), StageStatus::failed("deploydatabases")]
        );
    }

    #[tokio::test]
    async fn test_list_stages_missing_pipeline() {
        let driver = FakeDriver::new();

        let err = control(&driver).list_stages(&"5".into(), "ghost").await.unwrap_err();

        assert!(matches!(err, ConduitError::ElementNotFound { .. }));
    }

    #[tokio::test]
    async fn test_trigger_clicks_play_button() {
        let driver = FakeDriver::new();
        let play = locators::play_button("deployapps", &"8".into());
        driver.add_element(&play, "play", &[], "");

        control(&driver).trigger(&"8".into(), "deployapps").await.unwrap();

        assert_eq!(driver.clicks(), vec!["play"]);
    }

    #[tokio::test]
    async fn test_trigger_fails_when_play_button_goes_stale() {
        let driver = FakeDriver::new();
        let play = locators::play_button("deployapps", &"8".into());
        driver.add_element(&play, "play", &[], "");
        driver.detach_on_locate(&play);

        let err = control(&driver).trigger(&"8".into(), "deployapps").await.unwrap_err();

        assert!(matches!(err, ConduitError::StaleElement { .. }));
        assert!(driver.clicks().is_empty());
    }

    #[tokio::test]
    async fn test_retrigger_stage_walks_stage_detail() {
        let driver = FakeDriver::new();
        let instance = InstanceNumber::from("8");
        driver.add_element(&locators::failed_stage("runat", &instance, "acceptance"), "stage", &[], "");
        driver.add_element(&Locator::xpath(locators::JOBS_TAB), "jobs", &[], "");
        driver.add_element(&Locator::xpath(locators::RERUN_FAILED), "rerun", &[], "");
        driver.set_title("Stage Detail - Go");

        control(&driver).retrigger_stage(&instance, "runat", "acceptance").await.unwrap();

        assert_eq!(driver.clicks(), vec!["stage", "jobs", "rerun"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_stage_uses_todays_run() {
        let driver = FakeDriver::new();
        let instance = InstanceNumber::from("8");
        let today = chrono::Local::now().date_naive();
        driver.add_element(&locators::passed_stage_on("buildse", &instance, "compile", today), "ok", &[], "");

        let limits = WaitLimits::new(Duration::from_secs(60), Duration::from_secs(10));
        control(&driver)
            .wait_for_stage(&instance, "buildse", "compile", limits)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_stage_times_out() {
        let driver = FakeDriver::new();
        let limits = WaitLimits::new(Duration::from_secs(60), Duration::from_secs(10));

        let err = control(&driver)
            .wait_for_stage(&"8".into(), "buildse", "compile", limits)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_prepare_hides_tabs() {
        let driver = FakeDriver::new();
        driver.set_title("Dashboard - Go");
        driver.set_url(&format!("{BASE}/pipelines"));
        driver.add_element(&Locator::css(locators::DASHBOARD_TABS), "tabs", &[], "");

        let control = DashboardControl::open(
            Arc::new(driver.clone()),
            &StaticCredentialProvider::default(),
            DashboardConfig::new(BASE),
        )
        .await
        .unwrap();

        assert_eq!(driver.scripts(), vec![locators::HIDE_TABS_SCRIPT.to_string()]);
        assert_eq!(control.config().base_url, BASE);
    }

    #[tokio::test]
    async fn test_close_quits_driver() {
        let driver = FakeDriver::new();
        control(&driver).close().await.unwrap();
        assert!(driver.has_quit());
    }
}
