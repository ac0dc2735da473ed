use super::DriverFactory;
use crate::auth::CredentialProvider;
use crate::config::DashboardConfig;
use crate::dashboard::DashboardControl;
use crate::errors::ConduitError;
use crate::pipeline::{PipelineControl, SessionProvider};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens a fresh, logged-in browser session per recovery attempt.
///
/// Released sessions quit their browser.
pub struct DriverSessionProvider {
    factory: Arc<dyn DriverFactory>,
    credentials: Arc<dyn CredentialProvider>,
    config: DashboardConfig,
}

impl DriverSessionProvider {
    /// Creates a provider.
    #[must_use]
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        credentials: Arc<dyn CredentialProvider>,
        config: DashboardConfig,
    ) -> Self {
        Self {
            factory,
            credentials,
            config,
        }
    }

    /// Opens a prepared dashboard session.
    ///
    /// The browser is quit if preparing it fails.
    ///
    /// # Errors
    ///
    /// Returns the driver creation or preparation error.
    pub async fn open(&self) -> Result<DashboardControl, ConduitError> {
        let driver = self.factory.create().await?;
        match DashboardControl::open(Arc::clone(&driver), self.credentials.as_ref(), self.config.clone()).await {
            Ok(control) => {
                debug!(session = %control.session_id(), "Opened dashboard session");
                Ok(control)
            }
            Err(e) => {
                if let Err(quit_error) = driver.quit().await {
                    warn!(error = %quit_error, "Failed to quit driver after failed open");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl SessionProvider for DriverSessionProvider {
    async fn acquire(&self) -> Result<Arc<dyn PipelineControl>, ConduitError> {
        Ok(Arc::new(self.open().await?))
    }
}

impl std::fmt::Debug for DriverSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverSessionProvider")
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentialProvider;
    use crate::core::InstanceNumber;
    use crate::dashboard::locators;
    use crate::driver::{AutomationDriver, Locator};
    use crate::pipeline::with_session;
    use crate::testing::FakeDriver;
    use parking_lot::Mutex;

    const BASE: &str = "http://ci.example.com:8153/go";

    struct Factory {
        drivers: Mutex<Vec<FakeDriver>>,
    }

    #[async_trait]
    impl DriverFactory for Factory {
        async fn create(&self) -> Result<Arc<dyn AutomationDriver>, ConduitError> {
            let driver = self
                .drivers
                .lock()
                .pop()
                .ok_or_else(|| ConduitError::Driver("no browser left".into()))?;
            Ok(Arc::new(driver))
        }
    }

    fn provider(driver: &FakeDriver) -> DriverSessionProvider {
        let factory = Factory {
            drivers: Mutex::new(vec![driver.clone()]),
        };
        DriverSessionProvider::new(
            Arc::new(factory),
            Arc::new(StaticCredentialProvider::default()),
            DashboardConfig::new(BASE),
        )
    }

    #[tokio::test]
    async fn test_session_quits_driver_on_release() {
        let driver = FakeDriver::new();
        driver.set_title("Dashboard - Go");
        driver.set_url(&format!("{BASE}/pipelines"));
        driver.add_element(&Locator::css(locators::DASHBOARD_TABS), "tabs", &[], "");
        driver.add_element(&locators::play_button("deployapps", &"4".into()), "play", &[], "");
        let sessions = provider(&driver);

        with_session(&sessions, |session| async move {
            session.trigger(&InstanceNumber::from("4"), "deployapps").await?;
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(driver.clicks(), vec!["play"]);
        assert!(driver.has_quit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_open_quits_driver() {
        let driver = FakeDriver::new();
        driver.set_title("Login - Go");
        driver.set_url(&format!("{BASE}/auth/login"));
        let sessions = provider(&driver);

        let Err(err) = sessions.acquire().await else {
            panic!("opening a session behind a login redirect should fail");
        };

        assert!(matches!(err, ConduitError::Authentication(_)));
        assert!(driver.has_quit());
    }
}
