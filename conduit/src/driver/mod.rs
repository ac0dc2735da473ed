//! Browser automation port.
//!
//! [`AutomationDriver`] is the narrow slice of a WebDriver client the
//! dashboard adapter needs. Elements are opaque handles that stay valid until
//! the page changes; using one afterwards yields
//! [`ConduitError::StaleElement`].

mod session;

pub use session::DriverSessionProvider;

use crate::auth::Cookie;
use crate::errors::ConduitError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// How to find elements on a page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "using", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// An XPath 1.0 expression.
    XPath(String),
    /// A CSS selector.
    Css(String),
}

impl Locator {
    /// Creates an XPath locator.
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    /// Creates a CSS locator.
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// Returns the raw expression.
    #[must_use]
    pub fn expression(&self) -> &str {
        match self {
            Self::XPath(e) | Self::Css(e) => e,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::XPath(e) => write!(f, "xpath:{e}"),
            Self::Css(e) => write!(f, "css:{e}"),
        }
    }
}

/// An element found on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    /// Driver-assigned element id.
    pub id: String,
}

impl ElementHandle {
    /// Wraps a driver element id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A browser automation session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Loads `url` in the current window.
    async fn navigate(&self, url: &str) -> Result<(), ConduitError>;

    /// Returns the URL of the current page.
    async fn current_url(&self) -> Result<String, ConduitError>;

    /// Returns the title of the current page.
    async fn title(&self) -> Result<String, ConduitError>;

    /// Returns every element matching `locator`, possibly none.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, ConduitError>;

    /// Waits up to `timeout` for an element matching `locator` to be
    /// displayed and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::ElementNotFound`] when nothing shows up in time.
    async fn locate_once_visible(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<ElementHandle, ConduitError>;

    /// Clicks an element.
    async fn click(&self, element: &ElementHandle) -> Result<(), ConduitError>;

    /// Types into an element.
    async fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<(), ConduitError>;

    /// Returns the visible text of an element.
    async fn text(&self, element: &ElementHandle) -> Result<String, ConduitError>;

    /// Returns an attribute of an element.
    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, ConduitError>;

    /// Adds a cookie for the current domain.
    async fn add_cookie(&self, cookie: &Cookie) -> Result<(), ConduitError>;

    /// Runs a script in the page.
    async fn execute_script(&self, script: &str) -> Result<(), ConduitError>;

    /// Ends the session and closes the browser.
    async fn quit(&self) -> Result<(), ConduitError>;
}

/// Creates automation sessions.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Starts a new browser session.
    async fn create(&self) -> Result<Arc<dyn AutomationDriver>, ConduitError>;
}

/// Polls the page title until `accept` returns true or `timeout` elapses.
///
/// Returns the accepted title.
pub async fn wait_until_title<F>(
    driver: &dyn AutomationDriver,
    timeout: Duration,
    accept: F,
) -> Result<String, ConduitError>
where
    F: Fn(&str) -> bool + Send,
{
    const POLL: Duration = Duration::from_millis(100);

    let deadline = Instant::now() + timeout;
    loop {
        let title = driver.title().await?;
        if accept(&title) {
            return Ok(title);
        }
        trace!(title = %title, "Waiting for page title");
        if Instant::now() >= deadline {
            return Err(ConduitError::timeout(
                format!("page title, last saw '{title}'"),
                timeout,
            ));
        }
        tokio::time::sleep(POLL).await;
    }
}
