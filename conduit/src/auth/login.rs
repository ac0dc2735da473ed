use super::CredentialProvider;
use crate::config::DashboardConfig;
use crate::driver::{wait_until_title, AutomationDriver};
use crate::errors::ConduitError;
use tracing::{debug, error, trace};

fn is_landing_title(title: &str) -> bool {
    title.starts_with("Dashboard") || title.starts_with("Login")
}

fn is_login_page(url: &str, login_url: &str) -> bool {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    url.trim_end_matches('/') == login_url.trim_end_matches('/')
}

async fn load_dashboard(
    driver: &dyn AutomationDriver,
    config: &DashboardConfig,
) -> Result<String, ConduitError> {
    let url = config.dashboard_url();
    trace!(url = %url, "Navigating to dashboard");
    driver.navigate(&url).await?;
    wait_until_title(driver, config.title_timeout(), is_landing_title).await?;

    let current = driver.current_url().await?;
    debug!(url = %current, "Current URL");
    Ok(current)
}

/// Makes sure `driver` holds a logged-in dashboard session.
///
/// # Errors
///
/// Returns [`ConduitError::Authentication`] if the dashboard still redirects
/// to the login page after the provider's cookies were injected.
pub async fn ensure_logged_in(
    driver: &dyn AutomationDriver,
    credentials: &dyn CredentialProvider,
    config: &DashboardConfig,
) -> Result<(), ConduitError> {
    let login_url = config.login_url();
    let mut current = load_dashboard(driver, config).await?;

    if is_login_page(&current, &login_url) {
        debug!("Redirected to login, adding cookies to the browser");
        for cookie in credentials.cookies().await? {
            trace!(cookie = %cookie.name, domain = %cookie.domain, "Adding cookie");
            driver.add_cookie(&cookie).await?;
        }
        current = load_dashboard(driver, config).await?;
    }

    if is_login_page(&current, &login_url) {
        error!(browser = %config.browser, "Not logged into the dashboard");
        return Err(ConduitError::Authentication(format!(
            "Please login to the dashboard on {} before continuing",
            config.browser
        )));
    }

    debug!("Logged into the dashboard");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Cookie, MockCredentialProvider};
    use crate::driver::MockAutomationDriver;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const BASE: &str = "http://ci.example.com:8153/go";

    fn config() -> DashboardConfig {
        DashboardConfig::new(BASE)
    }

    fn driver_with_urls(urls: Vec<&'static str>) -> MockAutomationDriver {
        let mut driver = MockAutomationDriver::new();
        let calls = Arc::new(AtomicUsize::new(0));
        driver.expect_navigate().returning(|_| Ok(()));
        driver.expect_title().returning(|| Ok("Dashboard - Go".to_string()));
        driver.expect_current_url().returning(move || {
            let i = calls.fetch_add(1, Ordering::SeqCst).min(urls.len() - 1);
            Ok(urls[i].to_string())
        });
        driver
    }

    #[test]
    fn test_is_login_page_ignores_query() {
        assert!(is_login_page(
            "http://ci.example.com:8153/go/auth/login?redirect=1",
            "http://ci.example.com:8153/go/auth/login"
        ));
        assert!(!is_login_page(
            "http://ci.example.com:8153/go/pipelines",
            "http://ci.example.com:8153/go/auth/login"
        ));
    }

    #[tokio::test]
    async fn test_already_logged_in_skips_cookies() {
        let driver = driver_with_urls(vec!["http://ci.example.com:8153/go/pipelines"]);
        let mut credentials = MockCredentialProvider::new();
        credentials.expect_cookies().times(0);

        ensure_logged_in(&driver, &credentials, &config()).await.unwrap();
    }

    #[tokio::test]
    async fn test_injects_cookies_on_login_page() {
        let mut driver = driver_with_urls(vec![
            "http://ci.example.com:8153/go/auth/login",
            "http://ci.example.com:8153/go/pipelines",
        ]);
        driver.expect_add_cookie().times(2).returning(|_| Ok(()));
        let mut credentials = MockCredentialProvider::new();
        credentials.expect_cookies().times(1).returning(|| {
            Ok(vec![
                Cookie::new("JSESSIONID", "abc", "ci.example.com"),
                Cookie::new("remember", "1", ".example.com"),
            ])
        });

        ensure_logged_in(&driver, &credentials, &config()).await.unwrap();
    }

    #[tokio::test]
    async fn test_still_on_login_page_fails() {
        let mut driver = driver_with_urls(vec!["http://ci.example.com:8153/go/auth/login"]);
        driver.expect_add_cookie().returning(|_| Ok(()));
        let mut credentials = MockCredentialProvider::new();
        credentials
            .expect_cookies()
            .returning(|| Ok(vec![Cookie::new("JSESSIONID", "stale", "ci.example.com")]));

        let err = ensure_logged_in(&driver, &credentials, &config()).await.unwrap_err();

        assert!(matches!(err, ConduitError::Authentication(ref m) if m.contains("firefox")));
    }
}
