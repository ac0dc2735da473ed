//! Session cookies and where they come from.

use crate::errors::ConduitError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use tracing::{debug, trace};

/// Cookie `SameSite` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SameSite {
    /// Sent on top-level navigations.
    #[default]
    Lax,
    /// Sent on same-site requests only.
    Strict,
    /// Always sent.
    None,
}

impl SameSite {
    /// Maps a browser profile's numeric attribute. `0` is `Lax`; anything
    /// else is treated as `Strict`.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            Self::Lax
        } else {
            Self::Strict
        }
    }
}

impl<'de> Deserialize<'de> for SameSite {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(code) => Ok(Self::from_code(code)),
            Raw::Name(name) => match name.to_ascii_lowercase().as_str() {
                "lax" => Ok(Self::Lax),
                "strict" => Ok(Self::Strict),
                "none" => Ok(Self::None),
                other => Err(serde::de::Error::custom(format!("unknown sameSite value '{other}'"))),
            },
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

/// A browser cookie, in the shape WebDriver accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Domain the cookie belongs to, possibly with a leading dot.
    pub domain: String,
    /// Path scope.
    #[serde(default = "default_path")]
    pub path: String,
    /// `SameSite` attribute.
    #[serde(default)]
    pub same_site: SameSite,
    /// HTTPS only.
    #[serde(default)]
    pub secure: bool,
    /// Hidden from scripts.
    #[serde(default)]
    pub http_only: bool,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

impl Cookie {
    /// Creates a session cookie with path `/`.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            same_site: SameSite::default(),
            secure: false,
            http_only: false,
            expiry: None,
        }
    }

    /// Sets the `SameSite` attribute.
    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Returns true if the cookie is scoped to `base_domain` or one of its
    /// subdomains.
    #[must_use]
    pub fn belongs_to(&self, base_domain: &str) -> bool {
        let domain = self.domain.trim_start_matches('.').to_ascii_lowercase();
        let base = base_domain.trim_start_matches('.').to_ascii_lowercase();
        domain == base || domain.ends_with(&format!(".{base}"))
    }
}

/// Supplies the cookies of an authenticated dashboard session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns the cookies to inject.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Credentials`] if no cookies are available.
    async fn cookies(&self) -> Result<Vec<Cookie>, ConduitError>;
}

/// A fixed set of cookies.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    cookies: Vec<Cookie>,
}

impl StaticCredentialProvider {
    /// Creates a provider handing out `cookies`.
    #[must_use]
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn cookies(&self) -> Result<Vec<Cookie>, ConduitError> {
        Ok(self.cookies.clone())
    }
}

/// Reads cookies exported from a browser profile as a JSON array, keeping
/// those that belong to one base domain.
#[derive(Debug, Clone)]
pub struct JsonCookieFile {
    path: PathBuf,
    base_domain: String,
}

impl JsonCookieFile {
    /// Creates a provider reading `path` and keeping cookies for `base_domain`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, base_domain: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            base_domain: base_domain.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for JsonCookieFile {
    async fn cookies(&self) -> Result<Vec<Cookie>, ConduitError> {
        trace!(path = %self.path.display(), "Reading cookie file");
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ConduitError::Credentials(format!("cannot read cookie file {}: {e}", self.path.display()))
        })?;

        let all: Vec<Cookie> = serde_json::from_str(&raw).map_err(|e| {
            ConduitError::Credentials(format!("cookie file {} is not a cookie list: {e}", self.path.display()))
        })?;

        let cookies: Vec<Cookie> = all.into_iter().filter(|c| c.belongs_to(&self.base_domain)).collect();
        if cookies.is_empty() {
            return Err(ConduitError::Credentials(format!(
                "no cookies for '{}' in {}",
                self.base_domain,
                self.path.display()
            )));
        }

        debug!(count = cookies.len(), domain = %self.base_domain, "Loaded cookies");
        Ok(cookies)
    }
}
