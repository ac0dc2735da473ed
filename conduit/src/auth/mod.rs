//! Dashboard authentication.
//!
//! The dashboard is reached through a browser that may or may not hold a
//! session. When it lands on the login page, cookies from a
//! [`CredentialProvider`] are injected and the dashboard is reloaded.

mod cookies;
mod login;

#[cfg(test)]
pub use cookies::MockCredentialProvider;
pub use cookies::{Cookie, CredentialProvider, JsonCookieFile, SameSite, StaticCredentialProvider};
pub use login::ensure_logged_in;
