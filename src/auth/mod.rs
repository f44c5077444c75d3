//! Google OAuth: consent URL, code exchange, and refresh-token handling.
//!
//! The refresh token lives behind a [`credentials::CredentialStore`]; every
//! run trades it for a short-lived [`AccessToken`] before touching the
//! provider.

pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod oauth;
pub mod responses;

pub use self::credentials::EnvFileCredentialStore;
pub use self::error::AuthError;
pub use self::oauth::OAuthClient;

/// Short-lived bearer token for the provider API.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}
