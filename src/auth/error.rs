use thiserror::Error;

/// Errors from the Google OAuth token flow.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No refresh token stored; run `sleepsync auth-url` and `sleepsync authorize` first")]
    MissingRefreshToken,

    #[error("Refresh token rejected ({0}); run `sleepsync auth-url` to authorize again")]
    InvalidGrant(String),

    #[error("Token endpoint error (HTTP {status}): {message}")]
    TokenEndpoint { status: u16, message: String },

    #[error("Token response did not include a refresh token; revoke access and authorize again with prompt=consent")]
    NoRefreshTokenIssued,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}
