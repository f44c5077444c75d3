use thiserror::Error;

/// Errors from the fitness provider API.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider rejected the access token (HTTP 401)")]
    Unauthorized,

    #[error("Provider API error (HTTP {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected provider response: {0}")]
    Decode(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
