use thiserror::Error;

use crate::state::StateError;

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (suggested wait: {secs}s)"),
        None => String::new(),
    }
}

/// Errors from a record store backend.
///
/// `is_retryable()` separates transient failures (rate limits, server
/// errors, dropped connections) from payload problems that will fail the
/// same way on the next run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Rate limited by record store{}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Record store rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed record store response: {0}")]
    MalformedResponse(String),

    #[error("Invalid store configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    State(#[from] StateError),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::RateLimited { .. } => true,
            StoreError::Rejected { status, .. } => *status >= 500,
            StoreError::Http(_) => true,
            StoreError::MalformedResponse(_) | StoreError::Config(_) | StoreError::State(_) => {
                false
            }
        }
    }

    /// Suggested wait before the next request, when the store sent one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            StoreError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_retryable_with_hint() {
        let e = StoreError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert!(e.is_retryable());
        assert_eq!(e.retry_after_secs(), Some(30));
        assert_eq!(
            e.to_string(),
            "Rate limited by record store (suggested wait: 30s)"
        );
    }

    #[test]
    fn test_rate_limited_without_hint() {
        let e = StoreError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(e.to_string(), "Rate limited by record store");
        assert_eq!(e.retry_after_secs(), None);
    }

    #[test]
    fn test_422_not_retryable() {
        let e = StoreError::Rejected {
            status: 422,
            message: "INVALID_VALUE_FOR_COLUMN".into(),
        };
        assert!(!e.is_retryable());
        assert_eq!(e.retry_after_secs(), None);
    }

    #[test]
    fn test_503_retryable() {
        let e = StoreError::Rejected {
            status: 503,
            message: String::new(),
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn test_malformed_not_retryable() {
        assert!(!StoreError::MalformedResponse("no id".into()).is_retryable());
    }
}
