use thiserror::Error;

use super::window::WindowOutOfRange;
use crate::fit::ProviderError;

/// Errors that abort a whole run before any session is processed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Window(#[from] WindowOutOfRange),

    #[error("Failed to list sleep sessions")]
    ListSessions(#[from] ProviderError),
}
