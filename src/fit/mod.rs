//! Google Fit provider: sleep session listing and sleep stage aggregation.

pub mod client;
pub mod error;
pub mod responses;
pub mod types;

use chrono::{DateTime, Utc};

use crate::sync::SyncWindow;

pub use self::client::FitClient;
pub use self::error::ProviderError;
pub use self::types::{to_iso, SleepSession, StagePoint};

/// Source of sleep sessions and their stages.
///
/// Implementations carry their own credentials; the orchestrator only sees
/// time ranges.
#[async_trait::async_trait]
pub trait SleepProvider: Send + Sync {
    /// Sleep sessions overlapping the window, in provider order.
    async fn list_sessions(&self, window: &SyncWindow) -> Result<Vec<SleepSession>, ProviderError>;

    /// Sleep stage segments inside `[start, end]`.
    async fn fetch_stages(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StagePoint>, ProviderError>;
}
