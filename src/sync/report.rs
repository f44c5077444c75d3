//! Per-run outcome accounting.

use std::fmt;

use super::window::SyncWindow;
use crate::store::StoreError;

/// Why a session was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A stored session already has the same identity key.
    Duplicate,
    /// Shorter than the configured minimum duration.
    TooShort,
}

/// Terminal state of one fetched session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Skipped(SkipReason),
    Persisted {
        stages: usize,
        stage_fetch_failed: bool,
    },
    Failed,
}

/// Pipeline step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Lookup,
    SessionCreate,
    StageFetch,
    StageCreate,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lookup => "lookup",
            Self::SessionCreate => "session-create",
            Self::StageFetch => "stage-fetch",
            Self::StageCreate => "stage-create",
        })
    }
}

/// One logged, non-fatal failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub kind: FailureKind,
    /// ISO start of the session being processed.
    pub session_start: String,
    pub message: String,
    /// Backoff suggested by the store on a rate-limit response.
    pub retry_after_secs: Option<u64>,
}

impl SyncFailure {
    pub(crate) fn from_store(kind: FailureKind, session_start: &str, err: &StoreError) -> Self {
        Self {
            kind,
            session_start: session_start.to_string(),
            message: err.to_string(),
            retry_after_secs: err.retry_after_secs(),
        }
    }
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] session {}: {}", self.kind, self.session_start, self.message)
    }
}

/// What a run did, returned to the caller instead of being inferred from logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub window: SyncWindow,
    pub sessions_seen: usize,
    pub sessions_created: usize,
    pub skipped_duplicate: usize,
    pub skipped_too_short: usize,
    pub stages_created: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn new(window: SyncWindow) -> Self {
        Self {
            window,
            sessions_seen: 0,
            sessions_created: 0,
            skipped_duplicate: 0,
            skipped_too_short: 0,
            stages_created: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold one session's outcome into the counters.
    pub(crate) fn record(&mut self, outcome: &SessionOutcome) {
        self.sessions_seen += 1;
        match outcome {
            SessionOutcome::Skipped(SkipReason::Duplicate) => self.skipped_duplicate += 1,
            SessionOutcome::Skipped(SkipReason::TooShort) => self.skipped_too_short += 1,
            SessionOutcome::Persisted { stages, .. } => {
                self.sessions_created += 1;
                self.stages_created += stages;
            }
            SessionOutcome::Failed => {}
        }
    }
}
