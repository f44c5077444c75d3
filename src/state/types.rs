//! Types for the local state database.

use chrono::{DateTime, Utc};

use crate::sync::SyncReport;

/// Counts recorded when a sync run completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunStats {
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub sessions_seen: u64,
    pub sessions_created: u64,
    /// Duplicates and too-short sessions combined.
    pub sessions_skipped: u64,
    pub stages_created: u64,
    pub failures: u64,
    /// The session list could not be fetched; nothing was processed.
    pub aborted: bool,
    pub dry_run: bool,
}

impl SyncRunStats {
    pub fn from_report(report: &SyncReport, dry_run: bool) -> Self {
        Self {
            window_start: Some(report.window.start),
            window_end: Some(report.window.end),
            sessions_seen: report.sessions_seen as u64,
            sessions_created: report.sessions_created as u64,
            sessions_skipped: (report.skipped_duplicate + report.skipped_too_short) as u64,
            stages_created: report.stages_created as u64,
            failures: report.failures.len() as u64,
            aborted: false,
            dry_run,
        }
    }

    pub fn aborted(dry_run: bool) -> Self {
        Self {
            aborted: true,
            dry_run,
            ..Self::default()
        }
    }
}

/// One row of the run log.
#[derive(Debug, Clone)]
pub struct SyncRunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: SyncRunStats,
}

/// Summary of the state database for `status`.
#[derive(Debug, Clone, Default)]
pub struct StateSummary {
    /// Local record counts per table name, sorted by table name.
    pub records_by_table: Vec<(String, u64)>,
    pub total_runs: u64,
    pub last_sync_started: Option<DateTime<Utc>>,
    pub last_sync_completed: Option<DateTime<Utc>>,
}
