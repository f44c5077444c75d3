//! Sync orchestrator: one pass over the trailing window.
//!
//! Sessions are processed strictly in provider order, one at a time. Each
//! goes through the novelty check, the duration filter, the session write,
//! the stage fetch, and one write per stage. Only a failed session listing
//! aborts the run; everything after that is logged, recorded in the
//! [`SyncReport`], and skipped.

pub mod error;
pub mod report;
pub mod window;

use std::io::IsTerminal;

use chrono::{DateTime, Duration, Utc};
use indicatif::{ProgressBar, ProgressStyle};

use crate::fit::{SleepProvider, SleepSession};
use crate::store::{RecordId, RecordStore, SessionLookup, StoreError, StoreSchema};
use crate::types::DedupKey;

pub use self::error::SyncError;
pub use self::report::{FailureKind, SessionOutcome, SkipReason, SyncFailure, SyncReport};
pub use self::window::{SyncWindow, DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};

/// Sessions shorter than 5.5 hours are treated as naps and not stored.
pub const MIN_SLEEP_DURATION_MS: i64 = 19_800_000;

/// Knobs for a single run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub window_days: u32,
    /// Zero disables the filter.
    pub min_duration: Duration,
    pub dedup_key: DedupKey,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
            min_duration: Duration::milliseconds(MIN_SLEEP_DURATION_MS),
            dedup_key: DedupKey::default(),
            dry_run: false,
            no_progress_bar: false,
        }
    }
}

/// Create a progress bar over the fetched sessions.
///
/// Hidden when `--no-progress-bar` was passed or stdout is not a TTY.
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("valid template")
            .progress_chars("=> "),
    );
    pb
}

/// Sync the trailing window once.
///
/// Returns `Err` only when the window cannot be built or the session list
/// cannot be fetched. Per-session failures end up in
/// [`SyncReport::failures`].
pub async fn run_sync(
    provider: &dyn SleepProvider,
    store: &dyn RecordStore,
    schema: &StoreSchema,
    options: &SyncOptions,
    now: DateTime<Utc>,
) -> Result<SyncReport, SyncError> {
    let window = SyncWindow::trailing(now, options.window_days)?;
    tracing::info!(
        "Fetching sleep sessions from {} to {}",
        window.start_iso(),
        window.end_iso()
    );

    let sessions = provider.list_sessions(&window).await?;
    let mut report = SyncReport::new(window);

    if sessions.is_empty() {
        tracing::info!("No sleep sessions in window");
        return Ok(report);
    }
    tracing::info!("Found {} sleep sessions", sessions.len());

    let pipeline = SessionPipeline {
        provider,
        store,
        schema,
        lookup: SessionLookup::new(store, schema, options.dedup_key),
        options,
        pb: create_progress_bar(options.no_progress_bar, sessions.len() as u64),
    };

    for session in &sessions {
        let outcome = pipeline.process(session, &mut report.failures).await;
        if let SessionOutcome::Persisted {
            stage_fetch_failed: true,
            ..
        } = outcome
        {
            tracing::debug!(start = %session.start_iso(), "Session stored without stages");
        }
        report.record(&outcome);
        pipeline.pb.inc(1);
    }
    pipeline.pb.finish_and_clear();

    Ok(report)
}

/// Borrowed collaborators shared by every session in a run.
struct SessionPipeline<'a> {
    provider: &'a dyn SleepProvider,
    store: &'a dyn RecordStore,
    schema: &'a StoreSchema,
    lookup: SessionLookup<'a>,
    options: &'a SyncOptions,
    pb: ProgressBar,
}

impl SessionPipeline<'_> {
    async fn process(
        &self,
        session: &SleepSession,
        failures: &mut Vec<SyncFailure>,
    ) -> SessionOutcome {
        let start_iso = session.start_iso();
        self.pb
            .suspend(|| tracing::info!("Sleep record: {}", session.start.format("%d/%m/%Y")));
        self.pb.set_message(start_iso.clone());

        match self.lookup.is_novel(session).await {
            Ok(true) => {}
            Ok(false) => {
                self.pb.suspend(|| {
                    tracing::info!("  already stored, skipping session starting {}", start_iso)
                });
                return SessionOutcome::Skipped(SkipReason::Duplicate);
            }
            Err(e) => {
                self.fail(failures, FailureKind::Lookup, &start_iso, &e);
                return SessionOutcome::Failed;
            }
        }

        let min = self.options.min_duration;
        if min > Duration::zero() && session.duration() < min {
            self.pb.suspend(|| {
                tracing::info!(
                    "  {} min is shorter than the {} min minimum, skipping",
                    session.duration().num_minutes(),
                    min.num_minutes()
                )
            });
            return SessionOutcome::Skipped(SkipReason::TooShort);
        }

        let session_id = if self.options.dry_run {
            self.pb.suspend(|| {
                tracing::info!(
                    "[DRY RUN] Would create session {} to {}",
                    start_iso,
                    session.end_iso()
                )
            });
            None
        } else {
            let fields = self.schema.session_fields(session);
            match self
                .store
                .create_record(&self.schema.sessions.table, &fields)
                .await
            {
                Ok(id) => {
                    self.pb
                        .suspend(|| tracing::debug!(record_id = %id, "Created session record"));
                    Some(id)
                }
                Err(e) => {
                    self.fail(failures, FailureKind::SessionCreate, &start_iso, &e);
                    return SessionOutcome::Failed;
                }
            }
        };

        let points = match self.provider.fetch_stages(session.start, session.end).await {
            Ok(points) => points,
            Err(e) => {
                self.pb.suspend(|| {
                    tracing::error!("Failed to fetch sleep stages for {}: {}", start_iso, e)
                });
                failures.push(SyncFailure {
                    kind: FailureKind::StageFetch,
                    session_start: start_iso,
                    message: e.to_string(),
                    retry_after_secs: None,
                });
                return SessionOutcome::Persisted {
                    stages: 0,
                    stage_fetch_failed: true,
                };
            }
        };

        let Some(session_id) = session_id else {
            self.pb.suspend(|| {
                tracing::info!("[DRY RUN] Would create {} sleep stages", points.len())
            });
            return SessionOutcome::Persisted {
                stages: points.len(),
                stage_fetch_failed: false,
            };
        };

        let stages = self
            .write_stages(&points, &session_id, &start_iso, failures)
            .await;
        self.pb.suspend(|| {
            tracing::info!("  stored session with {}/{} stages", stages, points.len())
        });

        SessionOutcome::Persisted {
            stages,
            stage_fetch_failed: false,
        }
    }

    /// One write per stage, awaited in order. A failed write is recorded and
    /// the remaining stages are still attempted.
    async fn write_stages(
        &self,
        points: &[crate::fit::StagePoint],
        session_id: &RecordId,
        start_iso: &str,
        failures: &mut Vec<SyncFailure>,
    ) -> usize {
        let mut created = 0;
        for point in points {
            let fields = self.schema.stage_fields(point, session_id);
            match self
                .store
                .create_record(&self.schema.stages.table, &fields)
                .await
            {
                Ok(id) => {
                    created += 1;
                    self.pb.suspend(|| {
                        tracing::debug!(
                            record_id = %id,
                            stage = point.kind().map_or("unknown", |k| k.as_str()),
                            "Created stage record"
                        )
                    });
                }
                Err(e) => self.fail(failures, FailureKind::StageCreate, start_iso, &e),
            }
        }
        created
    }

    fn fail(
        &self,
        failures: &mut Vec<SyncFailure>,
        kind: FailureKind,
        start_iso: &str,
        err: &StoreError,
    ) {
        let failure = SyncFailure::from_store(kind, start_iso, err);
        self.pb.suspend(|| match failure.retry_after_secs {
            Some(secs) => tracing::warn!(
                retry_after_secs = secs,
                "Rate limited during {} for session {}; retry in {}s",
                kind,
                start_iso,
                secs
            ),
            None if err.is_retryable() => {
                tracing::warn!("{} failed for session {}: {}", kind, start_iso, err)
            }
            None => tracing::error!("{} failed for session {}: {}", kind, start_iso, err),
        });
        failures.push(failure);
    }
}
