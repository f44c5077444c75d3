//! sleepsync: pulls sleep sessions and their stages from Google Fit and
//! stores them in Airtable (or a local SQLite store).
//!
//! Each run covers a trailing window of days. Sessions already in the store
//! are skipped, naps below the minimum duration are dropped, and every
//! stored stage links back to its session record. Runs are batch pulls,
//! optionally repeated with `--watch-with-interval`.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod fit;
mod shutdown;
mod state;
mod store;
mod sync;
mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use auth::{AuthError, EnvFileCredentialStore, OAuthClient};
use cli::Command;
use config::{OAuthConfig, StoreConfig, SyncConfig};
use state::{SqliteStateDb, StateDb, SyncRunStats};
use store::{AirtableStore, RecordStore};
use sync::SyncReport;

fn http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("sleepsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

fn oauth_client(http: reqwest::Client, oauth: &OAuthConfig) -> OAuthClient {
    OAuthClient::new(
        http,
        &oauth.client_id,
        &oauth.client_secret,
        &oauth.redirect_uri,
    )
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Run the status command.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let db_path = config::expand_tilde(&args.state_db);

    if !db_path.exists() {
        println!("No state database found at {}", db_path.display());
        println!("Run a sync first to create the database.");
        return Ok(());
    }

    let db = SqliteStateDb::open(&db_path).await?;
    let summary = db.get_summary().await?;

    println!("State Database: {}", db_path.display());
    println!();
    if !summary.records_by_table.is_empty() {
        println!("Local records:");
        for (table, count) in &summary.records_by_table {
            println!("  {:<20} {}", table, count);
        }
        println!();
    }

    println!("Sync runs: {}", summary.total_runs);
    if let Some(started) = &summary.last_sync_started {
        println!(
            "Last sync started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_sync_completed {
        println!(
            "Last sync completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    let runs = db.recent_runs(args.runs).await?;
    if !runs.is_empty() {
        println!();
        println!("Recent runs:");
        for run in runs {
            let s = &run.stats;
            let state = match (run.completed_at, s.aborted, s.dry_run) {
                (None, _, _) => "incomplete",
                (Some(_), true, _) => "aborted",
                (Some(_), false, true) => "dry run",
                (Some(_), false, false) => "ok",
            };
            println!(
                "  #{:<4} {}  {:<10} seen {:>2}, created {:>2}, skipped {:>2}, stages {:>3}, failures {}",
                run.id,
                run.started_at.format("%Y-%m-%d %H:%M"),
                state,
                s.sessions_seen,
                s.sessions_created,
                s.sessions_skipped,
                s.stages_created,
                s.failures
            );
        }
    }

    Ok(())
}

/// Print the consent URL for the installed-app flow.
fn run_auth_url(args: cli::OAuthArgs) -> anyhow::Result<()> {
    let oauth = oauth_client(http_client()?, &OAuthConfig::from(args));
    let url = oauth.authorization_url()?;
    println!("Open this URL in a browser and grant access:");
    println!();
    println!("  {}", url);
    println!();
    println!("Then run `sleepsync authorize <code>` with the `code` parameter from the redirect.");
    Ok(())
}

/// Exchange an authorization code and persist the refresh token.
async fn run_authorize(args: cli::AuthorizeArgs) -> anyhow::Result<()> {
    let oauth = oauth_client(http_client()?, &OAuthConfig::from(args.oauth));
    let credentials =
        EnvFileCredentialStore::new(config::expand_tilde(&args.credentials.credentials_file));
    oauth
        .exchange_code(args.code.trim(), &credentials)
        .await
        .context("Authorization code exchange failed")?;
    println!(
        "Refresh token saved to {}",
        credentials.path().display()
    );
    Ok(())
}

fn log_summary(report: &SyncReport, dry_run: bool, elapsed: Duration) {
    if dry_run {
        tracing::info!("── Dry Run Summary ──");
        tracing::info!(
            "  {} sessions would be created with {} stages",
            report.sessions_created,
            report.stages_created
        );
    } else {
        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} sessions created, {} stages created",
            report.sessions_created,
            report.stages_created
        );
    }
    tracing::info!(
        "  {} seen, {} already stored, {} too short",
        report.sessions_seen,
        report.skipped_duplicate,
        report.skipped_too_short
    );
    if !report.is_clean() {
        tracing::warn!("  {} failures:", report.failures.len());
        for failure in &report.failures {
            tracing::warn!("    {}", failure);
        }
    }
    tracing::info!("  elapsed: {}", format_duration(elapsed));
}

/// Auth errors that a later watch cycle may recover from.
fn is_transient(err: &AuthError) -> bool {
    match err {
        AuthError::Http(_) => true,
        AuthError::TokenEndpoint { status, .. } => *status >= 500,
        _ => false,
    }
}

/// Sleep until the next watch cycle. Returns `false` when shutdown was
/// requested instead.
async fn wait_for_next_run(interval: u64, shutdown_token: &CancellationToken) -> bool {
    if shutdown_token.is_cancelled() {
        tracing::info!("Shutdown requested, exiting...");
        return false;
    }
    tracing::info!("Waiting {} seconds...", interval);
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(interval)) => true,
        _ = shutdown_token.cancelled() => {
            tracing::info!("Shutdown during wait, exiting...");
            false
        }
    }
}

/// One sync run, recorded in the run log.
async fn run_once(
    config: &SyncConfig,
    http: &reqwest::Client,
    access_token: auth::AccessToken,
    store: &dyn RecordStore,
    state_db: &dyn StateDb,
) -> anyhow::Result<SyncReport> {
    let provider = fit::FitClient::new(http.clone(), access_token);
    let run_id = state_db.start_sync_run().await?;
    let started = Instant::now();

    match sync::run_sync(&provider, store, &config.schema, &config.options, Utc::now()).await {
        Ok(report) => {
            let stats = SyncRunStats::from_report(&report, config.options.dry_run);
            if let Err(e) = state_db.complete_sync_run(run_id, &stats).await {
                tracing::warn!("Failed to record sync run: {}", e);
            }
            log_summary(&report, config.options.dry_run, started.elapsed());
            Ok(report)
        }
        Err(e) => {
            let stats = SyncRunStats::aborted(config.options.dry_run);
            if let Err(db_err) = state_db.complete_sync_run(run_id, &stats).await {
                tracing::warn!("Failed to record sync run: {}", db_err);
            }
            Err(e).context("Sync run aborted")
        }
    }
}

/// Run the sync command, once or in watch mode.
async fn run_sync_command(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = SyncConfig::from_args(args)?;
    tracing::debug!(?config, "Resolved configuration");

    let http = http_client()?;
    let oauth = oauth_client(http.clone(), &config.oauth);
    let credentials = EnvFileCredentialStore::new(&config.credentials_file);

    let db = Arc::new(SqliteStateDb::open(&config.state_db).await?);
    tracing::debug!("State database opened at {}", config.state_db.display());

    let store: Arc<dyn RecordStore> = match &config.store {
        StoreConfig::Airtable { api_key, base_id } => {
            Arc::new(AirtableStore::new(http.clone(), base_id, api_key)?) as Arc<dyn RecordStore>
        }
        StoreConfig::Sqlite => db.clone() as Arc<dyn RecordStore>,
    };
    tracing::info!(
        store = ?config.store,
        window_days = config.options.window_days,
        dedup_key = config.options.dedup_key.as_str(),
        dry_run = config.options.dry_run,
        "Starting sleepsync"
    );

    let shutdown_token = match config.watch_with_interval {
        Some(_) => shutdown::install_signal_handler()?,
        None => CancellationToken::new(),
    };

    loop {
        let refreshed = oauth.refresh_access_token(&credentials).await;

        let result = match refreshed {
            Ok(token) => run_once(&config, &http, token, &*store, &*db).await,
            Err(e) if config.watch_with_interval.is_some() && is_transient(&e) => {
                Err(anyhow::Error::new(e).context("Token refresh failed"))
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context("Google authorization failed"));
            }
        };

        match result {
            Ok(report) if config.fail_on_partial && !report.is_clean() => {
                anyhow::bail!(
                    "{} failures during sync (--fail-on-partial)",
                    report.failures.len()
                );
            }
            Ok(_) => {}
            Err(e) if config.watch_with_interval.is_some() => {
                tracing::error!("Sync run failed: {:#}", e);
            }
            Err(e) => return Err(e),
        }

        match config.watch_with_interval {
            Some(interval) => {
                if !wait_for_next_run(interval, &shutdown_token).await {
                    break;
                }
            }
            None => break,
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Sync(args) => run_sync_command(args).await,
        Command::Status(args) => run_status(args).await,
        Command::AuthUrl(args) => run_auth_url(args),
        Command::Authorize(args) => run_authorize(args).await,
    }
}
