use clap::{Args, Parser, Subcommand};

use crate::types::{DedupKey, LogLevel, StoreBackend};

/// Default location of the local state database (run log and SQLite store).
pub const DEFAULT_STATE_DB: &str = "~/.sleepsync/state.db";

#[derive(Parser, Debug)]
#[command(
    name = "sleepsync",
    version,
    about = "Sync Google Fit sleep sessions and stages into Airtable"
)]
pub struct Cli {
    /// Log level (RUST_LOG takes precedence when set)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pull sleep sessions from the trailing window and store new ones
    Sync(SyncArgs),

    /// Show recent sync runs and local record counts
    Status(StatusArgs),

    /// Print the Google consent URL to obtain a refresh token
    AuthUrl(OAuthArgs),

    /// Exchange the code from the consent redirect for a refresh token
    Authorize(AuthorizeArgs),
}

/// Google OAuth client settings.
#[derive(Args, Debug, Clone)]
pub struct OAuthArgs {
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: String,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: String,

    /// Redirect URI registered for the OAuth client
    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URI",
        default_value = "http://localhost:3000/refreshToken"
    )]
    pub google_redirect_uri: String,
}

/// Where the refresh token is persisted.
#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// dotenv-style file holding GOOGLE_REFRESH_TOKEN
    #[arg(long, env = "SLEEPSYNC_CREDENTIALS_FILE", default_value = ".env")]
    pub credentials_file: String,
}

/// Record store selection.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Record store backend
    #[arg(long, value_enum, default_value = "airtable")]
    pub store: StoreBackend,

    #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
    pub airtable_api_key: Option<String>,

    #[arg(long, env = "AIRTABLE_BASE_ID")]
    pub airtable_base_id: Option<String>,

    /// JSON file mapping sessions/stages to table and field names
    #[arg(long)]
    pub schema: Option<String>,

    /// SQLite database for the run log (and records with --store sqlite)
    #[arg(long, default_value = DEFAULT_STATE_DB)]
    pub state_db: String,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub oauth: OAuthArgs,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Number of trailing days to pull
    #[arg(long, default_value_t = crate::sync::DEFAULT_WINDOW_DAYS)]
    pub window_days: u32,

    /// Sessions shorter than this are not stored (0 disables the filter)
    #[arg(long, default_value_t = crate::sync::MIN_SLEEP_DURATION_MS)]
    pub min_duration_ms: i64,

    /// Session fields that identify an already-stored session
    #[arg(long, value_enum, default_value = "start-and-end")]
    pub dedup_key: DedupKey,

    /// Look up and fetch, but do not create any records
    #[arg(long)]
    pub dry_run: bool,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    /// Exit non-zero when any session or stage failed to sync
    #[arg(long)]
    pub fail_on_partial: bool,

    /// Run continuously, waiting N seconds between runs
    #[arg(long)]
    pub watch_with_interval: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = DEFAULT_STATE_DB)]
    pub state_db: String,

    /// Number of recent runs to list
    #[arg(long, default_value_t = 10)]
    pub runs: u32,
}

#[derive(Args, Debug, Clone)]
pub struct AuthorizeArgs {
    /// The `code` query parameter from the redirect
    pub code: String,

    #[command(flatten)]
    pub oauth: OAuthArgs,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}
