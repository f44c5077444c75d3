use std::path::PathBuf;

use anyhow::Context;

use crate::cli::{OAuthArgs, SyncArgs};
use crate::store::StoreSchema;
use crate::sync::{SyncOptions, MAX_WINDOW_DAYS};
use crate::types::StoreBackend;

/// Google OAuth client settings, shared by `sync`, `auth-url` and `authorize`.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl From<OAuthArgs> for OAuthConfig {
    fn from(args: OAuthArgs) -> Self {
        Self {
            client_id: args.google_client_id,
            client_secret: args.google_client_secret,
            redirect_uri: args.google_redirect_uri,
        }
    }
}

/// Resolved record store backend.
#[derive(Clone)]
pub enum StoreConfig {
    Airtable { api_key: String, base_id: String },
    Sqlite,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::Airtable { base_id, .. } => f
                .debug_struct("Airtable")
                .field("api_key", &"<redacted>")
                .field("base_id", base_id)
                .finish(),
            StoreConfig::Sqlite => f.write_str("Sqlite"),
        }
    }
}

/// Validated configuration for the `sync` command.
#[derive(Debug)]
pub struct SyncConfig {
    pub oauth: OAuthConfig,
    pub credentials_file: PathBuf,
    pub state_db: PathBuf,
    pub store: StoreConfig,
    pub schema: StoreSchema,
    pub options: SyncOptions,
    pub watch_with_interval: Option<u64>,
    pub fail_on_partial: bool,
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Treat empty strings from the environment as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl SyncConfig {
    pub fn from_args(args: SyncArgs) -> anyhow::Result<Self> {
        let store = match args.store.store {
            StoreBackend::Airtable => {
                let api_key = non_empty(args.store.airtable_api_key).context(
                    "--store airtable requires an API key (--airtable-api-key or AIRTABLE_API_KEY)",
                )?;
                let base_id = non_empty(args.store.airtable_base_id).context(
                    "--store airtable requires a base id (--airtable-base-id or AIRTABLE_BASE_ID)",
                )?;
                StoreConfig::Airtable { api_key, base_id }
            }
            StoreBackend::Sqlite => StoreConfig::Sqlite,
        };

        let schema = match args.store.schema.as_deref() {
            Some(path) => StoreSchema::load(&expand_tilde(path))?,
            None => StoreSchema::default(),
        };

        if args.window_days == 0 {
            anyhow::bail!("--window-days must be at least 1");
        }
        if args.window_days > MAX_WINDOW_DAYS {
            anyhow::bail!("--window-days cannot exceed {}", MAX_WINDOW_DAYS);
        }
        if args.min_duration_ms < 0 {
            anyhow::bail!("--min-duration-ms cannot be negative");
        }
        if args.watch_with_interval == Some(0) {
            anyhow::bail!("--watch-with-interval must be greater than 0");
        }

        Ok(Self {
            oauth: args.oauth.into(),
            credentials_file: expand_tilde(&args.credentials.credentials_file),
            state_db: expand_tilde(&args.store.state_db),
            store,
            schema,
            options: SyncOptions {
                window_days: args.window_days,
                min_duration: chrono::Duration::milliseconds(args.min_duration_ms),
                dedup_key: args.dedup_key,
                dry_run: args.dry_run,
                no_progress_bar: args.no_progress_bar,
            },
            watch_with_interval: args.watch_with_interval,
            fail_on_partial: args.fail_on_partial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn sync_args(extra: &[&str]) -> SyncArgs {
        let base = [
            "sleepsync",
            "sync",
            "--google-client-id",
            "cid",
            "--google-client-secret",
            "csecret",
        ];
        let cli = Cli::try_parse_from(base.iter().chain(extra.iter()).copied()).unwrap();
        match cli.command {
            Command::Sync(args) => args,
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/.sleepsync/state.db");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join(".sleepsync/state.db"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(expand_tilde("/abs/.env"), PathBuf::from("/abs/.env"));
        assert_eq!(expand_tilde(".env"), PathBuf::from(".env"));
    }

    #[test]
    fn test_airtable_requires_key_and_base() {
        let mut args = sync_args(&[]);
        args.store.airtable_api_key = None;
        args.store.airtable_base_id = Some("app123".into());
        let err = SyncConfig::from_args(args).unwrap_err();
        assert!(err.to_string().contains("API key"));

        let mut args = sync_args(&[]);
        args.store.airtable_api_key = Some("pat".into());
        args.store.airtable_base_id = Some("  ".into());
        let err = SyncConfig::from_args(args).unwrap_err();
        assert!(err.to_string().contains("base id"));
    }

    #[test]
    fn test_airtable_config_resolved() {
        let mut args = sync_args(&[]);
        args.store.airtable_api_key = Some("patSECRET".into());
        args.store.airtable_base_id = Some("app123".into());
        let cfg = SyncConfig::from_args(args).unwrap();
        assert!(matches!(cfg.store, StoreConfig::Airtable { ref base_id, .. } if base_id == "app123"));
        assert_eq!(cfg.options.min_duration.num_milliseconds(), 19_800_000);

        let debug = format!("{cfg:?}");
        assert!(!debug.contains("patSECRET"));
        assert!(!debug.contains("csecret"));
    }

    #[test]
    fn test_sqlite_needs_no_airtable_settings() {
        let mut args = sync_args(&["--store", "sqlite", "--dry-run"]);
        args.store.airtable_api_key = None;
        args.store.airtable_base_id = None;
        let cfg = SyncConfig::from_args(args).unwrap();
        assert!(matches!(cfg.store, StoreConfig::Sqlite));
        assert!(cfg.options.dry_run);
    }

    #[test]
    fn test_rejects_zero_watch_interval_and_window() {
        let args = sync_args(&["--store", "sqlite", "--watch-with-interval", "0"]);
        assert!(SyncConfig::from_args(args).is_err());

        let args = sync_args(&["--store", "sqlite", "--window-days", "0"]);
        assert!(SyncConfig::from_args(args).is_err());
    }

    #[test]
    fn test_window_days_upper_bound() {
        let args = sync_args(&["--store", "sqlite", "--window-days", "4294967295"]);
        let err = SyncConfig::from_args(args).unwrap_err();
        assert!(err.to_string().contains("--window-days"));

        let args = sync_args(&["--store", "sqlite", "--window-days", "3650"]);
        assert_eq!(SyncConfig::from_args(args).unwrap().options.window_days, 3650);
    }

    #[test]
    fn test_schema_file_loaded() {
        let dir = std::env::temp_dir().join("sleepsync_config_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("schema.json");
        let schema = StoreSchema {
            sessions: crate::store::schema::SessionTable {
                table: "tblSessions".into(),
                ..StoreSchema::default().sessions
            },
            ..StoreSchema::default()
        };
        std::fs::write(&path, serde_json::to_string(&schema).unwrap()).unwrap();

        let path_str = path.to_string_lossy().into_owned();
        let args = sync_args(&["--store", "sqlite", "--schema", &path_str]);
        let cfg = SyncConfig::from_args(args).unwrap();
        assert_eq!(cfg.schema.sessions.table, "tblSessions");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_schema_file_is_error() {
        let args = sync_args(&["--store", "sqlite", "--schema", "/nonexistent/schema.json"]);
        assert!(SyncConfig::from_args(args).is_err());
    }
}
