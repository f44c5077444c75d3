//! Refresh-token persistence.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::error::AuthError;

/// Variable name under which the refresh token is kept in the env file.
pub const REFRESH_TOKEN_KEY: &str = "GOOGLE_REFRESH_TOKEN";

/// Where the long-lived refresh token lives between runs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>, AuthError>;

    async fn save(&self, refresh_token: &str) -> Result<(), AuthError>;
}

/// dotenv-style file holding `GOOGLE_REFRESH_TOKEN=...` next to other
/// settings. Saving rewrites only that line.
#[derive(Debug, Clone)]
pub struct EnvFileCredentialStore {
    path: PathBuf,
    key: String,
}

impl EnvFileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: REFRESH_TOKEN_KEY.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Value of `key` in dotenv text. Accepts `export KEY=...` and quoted values.
fn find_value(contents: &str, key: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let rest = strip_key(line, key)?;
        let value = rest.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        Some(value.to_string()).filter(|v| !v.is_empty())
    })
}

/// The text after `KEY=` when `line` assigns `key`.
fn strip_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line);
    line.strip_prefix(key)?.trim_start().strip_prefix('=')
}

/// Replace the first assignment of `key`, or append one. Other lines are
/// kept as they are.
fn upsert(contents: &str, key: &str, value: &str) -> String {
    let assignment = format!("{key}={value}");
    let mut replaced = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            if !replaced && strip_key(line, key).is_some() {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(assignment);
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[async_trait]
impl CredentialStore for EnvFileCredentialStore {
    async fn load(&self) -> Result<Option<String>, AuthError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(find_value(&contents, &self.key)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Credential file {} does not exist", self.path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, refresh_token: &str) -> Result<(), AuthError> {
        let existing = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        fs::write(&self.path, upsert(&existing, &self.key, refresh_token)).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms)?;
        }
        tracing::debug!("Saved refresh token to {}", self.path.display());
        Ok(())
    }
}
