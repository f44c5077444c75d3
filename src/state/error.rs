use std::path::PathBuf;

use thiserror::Error;

/// Failures of the local SQLite file: the run log and, with
/// `--store sqlite`, the session and stage records themselves.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Cannot open state database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Cannot create state directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("State schema upgrade failed: {0}")]
    Migration(#[from] rusqlite::Error),

    #[error("State query failed: {0}")]
    Query(String),

    /// A local record's field map did not survive the JSON round trip
    /// through the `fields` column.
    #[error("Fields of local record {record_id} cannot be stored or read back: {source}")]
    RecordFields {
        record_id: String,
        source: serde_json::Error,
    },

    #[error("State database connection is poisoned")]
    Poisoned,

    #[error("State database task failed: {0}")]
    Spawn(#[from] tokio::task::JoinError),

    #[error("State database is at schema version {found}; this sleepsync understands up to {supported}")]
    UnsupportedSchemaVersion { found: i32, supported: i32 },
}

impl StateError {
    pub fn query(source: rusqlite::Error) -> Self {
        Self::Query(source.to_string())
    }

    pub fn record_fields(record_id: &str, source: serde_json::Error) -> Self {
        Self::RecordFields {
            record_id: record_id.to_string(),
            source,
        }
    }
}
