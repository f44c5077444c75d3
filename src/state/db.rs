//! State database trait and SQLite implementation.
//!
//! The same database file holds the sync run log and, when the SQLite
//! backend is selected, the session and stage records themselves.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use super::error::StateError;
use super::schema;
use super::types::{StateSummary, SyncRunRecord, SyncRunStats};
use crate::store::{FieldMap, RecordId, RecordQuery, RecordStore, StoreError};

/// Page size of [`RecordStore::first_page`] for the local store.
const PAGE_SIZE: i64 = 100;

/// Run log operations.
///
/// Object-safe so the CLI can hold an `Arc<dyn StateDb>`.
#[async_trait]
pub trait StateDb: Send + Sync {
    /// Start a new sync run and return its ID.
    async fn start_sync_run(&self) -> Result<i64, StateError>;

    /// Complete a sync run with statistics.
    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError>;

    /// Most recent runs, newest first.
    async fn recent_runs(&self, limit: u32) -> Result<Vec<SyncRunRecord>, StateError>;

    /// Get a summary of the database state.
    async fn get_summary(&self) -> Result<StateSummary, StateError>;
}

/// SQLite implementation of the state database.
pub struct SqliteStateDb {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    /// Path to the database file (for error messages).
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn timestamp_to_utc(ts: Option<i64>) -> Option<DateTime<Utc>> {
    ts.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

/// JSON path addressing a top-level key, e.g. `$."Start"`.
fn json_path(field: &str) -> Result<String, StoreError> {
    if field.contains('"') {
        return Err(StoreError::Config(format!(
            "field name {field:?} cannot contain double quotes in the local store"
        )));
    }
    Ok(format!("$.\"{field}\""))
}

fn row_to_run_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRunRecord> {
    let started_at: i64 = row.get(1)?;
    Ok(SyncRunRecord {
        id: row.get(0)?,
        started_at: timestamp_to_utc(Some(started_at)).unwrap_or_default(),
        completed_at: timestamp_to_utc(row.get(2)?),
        stats: SyncRunStats {
            window_start: timestamp_to_utc(row.get(3)?),
            window_end: timestamp_to_utc(row.get(4)?),
            sessions_seen: row.get::<_, Option<i64>>(5)?.unwrap_or(0) as u64,
            sessions_created: row.get::<_, Option<i64>>(6)?.unwrap_or(0) as u64,
            sessions_skipped: row.get::<_, Option<i64>>(7)?.unwrap_or(0) as u64,
            stages_created: row.get::<_, Option<i64>>(8)?.unwrap_or(0) as u64,
            failures: row.get::<_, Option<i64>>(9)?.unwrap_or(0) as u64,
            aborted: row.get::<_, Option<i64>>(10)?.unwrap_or(0) != 0,
            dry_run: row.get::<_, Option<i64>>(11)?.unwrap_or(0) != 0,
        },
    })
}

impl SqliteStateDb {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|source| StateError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn.lock().map_err(|_| StateError::Poisoned)
    }

    #[cfg(test)]
    fn get_record(&self, id: &RecordId) -> Result<Option<FieldMap>, StateError> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT fields FROM records WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StateError::query)?;

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StateError::record_fields(id.as_str(), e))
        })
        .transpose()
    }
}

#[async_trait]
impl StateDb for SqliteStateDb {
    async fn start_sync_run(&self) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO sync_runs (started_at) VALUES (?1)",
            [started_at],
        )
        .map_err(StateError::query)?;

        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();
        let conn = self.lock()?;

        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, window_start = ?2, window_end = ?3, \
             sessions_seen = ?4, sessions_created = ?5, sessions_skipped = ?6, \
             stages_created = ?7, failures = ?8, aborted = ?9, dry_run = ?10 WHERE id = ?11",
            rusqlite::params![
                completed_at,
                stats.window_start.map(|dt| dt.timestamp()),
                stats.window_end.map(|dt| dt.timestamp()),
                stats.sessions_seen as i64,
                stats.sessions_created as i64,
                stats.sessions_skipped as i64,
                stats.stages_created as i64,
                stats.failures as i64,
                stats.aborted as i64,
                stats.dry_run as i64,
                run_id,
            ],
        )
        .map_err(StateError::query)?;

        Ok(())
    }

    async fn recent_runs(&self, limit: u32) -> Result<Vec<SyncRunRecord>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, started_at, completed_at, window_start, window_end, sessions_seen, \
                 sessions_created, sessions_skipped, stages_created, failures, aborted, dry_run \
                 FROM sync_runs ORDER BY id DESC LIMIT ?1",
            )
            .map_err(StateError::query)?;

        let runs = stmt
            .query_map([limit as i64], row_to_run_record)
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        Ok(runs)
    }

    async fn get_summary(&self) -> Result<StateSummary, StateError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT table_name, COUNT(*) FROM records GROUP BY table_name ORDER BY table_name",
            )
            .map_err(StateError::query)?;
        let records_by_table = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        let total_runs: u64 = conn
            .query_row("SELECT COUNT(*) FROM sync_runs", [], |row| {
                row.get::<_, i64>(0)
            })
            .map_err(StateError::query)? as u64;

        let last_sync: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(
                "SELECT started_at, completed_at FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StateError::query)?;

        let (last_sync_started, last_sync_completed) = match last_sync {
            Some((started, completed)) => (timestamp_to_utc(started), timestamp_to_utc(completed)),
            None => (None, None),
        };

        Ok(StateSummary {
            records_by_table,
            total_runs,
            last_sync_started,
            last_sync_completed,
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStateDb {
    async fn create_record(&self, table: &str, fields: &FieldMap) -> Result<RecordId, StoreError> {
        let id = format!("rec{}", Uuid::new_v4().simple());
        let encoded =
            serde_json::to_string(fields).map_err(|e| StateError::record_fields(&id, e))?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO records (id, table_name, fields, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, table, encoded, Utc::now().timestamp()],
        )
        .map_err(StateError::query)?;

        Ok(RecordId::new(id))
    }

    async fn first_page(
        &self,
        table: &str,
        query: &RecordQuery,
    ) -> Result<Vec<RecordId>, StoreError> {
        let mut sql = String::from("SELECT id FROM records WHERE table_name = ?");
        let mut params: Vec<String> = vec![table.to_string()];
        for (field, value) in &query.equals {
            sql.push_str(" AND json_extract(fields, ?) = ?");
            params.push(json_path(field)?);
            params.push(value.clone());
        }
        match &query.sort_desc_by {
            Some(field) => {
                sql.push_str(" ORDER BY json_extract(fields, ?) DESC, created_at DESC");
                params.push(json_path(field)?);
            }
            None => sql.push_str(" ORDER BY created_at DESC"),
        }
        sql.push_str(&format!(" LIMIT {PAGE_SIZE}"));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(StateError::query)?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, String>(0)
            })
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        Ok(ids.into_iter().map(RecordId::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, serde_json::Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_and_get_record() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        let id = db
            .create_record("Sleep Sessions", &fields(&[("Start", json!("a"))]))
            .await
            .unwrap();
        assert!(id.as_str().starts_with("rec"));
        let stored = db.get_record(&id).unwrap().unwrap();
        assert_eq!(stored["Start"], "a");
        assert!(db.get_record(&RecordId::new("recMissing")).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_fields_reported() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        db.lock()
            .unwrap()
            .execute(
                "INSERT INTO records (id, table_name, fields, created_at) VALUES ('recBad', 's', '{oops', 0)",
                [],
            )
            .unwrap();

        let err = db.get_record(&RecordId::new("recBad")).unwrap_err();
        match err {
            StateError::RecordFields { record_id, .. } => assert_eq!(record_id, "recBad"),
            other => panic!("expected RecordFields, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_record_ids_unique() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        let a = db.create_record("t", &FieldMap::new()).await.unwrap();
        let b = db.create_record("t", &FieldMap::new()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_first_page_filters_by_table_and_fields() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        let wanted = db
            .create_record("s", &fields(&[("Start", json!("a")), ("End", json!("b"))]))
            .await
            .unwrap();
        db.create_record("s", &fields(&[("Start", json!("a")), ("End", json!("c"))]))
            .await
            .unwrap();
        db.create_record("other", &fields(&[("Start", json!("a")), ("End", json!("b"))]))
            .await
            .unwrap();

        let q = RecordQuery::new()
            .field_equals("Start", "a")
            .field_equals("End", "b")
            .sort_desc("Start");
        assert_eq!(db.first_page("s", &q).await.unwrap(), vec![wanted]);

        let q = RecordQuery::new().field_equals("Start", "a");
        assert_eq!(db.first_page("s", &q).await.unwrap().len(), 2);

        let q = RecordQuery::new().field_equals("Start", "z");
        assert!(db.first_page("s", &q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_page_field_names_with_spaces() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        db.create_record("s", &fields(&[("Sleep Start", json!("a"))]))
            .await
            .unwrap();
        let q = RecordQuery::new().field_equals("Sleep Start", "a");
        assert_eq!(db.first_page("s", &q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_first_page_sorted_descending() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        let early = db
            .create_record("s", &fields(&[("Start", json!("2024-01-01")), ("Tag", json!("x"))]))
            .await
            .unwrap();
        let late = db
            .create_record("s", &fields(&[("Start", json!("2024-02-01")), ("Tag", json!("x"))]))
            .await
            .unwrap();
        let q = RecordQuery::new().field_equals("Tag", "x").sort_desc("Start");
        assert_eq!(db.first_page("s", &q).await.unwrap(), vec![late, early]);
    }

    #[tokio::test]
    async fn test_first_page_rejects_quoted_field() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        let q = RecordQuery::new().field_equals("bad\"field", "a");
        assert!(matches!(
            db.first_page("s", &q).await,
            Err(StoreError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_run_lifecycle() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        let run_id = db.start_sync_run().await.unwrap();

        let stats = SyncRunStats {
            sessions_seen: 3,
            sessions_created: 1,
            sessions_skipped: 2,
            stages_created: 17,
            ..SyncRunStats::default()
        };
        db.complete_sync_run(run_id, &stats).await.unwrap();

        let runs = db.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, run_id);
        assert!(runs[0].completed_at.is_some());
        assert_eq!(runs[0].stats.stages_created, 17);
        assert_eq!(runs[0].stats.sessions_skipped, 2);
    }

    #[tokio::test]
    async fn test_recent_runs_newest_first_and_limited() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        let first = db.start_sync_run().await.unwrap();
        let second = db.start_sync_run().await.unwrap();
        let third = db.start_sync_run().await.unwrap();

        let runs = db.recent_runs(2).await.unwrap();
        let ids: Vec<i64> = runs.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![third, second]);
        assert!(runs[0].completed_at.is_none());
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_summary() {
        let db = SqliteStateDb::open_in_memory().unwrap();
        let empty = db.get_summary().await.unwrap();
        assert!(empty.records_by_table.is_empty());
        assert_eq!(empty.total_runs, 0);
        assert!(empty.last_sync_started.is_none());

        db.create_record("Sleep Stages", &FieldMap::new()).await.unwrap();
        db.create_record("Sleep Stages", &FieldMap::new()).await.unwrap();
        db.create_record("Sleep Sessions", &FieldMap::new()).await.unwrap();
        let run_id = db.start_sync_run().await.unwrap();
        db.complete_sync_run(run_id, &SyncRunStats::default())
            .await
            .unwrap();

        let summary = db.get_summary().await.unwrap();
        assert_eq!(
            summary.records_by_table,
            vec![
                ("Sleep Sessions".to_string(), 1),
                ("Sleep Stages".to_string(), 2)
            ]
        );
        assert_eq!(summary.total_runs, 1);
        assert!(summary.last_sync_started.is_some());
        assert!(summary.last_sync_completed.is_some());
    }

    #[tokio::test]
    async fn test_open_on_disk_creates_parent() {
        let dir = std::env::temp_dir().join(format!("sleepsync-state-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("state.db");
        let db = SqliteStateDb::open(&path).await.unwrap();
        db.start_sync_run().await.unwrap();
        assert!(path.exists());
        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
