//! Local SQLite state.
//!
//! Keeps a log of sync runs for `status`, and doubles as a
//! [`RecordStore`](crate::store::RecordStore) when records are kept
//! locally instead of in Airtable.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{SqliteStateDb, StateDb};
pub use error::StateError;
pub use types::SyncRunStats;
