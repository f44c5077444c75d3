//! Record store abstraction.
//!
//! The sync pipeline talks to the store through [`RecordStore`]: one
//! record created per call, queries limited to the first page of results.
//! Field and table names are opaque strings supplied by [`StoreSchema`].

pub mod airtable;
pub mod error;
pub mod lookup;
pub mod schema;

use std::fmt;

use serde_json::{Map, Value};

pub use self::airtable::AirtableStore;
pub use self::error::StoreError;
pub use self::lookup::SessionLookup;
pub use self::schema::StoreSchema;

/// Flat field-name-to-value mapping for one record.
pub type FieldMap = Map<String, Value>;

/// Identifier assigned by the store to a created record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exact-match query over string fields, optionally sorted descending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub equals: Vec<(String, String)>,
    pub sort_desc_by: Option<String>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_equals(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort_desc_by = Some(field.into());
        self
    }
}

/// Append-only record store.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Create one record and return the identifier the store assigned.
    async fn create_record(&self, table: &str, fields: &FieldMap) -> Result<RecordId, StoreError>;

    /// Identifiers of the first page of records matching `query`.
    async fn first_page(
        &self,
        table: &str,
        query: &RecordQuery,
    ) -> Result<Vec<RecordId>, StoreError>;
}
