//! Typed mapping from logical sleep fields to store table and field names.
//!
//! Airtable bases are usually addressed by opaque ids (`tbl...`, `fld...`);
//! the pipeline never sees those directly.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{FieldMap, RecordId, RecordQuery};
use crate::fit::{SleepSession, StagePoint};
use crate::types::DedupKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTable {
    pub table: String,
    pub start: String,
    pub end: String,
    /// Source application field; the source is not written when unset.
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTable {
    pub table: String,
    pub start: String,
    pub end: String,
    pub value: String,
    /// Linked-record field pointing at the parent session.
    pub session_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub sessions: SessionTable,
    pub stages: StageTable,
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self {
            sessions: SessionTable {
                table: "Sleep Sessions".to_string(),
                start: "Start".to_string(),
                end: "End".to_string(),
                source: Some("Source".to_string()),
            },
            stages: StageTable {
                table: "Sleep Stages".to_string(),
                start: "Start".to_string(),
                end: "End".to_string(),
                value: "Stage".to_string(),
                session_link: "Session".to_string(),
            },
        }
    }
}

impl StoreSchema {
    /// Load a schema from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        let schema: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid schema file {}", path.display()))?;
        Ok(schema)
    }

    pub fn session_fields(&self, session: &SleepSession) -> FieldMap {
        let t = &self.sessions;
        let mut fields = FieldMap::new();
        fields.insert(t.start.clone(), Value::String(session.start_iso()));
        fields.insert(t.end.clone(), Value::String(session.end_iso()));
        if let (Some(field), Some(source)) = (&t.source, &session.source) {
            fields.insert(field.clone(), Value::String(source.clone()));
        }
        fields
    }

    pub fn stage_fields(&self, stage: &StagePoint, session_id: &RecordId) -> FieldMap {
        let t = &self.stages;
        let mut fields = FieldMap::new();
        fields.insert(t.start.clone(), Value::String(stage.start_iso()));
        fields.insert(t.end.clone(), Value::String(stage.end_iso()));
        fields.insert(t.value.clone(), json!(stage.value));
        fields.insert(t.session_link.clone(), json!([session_id.as_str()]));
        fields
    }

    /// Query matching stored sessions with the same identity key.
    pub fn session_lookup_query(&self, session: &SleepSession, key: DedupKey) -> RecordQuery {
        let t = &self.sessions;
        let query = RecordQuery::new().field_equals(&t.start, session.start_iso());
        let query = match key {
            DedupKey::Start => query,
            DedupKey::StartAndEnd => query.field_equals(&t.end, session.end_iso()),
        };
        query.sort_desc(&t.start)
    }
}
