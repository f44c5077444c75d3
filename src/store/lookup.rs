use super::error::StoreError;
use super::schema::StoreSchema;
use super::RecordStore;
use crate::fit::SleepSession;
use crate::types::DedupKey;

/// Idempotency gate run before any session write.
pub struct SessionLookup<'a> {
    store: &'a dyn RecordStore,
    schema: &'a StoreSchema,
    key: DedupKey,
}

impl<'a> SessionLookup<'a> {
    pub fn new(store: &'a dyn RecordStore, schema: &'a StoreSchema, key: DedupKey) -> Self {
        Self { store, schema, key }
    }

    /// Returns `true` when no stored session shares this session's identity
    /// key, i.e. the session still needs to be written.
    ///
    /// Only the first page of matches is inspected.
    pub async fn is_novel(&self, session: &SleepSession) -> Result<bool, StoreError> {
        let query = self.schema.session_lookup_query(session, self.key);
        let matches = self
            .store
            .first_page(&self.schema.sessions.table, &query)
            .await?;

        match matches.first() {
            Some(existing) => {
                tracing::debug!(
                    record_id = %existing,
                    start = %session.start_iso(),
                    dedup_key = self.key.as_str(),
                    "Existing session record found"
                );
                Ok(false)
            }
            None => Ok(true),
        }
    }
}
