use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::error::StoreError;
use super::{FieldMap, RecordId, RecordQuery, RecordStore};

pub const AIRTABLE_API_ROOT: &str = "https://api.airtable.com/v0";

/// Airtable returns at most this many records per page.
const PAGE_SIZE: u32 = 100;

/// Headers that may carry a rate-limit backoff hint, in priority order.
const RETRY_AFTER_HEADERS: &[&str] = &["retry-after", "x-airtable-api-limits-retry-after-seconds"];

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<CreatedRecord>,
    #[serde(default)]
    offset: Option<String>,
}

/// Airtable REST backend.
pub struct AirtableStore {
    client: Client,
    api_root: Url,
    base_id: String,
    api_key: String,
}

impl std::fmt::Debug for AirtableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableStore")
            .field("api_root", &self.api_root.as_str())
            .field("base_id", &self.base_id)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl AirtableStore {
    pub fn new(client: Client, base_id: &str, api_key: &str) -> Result<Self, StoreError> {
        Self::with_api_root(client, AIRTABLE_API_ROOT, base_id, api_key)
    }

    pub fn with_api_root(
        client: Client,
        api_root: &str,
        base_id: &str,
        api_key: &str,
    ) -> Result<Self, StoreError> {
        let api_root = Url::parse(api_root)
            .map_err(|e| StoreError::Config(format!("invalid API root '{api_root}': {e}")))?;
        if api_root.cannot_be_a_base() {
            return Err(StoreError::Config(format!(
                "API root '{api_root}' cannot be a base URL"
            )));
        }
        Ok(Self {
            client,
            api_root,
            base_id: base_id.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// `{root}/{base}/{table}` with the table name percent-encoded.
    fn table_url(&self, table: &str) -> Url {
        let mut url = self.api_root.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.base_id).push(table);
        }
        url
    }
}

/// Escape a value for use inside a single-quoted formula string literal.
fn escape_formula_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Render an exact-match query as an Airtable `filterByFormula`.
pub(crate) fn filter_formula(query: &RecordQuery) -> Option<String> {
    let conditions: Vec<String> = query
        .equals
        .iter()
        .map(|(field, value)| format!("{{{}}} = '{}'", field, escape_formula_value(value)))
        .collect();
    match conditions.len() {
        0 => None,
        1 => conditions.into_iter().next(),
        _ => Some(format!("AND({})", conditions.join(", "))),
    }
}

fn list_params(query: &RecordQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("pageSize", PAGE_SIZE.to_string())];
    if let Some(formula) = filter_formula(query) {
        params.push(("filterByFormula", formula));
    }
    if let Some(field) = &query.sort_desc_by {
        params.push(("sort[0][field]", field.clone()));
        params.push(("sort[0][direction]", "desc".to_string()));
    }
    params
}

/// Extract the suggested wait (whole seconds) from a 429 response.
pub(crate) fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    RETRY_AFTER_HEADERS.iter().find_map(|name| {
        let raw = headers.get(*name)?.to_str().ok()?.trim();
        raw.parse::<u64>()
            .ok()
            .or_else(|| raw.parse::<f64>().ok().filter(|s| *s >= 0.0).map(|s| s.ceil() as u64))
    })
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = retry_after_secs(response.headers());
        tracing::debug!(?retry_after_secs, "Airtable responded 429");
        return Err(StoreError::RateLimited { retry_after_secs });
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

#[async_trait::async_trait]
impl RecordStore for AirtableStore {
    async fn create_record(&self, table: &str, fields: &FieldMap) -> Result<RecordId, StoreError> {
        let response = self
            .client
            .post(self.table_url(table))
            .bearer_auth(&self.api_key)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        let created: CreatedRecord = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
        if created.id.is_empty() {
            return Err(StoreError::MalformedResponse(
                "created record has no id".to_string(),
            ));
        }
        Ok(RecordId::new(created.id))
    }

    async fn first_page(
        &self,
        table: &str,
        query: &RecordQuery,
    ) -> Result<Vec<RecordId>, StoreError> {
        let response = self
            .client
            .get(self.table_url(table))
            .bearer_auth(&self.api_key)
            .query(&list_params(query))
            .send()
            .await?;
        let page: ListResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::MalformedResponse(e.to_string()))?;
        if page.offset.is_some() {
            tracing::debug!(table, "More matching records exist beyond the first page");
        }
        Ok(page.records.into_iter().map(|r| RecordId::new(r.id)).collect())
    }
}
