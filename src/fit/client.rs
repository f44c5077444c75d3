use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde_json::json;

use super::error::ProviderError;
use super::responses::{AggregateResponse, SessionListResponse};
use super::types::{SleepSession, StagePoint};
use super::SleepProvider;
use crate::auth::AccessToken;
use crate::sync::SyncWindow;

pub const FITNESS_API_ROOT: &str = "https://www.googleapis.com/fitness/v1/users/me";

/// Google Fit activity type for sleep.
pub const SLEEP_ACTIVITY_TYPE: u32 = 72;

pub const SLEEP_SEGMENT_DATA_TYPE: &str = "com.google.sleep.segment";

/// Google Fit REST client bound to a single bearer token.
pub struct FitClient {
    client: Client,
    api_root: String,
    access_token: AccessToken,
}

impl FitClient {
    pub fn new(client: Client, access_token: AccessToken) -> Self {
        Self::with_api_root(client, access_token, FITNESS_API_ROOT)
    }

    pub fn with_api_root(client: Client, access_token: AccessToken, api_root: &str) -> Self {
        Self {
            client,
            api_root: api_root.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/sessions", self.api_root)
    }

    fn aggregate_url(&self) -> String {
        format!("{}/dataset:aggregate", self.api_root)
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ProviderError::Unauthorized);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

fn aggregate_body(start: &DateTime<Utc>, end: &DateTime<Utc>) -> serde_json::Value {
    json!({
        "aggregateBy": [{ "dataTypeName": SLEEP_SEGMENT_DATA_TYPE }],
        "startTimeMillis": start.timestamp_millis(),
        "endTimeMillis": end.timestamp_millis(),
    })
}

#[async_trait::async_trait]
impl SleepProvider for FitClient {
    async fn list_sessions(&self, window: &SyncWindow) -> Result<Vec<SleepSession>, ProviderError> {
        let activity_type = SLEEP_ACTIVITY_TYPE.to_string();
        let response = self
            .client
            .get(self.sessions_url())
            .bearer_auth(self.access_token.secret())
            .query(&[
                ("startTime", window.start_iso()),
                ("endTime", window.end_iso()),
                ("activityType", activity_type),
            ])
            .send()
            .await?;
        let body: SessionListResponse = check_status(response).await?.json().await?;
        tracing::debug!(count = body.session.len(), "Provider returned sleep sessions");
        for session in &body.session {
            if let Some(other) = session
                .activity_type
                .filter(|t| *t != i64::from(SLEEP_ACTIVITY_TYPE))
            {
                tracing::debug!(id = ?session.id, activity_type = other, "Unexpected activity type in sleep query");
            }
        }

        Ok(sessions_from_response(&body))
    }

    async fn fetch_stages(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StagePoint>, ProviderError> {
        let response = self
            .client
            .post(self.aggregate_url())
            .bearer_auth(self.access_token.secret())
            .json(&aggregate_body(&start, &end))
            .send()
            .await?;
        let body: AggregateResponse = check_status(response).await?.json().await?;

        Ok(stages_from_response(&body))
    }
}

/// Convert listed sessions, dropping any the provider sent with unusable
/// timestamps so the rest of the window still syncs.
fn sessions_from_response(body: &SessionListResponse) -> Vec<SleepSession> {
    body.session
        .iter()
        .filter_map(|raw| match SleepSession::from_response(raw) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(id = ?raw.id, "Skipping sleep session: {}", e);
                None
            }
        })
        .collect()
}

fn stages_from_response(body: &AggregateResponse) -> Vec<StagePoint> {
    body.bucket
        .iter()
        .flat_map(|bucket| bucket.dataset.iter())
        .flat_map(|dataset| dataset.point.iter())
        .filter_map(|point| match StagePoint::from_response(point) {
            Ok(stage) => Some(stage),
            Err(e) => {
                tracing::warn!(
                    start_nanos = point.start_time_nanos,
                    "Skipping sleep stage: {}",
                    e
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_body_uses_session_bounds() {
        let start = DateTime::from_timestamp_millis(1_709_330_100_000).unwrap();
        let end = DateTime::from_timestamp_millis(1_709_357_400_000).unwrap();
        let body = aggregate_body(&start, &end);
        assert_eq!(body["startTimeMillis"], 1_709_330_100_000i64);
        assert_eq!(body["endTimeMillis"], 1_709_357_400_000i64);
        assert_eq!(
            body["aggregateBy"][0]["dataTypeName"],
            "com.google.sleep.segment"
        );
    }

    #[test]
    fn test_urls_trim_trailing_slash() {
        let client = FitClient::with_api_root(
            Client::new(),
            AccessToken::new("token"),
            "http://localhost:9000/fitness/v1/users/me/",
        );
        assert_eq!(
            client.sessions_url(),
            "http://localhost:9000/fitness/v1/users/me/sessions"
        );
        assert_eq!(
            client.aggregate_url(),
            "http://localhost:9000/fitness/v1/users/me/dataset:aggregate"
        );
    }

    #[test]
    fn test_out_of_range_session_skipped() {
        let body: SessionListResponse = serde_json::from_str(
            r#"{"session": [
                {"startTimeMillis": "9223372036854775807", "endTimeMillis": "9223372036854775807"},
                {"startTimeMillis": "1709330100000", "endTimeMillis": "1709357400000",
                 "application": {"packageName": "com.urbandroid.sleep"}}
            ]}"#,
        )
        .unwrap();
        let sessions = sessions_from_response(&body);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].start.timestamp_millis(), 1_709_330_100_000);
    }

    #[test]
    fn test_stage_point_without_value_skipped() {
        let body: AggregateResponse = serde_json::from_str(
            r#"{"bucket": [{"dataset": [{"point": [
                {"startTimeNanos": "1709330100000000000", "endTimeNanos": "1709331000000000000",
                 "value": [{"intVal": 4}]},
                {"startTimeNanos": "1709331000000000000", "endTimeNanos": "1709332000000000000",
                 "value": [{"fpVal": 1.0}]},
                {"startTimeNanos": "1709332000000000000", "endTimeNanos": "1709333000000000000",
                 "value": [{"intVal": 5}]}
            ]}]}]}"#,
        )
        .unwrap();
        let stages = stages_from_response(&body);
        assert_eq!(
            stages.iter().map(|s| s.value).collect::<Vec<_>>(),
            vec![4, 5]
        );
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_http_error() {
        let client = FitClient::with_api_root(
            Client::new(),
            AccessToken::new("token"),
            "http://127.0.0.1:1",
        );
        let start = DateTime::from_timestamp_millis(0).unwrap();
        let end = DateTime::from_timestamp_millis(1).unwrap();
        let err = client.fetch_stages(start, end).await.unwrap_err();
        assert!(matches!(err, ProviderError::Http(_)));
    }
}
