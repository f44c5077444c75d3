//! Wire shapes of the Google Fit REST API.
//!
//! Google encodes int64 fields as JSON strings, but some proxies and older
//! responses emit plain numbers, so both forms are accepted.

use serde::{Deserialize, Deserializer};

/// Response from `GET /users/me/sessions`.
#[derive(Debug, Deserialize)]
pub struct SessionListResponse {
    #[serde(default)]
    pub session: Vec<SessionResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(deserialize_with = "int64")]
    pub start_time_millis: i64,
    #[serde(deserialize_with = "int64")]
    pub end_time_millis: i64,
    #[serde(default)]
    pub activity_type: Option<i64>,
    #[serde(default)]
    pub application: Option<Application>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub package_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Response from `POST /users/me/dataset:aggregate`.
#[derive(Debug, Deserialize)]
pub struct AggregateResponse {
    #[serde(default)]
    pub bucket: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
pub struct Bucket {
    #[serde(default)]
    pub dataset: Vec<Dataset>,
}

#[derive(Debug, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub point: Vec<DataPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(deserialize_with = "int64")]
    pub start_time_nanos: i64,
    #[serde(deserialize_with = "int64")]
    pub end_time_nanos: i64,
    #[serde(default)]
    pub value: Vec<PointValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointValue {
    #[serde(default)]
    pub int_val: Option<i64>,
}

fn int64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_list_response() {
        let json = r#"{
            "session": [
                {
                    "id": "1709330100000",
                    "name": "Sleep",
                    "startTimeMillis": "1709330100000",
                    "endTimeMillis": "1709357400000",
                    "modifiedTimeMillis": "1709357500000",
                    "application": {"packageName": "com.urbandroid.sleep"},
                    "activityType": 72
                }
            ]
        }"#;
        let resp: SessionListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.session.len(), 1);
        let s = &resp.session[0];
        assert_eq!(s.start_time_millis, 1_709_330_100_000);
        assert_eq!(s.end_time_millis, 1_709_357_400_000);
        assert_eq!(s.activity_type, Some(72));
        assert_eq!(
            s.application.as_ref().unwrap().package_name.as_deref(),
            Some("com.urbandroid.sleep")
        );
    }

    #[test]
    fn test_session_list_empty() {
        let resp: SessionListResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.session.is_empty());
    }

    #[test]
    fn test_numeric_millis_accepted() {
        let json = r#"{"startTimeMillis": 1000, "endTimeMillis": 2000}"#;
        let s: SessionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(s.start_time_millis, 1000);
        assert!(s.application.is_none());
    }

    #[test]
    fn test_bad_millis_rejected() {
        let json = r#"{"startTimeMillis": "soon", "endTimeMillis": "2000"}"#;
        assert!(serde_json::from_str::<SessionResponse>(json).is_err());
    }

    #[test]
    fn test_aggregate_response() {
        let json = r#"{
            "bucket": [{
                "startTimeMillis": "1709330100000",
                "endTimeMillis": "1709357400000",
                "dataset": [{
                    "dataSourceId": "derived:com.google.sleep.segment:com.google.android.gms:merged",
                    "point": [
                        {
                            "startTimeNanos": "1709330100000000000",
                            "endTimeNanos": "1709331000000000000",
                            "dataTypeName": "com.google.sleep.segment",
                            "value": [{"intVal": 4, "mapVal": []}]
                        },
                        {
                            "startTimeNanos": "1709331000000000000",
                            "endTimeNanos": "1709332800000000000",
                            "dataTypeName": "com.google.sleep.segment",
                            "value": [{"intVal": 5, "mapVal": []}]
                        }
                    ]
                }]
            }]
        }"#;
        let resp: AggregateResponse = serde_json::from_str(json).unwrap();
        let points = &resp.bucket[0].dataset[0].point;
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].start_time_nanos, 1_709_330_100_000_000_000);
        assert_eq!(points[1].value[0].int_val, Some(5));
    }

    #[test]
    fn test_aggregate_response_no_buckets() {
        let resp: AggregateResponse = serde_json::from_str(r#"{"bucket": []}"#).unwrap();
        assert!(resp.bucket.is_empty());
    }
}
