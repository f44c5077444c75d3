use chrono::{DateTime, Duration, SecondsFormat, Utc};

use super::error::ProviderError;
use super::responses::{DataPoint, SessionResponse};

/// Format an instant the way the record store expects it:
/// UTC, millisecond precision, `Z` suffix (`2024-03-01T22:15:00.000Z`).
pub fn to_iso(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn instant_from_millis(millis: i64) -> Result<DateTime<Utc>, ProviderError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| ProviderError::Decode(format!("timestamp out of range: {millis} ms")))
}

/// A contiguous sleep period reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SleepSession {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Application that recorded the session (e.g. `com.urbandroid.sleep`).
    pub source: Option<String>,
}

impl SleepSession {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn start_iso(&self) -> String {
        to_iso(&self.start)
    }

    pub fn end_iso(&self) -> String {
        to_iso(&self.end)
    }

    pub fn from_response(resp: &SessionResponse) -> Result<Self, ProviderError> {
        let source = resp
            .application
            .as_ref()
            .and_then(|app| app.package_name.clone().or_else(|| app.name.clone()))
            .filter(|s| !s.is_empty());
        Ok(Self {
            start: instant_from_millis(resp.start_time_millis)?,
            end: instant_from_millis(resp.end_time_millis)?,
            source,
        })
    }
}

/// Provider sleep segment codes (`com.google.sleep.segment`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepStageKind {
    Awake,
    Sleep,
    OutOfBed,
    Light,
    Deep,
    Rem,
}

impl SleepStageKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Awake),
            2 => Some(Self::Sleep),
            3 => Some(Self::OutOfBed),
            4 => Some(Self::Light),
            5 => Some(Self::Deep),
            6 => Some(Self::Rem),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awake => "awake",
            Self::Sleep => "sleep",
            Self::OutOfBed => "out-of-bed",
            Self::Light => "light",
            Self::Deep => "deep",
            Self::Rem => "rem",
        }
    }
}

/// One classified sub-interval of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePoint {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Raw provider code; unknown codes are kept as-is.
    pub value: i64,
}

impl StagePoint {
    pub fn kind(&self) -> Option<SleepStageKind> {
        SleepStageKind::from_code(self.value)
    }

    pub fn start_iso(&self) -> String {
        to_iso(&self.start)
    }

    pub fn end_iso(&self) -> String {
        to_iso(&self.end)
    }

    pub fn from_response(point: &DataPoint) -> Result<Self, ProviderError> {
        let value = point
            .value
            .first()
            .and_then(|v| v.int_val)
            .ok_or_else(|| ProviderError::Decode("sleep segment point without intVal".into()))?;
        Ok(Self {
            start: DateTime::from_timestamp_nanos(point.start_time_nanos),
            end: DateTime::from_timestamp_nanos(point.end_time_nanos),
            value,
        })
    }
}
