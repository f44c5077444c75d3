use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::fit::to_iso;

/// Default number of trailing days covered by one run.
pub const DEFAULT_WINDOW_DAYS: u32 = 3;

/// Upper bound for `--window-days`.
pub const MAX_WINDOW_DAYS: u32 = 3650;

#[derive(Debug, Error)]
#[error("A {days}-day window before {now} reaches past the supported date range")]
pub struct WindowOutOfRange {
    pub days: u32,
    pub now: DateTime<Utc>,
}

/// Time range `[now - N days, now]` queried from the provider.
///
/// Recomputed on every run and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    pub fn trailing(now: DateTime<Utc>, days: u32) -> Result<Self, WindowOutOfRange> {
        let start = Duration::try_days(i64::from(days))
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or(WindowOutOfRange { days, now })?;
        Ok(Self { start, end: now })
    }

    pub fn start_iso(&self) -> String {
        to_iso(&self.start)
    }

    pub fn end_iso(&self) -> String {
        to_iso(&self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_window() {
        let now = DateTime::from_timestamp_millis(1_709_400_000_000).unwrap();
        let window = SyncWindow::trailing(now, 3).unwrap();
        assert_eq!(window.end, now);
        assert_eq!((window.end - window.start).num_days(), 3);
        assert_eq!(window.end_iso(), "2024-03-02T17:20:00.000Z");
        assert_eq!(window.start_iso(), "2024-02-28T17:20:00.000Z");
    }

    #[test]
    fn test_zero_day_window_is_empty() {
        let now = DateTime::from_timestamp_millis(1_709_400_000_000).unwrap();
        let window = SyncWindow::trailing(now, 0).unwrap();
        assert_eq!(window.start, window.end);
    }

    #[test]
    fn test_window_past_date_range_is_error() {
        let now = DateTime::from_timestamp_millis(1_709_400_000_000).unwrap();
        let err = SyncWindow::trailing(now, 200_000_000).unwrap_err();
        assert_eq!(err.days, 200_000_000);
        assert!(SyncWindow::trailing(now, u32::MAX).is_err());
        assert!(SyncWindow::trailing(now, MAX_WINDOW_DAYS).is_ok());
    }
}
