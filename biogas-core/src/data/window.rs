//! Time-range windows over a snapshot

use super::types::SensorDataStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Display window selectable by chart consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "5min")]
    FiveMinutes,
    #[default]
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "1hr")]
    OneHour,
}

impl TimeRange {
    pub const ALL: [TimeRange; 3] = [
        TimeRange::FiveMinutes,
        TimeRange::FifteenMinutes,
        TimeRange::OneHour,
    ];

    pub fn duration(self) -> Duration {
        match self {
            TimeRange::FiveMinutes => Duration::from_secs(5 * 60),
            TimeRange::FifteenMinutes => Duration::from_secs(15 * 60),
            TimeRange::OneHour => Duration::from_secs(60 * 60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::FiveMinutes => "5min",
            TimeRange::FifteenMinutes => "15min",
            TimeRange::OneHour => "1hr",
        }
    }

    /// Oldest timestamp inside the window ending at `now`
    pub fn cutoff(self, now: DateTime<Utc>) -> DateTime<Utc> {
        // The longest range is an hour, always representable
        now - chrono::Duration::seconds(self.duration().as_secs() as i64)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised time range name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time range '{0}', expected 5min, 15min or 1hr")]
pub struct ParseTimeRangeError(String);

impl FromStr for TimeRange {
    type Err = ParseTimeRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeRange::ALL
            .into_iter()
            .find(|range| range.as_str() == s)
            .ok_or_else(|| ParseTimeRangeError(s.to_string()))
    }
}

impl SensorDataStore {
    /// Restrict every reading to `range` ending at `now`
    ///
    /// A reading with no sample inside the window is kept whole.
    pub fn windowed(&self, range: TimeRange, now: DateTime<Utc>) -> SensorDataStore {
        let cutoff = range.cutoff(now);
        let mut windowed = SensorDataStore::new();
        for (code, reading) in self.iter() {
            *windowed.reading_mut(code) = reading.since(cutoff);
        }
        windowed
    }
}
