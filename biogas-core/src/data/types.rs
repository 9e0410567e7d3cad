//! Raw payloads, per-sensor rolling readings and the sensor store

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

// ============================================================================
// Raw inbound payload
// ============================================================================

/// Payload of one inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum RawMessage {
    /// Frame decoded as JSON
    Structured(serde_json::Value),
    /// Frame that is not JSON, passed through verbatim
    Text(String),
}

impl RawMessage {
    /// Decode a text frame; never fails, falls back to raw text
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => RawMessage::Structured(value),
            Err(_) => RawMessage::Text(text.to_string()),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, RawMessage::Structured(_))
    }

    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            RawMessage::Structured(value) => Some(value),
            RawMessage::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawMessage::Text(text) => Some(text),
            RawMessage::Structured(_) => None,
        }
    }
}

// ============================================================================
// Per-sensor rolling buffer
// ============================================================================

/// One value with its synthesized timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub at: DateTime<Utc>,
}

/// Summary of a reading's retained window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingStats {
    pub latest: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Rolling time-series of one sensor
///
/// Values and timestamps are stored as pairs, so they can never drift out
/// of alignment. Serializes as `{sensorCode, values, timestamps}` with
/// ISO-8601 millisecond timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    sensor_code: String,
    samples: VecDeque<Sample>,
}

impl SensorReading {
    pub fn new(sensor_code: impl Into<String>) -> Self {
        Self {
            sensor_code: sensor_code.into(),
            samples: VecDeque::new(),
        }
    }

    pub fn sensor_code(&self) -> &str {
        &self.sensor_code
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples oldest first
    pub fn samples(&self) -> impl ExactSizeIterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    /// Values oldest first
    pub fn values(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.samples.iter().map(|s| s.value)
    }

    /// Timestamps oldest first, index-aligned with [`values`](Self::values)
    pub fn timestamps(&self) -> impl ExactSizeIterator<Item = DateTime<Utc>> + '_ {
        self.samples.iter().map(|s| s.at)
    }

    /// Timestamps rendered as ISO-8601 (`2024-05-01T10:00:00.000Z`)
    pub fn iso_timestamps(&self) -> Vec<String> {
        self.timestamps().map(iso_timestamp).collect()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn stats(&self) -> Option<ReadingStats> {
        let latest = self.latest()?.value;
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for value in self.values() {
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }
        let count = self.len();
        Some(ReadingStats {
            latest,
            min,
            max,
            mean: sum / count as f64,
            count,
        })
    }

    /// Append in order, then drop from the front down to `max_len`
    pub(crate) fn append_bounded<I>(&mut self, samples: I, max_len: usize)
    where
        I: IntoIterator<Item = Sample>,
    {
        self.samples.extend(samples);
        let excess = self.samples.len().saturating_sub(max_len);
        self.samples.drain(..excess);
    }

    /// Samples from the first one at or after `cutoff`
    ///
    /// Returns the whole reading when nothing falls inside the window, so a
    /// stalled sensor still shows its last known data.
    pub fn since(&self, cutoff: DateTime<Utc>) -> SensorReading {
        match self.samples.iter().position(|s| s.at >= cutoff) {
            Some(start) => SensorReading {
                sensor_code: self.sensor_code.clone(),
                samples: self.samples.iter().skip(start).copied().collect(),
            },
            None => self.clone(),
        }
    }
}

impl Serialize for SensorReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let values: Vec<f64> = self.values().collect();
        let mut state = serializer.serialize_struct("SensorReading", 3)?;
        state.serialize_field("sensorCode", &self.sensor_code)?;
        state.serialize_field("values", &values)?;
        state.serialize_field("timestamps", &self.iso_timestamps())?;
        state.end()
    }
}

/// ISO-8601 UTC with millisecond precision
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Store
// ============================================================================

/// Sensor code → rolling reading
///
/// Iterates in sorted code order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SensorDataStore {
    readings: BTreeMap<String, SensorReading>,
}

impl SensorDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sensor_code: &str) -> Option<&SensorReading> {
        self.readings.get(sensor_code)
    }

    pub fn contains(&self, sensor_code: &str) -> bool {
        self.readings.contains_key(sensor_code)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> + '_ {
        self.readings.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SensorReading)> + '_ {
        self.readings.iter().map(|(code, reading)| (code.as_str(), reading))
    }

    /// Total samples retained across all sensors
    pub fn total_samples(&self) -> usize {
        self.readings.values().map(SensorReading::len).sum()
    }

    pub(crate) fn reading_mut(&mut self, sensor_code: &str) -> &mut SensorReading {
        self.readings
            .entry(sensor_code.to_string())
            .or_insert_with(|| SensorReading::new(sensor_code))
    }
}

impl<'a> IntoIterator for &'a SensorDataStore {
    type Item = (&'a String, &'a SensorReading);
    type IntoIter = std::collections::btree_map::Iter<'a, String, SensorReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}
