//! Test data builders
//!
//! Provides convenient builders for:
//! - Wire batches as the backend sends them
//! - Fixed instants for deterministic timestamp assertions

use crate::data::constants::DEFAULT_NAMESPACE_PREFIX;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Fixed reference instant (2024-05-01T10:00:00Z)
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
        .single()
        .unwrap_or_default()
}

/// `fixed_now()` shifted by `secs`
pub fn fixed_at(secs: i64) -> DateTime<Utc> {
    fixed_now() + chrono::Duration::seconds(secs)
}

/// Batch of namespaced topics with numeric-string samples
///
/// ```
/// use biogas_core::testing::sensor_batch;
///
/// let batch = sensor_batch(&[("ph", &[7.0, 7.1])]);
/// assert_eq!(batch["Biogestor/ph"][1], "7.1");
/// ```
pub fn sensor_batch(entries: &[(&str, &[f64])]) -> Value {
    let object: Map<String, Value> = entries
        .iter()
        .map(|(code, values)| {
            let samples = values.iter().map(|v| Value::String(v.to_string())).collect();
            (format!("{}{}", DEFAULT_NAMESPACE_PREFIX, code), Value::Array(samples))
        })
        .collect();
    Value::Object(object)
}

/// Batch with raw string samples, topics used verbatim
pub fn raw_batch(entries: &[(&str, &[&str])]) -> Value {
    let object: Map<String, Value> = entries
        .iter()
        .map(|(topic, values)| {
            let samples = values.iter().map(|v| Value::String(v.to_string())).collect();
            (topic.to_string(), Value::Array(samples))
        })
        .collect();
    Value::Object(object)
}

/// Serialized form of a batch, as a text frame
pub fn batch_frame(batch: &Value) -> String {
    batch.to_string()
}
