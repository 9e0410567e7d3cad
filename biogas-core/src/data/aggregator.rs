//! Rolling per-sensor aggregation of inbound batches
//!
//! For every entry of a batch:
//!
//! 1. strip the namespace prefix from the topic to get the sensor code
//! 2. skip the entry unless its value is an array
//! 3. parse each element, silently dropping non-numeric noise
//! 4. skip the sensor if nothing survived
//! 5. stamp the N survivors `now-(N-1)s, …, now` at 1-second cadence
//! 6. append to the sensor's reading, then trim the front to `max_data_points`
//!
//! Entries are applied one after another; a later entry mapping to the same
//! sensor code sees the earlier one's samples.

use super::batch::{parse_samples, strip_namespace, SensorBatch};
use super::constants::{DEFAULT_MAX_DATA_POINTS, DEFAULT_NAMESPACE_PREFIX, SAMPLE_CADENCE};
use super::types::{RawMessage, Sample, SensorDataStore};
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// Configuration for the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Cap per sensor buffer (must be at least 1)
    pub max_data_points: usize,
    /// Topic prefixes removed to obtain the sensor code
    pub namespace_prefixes: Vec<String>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_data_points: DEFAULT_MAX_DATA_POINTS,
            namespace_prefixes: vec![DEFAULT_NAMESPACE_PREFIX.to_string()],
        }
    }
}

impl AggregatorConfig {
    pub fn with_max_data_points(max_data_points: usize) -> Self {
        Self {
            max_data_points,
            ..Default::default()
        }
    }
}

/// Parse result of one batch entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorUpdate {
    pub sensor_code: String,
    /// Samples appended
    pub accepted: usize,
    /// Elements that failed to parse
    pub rejected: usize,
}

/// What one message did to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Every array entry, in application order (including fully rejected ones)
    pub entries: Vec<SensorUpdate>,
    /// Samples appended
    pub accepted: usize,
    /// Elements that failed to parse
    pub rejected: usize,
    /// Entries whose value was not an array
    pub skipped_entries: usize,
}

impl BatchOutcome {
    /// True if the store changed
    pub fn changed(&self) -> bool {
        self.accepted > 0
    }

    /// Codes of sensors that received samples
    pub fn updated(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .iter()
            .filter(|entry| entry.accepted > 0)
            .map(|entry| entry.sensor_code.as_str())
    }
}

/// Owner of the sensor store
#[derive(Debug, Clone)]
pub struct SensorAggregator {
    config: AggregatorConfig,
    store: SensorDataStore,
    batches_applied: u64,
}

impl SensorAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config: AggregatorConfig {
                // Zero would keep every reading permanently empty
                max_data_points: config.max_data_points.max(1),
                ..config
            },
            store: SensorDataStore::new(),
            batches_applied: 0,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn store(&self) -> &SensorDataStore {
        &self.store
    }

    /// Owned copy of the current store
    pub fn snapshot(&self) -> SensorDataStore {
        self.store.clone()
    }

    /// Messages that changed the store
    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Apply a decoded message received now
    pub fn handle_message(&mut self, message: &RawMessage) -> BatchOutcome {
        self.handle_message_at(message, Utc::now())
    }

    /// Apply a decoded message received at `now`
    pub fn handle_message_at(&mut self, message: &RawMessage, now: DateTime<Utc>) -> BatchOutcome {
        let value = match message {
            RawMessage::Structured(value) => value,
            RawMessage::Text(text) => {
                debug!(len = text.len(), "Ignoring unstructured frame");
                return BatchOutcome::default();
            }
        };

        match SensorBatch::from_value(value) {
            Some(batch) => self.apply_batch_at(batch, now),
            None => {
                debug!("Ignoring structured frame that is not a sensor batch");
                BatchOutcome::default()
            }
        }
    }

    /// Apply one batch received at `now`
    pub fn apply_batch_at(&mut self, batch: SensorBatch<'_>, now: DateTime<Utc>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (topic, values) in batch.entries() {
            let sensor_code = strip_namespace(topic, &self.config.namespace_prefixes);

            let Some((parsed, rejected)) = parse_samples(values) else {
                trace!(topic, "Skipping entry without a value list");
                outcome.skipped_entries += 1;
                continue;
            };
            let count = parsed.len();
            outcome.rejected += rejected;
            outcome.entries.push(SensorUpdate {
                sensor_code: sensor_code.to_string(),
                accepted: count,
                rejected,
            });

            if count == 0 {
                continue;
            }

            let samples = parsed.into_iter().enumerate().map(|(i, value)| Sample {
                value,
                at: synthesized_timestamp(now, count - 1 - i),
            });

            self.store
                .reading_mut(sensor_code)
                .append_bounded(samples, self.config.max_data_points);

            outcome.accepted += count;
        }

        if outcome.changed() {
            self.batches_applied += 1;
        }
        outcome
    }
}

impl Default for SensorAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}

/// `now - steps_back * cadence`
fn synthesized_timestamp(now: DateTime<Utc>, steps_back: usize) -> DateTime<Utc> {
    let cadence_ms = SAMPLE_CADENCE.as_millis() as i64;
    now - chrono::Duration::milliseconds(cadence_ms.saturating_mul(steps_back as i64))
}
