//! Sensor time-series aggregation
//!
//! - `types`: raw payloads, per-sensor readings and the store
//! - `batch`: topic demultiplexing and sample parsing
//! - `aggregator`: bounded rolling buffers with synthesized timestamps
//! - `window`: display time ranges over a snapshot
//! - `sensor_feed`: transport + aggregator with published snapshots

pub mod aggregator;
pub mod batch;
pub mod constants;
pub mod sensor_feed;
pub mod types;
pub mod window;

pub use aggregator::{AggregatorConfig, BatchOutcome, SensorAggregator, SensorUpdate};
pub use batch::{parse_sample, parse_samples, strip_namespace, SensorBatch};
pub use sensor_feed::{SensorFeed, SensorFeedConfig, SensorFeedHandle};
pub use types::{iso_timestamp, RawMessage, ReadingStats, Sample, SensorDataStore, SensorReading};
pub use window::{ParseTimeRangeError, TimeRange};
