//! Feed-wide constants

use std::time::Duration;

/// Namespace token the backend prepends to every sensor topic
pub const DEFAULT_NAMESPACE_PREFIX: &str = "Biogestor/";

/// Default rolling window per sensor
pub const DEFAULT_MAX_DATA_POINTS: usize = 50;

/// Spacing between synthesized timestamps within one batch
///
/// The wire format carries no per-sample time; samples are assumed to be
/// one second apart, ending at the moment the batch arrived.
pub const SAMPLE_CADENCE: Duration = Duration::from_secs(1);

/// Path of the sensor stream on the backend
pub const DEFAULT_STREAM_PATH: &str = "/ws/dataSensor/";
