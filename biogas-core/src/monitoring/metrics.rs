//! Prometheus metrics for feed monitoring
//!
//! Provides metrics for:
//! - Connection lifecycle (attempts, opens, closes, errors, retries)
//! - Inbound traffic (frames, unstructured frames, dropped sends)
//! - Sensor data (batches, accepted/rejected samples, latest values)

use crate::core::ConnectionStatus;
use prometheus::{IntCounter, IntCounterVec, IntGauge, GaugeVec, Opts, Registry};
use std::sync::Arc;
use tracing::info;

const NAMESPACE: &str = "biogas";

/// Central registry for all Prometheus metrics
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    feed: Arc<FeedMetrics>,
    sensors: Arc<SensorMetrics>,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all metric families
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let feed = Arc::new(FeedMetrics::new(&registry)?);
        let sensors = Arc::new(SensorMetrics::new(&registry)?);

        info!("Prometheus metrics registry initialized");

        Ok(Self {
            registry,
            feed,
            sensors,
        })
    }

    /// Get the underlying Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Get feed (transport) metrics
    pub fn feed(&self) -> &FeedMetrics {
        &self.feed
    }

    /// Shared handle to the feed metrics, for the driver task
    pub fn feed_handle(&self) -> Arc<FeedMetrics> {
        Arc::clone(&self.feed)
    }

    /// Get sensor metrics
    pub fn sensors(&self) -> &SensorMetrics {
        &self.sensors
    }

    /// Shared handle to the sensor metrics, for the aggregating observer
    pub fn sensors_handle(&self) -> Arc<SensorMetrics> {
        Arc::clone(&self.sensors)
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let metric = IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let metric = IntGauge::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

/// Transport metrics
pub struct FeedMetrics {
    /// Links requested (initial, automatic and manual)
    pub connect_attempts_total: IntCounter,
    /// Links that reported open
    pub opens_total: IntCounter,
    /// Unexpected link closes
    pub closes_total: IntCounter,
    /// Link errors, including refused opens
    pub errors_total: IntCounter,
    /// Automatic retries scheduled
    pub retries_scheduled_total: IntCounter,
    /// Closes that found the retry budget spent
    pub retry_exhaustions_total: IntCounter,
    /// Inbound frames from the live link
    pub frames_total: IntCounter,
    /// Inbound frames that were not JSON
    pub unstructured_frames_total: IntCounter,
    /// Outbound messages dropped because the link was not open
    pub dropped_sends_total: IntCounter,
    /// Current status code (0 disconnected, 1 connecting, 2 connected, 3 error)
    pub status: IntGauge,
    /// Current retry counter
    pub retry_count: IntGauge,
}

impl FeedMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            connect_attempts_total: counter(
                registry,
                "feed_connect_attempts_total",
                "Total number of link open attempts",
            )?,
            opens_total: counter(registry, "feed_opens_total", "Total number of links opened")?,
            closes_total: counter(
                registry,
                "feed_closes_total",
                "Total number of unexpected link closes",
            )?,
            errors_total: counter(registry, "feed_errors_total", "Total number of link errors")?,
            retries_scheduled_total: counter(
                registry,
                "feed_retries_scheduled_total",
                "Total number of automatic reconnection attempts scheduled",
            )?,
            retry_exhaustions_total: counter(
                registry,
                "feed_retry_exhaustions_total",
                "Number of times the retry budget ran out",
            )?,
            frames_total: counter(registry, "feed_frames_total", "Total inbound frames")?,
            unstructured_frames_total: counter(
                registry,
                "feed_unstructured_frames_total",
                "Inbound frames that failed JSON decoding",
            )?,
            dropped_sends_total: counter(
                registry,
                "feed_dropped_sends_total",
                "Outbound messages dropped while not connected",
            )?,
            status: gauge(
                registry,
                "feed_status",
                "Connection status (0 disconnected, 1 connecting, 2 connected, 3 error)",
            )?,
            retry_count: gauge(registry, "feed_retry_count", "Current reconnection attempt counter")?,
        })
    }

    /// Mirror the externally visible state into the gauges
    pub fn observe_state(&self, status: ConnectionStatus, retry_count: u32) {
        self.status.set(status.code());
        self.retry_count.set(i64::from(retry_count));
    }
}

/// Sensor data metrics
pub struct SensorMetrics {
    /// Batches that changed the store
    pub batches_total: IntCounter,
    /// Accepted samples by sensor
    pub samples_total: IntCounterVec,
    /// Rejected (non-numeric) samples by sensor
    pub rejected_samples_total: IntCounterVec,
    /// Latest value by sensor
    pub latest_value: GaugeVec,
    /// Sensors currently tracked
    pub sensors_tracked: IntGauge,
}

impl SensorMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let batches_total = counter(
            registry,
            "sensor_batches_total",
            "Total number of batches applied to the store",
        )?;

        let samples_total = IntCounterVec::new(
            Opts::new("sensor_samples_total", "Samples accepted per sensor").namespace(NAMESPACE),
            &["sensor"],
        )?;
        registry.register(Box::new(samples_total.clone()))?;

        let rejected_samples_total = IntCounterVec::new(
            Opts::new(
                "sensor_rejected_samples_total",
                "Non-numeric samples discarded per sensor",
            )
            .namespace(NAMESPACE),
            &["sensor"],
        )?;
        registry.register(Box::new(rejected_samples_total.clone()))?;

        let latest_value = GaugeVec::new(
            Opts::new("sensor_latest_value", "Most recent value per sensor").namespace(NAMESPACE),
            &["sensor"],
        )?;
        registry.register(Box::new(latest_value.clone()))?;

        let sensors_tracked = gauge(registry, "sensors_tracked", "Number of sensors in the store")?;

        Ok(Self {
            batches_total,
            samples_total,
            rejected_samples_total,
            latest_value,
            sensors_tracked,
        })
    }
}
