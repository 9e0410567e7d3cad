//! Sensor feed: a resilient transport wired to an aggregator
//!
//! The aggregator lives inside the feed's observer, on the driver task.
//! After every batch that changes the store, a fresh immutable snapshot is
//! published on a `watch` channel; readers clone the `Arc` and never lock
//! the aggregator.

use super::aggregator::{AggregatorConfig, BatchOutcome, SensorAggregator};
use super::types::{RawMessage, SensorDataStore};
use super::window::TimeRange;
use crate::core::{ConnectionStatus, TransportError};
use crate::monitoring::{MetricsRegistry, SensorMetrics};
use crate::resilience::{FeedConfig, FeedHandle, FeedObserver, FeedState, ResilientFeed, SendOutcome};
use crate::transport::Connector;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Configuration for a sensor feed
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFeedConfig {
    pub feed: FeedConfig,
    pub aggregator: AggregatorConfig,
}

impl SensorFeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            feed: FeedConfig::new(url),
            aggregator: AggregatorConfig::default(),
        }
    }
}

struct AggregatingObserver {
    aggregator: SensorAggregator,
    snapshots: watch::Sender<Arc<SensorDataStore>>,
    metrics: Option<Arc<SensorMetrics>>,
}

impl AggregatingObserver {
    fn record(&self, outcome: &BatchOutcome) {
        let Some(metrics) = &self.metrics else {
            return;
        };

        metrics.batches_total.inc();
        for entry in &outcome.entries {
            let labels = [entry.sensor_code.as_str()];
            metrics.samples_total.with_label_values(&labels).inc_by(entry.accepted as u64);
            metrics
                .rejected_samples_total
                .with_label_values(&labels)
                .inc_by(entry.rejected as u64);
        }
        for code in outcome.updated() {
            if let Some(latest) = self.aggregator.store().get(code).and_then(|r| r.latest()) {
                metrics.latest_value.with_label_values(&[code]).set(latest.value);
            }
        }
        metrics.sensors_tracked.set(self.aggregator.store().len() as i64);
    }
}

impl FeedObserver for AggregatingObserver {
    fn on_message(&mut self, message: &RawMessage) {
        let outcome = self.aggregator.handle_message(message);
        if outcome.entries.is_empty() {
            return;
        }
        self.record(&outcome);
        if !outcome.changed() {
            return;
        }

        debug!(
            sensors = outcome.entries.len(),
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "Applied sensor batch"
        );
        self.snapshots.send_replace(Arc::new(self.aggregator.snapshot()));
    }

    fn on_open(&mut self) {
        info!(sensors = self.aggregator.store().len(), "Sensor stream open");
    }

    fn on_error(&mut self, error: &TransportError) {
        debug!("Sensor stream error: {}", error);
    }
}

/// Read side of a sensor feed
#[derive(Clone, Debug)]
pub struct SensorFeedHandle {
    feed: FeedHandle,
    snapshots: watch::Receiver<Arc<SensorDataStore>>,
}

impl SensorFeedHandle {
    /// Current store; never mutated after publication
    pub fn snapshot(&self) -> Arc<SensorDataStore> {
        self.snapshots.borrow().clone()
    }

    /// Current store restricted to `range` ending now
    pub fn windowed(&self, range: TimeRange) -> SensorDataStore {
        self.snapshot().windowed(range, Utc::now())
    }

    /// Receiver notified whenever a new snapshot is published
    pub fn subscribe(&self) -> watch::Receiver<Arc<SensorDataStore>> {
        self.snapshots.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.feed.status()
    }

    pub fn is_connected(&self) -> bool {
        self.feed.is_connected()
    }

    pub fn retry_count(&self) -> u32 {
        self.feed.retry_count()
    }

    pub fn state(&self) -> FeedState {
        self.feed.state()
    }

    /// Receiver notified on every connection state change
    pub fn watch_state(&self) -> watch::Receiver<FeedState> {
        self.feed.watch()
    }

    pub fn last_message(&self) -> Option<RawMessage> {
        self.feed.last_message()
    }

    pub fn reconnect(&self) {
        self.feed.reconnect()
    }

    pub fn disconnect(&self) {
        self.feed.disconnect()
    }

    pub fn send_json<T: Serialize + ?Sized>(&self, payload: &T) -> SendOutcome {
        self.feed.send_json(payload)
    }

    /// Underlying transport handle
    pub fn feed(&self) -> &FeedHandle {
        &self.feed
    }
}

/// A running sensor feed; dropping it tears the transport down
#[derive(Debug)]
pub struct SensorFeed {
    transport: ResilientFeed,
    handle: SensorFeedHandle,
}

impl SensorFeed {
    /// Start streaming through `connector`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<C: Connector>(config: SensorFeedConfig, connector: C) -> Self {
        Self::spawn_with_metrics(config, connector, None)
    }

    /// Like [`spawn`](Self::spawn), recording into `metrics`
    pub fn spawn_with_metrics<C: Connector>(
        config: SensorFeedConfig,
        connector: C,
        metrics: Option<&MetricsRegistry>,
    ) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(SensorDataStore::new()));

        let observer = AggregatingObserver {
            aggregator: SensorAggregator::new(config.aggregator),
            snapshots: snapshot_tx,
            metrics: metrics.map(MetricsRegistry::sensors_handle),
        };
        let transport = ResilientFeed::spawn_with_metrics(
            config.feed,
            connector,
            observer,
            metrics.map(MetricsRegistry::feed_handle),
        );

        let handle = SensorFeedHandle {
            feed: transport.handle(),
            snapshots: snapshot_rx,
        };
        Self { transport, handle }
    }

    pub fn handle(&self) -> SensorFeedHandle {
        self.handle.clone()
    }

    /// Close the link and wait for the driver to finish
    pub async fn shutdown(self) {
        self.transport.shutdown().await
    }
}

impl std::ops::Deref for SensorFeed {
    type Target = SensorFeedHandle;

    fn deref(&self) -> &SensorFeedHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{batch_frame, sensor_batch, MockConnector};
    use crate::transport::LinkEvent;

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_replaced_per_batch() {
        let connector = MockConnector::new();
        let feed = SensorFeed::spawn(SensorFeedConfig::new("ws://plant.local/ws/dataSensor/"), connector.clone());
        settle().await;

        let before = feed.snapshot();
        assert!(before.is_empty());

        connector.emit(0, LinkEvent::Opened);
        connector.emit(0, LinkEvent::Frame(batch_frame(&sensor_batch(&[("ph", &[7.0, 7.1])]))));
        settle().await;

        let after = feed.snapshot();
        assert!(before.is_empty(), "published snapshots are never mutated");
        assert_eq!(after.get("ph").unwrap().values().collect::<Vec<_>>(), vec![7.0, 7.1]);
        assert!(feed.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_frame_leaves_snapshot_alone() {
        let connector = MockConnector::new();
        let feed = SensorFeed::spawn(SensorFeedConfig::new("ws://plant.local/ws/dataSensor/"), connector.clone());
        settle().await;
        let mut updates = feed.subscribe();
        updates.mark_unchanged();

        connector.emit(0, LinkEvent::Opened);
        connector.emit(0, LinkEvent::Frame("heartbeat".to_string()));
        settle().await;

        assert!(!updates.has_changed().unwrap());
        assert_eq!(feed.last_message(), Some(RawMessage::Text("heartbeat".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_recorded() {
        let registry = MetricsRegistry::new().unwrap();
        let connector = MockConnector::new();
        let feed = SensorFeed::spawn_with_metrics(
            SensorFeedConfig::new("ws://plant.local/ws/dataSensor/"),
            connector.clone(),
            Some(&registry),
        );
        settle().await;

        connector.emit(0, LinkEvent::Opened);
        connector.emit(0, LinkEvent::Frame(r#"{"Biogestor/ph": ["7.0", "x", "7.2"]}"#.to_string()));
        settle().await;

        let sensors = registry.sensors();
        assert_eq!(sensors.batches_total.get(), 1);
        assert_eq!(sensors.samples_total.with_label_values(&["ph"]).get(), 2);
        assert_eq!(sensors.rejected_samples_total.with_label_values(&["ph"]).get(), 1);
        assert_eq!(sensors.latest_value.with_label_values(&["ph"]).get(), 7.2);
        assert_eq!(registry.feed().opens_total.get(), 1);
        assert_eq!(registry.feed().frames_total.get(), 1);
        drop(feed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_only_batch_counted() {
        let registry = MetricsRegistry::new().unwrap();
        let connector = MockConnector::new();
        let feed = SensorFeed::spawn_with_metrics(
            SensorFeedConfig::new("ws://plant.local/ws/dataSensor/"),
            connector.clone(),
            Some(&registry),
        );
        settle().await;
        let mut updates = feed.subscribe();
        updates.mark_unchanged();

        connector.emit(0, LinkEvent::Opened);
        connector.emit(0, LinkEvent::Frame(r#"{"Biogestor/ph": ["abc", "xyz"]}"#.to_string()));
        settle().await;

        let sensors = registry.sensors();
        assert_eq!(sensors.batches_total.get(), 1);
        assert_eq!(sensors.rejected_samples_total.with_label_values(&["ph"]).get(), 2);
        assert_eq!(sensors.samples_total.with_label_values(&["ph"]).get(), 0);
        assert_eq!(sensors.sensors_tracked.get(), 0);
        assert!(!updates.has_changed().unwrap());
        assert!(feed.snapshot().is_empty());
    }
}
