//! Monitoring and observability module
//!
//! Provides Prometheus metrics for the feed and the sensor store, and an
//! HTTP server exposing them alongside a small read/control API.

pub mod metrics;
pub mod server;

pub use metrics::{FeedMetrics, MetricsRegistry, SensorMetrics};
pub use server::{encode_metrics, MonitoringServer, MonitoringServerConfig};
