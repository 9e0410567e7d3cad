//! Biogas Core - Real-time sensor ingestion for a biodigestor plant
//!
//! Subscribes to the plant's streaming telemetry feed, keeps a bounded
//! rolling time-series per sensor, and recovers from connection loss on its
//! own with exponential backoff and jitter.
//!
//! ## Architecture
//! - **Socket-free state machine** decides every reconnection step
//! - **Single driver task** per feed; consumers talk to it through handles
//! - **Epoch-tagged links**: events from a torn-down link are ignored
//! - **Immutable snapshots** published per batch over a `watch` channel
//!
//! ## Core Modules
//! - `core`: connection state machine and error types
//! - `resilience`: backoff, scheduled retries, the resilient feed driver
//! - `transport`: link abstraction and the WebSocket connector
//! - `data`: batch decoding, aggregation, windows, the sensor feed
//! - `config`: layered configuration and endpoint resolution
//! - `monitoring`: Prometheus metrics and the HTTP read API
//! - `testing`: mock connector and batch builders
//!
//! ## Example
//!
//! ```no_run
//! use biogas_core::prelude::*;
//!
//! # async fn run() -> biogas_core::Result<()> {
//! let config = Config::load_default()?;
//! let feed = SensorFeed::spawn(config.sensor_feed_config()?, WsConnector::new());
//!
//! let snapshot = feed.snapshot();
//! for (code, reading) in snapshot.iter() {
//!     println!("{}: {:?}", code, reading.latest());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod data;
pub mod monitoring;
pub mod resilience;
pub mod testing;
pub mod transport;
pub mod utils;

// Re-export core types
pub use crate::core::{ConnectionStatus, EndpointError, TransportError};

// Re-export feed types
pub use crate::data::{RawMessage, SensorDataStore, SensorFeed, SensorFeedHandle, SensorReading, TimeRange};
pub use crate::resilience::{FeedHandle, ResilientFeed};

// Re-export error types
pub use anyhow::{Error, Result};

/// Prelude for convenient imports
pub mod prelude {
    // Core types
    pub use crate::core::{ConnectionStatus, ReconnectPolicy};

    // Configuration
    pub use crate::config::{Config, FeedEndpoint};

    // Data feed
    pub use crate::data::{
        AggregatorConfig, RawMessage, SensorAggregator, SensorDataStore, SensorFeed,
        SensorFeedConfig, SensorFeedHandle, SensorReading, TimeRange,
    };

    // Transport
    pub use crate::resilience::{BackoffConfig, FeedConfig, FeedObserver, ResilientFeed, SendOutcome};
    pub use crate::transport::{Connector, WsConnector};

    // Error types
    pub use crate::{Error, Result};
}
