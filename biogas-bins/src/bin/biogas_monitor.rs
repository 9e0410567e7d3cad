//! Biodigestor Sensor Monitor
//!
//! Connects to the plant's streaming endpoint and keeps a rolling window of
//! every sensor:
//! - Reconnects on its own with exponential backoff and jitter
//! - Serves Prometheus metrics and a JSON read API (unless --no-http)
//! - Logs a per-sensor summary every `logging.summary_interval_secs`
//!
//! Ctrl+C disconnects cleanly.

use anyhow::Result;
use biogas_bins::common::{init_logging, print_summary, MonitorArgs};
use biogas_core::data::SensorFeed;
use biogas_core::monitoring::{MetricsRegistry, MonitoringServer, MonitoringServerConfig};
use biogas_core::transport::WsConnector;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = MonitorArgs::parse();
    let config_missing = args.config_missing();
    let config = args.load_config()?;

    // Initialize logging
    init_logging(&config)?;

    info!("=== Biogas Sensor Monitor ===");
    if config_missing {
        // Loading ran before the subscriber existed
        warn!(
            "Config file {} not found, using built-in defaults",
            args.config.display()
        );
    }
    let feed_config = config.sensor_feed_config()?;
    info!("Endpoint: {}", feed_config.feed.url);
    info!(
        "Buffer: {} samples per sensor, max {} retries",
        feed_config.aggregator.max_data_points, feed_config.feed.policy.max_retries
    );

    // Setup graceful shutdown on Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        warn!("Received Ctrl+C, initiating graceful shutdown...");
        let _ = shutdown_tx.send(());
    })?;

    let registry = Arc::new(MetricsRegistry::new()?);
    let feed = SensorFeed::spawn_with_metrics(feed_config, WsConnector::new(), Some(&registry));

    if config.monitoring.enable_http {
        let server = MonitoringServer::new(
            MonitoringServerConfig {
                listen_addr: config.listen_addr()?,
            },
            Arc::clone(&registry),
            feed.handle(),
        );
        tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!("Monitoring server stopped: {:#}", e);
            }
        });
    }

    let mut states = feed.watch_state();
    let summary_every = Duration::from_secs(config.logging.summary_interval_secs);
    let mut summary = tokio::time::interval(summary_every.max(Duration::from_secs(1)));
    summary.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    warn!("Feed stopped unexpectedly");
                    break;
                }
                let state = *states.borrow_and_update();
                info!(status = %state.status, retries = state.retry_count, "Connection state changed");
            }
            _ = summary.tick(), if !summary_every.is_zero() => {
                print_summary(&config, &feed.windowed(args.range), args.range);
            }
        }
    }

    feed.disconnect();
    print_summary(&config, &feed.snapshot(), args.range);
    feed.shutdown().await;
    info!("Monitor stopped");

    Ok(())
}
