//! Common utilities for all binaries
//!
//! Shared initialization, CLI parsing, and setup code.

use anyhow::Result;
use biogas_core::config::{Config, DEFAULT_CONFIG_PATH};
use biogas_core::data::{SensorDataStore, TimeRange};
use biogas_core::utils::init_logger;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Common CLI arguments for all binaries
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct MonitorArgs {
    /// Configuration file (missing file means built-in defaults)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Streaming base URL, overrides feed.base_url (e.g. ws://backend:8000)
    #[arg(short, long)]
    pub url: Option<String>,

    /// Samples kept per sensor
    #[arg(short, long)]
    pub max_data_points: Option<usize>,

    /// Log level, overrides logging.level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    pub json_logs: bool,

    /// Do not serve metrics and the HTTP API
    #[arg(long)]
    pub no_http: bool,

    /// Display window for the periodic summary (5min, 15min, 1hr)
    #[arg(short, long, default_value_t = TimeRange::default())]
    pub range: TimeRange,
}

impl MonitorArgs {
    /// True if `--config` points at nothing and defaults will be used
    pub fn config_missing(&self) -> bool {
        !self.config.exists()
    }

    /// Load the config file and apply command line overrides on top
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_or_default(&self.config)?;

        if let Some(url) = &self.url {
            config.feed.base_url = Some(url.clone());
        }
        if let Some(max_data_points) = self.max_data_points {
            config.aggregator.max_data_points = max_data_points;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.json = true;
        }
        if self.no_http {
            config.monitoring.enable_http = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Initialize tracing/logging
pub fn init_logging(config: &Config) -> Result<()> {
    init_logger(&config.logging.level, config.logging.json)
}

/// Log one line per sensor: latest value, window stats, sample count
pub fn print_summary(config: &Config, store: &SensorDataStore, range: TimeRange) {
    if store.is_empty() {
        info!("No sensor data received yet");
        return;
    }

    info!("=== Sensor summary ({}) ===", range);
    for (code, reading) in store.iter() {
        let display = config.sensor(code);
        let title = display.map_or(code, |d| d.title.as_str());
        let show = |value: f64| match display {
            Some(d) => d.format_value(value),
            None => format!("{:.2}", value),
        };

        let Some(latest) = reading.latest() else {
            continue;
        };
        let flag = if display.map_or(false, |d| d.out_of_range(latest.value)) {
            " (out of range)"
        } else {
            ""
        };

        match reading.stats() {
            Some(stats) => info!(
                "{}: {}{}  min {}  max {}  avg {}  ({} samples)",
                title,
                show(latest.value),
                flag,
                show(stats.min),
                show(stats.max),
                show(stats.mean),
                reading.len()
            ),
            None => info!("{}: {}{}", title, show(latest.value), flag),
        }
    }
}
