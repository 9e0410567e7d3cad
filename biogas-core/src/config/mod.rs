//! Layered configuration
//!
//! Built-in defaults, then an optional TOML file, then `BIOGAS_` environment
//! variables (`__` separates sections, e.g. `BIOGAS_FEED__BASE_URL`).
//! - `endpoint`: resolves the streaming URL from base URL or page origin
//! - `types`: the config sections and their validation

pub mod endpoint;
pub mod types;

pub use endpoint::FeedEndpoint;
pub use types::*;

use crate::core::ReconnectPolicy;
use crate::data::{AggregatorConfig, SensorFeedConfig};
use crate::resilience::{BackoffConfig, FeedConfig};
use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config as ConfigLoader, ConfigBuilder, Environment, File, FileFormat};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables use the `BIOGAS_` prefix and `__` between
    /// sections, e.g. `BIOGAS_FEED__BASE_URL=ws://backend:8000`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();

        let builder = Self::builder()?
            .add_source(File::from(config_path).format(FileFormat::Toml))
            .add_source(Self::environment());

        Self::finish(builder)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))
    }

    /// Like [`load`](Self::load), but a missing file means built-in defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();
        if config_path.exists() {
            return Self::load(config_path);
        }

        warn!(
            "Config file {} not found, using built-in defaults",
            config_path.display()
        );
        Self::finish(Self::builder()?.add_source(Self::environment()))
    }

    /// Load from default location (./config/default.toml)
    pub fn load_default() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Parse a TOML document on top of the defaults (no environment)
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        Self::finish(Self::builder()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn builder() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = FeedSettings::default();
        Ok(ConfigLoader::builder()
            // Start with default values
            .set_default("feed.path", defaults.path)?
            .set_default("feed.auto_reconnect", defaults.auto_reconnect)?
            .set_default("feed.max_retries", i64::from(defaults.max_retries))?
            .set_default("feed.initial_retry_delay_ms", defaults.initial_retry_delay_ms as i64)?
            .set_default("feed.max_retry_delay_ms", defaults.max_retry_delay_ms as i64)?
            .set_default("feed.max_jitter_ms", defaults.max_jitter_ms as i64)?
            .set_default("aggregator.max_data_points", AggregatorSettings::default().max_data_points as i64)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?)
    }

    fn environment() -> Environment {
        Environment::with_prefix("BIOGAS")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;

        // Deserialize into Config struct
        let cfg: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate feed
        self.endpoint()?;

        if self.feed.initial_retry_delay_ms == 0 {
            anyhow::bail!("feed.initial_retry_delay_ms must be positive");
        }

        if self.feed.max_retry_delay_ms < self.feed.initial_retry_delay_ms {
            anyhow::bail!(
                "feed.max_retry_delay_ms ({}) cannot be less than feed.initial_retry_delay_ms ({})",
                self.feed.max_retry_delay_ms,
                self.feed.initial_retry_delay_ms
            );
        }

        if !self.feed.backoff_multiplier.is_finite() || self.feed.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "feed.backoff_multiplier must be at least 1.0, got {}",
                self.feed.backoff_multiplier
            );
        }

        // Validate aggregator
        if self.aggregator.max_data_points == 0 {
            anyhow::bail!("aggregator.max_data_points must be at least 1");
        }

        // Validate monitoring
        if self.monitoring.enable_http {
            self.listen_addr()?;
        }

        // Validate log level
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}', must be one of: {:?}",
                self.logging.level,
                VALID_LOG_LEVELS
            );
        }

        // Validate sensor catalog
        for (i, sensor) in self.sensors.iter().enumerate() {
            if self.sensors[..i].iter().any(|other| other.code == sensor.code) {
                anyhow::bail!("Duplicate sensor code '{}' in catalog", sensor.code);
            }
            if let (Some(min), Some(max)) = (sensor.min, sensor.max) {
                if min > max {
                    anyhow::bail!("Sensor '{}' has min {} above max {}", sensor.code, min, max);
                }
            }
        }

        Ok(())
    }

    /// Resolved streaming endpoint
    pub fn endpoint(&self) -> Result<FeedEndpoint> {
        FeedEndpoint::resolve(
            self.feed.base_url.as_deref(),
            self.feed.origin.as_deref(),
            &self.feed.path,
        )
        .context("Failed to resolve streaming endpoint")
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.monitoring
            .listen_addr
            .parse()
            .with_context(|| format!("Invalid monitoring.listen_addr '{}'", self.monitoring.listen_addr))
    }

    /// Catalog entry for a sensor code
    pub fn sensor(&self, code: &str) -> Option<&SensorDisplay> {
        self.sensors.iter().find(|sensor| sensor.code == code)
    }

    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.feed.initial_retry_delay_ms),
            max_delay: Duration::from_millis(self.feed.max_retry_delay_ms),
            multiplier: self.feed.backoff_multiplier,
            max_jitter: Duration::from_millis(self.feed.max_jitter_ms),
        }
    }

    pub fn feed_config(&self) -> Result<FeedConfig> {
        Ok(FeedConfig {
            url: self.endpoint()?.into_string(),
            policy: ReconnectPolicy {
                auto_reconnect: self.feed.auto_reconnect,
                max_retries: self.feed.max_retries,
            },
            backoff: self.backoff_config(),
            jitter_seed: None,
        })
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            max_data_points: self.aggregator.max_data_points,
            namespace_prefixes: self.aggregator.namespace_prefixes.clone(),
        }
    }

    pub fn sensor_feed_config(&self) -> Result<SensorFeedConfig> {
        Ok(SensorFeedConfig {
            feed: self.feed_config()?,
            aggregator: self.aggregator_config(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.endpoint().unwrap().as_str(), "ws://localhost:8000/ws/dataSensor/");
        assert_eq!(config.sensors.len(), 6);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.aggregator.max_data_points = 0;
        assert!(config.validate().is_err());
        config.aggregator.max_data_points = 100;

        config.feed.max_retry_delay_ms = 500;
        assert!(config.validate().is_err());
        config.feed.max_retry_delay_ms = 30_000;

        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "debug".to_string();

        config.feed.origin = None;
        assert!(config.validate().is_err());
        config.feed.base_url = Some("ws://backend:8000".to_string());

        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_listen_addr_only_checked_when_enabled() {
        let mut config = Config::default();
        config.monitoring.listen_addr = "not an address".to_string();
        assert!(config.validate().is_err());

        config.monitoring.enable_http = false;
        config.validate().unwrap();
    }

    #[test]
    fn test_backoff_config_conversion() {
        let mut config = Config::default();
        config.feed.max_jitter_ms = 0;

        let backoff = config.backoff_config();
        assert_eq!(backoff.initial_delay, Duration::from_millis(1000));
        assert_eq!(backoff.max_delay, Duration::from_millis(30_000));
        assert_eq!(backoff.max_jitter, Duration::ZERO);
    }

    #[test]
    fn test_sensor_lookup() {
        let config = Config::default();
        let ph = config.sensor("ph").unwrap();
        assert_eq!(ph.max, Some(14.0));
        assert!(ph.out_of_range(15.0));
        assert_eq!(config.sensor("temperatura").unwrap().format_value(35.456), "35.46 °C");
        assert!(config.sensor("unknown").is_none());
    }
}
