use crate::data::constants::{DEFAULT_MAX_DATA_POINTS, DEFAULT_NAMESPACE_PREFIX, DEFAULT_STREAM_PATH};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedSettings,
    pub aggregator: AggregatorSettings,
    pub monitoring: MonitoringSettings,
    pub logging: LoggingSettings,
    /// Display catalog for known sensors
    pub sensors: Vec<SensorDisplay>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedSettings::default(),
            aggregator: AggregatorSettings::default(),
            monitoring: MonitoringSettings::default(),
            logging: LoggingSettings::default(),
            sensors: default_sensor_catalog(),
        }
    }
}

/// Streaming endpoint and reconnection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Explicit streaming base (e.g. `ws://backend:8000`); wins over `origin`
    pub base_url: Option<String>,

    /// Backend origin whose scheme is upgraded to ws/wss
    pub origin: Option<String>,

    /// Stream path appended to the base
    pub path: String,

    /// Retry automatically after an unexpected close
    pub auto_reconnect: bool,

    /// Consecutive automatic attempts before giving up
    pub max_retries: u32,

    pub initial_retry_delay_ms: u64,

    pub max_retry_delay_ms: u64,

    /// Delay growth factor per attempt
    pub backoff_multiplier: f64,

    /// Upper bound of random delay added per attempt (0 disables jitter)
    pub max_jitter_ms: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            origin: Some("http://localhost:8000".to_string()),
            path: DEFAULT_STREAM_PATH.to_string(),
            auto_reconnect: true,
            max_retries: 10,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            max_jitter_ms: 1000,
        }
    }
}

/// Rolling buffer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Samples retained per sensor
    pub max_data_points: usize,

    /// Topic prefixes stripped to obtain sensor codes
    pub namespace_prefixes: Vec<String>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            max_data_points: DEFAULT_MAX_DATA_POINTS,
            namespace_prefixes: vec![DEFAULT_NAMESPACE_PREFIX.to_string()],
        }
    }
}

/// HTTP monitoring settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Serve metrics and the read API
    pub enable_http: bool,

    /// Address to bind to (e.g., "0.0.0.0:9090")
    pub listen_addr: String,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            enable_http: true,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output JSON formatted logs
    pub json: bool,

    /// Seconds between sensor summaries in the monitor (0 disables them)
    pub summary_interval_secs: u64,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            summary_interval_secs: 30,
        }
    }
}

/// Display metadata for one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDisplay {
    /// Sensor code as it appears after prefix stripping
    pub code: String,
    pub title: String,
    #[serde(default)]
    pub unit: String,
    /// Lower bound of the display scale
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper bound of the display scale
    #[serde(default)]
    pub max: Option<f64>,
}

impl SensorDisplay {
    fn new(code: &str, title: &str, unit: &str, range: Option<(f64, f64)>) -> Self {
        Self {
            code: code.to_string(),
            title: title.to_string(),
            unit: unit.to_string(),
            min: range.map(|(min, _)| min),
            max: range.map(|(_, max)| max),
        }
    }

    /// `value` followed by the unit, if any
    pub fn format_value(&self, value: f64) -> String {
        if self.unit.is_empty() {
            format!("{:.2}", value)
        } else {
            format!("{:.2} {}", value, self.unit)
        }
    }

    /// True if `value` lies outside the display bounds
    pub fn out_of_range(&self, value: f64) -> bool {
        self.min.map_or(false, |min| value < min) || self.max.map_or(false, |max| value > max)
    }
}

/// Sensors the plant ships with
pub fn default_sensor_catalog() -> Vec<SensorDisplay> {
    vec![
        SensorDisplay::new("temperatura", "Temperatura", "°C", Some((0.0, 60.0))),
        SensorDisplay::new("humedad", "Humedad", "%", Some((0.0, 100.0))),
        SensorDisplay::new("presion", "Presión", "hPa", Some((900.0, 1100.0))),
        SensorDisplay::new("ph", "pH", "", Some((0.0, 14.0))),
        SensorDisplay::new("gas_total_m3", "Gas total", "m³", None),
        SensorDisplay::new("biol_total_m3", "Biol total", "m³", None),
    ]
}
