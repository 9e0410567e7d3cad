//! Exponential backoff for reconnection
//!
//! Each consecutive failure doubles the delay and adds a random amount of
//! up to `max_jitter`, capped at `max_delay`:
//!
//! ```text
//! next = min(current * multiplier + jitter(0..max_jitter), max_delay)
//! ```
//!
//! Additive jitter keeps a fleet of dashboards from retrying in lock-step
//! after the backend restarts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Configuration for exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling for any single delay
    pub max_delay: Duration,
    /// Growth factor applied per failure (typically 2.0)
    pub multiplier: f64,
    /// Upper bound of the random amount added per step
    pub max_jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            max_jitter: Duration::from_millis(1000),
        }
    }
}

impl BackoffConfig {
    /// Same schedule without randomization (for tests and replay)
    pub fn without_jitter(self) -> Self {
        Self {
            max_jitter: Duration::ZERO,
            ..self
        }
    }

    /// Short delays for local development against a flaky backend
    pub fn aggressive() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_jitter: Duration::from_millis(50),
        }
    }
}

/// Backoff state: the delay to use for the next scheduled retry
pub struct RetryBackoff {
    config: BackoffConfig,
    current_delay: Duration,
    rng: StdRng,
}

impl RetryBackoff {
    /// Create a backoff seeded from OS entropy
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a backoff with a fixed seed (reproducible jitter)
    pub fn seeded(config: BackoffConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: BackoffConfig, rng: StdRng) -> Self {
        Self {
            current_delay: config.initial_delay,
            config,
            rng,
        }
    }

    /// Delay that the next scheduled retry will wait
    pub fn current(&self) -> Duration {
        self.current_delay
    }

    /// Grow the delay for the following retry and return the new value
    pub fn advance(&mut self) -> Duration {
        let grown = self.current_delay.as_secs_f64() * self.config.multiplier + self.jitter();
        let grown = if grown.is_finite() {
            Duration::from_secs_f64(grown.max(0.0))
        } else {
            self.config.max_delay
        };
        self.current_delay = grown.min(self.config.max_delay);
        self.current_delay
    }

    /// Back to the initial delay
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
    }

    /// Get the configuration
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    fn jitter(&mut self) -> f64 {
        if self.config.max_jitter.is_zero() {
            return 0.0;
        }
        self.rng.gen::<f64>() * self.config.max_jitter.as_secs_f64()
    }
}

impl std::fmt::Debug for RetryBackoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryBackoff")
            .field("config", &self.config)
            .field("current_delay", &self.current_delay)
            .finish_non_exhaustive()
    }
}
