//! Resilience patterns for the telemetry feed
//!
//! - Exponential backoff with additive jitter
//! - Cancellable scheduled retries
//! - Automatic reconnection driven by the connection state machine

pub mod backoff;
pub mod reconnect;
pub mod schedule;

pub use backoff::{BackoffConfig, RetryBackoff};
pub use reconnect::{FeedConfig, FeedHandle, FeedObserver, FeedState, ResilientFeed, SendOutcome};
pub use schedule::{RetryToken, ScheduledRetry};
