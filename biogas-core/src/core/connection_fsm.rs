//! Connection State Machine
//!
//! Socket-free model of the feed connection lifecycle. Every transition
//! returns the [`Directive`]s the driver has to carry out (open a link,
//! close a link, arm or disarm the retry timer), so the whole reconnection
//! policy can be exercised without a network.
//!
//! # State Diagram
//!
//! ```text
//!                 start() / reconnect()
//!   DISCONNECTED ─────────────────────────→ CONNECTING
//!        ▲  ▲                                │      │
//!        │  │                          opened()  error()
//!        │  │                                ▼      ▼
//!        │  │  closed()                 CONNECTED  ERROR
//!        │  └───────────────────────────────┘       │
//!        └──────────────────────────────────────────┘
//!                         closed()
//!
//!   closed() while auto-reconnect is on and attempts remain:
//!       schedule retry(delay) ── retry_due() ──→ CONNECTING
//! ```
//!
//! **Key Features:**
//! - Every link is tagged with an [`Epoch`]; events from a torn-down link
//!   are rejected, so there is never more than one live link
//! - Retry counter increments once per scheduled attempt and never exceeds
//!   `max_retries`
//! - `disconnect()` cancels any pending retry and disables auto-reconnect
//! - `reconnect()` resets counter and backoff and connects immediately
//!
//! # Usage
//!
//! ```
//! use biogas_core::core::connection_fsm::*;
//! use biogas_core::resilience::{BackoffConfig, RetryBackoff};
//!
//! let backoff = RetryBackoff::new(BackoffConfig::default().without_jitter());
//! let mut fsm = ConnectionFsm::new(ReconnectPolicy::default(), backoff);
//!
//! let directives = fsm.start();
//! let epoch = match directives.as_slice() {
//!     [Directive::OpenLink(epoch)] => *epoch,
//!     other => panic!("unexpected directives: {:?}", other),
//! };
//! assert_eq!(fsm.status(), ConnectionStatus::Connecting);
//!
//! fsm.on_open(epoch).unwrap();
//! assert!(fsm.status().is_connected());
//!
//! // Server goes away: a retry is scheduled after the initial delay
//! let directives = fsm.on_close(epoch).unwrap();
//! assert!(matches!(directives[0], Directive::ScheduleRetry { attempt: 1, .. }));
//! ```

use crate::resilience::backoff::RetryBackoff;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Status
// ============================================================================

/// Externally visible connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// A link is being opened
    Connecting,
    /// The link is open and delivering frames
    Connected,
    /// No link; either waiting for a retry, exhausted, or disconnected on purpose
    #[default]
    Disconnected,
    /// The link reported an error; a close normally follows
    Error,
}

impl ConnectionStatus {
    /// Check if operational
    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }

    /// Lowercase name, as serialized
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }

    /// Stable numeric code for gauges (0..=3)
    pub fn code(self) -> i64 {
        match self {
            ConnectionStatus::Disconnected => 0,
            ConnectionStatus::Connecting => 1,
            ConnectionStatus::Connected => 2,
            ConnectionStatus::Error => 3,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Epoch / Directive / Policy
// ============================================================================

/// Identity of one link; bumped on every `connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Side effect requested by a transition, applied by the driver in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Tear down the current link
    CloseLink,
    /// Open a new link tagged with this epoch
    OpenLink(Epoch),
    /// Arm the retry timer
    ScheduleRetry {
        /// How long to wait before connecting again
        delay: Duration,
        /// Retry counter value after this attempt was scheduled
        attempt: u32,
    },
    /// Disarm the pending retry timer
    CancelRetry,
}

/// Reconnection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retry automatically after an unexpected close
    pub auto_reconnect: bool,
    /// Cap on consecutive automatic attempts
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            max_retries: 10,
        }
    }
}

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Links requested (initial, automatic and manual)
    pub connect_attempts: u64,
    /// Links that reported open
    pub opens: u64,
    /// Unexpected closes
    pub closes: u64,
    /// Link errors
    pub errors: u64,
    /// Automatic retries scheduled
    pub retries_scheduled: u64,
    /// Closes that found the retry budget exhausted
    pub exhaustions: u64,
}

// ============================================================================
// State machine
// ============================================================================

/// Connection lifecycle state machine
#[derive(Debug)]
pub struct ConnectionFsm {
    policy: ReconnectPolicy,
    backoff: RetryBackoff,
    status: ConnectionStatus,
    /// Last issued epoch
    epoch: Epoch,
    /// Epoch of the link that is currently open or opening
    live: Option<Epoch>,
    should_reconnect: bool,
    retry_count: u32,
    retry_pending: bool,
    stats: ConnectionStats,
}

impl ConnectionFsm {
    pub fn new(policy: ReconnectPolicy, backoff: RetryBackoff) -> Self {
        Self {
            should_reconnect: policy.auto_reconnect,
            policy,
            backoff,
            status: ConnectionStatus::Disconnected,
            epoch: Epoch::default(),
            live: None,
            retry_count: 0,
            retry_pending: false,
            stats: ConnectionStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Automatic attempts since the last successful open or reset
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether an unexpected close would schedule a retry (budget permitting)
    pub fn auto_reconnect_enabled(&self) -> bool {
        self.should_reconnect
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Delay the next scheduled retry would use
    pub fn next_delay(&self) -> Duration {
        self.backoff.current()
    }

    /// Epoch of the link currently open or opening
    pub fn live_epoch(&self) -> Option<Epoch> {
        self.live
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.live == Some(epoch)
    }

    /// True once a close found the retry budget spent
    pub fn is_exhausted(&self) -> bool {
        self.should_reconnect
            && !self.retry_pending
            && self.live.is_none()
            && self.retry_count >= self.policy.max_retries
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    // ------------------------------------------------------------------
    // Consumer-driven transitions
    // ------------------------------------------------------------------

    /// Initial connection on construction
    pub fn start(&mut self) -> Vec<Directive> {
        self.should_reconnect = self.policy.auto_reconnect;
        self.connect()
    }

    /// Transition: any → Connecting
    ///
    /// Tears down the live link first so at most one exists.
    pub fn connect(&mut self) -> Vec<Directive> {
        let mut directives = Vec::with_capacity(2);
        if self.live.take().is_some() {
            directives.push(Directive::CloseLink);
        }

        self.epoch = self.epoch.next();
        self.live = Some(self.epoch);
        self.status = ConnectionStatus::Connecting;
        self.stats.connect_attempts += 1;

        directives.push(Directive::OpenLink(self.epoch));
        directives
    }

    /// Transition: any → Disconnected, auto-reconnect off
    pub fn disconnect(&mut self) -> Vec<Directive> {
        self.should_reconnect = false;

        let mut directives = Vec::with_capacity(2);
        if std::mem::take(&mut self.retry_pending) {
            directives.push(Directive::CancelRetry);
        }
        if self.live.take().is_some() {
            directives.push(Directive::CloseLink);
        }

        self.status = ConnectionStatus::Disconnected;
        self.retry_count = 0;
        directives
    }

    /// Manual reconnect: re-enable auto-reconnect, reset counter and
    /// backoff, skip any pending wait and connect now
    pub fn reconnect(&mut self) -> Vec<Directive> {
        self.should_reconnect = true;
        self.retry_count = 0;
        self.backoff.reset();

        let mut directives = Vec::with_capacity(3);
        if std::mem::take(&mut self.retry_pending) {
            directives.push(Directive::CancelRetry);
        }
        directives.extend(self.connect());
        directives
    }

    /// The retry timer fired
    pub fn on_retry_due(&mut self) -> Vec<Directive> {
        if !std::mem::take(&mut self.retry_pending) {
            // Cancelled in the meantime
            return Vec::new();
        }
        self.connect()
    }

    // ------------------------------------------------------------------
    // Link-driven transitions (None = stale epoch, ignored)
    // ------------------------------------------------------------------

    /// Transition: Connecting → Connected
    pub fn on_open(&mut self, epoch: Epoch) -> Option<Vec<Directive>> {
        if !self.is_current(epoch) {
            return None;
        }
        self.status = ConnectionStatus::Connected;
        self.retry_count = 0;
        self.backoff.reset();
        self.stats.opens += 1;
        Some(Vec::new())
    }

    /// Transition: any → Error (no retry by itself)
    pub fn on_error(&mut self, epoch: Epoch) -> Option<Vec<Directive>> {
        if !self.is_current(epoch) {
            return None;
        }
        self.status = ConnectionStatus::Error;
        self.stats.errors += 1;
        Some(Vec::new())
    }

    /// The connector could not even start opening the link
    ///
    /// Ends in Error without scheduling a retry; recovery is manual.
    pub fn on_open_failed(&mut self, epoch: Epoch) -> Option<Vec<Directive>> {
        if !self.is_current(epoch) {
            return None;
        }
        self.live = None;
        self.status = ConnectionStatus::Error;
        self.stats.errors += 1;
        Some(Vec::new())
    }

    /// Transition: any → Disconnected, maybe scheduling a retry
    pub fn on_close(&mut self, epoch: Epoch) -> Option<Vec<Directive>> {
        if !self.is_current(epoch) {
            return None;
        }
        self.live = None;
        self.status = ConnectionStatus::Disconnected;
        self.stats.closes += 1;

        if !self.should_reconnect {
            return Some(Vec::new());
        }

        if self.retry_count >= self.policy.max_retries {
            self.stats.exhaustions += 1;
            return Some(Vec::new());
        }

        let delay = self.backoff.current();
        self.retry_count += 1;
        self.backoff.advance();
        self.retry_pending = true;
        self.stats.retries_scheduled += 1;

        Some(vec![Directive::ScheduleRetry {
            delay,
            attempt: self.retry_count,
        }])
    }
}
