//! Resilient streaming feed with automatic reconnection
//!
//! [`ResilientFeed`] owns a single driver task that holds the connection
//! state machine, the live link, the retry timer and the observer. The
//! driver processes one event at a time from three queues:
//!
//! - consumer commands sent through a [`FeedHandle`]
//! - link events, tagged with the epoch of the link that produced them
//! - retry timer firings, tagged with the token of the timer
//!
//! Each event is fed to the [`ConnectionFsm`], the returned directives are
//! carried out in order, and the resulting [`FeedState`] is published on a
//! `watch` channel. Consumer operations never block and never fail.

use super::backoff::{BackoffConfig, RetryBackoff};
use super::schedule::{RetryToken, ScheduledRetry};
use crate::core::{ConnectionFsm, ConnectionStatus, Directive, Epoch, ReconnectPolicy, TransportError};
use crate::data::RawMessage;
use crate::monitoring::FeedMetrics;
use crate::transport::{Connector, LinkEvent, LinkEvents, LinkHandle};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Configuration for a resilient feed
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Streaming endpoint
    pub url: String,
    /// Auto-reconnect switch and retry budget
    pub policy: ReconnectPolicy,
    /// Delay growth between automatic attempts
    pub backoff: BackoffConfig,
    /// Seed for the jitter generator; `None` seeds from entropy
    pub jitter_seed: Option<u64>,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
            backoff: BackoffConfig::default(),
            jitter_seed: None,
        }
    }

    fn retry_backoff(&self) -> RetryBackoff {
        match self.jitter_seed {
            Some(seed) => RetryBackoff::seeded(self.backoff.clone(), seed),
            None => RetryBackoff::new(self.backoff.clone()),
        }
    }
}

/// Hooks invoked by the driver task, in event order
///
/// All hooks default to no-ops. They run on the driver task, so a slow hook
/// delays the next event.
pub trait FeedObserver: Send + 'static {
    /// A frame arrived on the live link (structured, or raw text if it was not JSON)
    fn on_message(&mut self, _message: &RawMessage) {}

    /// The live link opened
    fn on_open(&mut self) {}

    /// The live link closed
    fn on_close(&mut self) {}

    /// The live link failed, or a link could not be opened
    fn on_error(&mut self, _error: &TransportError) {}
}

impl FeedObserver for () {}

/// Externally visible feed state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedState {
    pub status: ConnectionStatus,
    pub retry_count: u32,
}

/// Result of a send request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the driver for transmission on the live link
    Queued,
    /// Not connected (or not serializable); nothing was sent
    Dropped,
}

#[derive(Debug)]
enum Command {
    Reconnect,
    Disconnect,
    Send(String),
    Shutdown,
}

// ============================================================================
// Consumer handle
// ============================================================================

/// Cloneable, non-blocking handle to a running feed
#[derive(Clone)]
pub struct FeedHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<FeedState>,
    last_message: Arc<RwLock<Option<RawMessage>>>,
    metrics: Option<Arc<FeedMetrics>>,
}

impl FeedHandle {
    pub fn state(&self) -> FeedState {
        *self.state.borrow()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state().status
    }

    pub fn retry_count(&self) -> u32 {
        self.state().retry_count
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Receiver notified on every state change
    pub fn watch(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// Most recent inbound message, if any
    pub fn last_message(&self) -> Option<RawMessage> {
        self.last_message.read().clone()
    }

    /// False once the driver task has stopped
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Reset the retry budget and connect immediately
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Close the link and stop reconnecting until [`reconnect`](Self::reconnect)
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Transmit a text frame if connected
    pub fn send_text(&self, text: impl Into<String>) -> SendOutcome {
        let status = self.status();
        if !status.is_connected() {
            warn!(%status, "Cannot send message: feed not connected");
            self.record_drop();
            return SendOutcome::Dropped;
        }

        match self.commands.send(Command::Send(text.into())) {
            Ok(()) => SendOutcome::Queued,
            Err(_) => {
                warn!("Cannot send message: feed stopped");
                self.record_drop();
                SendOutcome::Dropped
            }
        }
    }

    /// Serialize `payload` as JSON and transmit it if connected
    pub fn send_json<T: Serialize + ?Sized>(&self, payload: &T) -> SendOutcome {
        match serde_json::to_string(payload) {
            Ok(text) => self.send_text(text),
            Err(e) => {
                warn!("Cannot send message: serialization failed: {}", e);
                self.record_drop();
                SendOutcome::Dropped
            }
        }
    }

    fn record_drop(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.dropped_sends_total.inc();
        }
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("state", &self.state())
            .field("running", &self.is_running())
            .finish()
    }
}

// ============================================================================
// Owner
// ============================================================================

/// A running feed; dropping it tears the feed down
#[derive(Debug)]
pub struct ResilientFeed {
    handle: FeedHandle,
    task: Option<JoinHandle<()>>,
}

impl ResilientFeed {
    /// Start the driver task and connect immediately
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<C, O>(config: FeedConfig, connector: C, observer: O) -> Self
    where
        C: Connector,
        O: FeedObserver,
    {
        Self::spawn_with_metrics(config, connector, observer, None)
    }

    /// Like [`spawn`](Self::spawn), recording into `metrics`
    pub fn spawn_with_metrics<C, O>(
        config: FeedConfig,
        connector: C,
        observer: O,
        metrics: Option<Arc<FeedMetrics>>,
    ) -> Self
    where
        C: Connector,
        O: FeedObserver,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(FeedState::default());
        let last_message = Arc::new(RwLock::new(None));

        info!(
            url = %config.url,
            auto_reconnect = config.policy.auto_reconnect,
            max_retries = config.policy.max_retries,
            "Starting resilient feed"
        );

        let driver = FeedDriver {
            fsm: ConnectionFsm::new(config.policy, config.retry_backoff()),
            url: config.url,
            connector,
            observer,
            link: None,
            retry: None,
            next_token: 0,
            event_tx,
            retry_tx,
            state_tx,
            last_message: Arc::clone(&last_message),
            metrics: metrics.clone(),
        };
        let task = tokio::spawn(driver.run(command_rx, event_rx, retry_rx));

        Self {
            handle: FeedHandle {
                commands: command_tx,
                state: state_rx,
                last_message,
                metrics,
            },
            task: Some(task),
        }
    }

    pub fn handle(&self) -> FeedHandle {
        self.handle.clone()
    }

    /// Close the link, cancel any retry and wait for the driver to finish
    pub async fn shutdown(mut self) {
        let _ = self.handle.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Feed driver task failed: {}", e);
            }
        }
    }
}

impl std::ops::Deref for ResilientFeed {
    type Target = FeedHandle;

    fn deref(&self) -> &FeedHandle {
        &self.handle
    }
}

impl Drop for ResilientFeed {
    fn drop(&mut self) {
        // Handles may outlive the owner; the driver still has to stop
        let _ = self.handle.commands.send(Command::Shutdown);
    }
}

// ============================================================================
// Driver
// ============================================================================

struct FeedDriver<C, O> {
    url: String,
    connector: C,
    observer: O,
    fsm: ConnectionFsm,
    link: Option<LinkHandle>,
    retry: Option<ScheduledRetry>,
    next_token: RetryToken,
    event_tx: mpsc::UnboundedSender<(Epoch, LinkEvent)>,
    retry_tx: mpsc::UnboundedSender<RetryToken>,
    state_tx: watch::Sender<FeedState>,
    last_message: Arc<RwLock<Option<RawMessage>>>,
    metrics: Option<Arc<FeedMetrics>>,
}

impl<C: Connector, O: FeedObserver> FeedDriver<C, O> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(Epoch, LinkEvent)>,
        mut retries: mpsc::UnboundedReceiver<RetryToken>,
    ) {
        let directives = self.fsm.start();
        self.apply(directives);
        self.publish();

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some((epoch, event)) = events.recv() => self.handle_link_event(epoch, event),
                Some(token) = retries.recv() => self.handle_retry(token),
            }
            self.publish();
        }

        let directives = self.fsm.disconnect();
        self.apply(directives);
        self.publish();
        info!(url = %self.url, "Feed stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Reconnect => {
                info!(url = %self.url, "Manual reconnect requested");
                let directives = self.fsm.reconnect();
                self.apply(directives);
            }
            Command::Disconnect => {
                info!(url = %self.url, "Disconnecting; automatic reconnection disabled");
                let had_link = self.link.is_some();
                let directives = self.fsm.disconnect();
                self.apply(directives);
                if had_link {
                    self.observer.on_close();
                }
            }
            Command::Send(text) => self.transmit(text),
            Command::Shutdown => {}
        }
    }

    fn transmit(&mut self, text: String) {
        let link = match (&self.link, self.fsm.status()) {
            (Some(link), ConnectionStatus::Connected) => link,
            (_, status) => {
                // State changed between the handle's check and now
                warn!(%status, "Cannot send message: feed not connected");
                if let Some(metrics) = &self.metrics {
                    metrics.dropped_sends_total.inc();
                }
                return;
            }
        };

        if let Err(err) = link.send(text) {
            error!("Send failed: {}", err);
            if let Some(epoch) = self.fsm.live_epoch() {
                self.fsm.on_error(epoch);
            }
            self.record(|m| m.errors_total.inc());
            self.observer.on_error(&err);
        }
    }

    fn handle_link_event(&mut self, epoch: Epoch, event: LinkEvent) {
        if !self.fsm.is_current(epoch) {
            trace!(%epoch, ?event, "Ignoring event from stale link");
            return;
        }

        match event {
            LinkEvent::Opened => {
                if let Some(directives) = self.fsm.on_open(epoch) {
                    info!(url = %self.url, %epoch, "Feed connected");
                    self.record(|m| m.opens_total.inc());
                    self.apply(directives);
                    self.observer.on_open();
                }
            }
            LinkEvent::Frame(text) => self.dispatch_frame(text),
            LinkEvent::Error(reason) => {
                if let Some(directives) = self.fsm.on_error(epoch) {
                    warn!(url = %self.url, %epoch, "Feed link error: {}", reason);
                    self.record(|m| m.errors_total.inc());
                    self.apply(directives);
                    self.observer.on_error(&TransportError::Link(reason));
                }
            }
            LinkEvent::Closed => {
                let exhaustions = self.fsm.stats().exhaustions;
                if let Some(directives) = self.fsm.on_close(epoch) {
                    self.link = None;
                    info!(url = %self.url, %epoch, "Feed disconnected");
                    self.record(|m| m.closes_total.inc());
                    self.observer.on_close();
                    self.apply(directives);

                    if self.fsm.stats().exhaustions > exhaustions {
                        warn!(
                            max_retries = self.fsm.policy().max_retries,
                            "Max reconnection attempts reached; waiting for manual reconnect"
                        );
                        self.record(|m| m.retry_exhaustions_total.inc());
                    }
                }
            }
        }
    }

    fn dispatch_frame(&mut self, text: String) {
        let message = RawMessage::decode(&text);
        self.record(|m| m.frames_total.inc());
        if !message.is_structured() {
            debug!(len = text.len(), "Received non-JSON frame, passing through raw text");
            self.record(|m| m.unstructured_frames_total.inc());
        }

        self.observer.on_message(&message);
        *self.last_message.write() = Some(message);
    }

    fn handle_retry(&mut self, token: RetryToken) {
        if self.retry.as_ref().map(ScheduledRetry::token) != Some(token) {
            trace!(token, "Ignoring cancelled retry");
            return;
        }
        self.retry = None;

        debug!(attempt = self.fsm.retry_count(), "Retry timer fired");
        let directives = self.fsm.on_retry_due();
        self.apply(directives);
    }

    fn apply(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::CloseLink => {
                    if let Some(link) = self.link.take() {
                        debug!("Closing previous link");
                        link.close();
                    }
                }
                Directive::OpenLink(epoch) => self.open_link(epoch),
                Directive::ScheduleRetry { delay, attempt } => {
                    self.next_token += 1;
                    info!(
                        "Reconnecting in {:?} (attempt {}/{})",
                        delay,
                        attempt,
                        self.fsm.policy().max_retries
                    );
                    self.record(|m| m.retries_scheduled_total.inc());
                    self.retry = Some(ScheduledRetry::arm(delay, self.next_token, self.retry_tx.clone()));
                }
                Directive::CancelRetry => {
                    if let Some(retry) = self.retry.take() {
                        debug!(remaining = ?retry.remaining(), "Cancelling pending retry");
                        retry.cancel();
                    }
                }
            }
        }
    }

    fn open_link(&mut self, epoch: Epoch) {
        debug!(url = %self.url, %epoch, "Opening link");
        self.record(|m| m.connect_attempts_total.inc());

        let events = LinkEvents::new(epoch, self.event_tx.clone());
        match self.connector.open(&self.url, events) {
            Ok(link) => self.link = Some(link),
            Err(err) => {
                error!(url = %self.url, "Failed to open link: {}", err);
                if self.fsm.on_open_failed(epoch).is_some() {
                    self.record(|m| m.errors_total.inc());
                    self.observer.on_error(&err);
                }
            }
        }
    }

    fn publish(&self) {
        let state = FeedState {
            status: self.fsm.status(),
            retry_count: self.fsm.retry_count(),
        };
        self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if let Some(metrics) = &self.metrics {
            metrics.observe_state(state.status, state.retry_count);
        }
    }

    fn record(&self, f: impl FnOnce(&FeedMetrics)) {
        if let Some(metrics) = &self.metrics {
            f(metrics.as_ref());
        }
    }
}
