//! Programmable connector for driving a feed without a network
//!
//! Every `open` records a link; the test then plays the server's part by
//! emitting events on it and inspects what the driver sent or tore down.

use crate::core::TransportError;
use crate::transport::{Connector, LinkEndpoint, LinkEvent, LinkEvents, LinkHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot::error::TryRecvError;

struct MockLink {
    url: String,
    events: LinkEvents,
    endpoint: LinkEndpoint,
    sent: Vec<String>,
    torn_down: bool,
}

impl MockLink {
    fn poll(&mut self) {
        while let Ok(text) = self.endpoint.outbound.try_recv() {
            self.sent.push(text);
        }
        if !self.torn_down {
            self.torn_down = !matches!(self.endpoint.shutdown.try_recv(), Err(TryRecvError::Empty));
        }
    }
}

#[derive(Default)]
struct MockState {
    links: Vec<MockLink>,
    refusals: Vec<String>,
    refused: usize,
}

/// Mock implementation of [`Connector`]; clones share the same links
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail synchronously with `reason`
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.state.lock().refusals.push(reason.into());
    }

    /// Links opened so far (refused opens excluded)
    pub fn open_count(&self) -> usize {
        self.state.lock().links.len()
    }

    /// Opens that were refused
    pub fn refused_count(&self) -> usize {
        self.state.lock().refused
    }

    /// Links not yet torn down by the driver
    pub fn live_count(&self) -> usize {
        let mut state = self.state.lock();
        state.links.iter_mut().for_each(MockLink::poll);
        state.links.iter().filter(|link| !link.torn_down).count()
    }

    pub fn url(&self, index: usize) -> Option<String> {
        self.state.lock().links.get(index).map(|link| link.url.clone())
    }

    /// Emit an event on link `index`; false if no such link or the driver is gone
    pub fn emit(&self, index: usize, event: LinkEvent) -> bool {
        self.state
            .lock()
            .links
            .get(index)
            .map_or(false, |link| link.events.emit(event))
    }

    /// Emit an event on the most recently opened link
    pub fn emit_latest(&self, event: LinkEvent) -> bool {
        let state = self.state.lock();
        state.links.last().map_or(false, |link| link.events.emit(event))
    }

    /// Open then deliver `frame` on the most recent link
    pub fn open_latest_with(&self, frame: impl Into<String>) -> bool {
        self.emit_latest(LinkEvent::Opened) && self.emit_latest(LinkEvent::Frame(frame.into()))
    }

    /// Frames the driver transmitted on link `index`
    pub fn sent(&self, index: usize) -> Vec<String> {
        let mut state = self.state.lock();
        match state.links.get_mut(index) {
            Some(link) => {
                link.poll();
                link.sent.clone()
            }
            None => Vec::new(),
        }
    }

    /// True once the driver closed or dropped link `index`
    pub fn is_torn_down(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        match state.links.get_mut(index) {
            Some(link) => {
                link.poll();
                link.torn_down
            }
            None => false,
        }
    }
}

impl Connector for MockConnector {
    fn open(&mut self, url: &str, events: LinkEvents) -> Result<LinkHandle, TransportError> {
        let mut state = self.state.lock();
        if !state.refusals.is_empty() {
            let reason = state.refusals.remove(0);
            state.refused += 1;
            return Err(TransportError::Open {
                url: url.to_string(),
                reason,
            });
        }

        let (handle, endpoint) = LinkHandle::pair();
        state.links.push(MockLink {
            url: url.to_string(),
            events,
            endpoint,
            sent: Vec::new(),
            torn_down: false,
        });
        Ok(handle)
    }
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("open_count", &self.open_count())
            .finish()
    }
}
