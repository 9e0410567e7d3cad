//! Link abstraction between the feed driver and a concrete socket
//!
//! A [`Connector`] starts opening a link and returns immediately with a
//! [`LinkHandle`]; everything that happens afterwards (open, frames, error,
//! close) is reported asynchronously through [`LinkEvents`], tagged with the
//! epoch the driver assigned to that link. Dropping or closing the handle
//! tears the link down.
//!
//! ```text
//!   driver ──open(url, events)──→ Connector ──spawn──→ link task
//!     ▲                                                   │
//!     └──────────── (Epoch, LinkEvent) ◄──────────────────┘
//! ```

pub mod websocket;

pub use websocket::WsConnector;

use crate::core::{Epoch, TransportError};
use tokio::sync::{mpsc, oneshot};

/// Something that happened on a link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link is open
    Opened,
    /// One inbound text frame
    Frame(String),
    /// The link failed; a `Closed` normally follows
    Error(String),
    /// The link is gone
    Closed,
}

/// Reporting side handed to a link, stamped with its epoch
#[derive(Debug, Clone)]
pub struct LinkEvents {
    epoch: Epoch,
    tx: mpsc::UnboundedSender<(Epoch, LinkEvent)>,
}

impl LinkEvents {
    pub fn new(epoch: Epoch, tx: mpsc::UnboundedSender<(Epoch, LinkEvent)>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Report an event; false once the driver is gone
    pub fn emit(&self, event: LinkEvent) -> bool {
        self.tx.send((self.epoch, event)).is_ok()
    }
}

/// Driver-side handle of one link
///
/// Dropping it signals the link task to shut down.
#[derive(Debug)]
pub struct LinkHandle {
    outbound: mpsc::UnboundedSender<String>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Link-side counterpart of a [`LinkHandle`]
#[derive(Debug)]
pub struct LinkEndpoint {
    /// Frames the driver wants transmitted
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Resolves when the driver tears the link down
    pub shutdown: oneshot::Receiver<()>,
}

impl LinkHandle {
    /// Create a connected handle/endpoint pair
    pub fn pair() -> (LinkHandle, LinkEndpoint) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            LinkHandle {
                outbound: outbound_tx,
                shutdown: Some(shutdown_tx),
            },
            LinkEndpoint {
                outbound: outbound_rx,
                shutdown: shutdown_rx,
            },
        )
    }

    /// Queue one text frame for transmission
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .map_err(|_| TransportError::LinkClosed)
    }

    /// Tear the link down
    pub fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Opens links to a streaming endpoint
///
/// `open` must not block: it starts the work (typically by spawning a task)
/// and reports progress through `events`. An `Err` means the link could not
/// even be started.
pub trait Connector: Send + 'static {
    fn open(&mut self, url: &str, events: LinkEvents) -> Result<LinkHandle, TransportError>;
}

impl<C: Connector + ?Sized> Connector for Box<C> {
    fn open(&mut self, url: &str, events: LinkEvents) -> Result<LinkHandle, TransportError> {
        (**self).open(url, events)
    }
}
