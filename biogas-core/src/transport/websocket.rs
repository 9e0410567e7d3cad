//! WebSocket link built on tokio-tungstenite
//!
//! Each `open` spawns one task that connects, reports `Opened`, then
//! multiplexes inbound frames, outbound frames and the shutdown signal until
//! one side goes away. `wss://` endpoints need the `tls` feature.

use super::{Connector, LinkEndpoint, LinkEvent, LinkEvents, LinkHandle};
use crate::core::TransportError;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

/// Connector for `ws://` / `wss://` endpoints
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&mut self, url: &str, events: LinkEvents) -> Result<LinkHandle, TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| TransportError::Open {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let (handle, endpoint) = LinkHandle::pair();
        runtime.spawn(run_link(url.to_string(), events, endpoint));
        Ok(handle)
    }
}

async fn run_link(url: String, events: LinkEvents, endpoint: LinkEndpoint) {
    let LinkEndpoint {
        mut outbound,
        mut shutdown,
    } = endpoint;

    debug!(epoch = %events.epoch(), %url, "Opening WebSocket link");

    let socket = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => match result {
            Ok((socket, _response)) => socket,
            Err(e) => {
                events.emit(LinkEvent::Error(e.to_string()));
                events.emit(LinkEvent::Closed);
                return;
            }
        },
        _ = &mut shutdown => {
            debug!(epoch = %events.epoch(), "Link torn down while connecting");
            return;
        }
    };

    events.emit(LinkEvent::Opened);
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = sink.send(Message::Close(None)).await;
                debug!(epoch = %events.epoch(), "Link torn down");
                return;
            }
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        events.emit(LinkEvent::Error(e.to_string()));
                        events.emit(LinkEvent::Closed);
                        return;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    events.emit(LinkEvent::Frame(text));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        events.emit(LinkEvent::Frame(text));
                    }
                    Err(_) => debug!(epoch = %events.epoch(), "Skipping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(epoch = %events.epoch(), ?frame, "Server closed link");
                    events.emit(LinkEvent::Closed);
                    return;
                }
                Some(Ok(other)) => {
                    // ping/pong are answered by tungstenite
                    trace!(epoch = %events.epoch(), ?other, "Control frame");
                }
                Some(Err(e)) => {
                    events.emit(LinkEvent::Error(e.to_string()));
                    events.emit(LinkEvent::Closed);
                    return;
                }
                None => {
                    events.emit(LinkEvent::Closed);
                    return;
                }
            }
        }
    }
}
