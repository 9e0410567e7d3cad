//! Domain-specific error types for the telemetry feed
//!
//! None of these ever cross into consumer code as a panic: transport errors
//! are delivered to [`FeedObserver::on_error`](crate::resilience::FeedObserver)
//! and reflected in the connection status, endpoint errors surface while
//! loading configuration.

use thiserror::Error;

/// Failures of the streaming link
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connector refused to start opening a link
    #[error("failed to open link to {url}: {reason}")]
    Open {
        /// Endpoint that was being opened
        url: String,
        /// Connector-provided reason
        reason: String,
    },

    /// The link reported an I/O or protocol error
    #[error("link error: {0}")]
    Link(String),

    /// The link's outbound channel is gone
    #[error("link closed before the message could be delivered")]
    LinkClosed,
}

/// Failures while resolving the streaming endpoint URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// Neither a base URL nor an origin was configured
    #[error("no streaming endpoint configured (set feed.base_url or feed.origin)")]
    Missing,

    /// The origin uses a scheme with no streaming counterpart
    #[error("unsupported scheme in '{0}', expected http, https, ws or wss")]
    UnsupportedScheme(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_display() {
        let err = TransportError::Open {
            url: "ws://plant.local/ws/dataSensor/".to_string(),
            reason: "runtime unavailable".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ws://plant.local"));
        assert!(msg.contains("runtime unavailable"));
    }

    #[test]
    fn test_endpoint_error_display() {
        let err = EndpointError::UnsupportedScheme("ftp://plant".to_string());
        assert!(err.to_string().contains("ftp://plant"));
    }
}
