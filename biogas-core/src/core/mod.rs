//! Core types for the telemetry feed
//!
//! - `connection_fsm`: socket-free connection lifecycle state machine
//! - `errors`: transport and endpoint error types

pub mod connection_fsm;
pub mod errors;

// Re-export commonly used types
pub use connection_fsm::{
    ConnectionFsm, ConnectionStats, ConnectionStatus, Directive, Epoch, ReconnectPolicy,
};
pub use errors::{EndpointError, TransportError};
