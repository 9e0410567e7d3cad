//! Testing utilities and mocks for integration tests
//!
//! Provides mock implementations and test helpers for:
//! - MockConnector: programmable link source for driving a feed offline
//! - Batch builders in the backend's wire shape
//! - Fixed instants for timestamp assertions

pub mod helpers;
pub mod mock_connector;

pub use helpers::*;
pub use mock_connector::MockConnector;
