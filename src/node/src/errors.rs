//! Error types for the node.

use ferry_bridge::errors::BridgeError;
use ferry_core::errors::CoreError;
use std::error::Error as StdError;
use std::fmt;

/// Errors that can occur in the node.
#[derive(Debug)]
pub enum NodeError {
    /// Error raised by a bridge operation.
    BridgeError(BridgeError),

    /// Error when a core operation fails.
    CoreError(CoreError),

    /// Error when relaying envelopes or claims between the two sides.
    RelayError(String),

    /// Error when a metrics operation fails.
    MetricsError(String),

    /// Error when a configuration operation fails.
    ConfigError(String),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::BridgeError(e) => write!(f, "Bridge error: {}", e),
            NodeError::CoreError(e) => write!(f, "Core error: {}", e),
            NodeError::RelayError(msg) => write!(f, "Relay error: {}", msg),
            NodeError::MetricsError(msg) => write!(f, "Metrics error: {}", msg),
            NodeError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl StdError for NodeError {}

impl From<BridgeError> for NodeError {
    fn from(error: BridgeError) -> Self {
        NodeError::BridgeError(error)
    }
}

impl From<CoreError> for NodeError {
    fn from(error: CoreError) -> Self {
        NodeError::CoreError(error)
    }
}
