//! Error types for the bridge crate.

use ferry_core::{errors::CoreError, types::short_hex, Balance, TokenId};
use thiserror::Error;

/// Errors that can occur in the bridge crate.
///
/// Every operation that returns one of these leaves the bridge state exactly as it
/// was before the call.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The caller or the inbound peer is not allowed to perform the operation.
    #[error("Unauthorized: {0}")]
    Authorization(String),

    /// Malformed input: null beneficiary, unmapped token, amount below minimum...
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A Merkle proof does not lead to the stored inbox root.
    #[error("INVALID_PROOF: leaf {index} of token {} does not match the inbox root", short_hex(.token))]
    Proof {
        /// The local token
        token: TokenId,
        /// The claimed leaf index
        index: u64,
    },

    /// The leaf was already settled.
    #[error("LEAF_ALREADY_EXECUTED: leaf {index} of token {}", short_hex(.token))]
    Replay {
        /// The local token
        token: TokenId,
        /// The claimed leaf index
        index: u64,
    },

    /// A budget, credit or payment is smaller than what the operation needs.
    #[error("Insufficient {resource}: required {required}, available {available}")]
    InsufficientResource {
        /// What ran short
        resource: &'static str,
        /// The amount needed
        required: u128,
        /// The amount at hand
        available: u128,
    },

    /// The operation is not available in the configured mode.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The accounting backend reported a balance change that differs from the
    /// amount forwarded to it.
    #[error("Balance mismatch on {}: forwarded {expected}, observed {observed}", short_hex(.token))]
    BalanceMismatch {
        /// The token whose balance was checked
        token: TokenId,
        /// The forwarded amount
        expected: Balance,
        /// The observed balance delta
        observed: Balance,
    },

    /// Error raised by the accounting backend.
    #[error("Accounting backend error: {0}")]
    Backend(String),

    /// Error raised by the transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error when a storage operation fails.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error when serialization or deserialization fails.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the core primitives.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<rocksdb::Error> for BridgeError {
    fn from(err: rocksdb::Error) -> Self {
        BridgeError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for BridgeError {
    fn from(err: bincode::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}
