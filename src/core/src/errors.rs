//! Error types for the core crate.

use thiserror::Error;

/// Errors that can occur in the core crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A proof did not carry exactly one sibling per tree level.
    #[error("Proof length mismatch: expected {expected} siblings, got {actual}")]
    ProofLengthMismatch {
        /// The tree depth
        expected: usize,
        /// The number of siblings supplied
        actual: usize,
    },

    /// The accumulator has no free index left.
    #[error("Merkle accumulator is full ({capacity} leaves)")]
    TreeFull {
        /// The maximum number of leaves
        capacity: u64,
    },

    /// A leaf index outside the populated part of a tree was requested.
    #[error("Leaf index {index} out of range (tree has {count} leaves)")]
    IndexOutOfRange {
        /// The requested index
        index: u64,
        /// The number of leaves in the tree
        count: u64,
    },
}
