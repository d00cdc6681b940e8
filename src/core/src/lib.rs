//! Core primitives for the Ferry bridge engine.
//!
//! This crate provides the fundamental types and operations shared by both sides of
//! a bridge: transfer leaves, the append-only Merkle accumulator that batches them,
//! fixed-depth inclusion proofs and the pure verifier used to settle claims.

pub mod accumulator;
pub mod errors;
pub mod proofs;
pub mod tree;
pub mod types;

// Re-export commonly used types
pub use accumulator::MerkleAccumulator;
pub use errors::CoreError;
pub use proofs::{branch_root, Proof, TREE_DEPTH, ZERO_HASHES};
pub use tree::ProofTree;
pub use types::{Address, Balance, Hash, Leaf, Nonce, RemoteRoot, TokenId, NATIVE_TOKEN, ZERO_ADDRESS};
