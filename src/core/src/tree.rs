//! Full leaf history for building inclusion proofs.
//!
//! The accumulator keeps only its frontier, so it cannot answer "what is the path
//! of leaf `i`". Claimants and relayers rebuild a `ProofTree` from the insertion
//! events of an outbox and ask it for proofs against the latest root.

use crate::accumulator::MAX_LEAVES;
use crate::errors::CoreError;
use crate::proofs::{hash_pair, Proof, TREE_DEPTH, ZERO_HASHES};
use crate::types::Hash;

/// A Merkle tree that retains every leaf hash.
#[derive(Clone, Debug, Default)]
pub struct ProofTree {
    leaves: Vec<Hash>,
}

impl ProofTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    /// Creates a tree from leaf hashes in insertion order.
    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        Self { leaves }
    }

    /// Appends a leaf hash and returns its index.
    pub fn push(&mut self, leaf: Hash) -> Result<u64, CoreError> {
        let index = self.leaves.len() as u64;
        if index >= MAX_LEAVES {
            return Err(CoreError::TreeFull {
                capacity: MAX_LEAVES,
            });
        }
        self.leaves.push(leaf);
        Ok(index)
    }

    /// Returns the number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Returns true if the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Computes the root over all leaves, padding with empty subtrees.
    pub fn root(&self) -> Hash {
        let mut layer = self.leaves.clone();
        for level in 0..TREE_DEPTH {
            if layer.is_empty() {
                return empty_root_from(level);
            }
            layer = next_layer(&layer, level);
        }
        layer[0]
    }

    /// Builds the inclusion proof of the leaf at `index` against the current root.
    pub fn proof(&self, index: u64) -> Result<Proof, CoreError> {
        let count = self.leaves.len() as u64;
        if index >= count {
            return Err(CoreError::IndexOutOfRange { index, count });
        }

        let mut siblings = [[0u8; 32]; TREE_DEPTH];
        let mut layer = self.leaves.clone();
        let mut position = index as usize;

        for (level, sibling) in siblings.iter_mut().enumerate() {
            *sibling = layer
                .get(position ^ 1)
                .copied()
                .unwrap_or(ZERO_HASHES[level]);
            layer = next_layer(&layer, level);
            position >>= 1;
        }

        Ok(Proof::new(siblings))
    }
}

/// Hashes one layer into its parent layer. A trailing unpaired node is paired with
/// the empty subtree of its level.
fn next_layer(layer: &[Hash], level: usize) -> Vec<Hash> {
    layer
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [left] => hash_pair(left, &ZERO_HASHES[level]),
            _ => unreachable!("chunks(2) yields one or two nodes"),
        })
        .collect()
}

/// Root of a subtree that is empty from `level` upwards.
fn empty_root_from(level: usize) -> Hash {
    let mut current = ZERO_HASHES[level];
    for zero in ZERO_HASHES.iter().skip(level) {
        current = hash_pair(&current, zero);
    }
    current
}
