//! Append-only incremental Merkle accumulator.
//!
//! Only the left frontier of the tree (one node per level) and the leaf count are
//! stored. Siblings that never received a real leaf are taken from
//! [`ZERO_HASHES`], so both `insert` and `root` cost `O(TREE_DEPTH)` hashes no matter
//! how many leaves were inserted before.

use crate::errors::CoreError;
use crate::proofs::{hash_pair, TREE_DEPTH, ZERO_HASHES};
use crate::types::{short_hex, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Maximum number of leaves an accumulator accepts.
///
/// One less than the `2^TREE_DEPTH` slots of the tree. The last index is left
/// unused on purpose.
pub const MAX_LEAVES: u64 = (1u64 << TREE_DEPTH) - 1;

/// An append-only sparse Merkle accumulator of fixed depth.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleAccumulator {
    /// Left frontier: the most recent completed subtree root at each level
    branch: [Hash; TREE_DEPTH],
    /// Number of inserted leaves
    count: u64,
}

impl Default for MerkleAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self {
            branch: [[0u8; 32]; TREE_DEPTH],
            count: 0,
        }
    }

    /// Returns the number of inserted leaves. This is also the index the next
    /// leaf will receive.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns true if no leaf has been inserted yet.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Inserts a leaf hash at the next unused index.
    ///
    /// # Returns
    ///
    /// The new root and the new leaf count, or `CoreError::TreeFull` once
    /// [`MAX_LEAVES`] leaves have been inserted.
    pub fn insert(&mut self, leaf: Hash) -> Result<(Hash, u64), CoreError> {
        if self.count >= MAX_LEAVES {
            warn!("Accumulator full at {} leaves, rejecting {}", self.count, short_hex(&leaf));
            return Err(CoreError::TreeFull {
                capacity: MAX_LEAVES,
            });
        }

        self.count += 1;
        let mut size = self.count;
        let mut node = leaf;

        for level in 0..TREE_DEPTH {
            // An odd size means this level's subtree is still open on the right:
            // park the node in the frontier and stop.
            if size & 1 == 1 {
                self.branch[level] = node;
                return Ok((self.root(), self.count));
            }
            node = hash_pair(&self.branch[level], &node);
            size >>= 1;
        }

        // Unreachable while count < 2^TREE_DEPTH, which the capacity check guarantees.
        Err(CoreError::TreeFull {
            capacity: MAX_LEAVES,
        })
    }

    /// Computes the current root.
    pub fn root(&self) -> Hash {
        let mut current = ZERO_HASHES[0];
        for level in 0..TREE_DEPTH {
            if (self.count >> level) & 1 == 1 {
                current = hash_pair(&self.branch[level], &current);
            } else {
                current = hash_pair(&current, &ZERO_HASHES[level]);
            }
        }
        current
    }
}

impl fmt::Debug for MerkleAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerkleAccumulator")
            .field("root", &short_hex(&self.root()))
            .field("count", &self.count)
            .finish()
    }
}

impl fmt::Display for MerkleAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MerkleAccumulator {{ root: {}, count: {} }}",
            short_hex(&self.root()),
            self.count
        )
    }
}
