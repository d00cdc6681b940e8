//! Replay protection for claimed leaves.

use bitvec::prelude::*;
use ferry_core::TokenId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of leaf indices covered by one chunk.
const CHUNK_BITS: u64 = 256;

/// Sparse bitset of executed leaf indices.
///
/// Indices are grouped into 256-bit chunks that are allocated on first use, so a
/// handful of claims far apart in a large tree stays small.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedSet {
    chunks: HashMap<u64, [u64; 4]>,
}

fn locate(index: u64) -> (u64, usize) {
    (index / CHUNK_BITS, (index % CHUNK_BITS) as usize)
}

impl ExecutedSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `index` was executed.
    pub fn is_set(&self, index: u64) -> bool {
        let (chunk, bit) = locate(index);
        self.chunks
            .get(&chunk)
            .map(|words| words.view_bits::<Lsb0>()[bit])
            .unwrap_or(false)
    }

    /// Marks `index` as executed. Returns false if it already was.
    pub fn set(&mut self, index: u64) -> bool {
        let (chunk, bit) = locate(index);
        let words = self.chunks.entry(chunk).or_insert([0u64; 4]);
        let bits = words.view_bits_mut::<Lsb0>();
        if bits[bit] {
            return false;
        }
        bits.set(bit, true);
        true
    }

    /// Clears a bit set by an operation that is being rolled back.
    pub(crate) fn revert(&mut self, index: u64) {
        let (chunk, bit) = locate(index);
        if let Some(words) = self.chunks.get_mut(&chunk) {
            words.view_bits_mut::<Lsb0>().set(bit, false);
            if words.iter().all(|word| *word == 0) {
                self.chunks.remove(&chunk);
            }
        }
    }

    /// Number of executed indices.
    pub fn count(&self) -> usize {
        self.chunks
            .values()
            .map(|words| words.view_bits::<Lsb0>().count_ones())
            .sum()
    }
}

/// Executed sets for every local token.
#[derive(Clone, Debug, Default)]
pub struct ReplayGuard {
    sets: HashMap<TokenId, ExecutedSet>,
}

impl ReplayGuard {
    /// Creates an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if leaf `index` of `token` was executed.
    pub fn is_executed(&self, token: &TokenId, index: u64) -> bool {
        self.sets.get(token).map(|set| set.is_set(index)).unwrap_or(false)
    }

    /// Marks leaf `index` of `token` as executed. Returns false if it already was.
    pub fn mark(&mut self, token: &TokenId, index: u64) -> bool {
        self.sets.entry(*token).or_default().set(index)
    }

    pub(crate) fn revert(&mut self, token: &TokenId, index: u64) {
        if let Some(set) = self.sets.get_mut(token) {
            set.revert(index);
        }
    }

    /// The executed set of a token, if any leaf of it was ever marked.
    pub fn set_of(&self, token: &TokenId) -> Option<&ExecutedSet> {
        self.sets.get(token)
    }

    pub(crate) fn restore(&mut self, token: TokenId, set: ExecutedSet) {
        self.sets.insert(token, set);
    }
}
