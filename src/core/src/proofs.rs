//! Fixed-depth Merkle inclusion proofs for the outbox accumulator.

use crate::errors::CoreError;
use crate::types::{short_hex, Hash};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Depth of every accumulator, giving room for `2^32` leaves.
pub const TREE_DEPTH: usize = 32;

/// Roots of empty subtrees: `ZERO_HASHES[0]` is the empty leaf and
/// `ZERO_HASHES[i + 1] = H(ZERO_HASHES[i] || ZERO_HASHES[i])`.
pub const ZERO_HASHES: [Hash; TREE_DEPTH] = compute_zero_hashes();

/// Computes the zero hashes for each level of the tree at compile time.
pub const fn compute_zero_hashes() -> [Hash; TREE_DEPTH] {
    let mut hashes = [[0u8; 32]; TREE_DEPTH];
    let mut level = 1;
    while level < TREE_DEPTH {
        hashes[level] = sha256_pair_const(&hashes[level - 1], &hashes[level - 1]);
        level += 1;
    }
    hashes
}

// SHA-256 initial hash values (first 32 bits of the fractional parts of the square roots of the first 8 primes)
const H_INIT: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

// SHA-256 round constants
const K: [u32; 64] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2,
];

/// Runs the SHA-256 compression function over one 64-byte block.
const fn compress(state: [u32; 8], block: &[u8; 64]) -> [u32; 8] {
    // Prepare the message schedule
    let mut w = [0u32; 64];
    let mut t = 0;
    while t < 16 {
        let j = t * 4;
        w[t] = ((block[j] as u32) << 24)
            | ((block[j + 1] as u32) << 16)
            | ((block[j + 2] as u32) << 8)
            | (block[j + 3] as u32);
        t += 1;
    }
    while t < 64 {
        let s0 = w[t - 15].rotate_right(7) ^ w[t - 15].rotate_right(18) ^ (w[t - 15] >> 3);
        let s1 = w[t - 2].rotate_right(17) ^ w[t - 2].rotate_right(19) ^ (w[t - 2] >> 10);
        w[t] = w[t - 16].wrapping_add(s0).wrapping_add(w[t - 7]).wrapping_add(s1);
        t += 1;
    }

    let mut a = state[0];
    let mut b = state[1];
    let mut c = state[2];
    let mut d = state[3];
    let mut e = state[4];
    let mut f = state[5];
    let mut g = state[6];
    let mut h = state[7];

    t = 0;
    while t < 64 {
        let s1 = e.rotate_right(6) ^ e.rotate_right(11) ^ e.rotate_right(25);
        let ch = (e & f) ^ ((!e) & g);
        let temp1 = h.wrapping_add(s1).wrapping_add(ch).wrapping_add(K[t]).wrapping_add(w[t]);
        let s0 = a.rotate_right(2) ^ a.rotate_right(13) ^ a.rotate_right(22);
        let maj = (a & b) ^ (a & c) ^ (b & c);
        let temp2 = s0.wrapping_add(maj);

        h = g;
        g = f;
        f = e;
        e = d.wrapping_add(temp1);
        d = c;
        c = b;
        b = a;
        a = temp1.wrapping_add(temp2);

        t += 1;
    }

    [
        state[0].wrapping_add(a),
        state[1].wrapping_add(b),
        state[2].wrapping_add(c),
        state[3].wrapping_add(d),
        state[4].wrapping_add(e),
        state[5].wrapping_add(f),
        state[6].wrapping_add(g),
        state[7].wrapping_add(h),
    ]
}

/// SHA-256 of `left || right`, usable in const context.
///
/// A 64-byte message takes two blocks: the data itself and a padding block that
/// only carries the `0x80` marker and the 512-bit message length.
pub const fn sha256_pair_const(left: &Hash, right: &Hash) -> Hash {
    let mut block = [0u8; 64];
    let mut i = 0;
    while i < 32 {
        block[i] = left[i];
        block[32 + i] = right[i];
        i += 1;
    }
    let state = compress(H_INIT, &block);

    let mut padding = [0u8; 64];
    padding[0] = 0x80;
    padding[62] = 0x02;
    let state = compress(state, &padding);

    // Produce the final hash value (big-endian)
    let mut result = [0u8; 32];
    i = 0;
    while i < 8 {
        result[i * 4] = (state[i] >> 24) as u8;
        result[i * 4 + 1] = (state[i] >> 16) as u8;
        result[i * 4 + 2] = (state[i] >> 8) as u8;
        result[i * 4 + 3] = state[i] as u8;
        i += 1;
    }
    result
}

/// Hashes an ordered pair of nodes into their parent.
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Recomputes a root from a leaf hash, its sibling path and its index.
///
/// Bit `i` of `index` decides the side at depth `i`: a set bit means the running
/// node is a right child. No stored state is consulted.
pub fn branch_root(item: Hash, branch: &[Hash; TREE_DEPTH], index: u64) -> Hash {
    let mut current = item;
    for (level, sibling) in branch.iter().enumerate() {
        if (index >> level) & 1 == 1 {
            current = hash_pair(sibling, &current);
        } else {
            current = hash_pair(&current, sibling);
        }
    }
    current
}

/// A Merkle inclusion proof: exactly one sibling hash per tree level, leaf first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof(pub [Hash; TREE_DEPTH]);

impl Proof {
    /// Creates a proof from a full sibling path.
    pub fn new(siblings: [Hash; TREE_DEPTH]) -> Self {
        Self(siblings)
    }

    /// The sibling hashes, leaf level first.
    pub fn siblings(&self) -> &[Hash; TREE_DEPTH] {
        &self.0
    }

    /// Computes the root this proof commits `leaf_hash` at `index` to.
    pub fn compute_root(&self, leaf_hash: Hash, index: u64) -> Hash {
        branch_root(leaf_hash, &self.0, index)
    }

    /// Verifies that `leaf_hash` sits at `index` under `root`.
    pub fn verify(&self, leaf_hash: Hash, index: u64, root: Hash) -> bool {
        self.compute_root(leaf_hash, index) == root
    }
}

impl TryFrom<Vec<Hash>> for Proof {
    type Error = CoreError;

    fn try_from(siblings: Vec<Hash>) -> Result<Self, Self::Error> {
        let actual = siblings.len();
        let siblings: [Hash; TREE_DEPTH] = siblings
            .try_into()
            .map_err(|_| CoreError::ProofLengthMismatch {
                expected: TREE_DEPTH,
                actual,
            })?;
        Ok(Self(siblings))
    }
}

impl From<Proof> for Vec<Hash> {
    fn from(proof: Proof) -> Self {
        proof.0.to_vec()
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Proof {{ siblings: {} hashes, first: {} }}",
            self.0.len(),
            short_hex(&self.0[0])
        )
    }
}
