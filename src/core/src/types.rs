//! Core types for the Ferry bridge engine.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte identity: account, token or bridge contract.
pub type Address = [u8; 32];

/// Token identifier. Tokens are addressed like any other identity.
pub type TokenId = Address;

/// Token amount, represented as a 128-bit unsigned integer.
pub type Balance = u128;

/// Snapshot counter of an outbox, strictly increasing per flush.
pub type Nonce = u64;

/// Type alias for a hash value (32 bytes)
pub type Hash = [u8; 32];

/// The null identity. A zero remote token means "not mapped".
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Reserved identity of the chain's native asset.
pub const NATIVE_TOKEN: TokenId = [0xEE; 32];

/// Domain separator mixed into every leaf hash.
const LEAF_DOMAIN: &[u8] = b"ferry/leaf/v1";

/// One outbound transfer recorded in an outbox accumulator.
///
/// `index` is the leaf's position in the accumulator at insertion time. It is not
/// part of the hash; the position is proven by the path instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    /// Position of the leaf in the accumulator
    pub index: u64,
    /// Recipient on the destination ledger
    pub beneficiary: Address,
    /// Project tokens given up on the origin ledger
    pub source_amount: Balance,
    /// Backing assets carried to the destination ledger
    pub dest_amount: Balance,
}

impl Leaf {
    /// Creates a new leaf.
    pub fn new(index: u64, beneficiary: Address, source_amount: Balance, dest_amount: Balance) -> Self {
        Self {
            index,
            beneficiary,
            source_amount,
            dest_amount,
        }
    }

    /// Computes the hash of this leaf.
    ///
    /// Both the accumulator and the claim verifier go through this function, so the
    /// field order here is part of the wire contract between peers.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(LEAF_DOMAIN);

        let mut amount_bytes = [0u8; 16];
        BigEndian::write_u128(&mut amount_bytes, self.source_amount);
        hasher.update(amount_bytes);

        BigEndian::write_u128(&mut amount_bytes, self.dest_amount);
        hasher.update(amount_bytes);

        hasher.update(self.beneficiary);

        hasher.finalize().into()
    }
}

/// A root snapshot of a remote outbox, as stored by the local inbox.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRoot {
    /// The outbox nonce the root was taken at
    pub nonce: Nonce,
    /// The accumulator root
    pub root: Hash,
}

/// Abbreviated hex rendering used in logs and `Display` impls.
pub fn short_hex(bytes: &[u8]) -> String {
    let encoded = hex::encode(bytes);
    if encoded.len() > 12 {
        format!("0x{}…", &encoded[..12])
    } else {
        format!("0x{}", encoded)
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Leaf {{ index: {}, beneficiary: {}, source_amount: {}, dest_amount: {} }}",
            self.index,
            short_hex(&self.beneficiary),
            self.source_amount,
            self.dest_amount
        )
    }
}

impl fmt::Display for RemoteRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteRoot {{ nonce: {}, root: {} }}", self.nonce, short_hex(&self.root))
    }
}
