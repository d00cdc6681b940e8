//! Messages exchanged between peer bridges.

use ferry_core::{types::short_hex, Address, Balance, Hash, Leaf, Proof, RemoteRoot, TokenId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one bridge instance: the ledger it lives on and its address there.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Ledger (chain) identifier
    pub chain_id: u64,
    /// Address of the bridge on that ledger
    #[serde(with = "crate::config::hex_address")]
    pub bridge: Address,
}

/// An outbox snapshot sent by the accumulator ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMessage {
    /// The token as known on the receiving ledger
    pub token: TokenId,
    /// Backing assets carried with the message
    pub amount: Balance,
    /// The outbox root and the nonce it was taken at
    pub root: RemoteRoot,
}

/// One transfer carried by a queued batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Recipient on the destination ledger
    pub beneficiary: Address,
    /// Project tokens to mint for the recipient
    pub source_amount: Balance,
}

/// A whole transfer queue sent by the queued ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMessage {
    /// Project on the sending ledger
    pub origin_project_id: u64,
    /// Project on the receiving ledger
    pub destination_project_id: u64,
    /// The token as known on the receiving ledger
    pub token: TokenId,
    /// Backing assets carried with the message
    pub total_amount: Balance,
    /// Transfers to settle, in order
    pub items: Vec<QueueItem>,
}

/// Payload of an envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutboundMessage {
    /// Accumulator root snapshot
    Root(RootMessage),
    /// Queued transfer batch
    Batch(BatchMessage),
}

impl OutboundMessage {
    /// The token the message credits on the receiving ledger.
    pub fn token(&self) -> &TokenId {
        match self {
            OutboundMessage::Root(message) => &message.token,
            OutboundMessage::Batch(message) => &message.token,
        }
    }

    /// Backing assets carried with the message.
    pub fn amount(&self) -> Balance {
        match self {
            OutboundMessage::Root(message) => message.amount,
            OutboundMessage::Batch(message) => message.total_amount,
        }
    }
}

/// A transport frame: who sent the message and how much execution it pays for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The sending bridge
    pub origin: PeerIdentity,
    /// Execution budget requested for the receiving side
    pub execution_budget: u64,
    /// The payload
    pub message: OutboundMessage,
}

/// A claim for one leaf of a remote outbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// The local token the leaf is settled in
    pub token: TokenId,
    /// The leaf being claimed
    pub leaf: Leaf,
    /// Inclusion proof of the leaf under the current inbox root
    pub proof: Proof,
}

impl Claim {
    /// Creates a new claim.
    pub fn new(token: TokenId, leaf: Leaf, proof: Proof) -> Self {
        Self { token, leaf, proof }
    }

    /// Hash of the claimed leaf.
    pub fn leaf_hash(&self) -> Hash {
        self.leaf.hash()
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", short_hex(&self.bridge), self.chain_id)
    }
}

impl fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundMessage::Root(message) => write!(
                f,
                "Root {{ token: {}, amount: {}, nonce: {}, root: {} }}",
                short_hex(&message.token),
                message.amount,
                message.root.nonce,
                short_hex(&message.root.root)
            ),
            OutboundMessage::Batch(message) => write!(
                f,
                "Batch {{ token: {}, total_amount: {}, items: {} }}",
                short_hex(&message.token),
                message.total_amount,
                message.items.len()
            ),
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Claim {{ token: {}, leaf: {} }}", short_hex(&self.token), self.leaf)
    }
}
