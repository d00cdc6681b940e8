//! Events emitted by committed bridge operations.

use crate::message::OutboundMessage;
use ferry_core::{types::short_hex, Address, Balance, Hash, Nonce, TokenId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Something that happened inside a bridge.
///
/// Events of a failed operation are discarded together with its state changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeEvent {
    /// A leaf was appended to an outbox accumulator.
    InsertToOutbox {
        token: TokenId,
        beneficiary: Address,
        root: Hash,
        index: u64,
        source_amount: Balance,
        dest_amount: Balance,
    },
    /// A transfer was appended to a queue.
    TransferQueued {
        token: TokenId,
        beneficiary: Address,
        position: usize,
        source_amount: Balance,
        dest_amount: Balance,
    },
    /// An outbox root was handed to the transport.
    RootToRemote {
        token: TokenId,
        remote_token: TokenId,
        root: Hash,
        nonce: Nonce,
        amount: Balance,
        execution_budget: u64,
    },
    /// A queued batch was handed to the transport.
    BatchToRemote {
        token: TokenId,
        remote_token: TokenId,
        items: usize,
        amount: Balance,
        execution_budget: u64,
    },
    /// The inbox accepted a newer root.
    NewInboxTreeRoot {
        token: TokenId,
        nonce: Nonce,
        root: Hash,
    },
    /// A root arrived with a nonce not above the stored one.
    StaleRootRejected {
        token: TokenId,
        nonce: Nonce,
        current_nonce: Nonce,
    },
    /// Funds delivered with a root were added to pending credit.
    CreditReceived {
        token: TokenId,
        amount: Balance,
        pending: Balance,
    },
    /// A leaf claim was settled.
    Claimed {
        token: TokenId,
        index: u64,
        beneficiary: Address,
        source_amount: Balance,
        dest_amount: Balance,
    },
    /// A queued batch from the peer was settled.
    BatchSettled {
        token: TokenId,
        items: usize,
        amount: Balance,
    },
    /// Pending credit was forwarded to accounting by an explicit call.
    PendingCreditApplied {
        token: TokenId,
        amount: Balance,
        remaining: Balance,
    },
    /// A token mapping was created, changed or disabled.
    TokenMapped {
        local_token: TokenId,
        remote_token: TokenId,
        min_execution_budget: u64,
        min_flush_amount: Balance,
    },
}

impl BridgeEvent {
    /// Builds the event for a dispatched message.
    pub(crate) fn dispatched(token: TokenId, message: &OutboundMessage, execution_budget: u64) -> Self {
        match message {
            OutboundMessage::Root(root) => BridgeEvent::RootToRemote {
                token,
                remote_token: root.token,
                root: root.root.root,
                nonce: root.root.nonce,
                amount: root.amount,
                execution_budget,
            },
            OutboundMessage::Batch(batch) => BridgeEvent::BatchToRemote {
                token,
                remote_token: batch.token,
                items: batch.items.len(),
                amount: batch.total_amount,
                execution_budget,
            },
        }
    }

    /// Short event name, as used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::InsertToOutbox { .. } => "insert_to_outbox",
            BridgeEvent::TransferQueued { .. } => "transfer_queued",
            BridgeEvent::RootToRemote { .. } => "root_to_remote",
            BridgeEvent::BatchToRemote { .. } => "batch_to_remote",
            BridgeEvent::NewInboxTreeRoot { .. } => "new_inbox_tree_root",
            BridgeEvent::StaleRootRejected { .. } => "stale_root_rejected",
            BridgeEvent::CreditReceived { .. } => "credit_received",
            BridgeEvent::Claimed { .. } => "claimed",
            BridgeEvent::BatchSettled { .. } => "batch_settled",
            BridgeEvent::PendingCreditApplied { .. } => "pending_credit_applied",
            BridgeEvent::TokenMapped { .. } => "token_mapped",
        }
    }
}

impl fmt::Display for BridgeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeEvent::InsertToOutbox { token, index, root, .. } => {
                write!(f, "{} {} #{} root {}", self.name(), short_hex(token), index, short_hex(root))
            }
            BridgeEvent::RootToRemote { token, nonce, amount, .. } => {
                write!(f, "{} {} nonce {} amount {}", self.name(), short_hex(token), nonce, amount)
            }
            BridgeEvent::NewInboxTreeRoot { token, nonce, root } => {
                write!(f, "{} {} nonce {} root {}", self.name(), short_hex(token), nonce, short_hex(root))
            }
            BridgeEvent::Claimed { token, index, beneficiary, .. } => {
                write!(f, "{} {} #{} by {}", self.name(), short_hex(token), index, short_hex(beneficiary))
            }
            other => write!(f, "{}", other.name()),
        }
    }
}
