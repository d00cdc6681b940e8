//! Merkle accumulator outbox.

use crate::config::LedgerKind;
use crate::errors::BridgeError;
use crate::events::BridgeEvent;
use crate::ledger::{require_mapping, Dispatch, OutboundTransfer, RecordOutcome, TransferLedger};
use crate::message::{OutboundMessage, RootMessage};
use crate::state::TokenState;
use ferry_core::{types::short_hex, Balance, Leaf, MerkleAccumulator, Nonce, RemoteRoot, TokenId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outbound accumulator of one token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxTree {
    /// Number of roots sent so far
    pub nonce: Nonce,
    /// Backing assets inserted since the last dispatch
    pub balance: Balance,
    /// The accumulator
    pub tree: MerkleAccumulator,
}

impl OutboxTree {
    /// Current accumulator root.
    pub fn root(&self) -> ferry_core::Hash {
        self.tree.root()
    }

    /// Number of leaves inserted.
    pub fn count(&self) -> u64 {
        self.tree.count()
    }
}

/// Ledger that appends transfers to a per-token accumulator and sends its root.
#[derive(Clone, Debug, Default)]
pub struct AccumulatorLedger;

impl AccumulatorLedger {
    /// Creates the ledger.
    pub fn new() -> Self {
        Self
    }
}

impl TransferLedger for AccumulatorLedger {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Accumulator
    }

    fn record(&self, token: &TokenId, state: &mut TokenState, transfer: OutboundTransfer) -> Result<RecordOutcome, BridgeError> {
        let outbox = &mut state.outbox;
        let balance = outbox.balance.checked_add(transfer.dest_amount).ok_or_else(|| {
            BridgeError::Validation(format!("outbox balance of {} would overflow", short_hex(token)))
        })?;

        let leaf = Leaf::new(
            outbox.tree.count(),
            transfer.beneficiary,
            transfer.source_amount,
            transfer.dest_amount,
        );
        let (root, _) = outbox.tree.insert(leaf.hash())?;
        outbox.balance = balance;

        debug!("Inserted {} into outbox of {}, root {}", leaf, short_hex(token), short_hex(&root));

        Ok(RecordOutcome {
            event: BridgeEvent::InsertToOutbox {
                token: *token,
                beneficiary: leaf.beneficiary,
                root,
                index: leaf.index,
                source_amount: leaf.source_amount,
                dest_amount: leaf.dest_amount,
            },
        })
    }

    fn take_dispatch(&self, token: &TokenId, state: &mut TokenState, bypass_minimum: bool) -> Result<Dispatch, BridgeError> {
        let mapping = require_mapping(token, state)?.clone();
        let outbox = &mut state.outbox;

        if !bypass_minimum && outbox.balance < mapping.min_flush_amount {
            return Err(BridgeError::Validation(format!(
                "pending balance {} of {} is below the minimum flush amount {}",
                outbox.balance,
                short_hex(token),
                mapping.min_flush_amount
            )));
        }

        let amount = outbox.balance;
        outbox.balance = 0;
        outbox.nonce += 1;

        let root = RemoteRoot {
            nonce: outbox.nonce,
            root: outbox.tree.root(),
        };

        info!(
            "Flushing outbox of {}: nonce {}, {} leaves, amount {}",
            short_hex(token),
            root.nonce,
            outbox.tree.count(),
            amount
        );

        Ok(Dispatch {
            message: OutboundMessage::Root(RootMessage {
                token: mapping.remote_token,
                amount,
                root,
            }),
            execution_budget: mapping.min_execution_budget,
        })
    }

    fn pending_balance(&self, state: &TokenState) -> Balance {
        state.outbox.balance
    }

    fn has_pending(&self, state: &TokenState) -> bool {
        state.outbox.balance > 0
    }
}
