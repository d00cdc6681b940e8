//! Bounded transfer queue settled on arrival.
//!
//! Instead of a root, the whole queue travels to the peer, which mints every entry
//! directly. There is no proof or replay step on the receiving side.

use crate::config::{LedgerKind, QueueConfig};
use crate::errors::BridgeError;
use crate::events::BridgeEvent;
use crate::ledger::{require_mapping, Dispatch, OutboundTransfer, RecordOutcome, TransferLedger};
use crate::message::{BatchMessage, OutboundMessage, QueueItem};
use crate::state::TokenState;
use ferry_core::{types::short_hex, Balance, TokenId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outbound queue of one token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferQueue {
    /// Queued transfers, oldest first
    pub items: Vec<QueueItem>,
    /// Sum of the backing assets of the queued transfers
    pub total: Balance,
}

impl TransferQueue {
    /// Number of queued transfers.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ledger that queues transfers and ships them as a batch.
#[derive(Clone, Debug)]
pub struct QueuedLedger {
    config: QueueConfig,
    project_id: u64,
    peer_project_id: u64,
}

impl QueuedLedger {
    /// Creates the ledger.
    pub fn new(config: QueueConfig, project_id: u64, peer_project_id: u64) -> Self {
        Self {
            config,
            project_id,
            peer_project_id,
        }
    }
}

impl TransferLedger for QueuedLedger {
    fn kind(&self) -> LedgerKind {
        LedgerKind::Queued
    }

    fn record(&self, token: &TokenId, state: &mut TokenState, transfer: OutboundTransfer) -> Result<RecordOutcome, BridgeError> {
        let queue = &mut state.queue;
        queue.total = queue.total.checked_add(transfer.dest_amount).ok_or_else(|| {
            BridgeError::Validation(format!("queue total of {} would overflow", short_hex(token)))
        })?;
        queue.items.push(QueueItem {
            beneficiary: transfer.beneficiary,
            source_amount: transfer.source_amount,
        });

        let position = queue.items.len() - 1;
        debug!("Queued transfer #{} of {} for {}", position, short_hex(token), short_hex(&transfer.beneficiary));

        Ok(RecordOutcome {
            event: BridgeEvent::TransferQueued {
                token: *token,
                beneficiary: transfer.beneficiary,
                position,
                source_amount: transfer.source_amount,
                dest_amount: transfer.dest_amount,
            },
        })
    }

    fn take_dispatch(&self, token: &TokenId, state: &mut TokenState, _bypass_minimum: bool) -> Result<Dispatch, BridgeError> {
        let remote_token = require_mapping(token, state)?.remote_token;

        if state.queue.is_empty() {
            return Err(BridgeError::Validation(format!(
                "transfer queue of {} is empty",
                short_hex(token)
            )));
        }

        let queue = std::mem::take(&mut state.queue);
        let execution_budget = self.config.budget_for(queue.items.len());

        info!(
            "Dispatching batch of {} transfers of {}, total {}",
            queue.items.len(),
            short_hex(token),
            queue.total
        );

        Ok(Dispatch {
            message: OutboundMessage::Batch(BatchMessage {
                origin_project_id: self.project_id,
                destination_project_id: self.peer_project_id,
                token: remote_token,
                total_amount: queue.total,
                items: queue.items,
            }),
            execution_budget,
        })
    }

    fn pending_balance(&self, state: &TokenState) -> Balance {
        state.queue.total
    }

    fn has_pending(&self, state: &TokenState) -> bool {
        !state.queue.is_empty()
    }

    fn dispatch_due(&self, state: &TokenState) -> bool {
        state.queue.len() >= self.config.max_batch_size
    }
}
