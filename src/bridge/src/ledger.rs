//! Outbound transfer strategies.
//!
//! A bridge is deployed with exactly one [`TransferLedger`]: the Merkle accumulator
//! in [`crate::outbox`] or the bounded queue in [`crate::queue`]. Both turn prepared
//! transfers into messages for the peer; the receiving side accepts either kind.

use crate::config::{BridgeConfig, LedgerKind};
use crate::errors::BridgeError;
use crate::events::BridgeEvent;
use crate::message::OutboundMessage;
use crate::outbox::AccumulatorLedger;
use crate::queue::QueuedLedger;
use crate::state::{TokenMapping, TokenState};
use ferry_core::{Address, Balance, TokenId};

/// A prepared transfer, after redemption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundTransfer {
    /// Recipient on the peer ledger
    pub beneficiary: Address,
    /// Project tokens redeemed on this ledger
    pub source_amount: Balance,
    /// Backing assets released by the redemption
    pub dest_amount: Balance,
}

/// A message ready to be handed to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatch {
    /// The message
    pub message: OutboundMessage,
    /// Execution budget to request on the peer ledger
    pub execution_budget: u64,
}

/// Result of recording a transfer.
#[derive(Clone, Debug)]
pub struct RecordOutcome {
    /// Event describing the recorded transfer
    pub event: BridgeEvent,
}

/// Tracks outbound transfers of every token and packs them into messages.
pub trait TransferLedger: Send + Sync {
    /// The strategy implemented.
    fn kind(&self) -> LedgerKind;

    /// Records a transfer of `token`. Nothing is sent; see [`Self::dispatch_due`].
    fn record(&self, token: &TokenId, state: &mut TokenState, transfer: OutboundTransfer) -> Result<RecordOutcome, BridgeError>;

    /// Packs everything pending for `token` into a message and resets the pending
    /// side of `state`.
    ///
    /// `bypass_minimum` skips the mapping's minimum flush amount; it is used when
    /// the bridge dispatches on its own.
    fn take_dispatch(&self, token: &TokenId, state: &mut TokenState, bypass_minimum: bool) -> Result<Dispatch, BridgeError>;

    /// Backing assets waiting to be sent.
    fn pending_balance(&self, state: &TokenState) -> Balance;

    /// Returns true if anything is waiting to be sent.
    fn has_pending(&self, state: &TokenState) -> bool;

    /// Returns true if the bridge should send the pending transfers without
    /// waiting for a flush.
    fn dispatch_due(&self, _state: &TokenState) -> bool {
        false
    }
}

/// Builds the ledger selected by the configuration.
pub fn from_config(config: &BridgeConfig) -> Box<dyn TransferLedger> {
    match config.ledger {
        LedgerKind::Accumulator => Box::new(AccumulatorLedger::new()),
        LedgerKind::Queued => Box::new(QueuedLedger::new(
            config.queue.clone(),
            config.project_id,
            config.peer_project_id,
        )),
    }
}

/// Returns the enabled mapping of a token or a validation error.
pub(crate) fn require_mapping<'a>(token: &TokenId, state: &'a TokenState) -> Result<&'a TokenMapping, BridgeError> {
    state.active_mapping().ok_or_else(|| {
        BridgeError::Validation(format!(
            "token {} is not mapped",
            ferry_core::types::short_hex(token)
        ))
    })
}
