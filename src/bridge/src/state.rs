//! Per-token bridge state and the rollback checkpoint.

use crate::events::BridgeEvent;
use crate::outbox::OutboxTree;
use crate::queue::TransferQueue;
use crate::replay::ReplayGuard;
use ferry_core::{types::short_hex, Balance, RemoteRoot, TokenId, ZERO_ADDRESS};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// How a local token is carried to the peer ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMapping {
    /// The token on this ledger
    pub local_token: TokenId,
    /// The token on the peer ledger; the zero address disables bridging
    pub remote_token: TokenId,
    /// Execution budget attached to every dispatch of this token
    pub min_execution_budget: u64,
    /// Smallest pending balance an explicit flush may send
    pub min_flush_amount: Balance,
}

impl TokenMapping {
    /// Creates a mapping.
    pub fn new(local_token: TokenId, remote_token: TokenId, min_execution_budget: u64, min_flush_amount: Balance) -> Self {
        Self {
            local_token,
            remote_token,
            min_execution_budget,
            min_flush_amount,
        }
    }

    /// Returns true if the mapping points at a remote token.
    pub fn is_enabled(&self) -> bool {
        self.remote_token != ZERO_ADDRESS
    }
}

impl fmt::Display for TokenMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} (budget {}, min flush {})",
            short_hex(&self.local_token),
            short_hex(&self.remote_token),
            self.min_execution_budget,
            self.min_flush_amount
        )
    }
}

/// Everything the bridge tracks for one local token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    /// Current mapping, if the token was ever mapped
    pub mapping: Option<TokenMapping>,
    /// Outbound accumulator
    pub outbox: OutboxTree,
    /// Outbound queue
    pub queue: TransferQueue,
    /// Latest root received from the peer
    pub inbox: RemoteRoot,
    /// Funds received from the peer, not yet applied to accounting
    pub pending_credit: Balance,
}

impl TokenState {
    /// The enabled mapping of this token, if any.
    pub fn active_mapping(&self) -> Option<&TokenMapping> {
        self.mapping.as_ref().filter(|mapping| mapping.is_enabled())
    }
}

/// All per-token state of a bridge instance.
#[derive(Clone, Debug, Default)]
pub struct BridgeState {
    tokens: HashMap<TokenId, TokenState>,
}

impl BridgeState {
    /// Creates empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `token`, if it was ever touched.
    pub fn get(&self, token: &TokenId) -> Option<&TokenState> {
        self.tokens.get(token)
    }

    /// Mutable state of `token`, created on first touch.
    pub fn entry(&mut self, token: &TokenId) -> &mut TokenState {
        self.tokens.entry(*token).or_default()
    }

    /// Iterates over all touched tokens.
    pub fn iter(&self) -> impl Iterator<Item = (&TokenId, &TokenState)> {
        self.tokens.iter()
    }

    pub(crate) fn insert(&mut self, token: TokenId, state: TokenState) {
        self.tokens.insert(token, state);
    }

    fn restore(&mut self, token: TokenId, snapshot: Option<TokenState>) {
        match snapshot {
            Some(state) => {
                self.tokens.insert(token, state);
            }
            None => {
                self.tokens.remove(&token);
            }
        }
    }
}

/// Record of everything an in-flight operation changed, used to undo it.
///
/// Token state is snapshotted on first touch. Replay bits are undone one by one
/// since executed sets can grow large.
///
/// Once an operation has caused an effect outside the bridge (a message sent, a
/// mint or credit applied) it seals its checkpoint. A sealed checkpoint is
/// committed even if the operation fails afterwards.
#[derive(Debug, Default)]
pub struct Checkpoint {
    tokens: HashMap<TokenId, Option<TokenState>>,
    executed: Vec<(TokenId, u64)>,
    events_len: usize,
    sealed: bool,
}

impl Checkpoint {
    /// Starts a checkpoint at the current event log length.
    pub fn new(events_len: usize) -> Self {
        Self {
            events_len,
            ..Self::default()
        }
    }

    /// Snapshots `token` unless it was already snapshotted by this checkpoint.
    pub fn touch(&mut self, state: &BridgeState, token: &TokenId) {
        self.tokens
            .entry(*token)
            .or_insert_with(|| state.get(token).cloned());
    }

    /// Snapshots `token` and returns its state for mutation.
    pub fn stage<'s>(&mut self, state: &'s mut BridgeState, token: &TokenId) -> &'s mut TokenState {
        self.touch(state, token);
        state.entry(token)
    }

    /// Event log length when the operation started.
    pub fn events_len(&self) -> usize {
        self.events_len
    }

    /// Records a replay bit set by the operation.
    pub fn executed(&mut self, token: &TokenId, index: u64) {
        self.executed.push((*token, index));
    }

    /// Marks the operation as past the point of no return.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Returns true if an external effect has happened.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Tokens touched by the operation.
    pub fn touched(&self) -> impl Iterator<Item = &TokenId> {
        self.tokens.keys().chain(self.executed.iter().map(|(token, _)| token))
    }

    /// Undoes every recorded change.
    pub fn rollback(self, state: &mut BridgeState, replay: &mut ReplayGuard, events: &mut Vec<BridgeEvent>) {
        for (token, snapshot) in self.tokens {
            state.restore(token, snapshot);
        }
        for (token, index) in self.executed.into_iter().rev() {
            replay.revert(&token, index);
        }
        events.truncate(self.events_len);
    }
}
