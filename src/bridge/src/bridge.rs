//! The bridge engine.
//!
//! A [`Bridge`] is one side of a bridge pair. It owns the per-token outbox, inbox,
//! pending credit and replay state, and talks to its collaborators (accounting,
//! transport, permissions) through traits.
//!
//! State changes are staged against a [`Checkpoint`] and undone if the operation
//! fails before it reaches the outside world. Sending a message, minting or
//! crediting seals the checkpoint: from then on the operation's state is committed
//! even if a later step fails, and the error is still returned.
//!
//! Committed state is written to storage when one is configured. A write failure
//! does not fail the operation; it is logged and reported by
//! [`Bridge::storage_healthy`].

use crate::backend::{AccountingBackend, Permission, PermissionProvider};
use crate::config::{BridgeConfig, CreditMode, LedgerKind};
use crate::errors::BridgeError;
use crate::events::BridgeEvent;
use crate::inbox;
use crate::ledger::{self, Dispatch, OutboundTransfer, TransferLedger};
use crate::message::{BatchMessage, Claim, Envelope, OutboundMessage, PeerIdentity};
use crate::metrics;
use crate::outbox::OutboxTree;
use crate::queue::TransferQueue;
use crate::replay::ReplayGuard;
use crate::settlement;
use crate::state::{BridgeState, Checkpoint, TokenMapping, TokenState};
use crate::storage::StateStore;
use crate::transport::TransportAdapter;
use ferry_core::{
    types::short_hex, Address, Balance, Hash, Nonce, RemoteRoot, TokenId, NATIVE_TOKEN, TREE_DEPTH, ZERO_ADDRESS,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One side of a bridge pair.
pub struct Bridge {
    config: BridgeConfig,
    ledger: Box<dyn TransferLedger>,
    state: BridgeState,
    replay: ReplayGuard,
    accounting: Arc<dyn AccountingBackend>,
    transport: Arc<dyn TransportAdapter>,
    permissions: Arc<dyn PermissionProvider>,
    store: Option<StateStore>,
    storage_healthy: bool,
    events: Vec<BridgeEvent>,
}

impl Bridge {
    /// Opens a bridge.
    ///
    /// If the configuration names a data directory, previously committed state is
    /// loaded from it and every later commit is written back.
    pub fn open(
        config: BridgeConfig,
        accounting: Arc<dyn AccountingBackend>,
        transport: Arc<dyn TransportAdapter>,
        permissions: Arc<dyn PermissionProvider>,
    ) -> Result<Self, BridgeError> {
        let (store, state, replay) = match &config.storage {
            Some(storage) => {
                let store = StateStore::open(&storage.data_dir)?;
                let (state, replay) = store.load()?;
                (Some(store), state, replay)
            }
            None => (None, BridgeState::new(), ReplayGuard::new()),
        };

        info!(
            "Opened bridge {} -> {} ({:?} ledger, {:?} credit) over {}",
            config.identity,
            config.peer,
            config.ledger,
            config.credit_mode,
            transport.name()
        );

        Ok(Self {
            ledger: ledger::from_config(&config),
            config,
            state,
            replay,
            accounting,
            transport,
            permissions,
            store,
            storage_healthy: true,
            events: Vec::new(),
        })
    }

    /// Runs `op` against a fresh checkpoint. The changes are committed on success
    /// or when the checkpoint was sealed, and rolled back otherwise.
    fn atomically<T, F>(&mut self, op: F) -> Result<T, BridgeError>
    where
        F: FnOnce(&mut Self, &mut Checkpoint) -> Result<T, BridgeError>,
    {
        let mut checkpoint = Checkpoint::new(self.events.len());
        let result = op(self, &mut checkpoint);

        match &result {
            Ok(_) => self.commit(&checkpoint),
            Err(err) if checkpoint.is_sealed() => {
                error!("Operation failed after reaching accounting or transport, keeping its state: {}", err);
                self.commit(&checkpoint);
            }
            Err(err) => {
                debug!("Rolling back: {}", err);
                checkpoint.rollback(&mut self.state, &mut self.replay, &mut self.events);
            }
        }
        result
    }

    fn commit(&mut self, checkpoint: &Checkpoint) {
        for event in &self.events[checkpoint.events_len()..] {
            metrics::observe(event);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.persist(checkpoint.touched(), &self.state, &self.replay) {
                error!("Failed to persist committed bridge state: {}", e);
                metrics::STORAGE_FAILURES.inc();
                self.storage_healthy = false;
            }
        }
    }

    fn check_fee(&self, dispatch: &Dispatch, payment: Balance) -> Result<(), BridgeError> {
        let fee = self.transport.quote(&dispatch.message, dispatch.execution_budget);
        if fee > payment {
            return Err(BridgeError::InsufficientResource {
                resource: "transport payment",
                required: fee,
                available: payment,
            });
        }
        Ok(())
    }

    /// Hands a message to the transport after checking the payment covers its fee.
    /// Seals the checkpoint once the transport accepted the message.
    fn dispatch(
        &mut self,
        checkpoint: &mut Checkpoint,
        token: &TokenId,
        dispatch: Dispatch,
        payment: Balance,
    ) -> Result<(), BridgeError> {
        self.check_fee(&dispatch, payment)?;

        let event = BridgeEvent::dispatched(*token, &dispatch.message, dispatch.execution_budget);
        info!("Sending {} to {} (budget {})", dispatch.message, self.config.peer, dispatch.execution_budget);
        self.transport.send(Envelope {
            origin: self.config.identity,
            execution_budget: dispatch.execution_budget,
            message: dispatch.message,
        })?;

        checkpoint.seal();
        self.events.push(event);
        Ok(())
    }

    /// Credits `amount` of `token` to accounting. A surplus mismatch is only seen
    /// after the credit went through, so it seals the checkpoint.
    fn forward(&self, checkpoint: &mut Checkpoint, token: &TokenId, amount: Balance) -> Result<(), BridgeError> {
        let result = settlement::forward(self.accounting.as_ref(), token, amount);
        if matches!(result, Err(BridgeError::BalanceMismatch { .. })) {
            checkpoint.seal();
        }
        result
    }

    /// Redeems `source_amount` project tokens of `caller` and records a transfer of
    /// the released `token` assets to `beneficiary` on the peer ledger.
    ///
    /// Every check runs before the redemption. Once tokens are burned the transfer
    /// is recorded. If that fills the outbound queue, the queue is sent with the
    /// configured fee allowance; when that send fails the transfers stay queued
    /// for a later [`Bridge::flush`] and the prepare still succeeds.
    ///
    /// # Returns
    ///
    /// The amount of backing assets carried by the transfer.
    pub fn prepare(
        &mut self,
        caller: &Address,
        source_amount: Balance,
        beneficiary: &Address,
        min_dest_amount: Balance,
        token: &TokenId,
    ) -> Result<Balance, BridgeError> {
        let (caller, beneficiary, token) = (*caller, *beneficiary, *token);

        let dest_amount = self.atomically(|bridge, checkpoint| {
            if beneficiary == ZERO_ADDRESS {
                return Err(BridgeError::Validation("beneficiary is the zero address".to_string()));
            }
            if bridge.accounting.project_token().is_none() {
                return Err(BridgeError::Validation(format!(
                    "project {} has no token to bridge",
                    bridge.config.project_id
                )));
            }
            if !bridge.is_mapped(&token) {
                return Err(BridgeError::Validation(format!("token {} is not mapped", short_hex(&token))));
            }

            let quoted = bridge.accounting.reclaimable(source_amount, &token);
            if quoted < min_dest_amount {
                return Err(BridgeError::Validation(format!(
                    "redemption would release {}, below the minimum of {}",
                    quoted, min_dest_amount
                )));
            }

            // The ledger has to accept the transfer before anything is burned.
            let mut scratch = bridge.state.get(&token).cloned().unwrap_or_default();
            bridge.ledger.record(
                &token,
                &mut scratch,
                OutboundTransfer {
                    beneficiary,
                    source_amount,
                    dest_amount: quoted,
                },
            )?;

            let dest_amount = bridge
                .accounting
                .redeem(&caller, source_amount, &token, min_dest_amount)?;
            checkpoint.seal();

            let transfer = OutboundTransfer {
                beneficiary,
                source_amount,
                dest_amount,
            };
            let outcome = {
                let token_state = checkpoint.stage(&mut bridge.state, &token);
                bridge.ledger.record(&token, token_state, transfer)?
            };
            bridge.events.push(outcome.event);
            Ok(dest_amount)
        })?;

        let due = self
            .state
            .get(&token)
            .map_or(false, |token_state| self.ledger.dispatch_due(token_state));
        if due {
            let allowance = self.config.dispatch_fee_allowance;
            if let Err(e) = self.send_pending(&token, allowance, true) {
                warn!("Automatic dispatch of {} failed, transfers stay queued: {}", short_hex(&token), e);
            }
        }

        Ok(dest_amount)
    }

    /// Sends everything pending for `token` to the peer.
    ///
    /// `transport_payment` must cover the transport's quote for the message.
    pub fn flush(&mut self, token: &TokenId, transport_payment: Balance) -> Result<(), BridgeError> {
        self.send_pending(token, transport_payment, false)
    }

    fn send_pending(&mut self, token: &TokenId, payment: Balance, bypass_minimum: bool) -> Result<(), BridgeError> {
        let token = *token;
        self.atomically(|bridge, checkpoint| {
            let dispatch = {
                let token_state = checkpoint.stage(&mut bridge.state, &token);
                bridge.ledger.take_dispatch(&token, token_state, bypass_minimum)?
            };
            bridge.dispatch(checkpoint, &token, dispatch, payment)
        })
    }

    /// Handles an envelope delivered by the transport.
    pub fn receive(&mut self, envelope: Envelope) -> Result<(), BridgeError> {
        debug!("Received {} from {}", envelope.message, envelope.origin);
        match envelope.message {
            OutboundMessage::Root(message) => self.receive_root(
                &envelope.origin,
                &message.token,
                message.amount,
                message.root.nonce,
                message.root.root,
            ),
            OutboundMessage::Batch(batch) => self.receive_batch(&envelope.origin, batch),
        }
    }

    fn authenticate(&self, origin: &PeerIdentity) -> Result<(), BridgeError> {
        if !self.transport.authenticate(origin) {
            return Err(BridgeError::Authorization(format!(
                "{} is not the peer of {}",
                origin, self.config.identity
            )));
        }
        Ok(())
    }

    /// Records a root of the peer's outbox for `token` together with the funds it
    /// carries.
    ///
    /// The funds always go to pending credit. The stored root is replaced only when
    /// `nonce` is newer; a stale root is not an error.
    pub fn receive_root(
        &mut self,
        origin: &PeerIdentity,
        token: &TokenId,
        amount: Balance,
        nonce: Nonce,
        root: Hash,
    ) -> Result<(), BridgeError> {
        self.authenticate(origin)?;
        let token = *token;

        self.atomically(|bridge, checkpoint| {
            let token_state = checkpoint.stage(&mut bridge.state, &token);
            let events = inbox::apply_root(&token, token_state, amount, RemoteRoot { nonce, root })?;
            bridge.events.extend(events);
            Ok(())
        })
    }

    fn receive_batch(&mut self, origin: &PeerIdentity, batch: BatchMessage) -> Result<(), BridgeError> {
        self.authenticate(origin)?;

        if batch.destination_project_id != self.config.project_id {
            return Err(BridgeError::Validation(format!(
                "batch for project {} delivered to project {}",
                batch.destination_project_id, self.config.project_id
            )));
        }

        self.atomically(|bridge, checkpoint| {
            bridge.forward(checkpoint, &batch.token, batch.total_amount)?;
            for item in &batch.items {
                bridge.accounting.mint(&item.beneficiary, item.source_amount)?;
            }

            bridge.events.push(BridgeEvent::BatchSettled {
                token: batch.token,
                items: batch.items.len(),
                amount: batch.total_amount,
            });
            info!(
                "Settled batch of {} transfers of {}, total {}",
                batch.items.len(),
                short_hex(&batch.token),
                batch.total_amount
            );
            Ok(())
        })
    }

    /// Checks every claim of a call against current state, changing nothing.
    fn check_claims(&self, claims: &[Claim]) -> Result<(), BridgeError> {
        let mut seen = HashSet::new();
        let mut required: HashMap<TokenId, Balance> = HashMap::new();

        for claim in claims {
            let token = claim.token;
            let index = claim.leaf.index;

            if index >= 1u64 << TREE_DEPTH {
                return Err(BridgeError::Validation(format!(
                    "leaf index {} is outside the tree",
                    index
                )));
            }
            if self.replay.is_executed(&token, index) || !seen.insert((token, index)) {
                return Err(BridgeError::Replay { token, index });
            }

            let token_state = self
                .state
                .get(&token)
                .ok_or(BridgeError::Proof { token, index })?;
            inbox::verify_leaf(&token, token_state, &claim.leaf, &claim.proof)?;

            if self.config.credit_mode == CreditMode::OnClaim {
                let total = required.entry(token).or_default();
                *total = total.saturating_add(claim.leaf.dest_amount);
                if *total > token_state.pending_credit {
                    return Err(BridgeError::InsufficientResource {
                        resource: "pending credit",
                        required: *total,
                        available: token_state.pending_credit,
                    });
                }
            }
        }
        Ok(())
    }

    /// Marks a checked claim executed and settles it: the beneficiary is minted
    /// first, then the leaf's backing assets are credited in on-claim mode.
    fn settle_claim(&mut self, checkpoint: &mut Checkpoint, claim: &Claim) -> Result<(), BridgeError> {
        let token = claim.token;
        let leaf = &claim.leaf;

        if self.replay.is_executed(&token, leaf.index) {
            return Err(BridgeError::Replay {
                token,
                index: leaf.index,
            });
        }
        self.replay.mark(&token, leaf.index);
        checkpoint.executed(&token, leaf.index);

        if self.config.credit_mode == CreditMode::OnClaim {
            let token_state = checkpoint.stage(&mut self.state, &token);
            settlement::take_pending(token_state, leaf.dest_amount)?;
        }

        self.accounting.mint(&leaf.beneficiary, leaf.source_amount)?;
        checkpoint.seal();

        self.events.push(BridgeEvent::Claimed {
            token,
            index: leaf.index,
            beneficiary: leaf.beneficiary,
            source_amount: leaf.source_amount,
            dest_amount: leaf.dest_amount,
        });

        if self.config.credit_mode == CreditMode::OnClaim {
            self.forward(checkpoint, &token, leaf.dest_amount)?;
        }

        info!("Settled claim of {} on {}", leaf, short_hex(&token));
        Ok(())
    }

    /// Settles one leaf of the peer's outbox.
    pub fn claim(&mut self, claim: &Claim) -> Result<(), BridgeError> {
        self.claim_batch(std::slice::from_ref(claim))
    }

    /// Settles several leaves in order.
    ///
    /// Every claim is checked before the first one is settled: a bad proof, a
    /// replay or a shortfall of pending credit rejects the whole call. Each claim
    /// then commits on its own. If accounting refuses one, the claims before it
    /// stay settled and it and the claims after it stay claimable.
    pub fn claim_batch(&mut self, claims: &[Claim]) -> Result<(), BridgeError> {
        self.check_claims(claims)?;
        for claim in claims {
            self.atomically(|bridge, checkpoint| bridge.settle_claim(checkpoint, claim))?;
        }
        Ok(())
    }

    /// Creates, changes or disables the mapping of `mapping.local_token`.
    pub fn map_token(&mut self, caller: &Address, mapping: TokenMapping) -> Result<(), BridgeError> {
        self.map_tokens(caller, vec![mapping])
    }

    /// Applies several mappings in order.
    ///
    /// The whole list is checked, including the fee of every flush it causes,
    /// before any mapping is applied or any message sent. Each mapping then
    /// commits together with its flush. If the transport refuses a flush, the
    /// mappings before it stay applied and it and the rest are not.
    pub fn map_tokens(&mut self, caller: &Address, mappings: Vec<TokenMapping>) -> Result<(), BridgeError> {
        if !self
            .permissions
            .is_authorized(caller, self.config.project_id, Permission::MapToken)
        {
            return Err(BridgeError::Authorization(format!(
                "{} may not map tokens of project {}",
                short_hex(caller),
                self.config.project_id
            )));
        }

        let allowance = self.config.dispatch_fee_allowance;

        let mut scratch: HashMap<TokenId, TokenState> = HashMap::new();
        for mapping in &mappings {
            let token = mapping.local_token;
            let token_state = scratch
                .entry(token)
                .or_insert_with(|| self.state.get(&token).cloned().unwrap_or_default());
            if let Some(flush) = update_mapping(&self.config, self.ledger.as_ref(), token_state, mapping)? {
                self.check_fee(&flush, allowance)?;
            }
        }

        for mapping in &mappings {
            let token = mapping.local_token;
            self.atomically(|bridge, checkpoint| {
                let flush = {
                    let token_state = checkpoint.stage(&mut bridge.state, &token);
                    update_mapping(&bridge.config, bridge.ledger.as_ref(), token_state, mapping)?
                };
                info!("Mapping {}", mapping);

                if let Some(dispatch) = flush {
                    bridge.dispatch(checkpoint, &token, dispatch, allowance)?;
                }

                bridge.events.push(BridgeEvent::TokenMapped {
                    local_token: mapping.local_token,
                    remote_token: mapping.remote_token,
                    min_execution_budget: mapping.min_execution_budget,
                    min_flush_amount: mapping.min_flush_amount,
                });
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Forwards `amount` of pending credit of `token` to accounting.
    ///
    /// Only available when the bridge is configured for manual crediting.
    pub fn credit_pending(&mut self, token: &TokenId, amount: Balance) -> Result<(), BridgeError> {
        if self.config.credit_mode == CreditMode::OnClaim {
            return Err(BridgeError::Configuration(
                "pending credit is applied by claims in on-claim mode".to_string(),
            ));
        }

        let token = *token;
        self.atomically(|bridge, checkpoint| {
            let remaining = {
                let token_state = checkpoint.stage(&mut bridge.state, &token);
                settlement::take_pending(token_state, amount)?
            };
            bridge.events.push(BridgeEvent::PendingCreditApplied {
                token,
                amount,
                remaining,
            });
            bridge.forward(checkpoint, &token, amount)
        })
    }

    /// Returns true if `token` has an enabled mapping.
    pub fn is_mapped(&self, token: &TokenId) -> bool {
        self.state
            .get(token)
            .and_then(|token_state| token_state.active_mapping())
            .is_some()
    }

    /// Returns false once a committed operation could not be written to storage.
    /// The in-memory state is ahead of the disk from then on.
    pub fn storage_healthy(&self) -> bool {
        self.storage_healthy
    }

    /// The bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The outbound strategy in use.
    pub fn ledger_kind(&self) -> LedgerKind {
        self.ledger.kind()
    }

    /// The current mapping of `token`, enabled or not.
    pub fn mapping_of(&self, token: &TokenId) -> Option<&TokenMapping> {
        self.state.get(token).and_then(|token_state| token_state.mapping.as_ref())
    }

    /// The outbox accumulator of `token`.
    pub fn outbox_of(&self, token: &TokenId) -> Option<&OutboxTree> {
        self.state.get(token).map(|token_state| &token_state.outbox)
    }

    /// The outbound queue of `token`.
    pub fn queue_of(&self, token: &TokenId) -> Option<&TransferQueue> {
        self.state.get(token).map(|token_state| &token_state.queue)
    }

    /// The latest root received for `token`.
    pub fn inbox_of(&self, token: &TokenId) -> RemoteRoot {
        self.state
            .get(token)
            .map(|token_state| token_state.inbox)
            .unwrap_or_default()
    }

    /// Funds received for `token` and not yet applied to accounting.
    pub fn pending_credit_of(&self, token: &TokenId) -> Balance {
        self.state
            .get(token)
            .map(|token_state| token_state.pending_credit)
            .unwrap_or_default()
    }

    /// Backing assets of `token` waiting to be sent to the peer.
    pub fn pending_balance_of(&self, token: &TokenId) -> Balance {
        self.state
            .get(token)
            .map(|token_state| self.ledger.pending_balance(token_state))
            .unwrap_or_default()
    }

    /// Returns true if leaf `index` of `token` was claimed.
    pub fn is_executed(&self, token: &TokenId, index: u64) -> bool {
        self.replay.is_executed(token, index)
    }

    /// Events of committed operations since the last drain.
    pub fn events(&self) -> &[BridgeEvent] {
        &self.events
    }

    /// Takes the events of committed operations.
    pub fn drain_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Applies `mapping` to the state of its token.
///
/// # Returns
///
/// The flush of pending transfers owed when an active mapping is disabled.
fn update_mapping(
    config: &BridgeConfig,
    ledger: &dyn TransferLedger,
    token_state: &mut TokenState,
    mapping: &TokenMapping,
) -> Result<Option<Dispatch>, BridgeError> {
    let token = mapping.local_token;

    if token == NATIVE_TOKEN {
        if mapping.remote_token != NATIVE_TOKEN && mapping.remote_token != ZERO_ADDRESS {
            return Err(BridgeError::Validation(
                "the native token can only map to the native token".to_string(),
            ));
        }
    } else if mapping.min_execution_budget < config.min_execution_budget_floor {
        return Err(BridgeError::InsufficientResource {
            resource: "execution budget",
            required: u128::from(config.min_execution_budget_floor),
            available: u128::from(mapping.min_execution_budget),
        });
    }

    if let Some(current) = token_state.active_mapping() {
        if mapping.is_enabled() && current.remote_token != mapping.remote_token && !token_state.outbox.tree.is_empty() {
            return Err(BridgeError::Validation(format!(
                "token {} already mapped to {}",
                short_hex(&token),
                short_hex(&current.remote_token)
            )));
        }
    }

    let flush = if !mapping.is_enabled() && token_state.active_mapping().is_some() && ledger.has_pending(token_state) {
        Some(ledger.take_dispatch(&token, token_state, true)?)
    } else {
        None
    };

    token_state.mapping = Some(mapping.clone());
    Ok(flush)
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("identity", &self.config.identity)
            .field("peer", &self.config.peer)
            .field("ledger", &self.ledger.kind())
            .field("tokens", &self.state.iter().count())
            .finish()
    }
}
