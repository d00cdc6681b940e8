//! Two bridges wired together in one process.
//!
//! Each side has its own in-memory accounting and a bridge. Envelopes travel over a
//! [`ChannelTransport`] pair and are delivered by [`Devnet::relay`]. The devnet also
//! plays the claimant: it mirrors every outbox from the bridge events, so it can
//! build proofs for the roots the other side received.

use crate::config::NodeConfig;
use crate::errors::NodeError;
use ferry_bridge::{
    BridgeEvent, Bridge, BridgeConfig, ChannelTransport, Claim, Envelope, MemoryAccounting, OwnerPermissions,
    TokenMapping,
};
use ferry_core::{types::short_hex, Address, Balance, Leaf, Nonce, ProofTree, TokenId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// One of the two ledgers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// The local ledger
    Local,
    /// The remote ledger
    Remote,
}

impl Side {
    /// The ledger on the other end of the bridge.
    pub fn other(self) -> Self {
        match self {
            Side::Local => Side::Remote,
            Side::Remote => Side::Local,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// Leaves of one outbox, as seen through its events.
#[derive(Debug, Default)]
struct OutboxMirror {
    leaves: Vec<Leaf>,
    /// Leaf count at each sent root, by nonce
    snapshots: HashMap<Nonce, usize>,
    /// Leaves below this index were claimed
    claimed: usize,
}

/// A bridge and the ledger it lives on.
pub struct Endpoint {
    /// The bridge
    pub bridge: Arc<Mutex<Bridge>>,
    /// Accounting of the ledger
    pub accounting: Arc<MemoryAccounting>,
    /// The backing asset bridged on this ledger
    pub token: TokenId,
    inbound: mpsc::UnboundedReceiver<Envelope>,
    mirror: OutboxMirror,
}

/// Two bridges connected to each other.
pub struct Devnet {
    local: Endpoint,
    remote: Endpoint,
    log: Vec<(Side, BridgeEvent)>,
}

fn accounting(config: &NodeConfig, token: &TokenId) -> Arc<MemoryAccounting> {
    let devnet = &config.devnet;
    let accounting = MemoryAccounting::new(Some(devnet.project_token), devnet.redemption_rate_bps);
    accounting.issue(&devnet.holder, devnet.holder_balance);
    accounting.fund(token, devnet.initial_surplus);
    Arc::new(accounting)
}

fn open_bridge(
    config: &NodeConfig,
    bridge_config: BridgeConfig,
    accounting: Arc<MemoryAccounting>,
    transport: Arc<ChannelTransport>,
    mapping: TokenMapping,
) -> Result<Bridge, NodeError> {
    let permissions = Arc::new(OwnerPermissions::new(config.devnet.owner));
    let mut bridge = Bridge::open(bridge_config, accounting, transport, permissions)?;
    if !bridge.is_mapped(&mapping.local_token) {
        bridge.map_token(&config.devnet.owner, mapping)?;
    }
    // The log starts with transfers
    bridge.drain_events();
    Ok(bridge)
}

impl Devnet {
    /// Opens both bridges and maps the local token to the remote one.
    pub fn new(config: &NodeConfig) -> Result<Self, NodeError> {
        if config.local.peer != config.remote.identity || config.remote.peer != config.local.identity {
            return Err(NodeError::ConfigError(
                "local and remote bridges must name each other as peers".to_string(),
            ));
        }

        let devnet = &config.devnet;
        let (local_end, remote_end) =
            ChannelTransport::pair(config.local.identity, config.remote.identity, devnet.transport_fee);

        let local_accounting = accounting(config, &devnet.local_token);
        let remote_accounting = accounting(config, &devnet.remote_token);

        let local_bridge = open_bridge(
            config,
            config.local.clone(),
            local_accounting.clone(),
            local_end.transport,
            TokenMapping::new(devnet.local_token, devnet.remote_token, devnet.min_execution_budget, 0),
        )?;
        let remote_bridge = open_bridge(
            config,
            config.remote.clone(),
            remote_accounting.clone(),
            remote_end.transport,
            TokenMapping::new(devnet.remote_token, devnet.local_token, devnet.min_execution_budget, 0),
        )?;

        info!(
            "Devnet up: {} on {} <-> {} on {}",
            short_hex(&devnet.local_token),
            config.local.identity,
            short_hex(&devnet.remote_token),
            config.remote.identity
        );

        Ok(Self {
            local: Endpoint {
                bridge: Arc::new(Mutex::new(local_bridge)),
                accounting: local_accounting,
                token: config.devnet.local_token,
                inbound: local_end.inbound,
                mirror: OutboxMirror::default(),
            },
            remote: Endpoint {
                bridge: Arc::new(Mutex::new(remote_bridge)),
                accounting: remote_accounting,
                token: config.devnet.remote_token,
                inbound: remote_end.inbound,
                mirror: OutboxMirror::default(),
            },
            log: Vec::new(),
        })
    }

    /// The bridge and ledger of one side.
    pub fn endpoint(&self, side: Side) -> &Endpoint {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    fn endpoint_mut(&mut self, side: Side) -> &mut Endpoint {
        match side {
            Side::Local => &mut self.local,
            Side::Remote => &mut self.remote,
        }
    }

    /// Sends `amount` project tokens of `holder` from `side` to `beneficiary` on the
    /// other side.
    pub async fn prepare(
        &mut self,
        side: Side,
        holder: &Address,
        amount: Balance,
        beneficiary: &Address,
    ) -> Result<Balance, NodeError> {
        let endpoint = self.endpoint(side);
        let dest = endpoint
            .bridge
            .lock()
            .await
            .prepare(holder, amount, beneficiary, 0, &endpoint.token)?;
        self.sync_events().await;
        Ok(dest)
    }

    /// Flushes the outbound ledger of `side`.
    pub async fn flush(&mut self, side: Side, transport_payment: Balance) -> Result<(), NodeError> {
        let endpoint = self.endpoint(side);
        endpoint
            .bridge
            .lock()
            .await
            .flush(&endpoint.token, transport_payment)?;
        self.sync_events().await;
        Ok(())
    }

    /// Delivers every envelope in flight.
    ///
    /// # Returns
    ///
    /// The number of envelopes delivered.
    pub async fn relay(&mut self) -> Result<usize, NodeError> {
        let mut delivered = 0;
        for side in [Side::Local, Side::Remote] {
            let endpoint = self.endpoint_mut(side);
            while let Ok(envelope) = endpoint.inbound.try_recv() {
                debug!("Relaying {} to {}", envelope.message, side);
                endpoint.bridge.lock().await.receive(envelope)?;
                delivered += 1;
            }
        }
        self.sync_events().await;
        Ok(delivered)
    }

    /// Claims, on `side`, every leaf of the other side's outbox covered by the
    /// root `side` currently holds.
    ///
    /// # Returns
    ///
    /// The number of leaves claimed.
    pub async fn claim_ready(&mut self, side: Side) -> Result<usize, NodeError> {
        self.sync_events().await;

        let inbox = {
            let endpoint = self.endpoint(side);
            let bridge = endpoint.bridge.lock().await;
            bridge.inbox_of(&endpoint.token)
        };
        if inbox.nonce == 0 {
            return Ok(0);
        }

        let source = &self.endpoint(side.other()).mirror;
        let count = *source.snapshots.get(&inbox.nonce).ok_or_else(|| {
            NodeError::RelayError(format!("no outbox snapshot for nonce {}", inbox.nonce))
        })?;

        let tree = ProofTree::from_leaves(source.leaves[..count].iter().map(Leaf::hash).collect());
        if tree.root() != inbox.root {
            return Err(NodeError::RelayError(format!(
                "rebuilt root {} does not match inbox root {}",
                short_hex(&tree.root()),
                short_hex(&inbox.root)
            )));
        }

        let token = self.endpoint(side).token;
        let claims = (source.claimed..count)
            .map(|index| {
                let proof = tree.proof(index as u64)?;
                Ok(Claim::new(token, source.leaves[index].clone(), proof))
            })
            .collect::<Result<Vec<_>, NodeError>>()?;

        if claims.is_empty() {
            return Ok(0);
        }

        // Claims commit one by one, so a failed batch may still have settled a prefix
        let (result, settled) = {
            let mut bridge = self.endpoint(side).bridge.lock().await;
            let result = bridge.claim_batch(&claims);
            let settled = claims
                .iter()
                .take_while(|claim| bridge.is_executed(&token, claim.leaf.index))
                .count();
            (result, settled)
        };
        self.endpoint_mut(side.other()).mirror.claimed += settled;
        self.sync_events().await;
        result?;

        info!("Claimed {} leaves on {}", settled, side);
        Ok(settled)
    }

    /// Moves new bridge events into the log and the outbox mirrors.
    async fn sync_events(&mut self) {
        for side in [Side::Local, Side::Remote] {
            let endpoint = match side {
                Side::Local => &mut self.local,
                Side::Remote => &mut self.remote,
            };
            let events = endpoint.bridge.lock().await.drain_events();

            for event in events {
                match &event {
                    BridgeEvent::InsertToOutbox {
                        index,
                        beneficiary,
                        source_amount,
                        dest_amount,
                        ..
                    } => {
                        endpoint
                            .mirror
                            .leaves
                            .push(Leaf::new(*index, *beneficiary, *source_amount, *dest_amount));
                    }
                    BridgeEvent::RootToRemote { nonce, .. } => {
                        let count = endpoint.mirror.leaves.len();
                        endpoint.mirror.snapshots.insert(*nonce, count);
                    }
                    _ => {}
                }
                self.log.push((side, event));
            }
        }
    }

    /// Every event observed so far, oldest first.
    pub fn events(&self) -> &[(Side, BridgeEvent)] {
        &self.log
    }
}
