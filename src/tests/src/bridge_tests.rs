//! Tests for the bridge crate.

use ferry_bridge::{
    AccountingBackend, Bridge, BridgeConfig, BridgeError, BridgeEvent, ChannelTransport, Claim, CreditMode, Envelope, MemoryAccounting,
    OutboundMessage, OwnerPermissions, PeerIdentity, TokenMapping,
};
use ferry_core::{Address, Balance, Leaf, ProofTree, TokenId, NATIVE_TOKEN, ZERO_ADDRESS};
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

pub const OWNER: Address = [0x0F; 32];
pub const HOLDER: Address = [0x11; 32];
pub const PROJECT_TOKEN: TokenId = [0x10; 32];
pub const TOKEN_A: TokenId = [0xAA; 32];
pub const TOKEN_B: TokenId = [0xBB; 32];

/// One side of a test bridge pair.
pub struct TestSide {
    pub bridge: Bridge,
    pub accounting: Arc<MemoryAccounting>,
    pub inbound: UnboundedReceiver<Envelope>,
}

impl TestSide {
    /// Delivers every envelope received from the peer.
    pub fn pump(&mut self) -> Vec<Result<(), BridgeError>> {
        let mut results = Vec::new();
        while let Ok(envelope) = self.inbound.try_recv() {
            results.push(self.bridge.receive(envelope));
        }
        results
    }
}

/// Builds two bridges mapping `TOKEN_A` on side A to `TOKEN_B` on side B.
pub fn bridge_pair(config: BridgeConfig) -> (TestSide, TestSide) {
    bridge_pair_with(config, 0, |books| books as Arc<dyn AccountingBackend>)
}

/// Like [`bridge_pair`], with a transport fee and side B's accounting wrapped by
/// `wrap_b`.
pub fn bridge_pair_with<F>(config: BridgeConfig, fee: Balance, wrap_b: F) -> (TestSide, TestSide)
where
    F: FnOnce(Arc<MemoryAccounting>) -> Arc<dyn AccountingBackend>,
{
    let config_b = config.mirrored();
    let (end_a, end_b) = ChannelTransport::pair(config.identity, config_b.identity, fee);

    let accounting_a = Arc::new(MemoryAccounting::new(Some(PROJECT_TOKEN), 5_000));
    accounting_a.issue(&HOLDER, 1_000);
    accounting_a.fund(&TOKEN_A, 1_000);
    let accounting_b = Arc::new(MemoryAccounting::new(Some(PROJECT_TOKEN), 5_000));

    let mut bridge_a = Bridge::open(
        config,
        accounting_a.clone(),
        end_a.transport,
        Arc::new(OwnerPermissions::new(OWNER)),
    )
    .unwrap();
    let mut bridge_b = Bridge::open(
        config_b,
        wrap_b(accounting_b.clone()),
        end_b.transport,
        Arc::new(OwnerPermissions::new(OWNER)),
    )
    .unwrap();

    bridge_a
        .map_token(&OWNER, TokenMapping::new(TOKEN_A, TOKEN_B, 200_000, 0))
        .unwrap();
    bridge_b
        .map_token(&OWNER, TokenMapping::new(TOKEN_B, TOKEN_A, 200_000, 0))
        .unwrap();

    (
        TestSide {
            bridge: bridge_a,
            accounting: accounting_a,
            inbound: end_a.inbound,
        },
        TestSide {
            bridge: bridge_b,
            accounting: accounting_b,
            inbound: end_b.inbound,
        },
    )
}

/// Accounting that refuses to mint to frozen addresses.
struct FrozenAccounting {
    books: Arc<MemoryAccounting>,
    frozen: Arc<Mutex<HashSet<Address>>>,
}

impl AccountingBackend for FrozenAccounting {
    fn project_token(&self) -> Option<TokenId> {
        self.books.project_token()
    }

    fn redeem(&self, holder: &Address, amount: Balance, token: &TokenId, min_reclaimed: Balance) -> Result<Balance, BridgeError> {
        self.books.redeem(holder, amount, token, min_reclaimed)
    }

    fn reclaimable(&self, amount: Balance, token: &TokenId) -> Balance {
        self.books.reclaimable(amount, token)
    }

    fn mint(&self, beneficiary: &Address, amount: Balance) -> Result<(), BridgeError> {
        if self.frozen.lock().unwrap().contains(beneficiary) {
            return Err(BridgeError::Backend(format!("{:?} is frozen", &beneficiary[..4])));
        }
        self.books.mint(beneficiary, amount)
    }

    fn credit(&self, token: &TokenId, amount: Balance) -> Result<(), BridgeError> {
        self.books.credit(token, amount)
    }

    fn current_surplus(&self, token: &TokenId) -> Balance {
        self.books.current_surplus(token)
    }
}

/// Returns a random non-zero address.
pub fn random_address() -> Address {
    let mut rng = rand::thread_rng();
    let mut address = [0u8; 32];
    rng.fill(&mut address);
    address[0] |= 1;
    address
}

/// Tests the full flow: two transfers from A, one root, one claim on B.
#[test]
fn test_end_to_end() {
    let (mut a, mut b) = bridge_pair(BridgeConfig::default());
    let beneficiary = random_address();

    // Two transfers at a 50% redemption rate
    assert_eq!(a.bridge.prepare(&HOLDER, 100, &beneficiary, 50, &TOKEN_A).unwrap(), 50);
    assert_eq!(a.bridge.prepare(&HOLDER, 40, &random_address(), 20, &TOKEN_A).unwrap(), 20);
    assert_eq!(a.bridge.outbox_of(&TOKEN_A).unwrap().count(), 2);
    assert_eq!(a.bridge.pending_balance_of(&TOKEN_A), 70);

    // Rebuild the outbox from the insertion events
    let leaves: Vec<Leaf> = a
        .bridge
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            BridgeEvent::InsertToOutbox {
                index,
                beneficiary,
                source_amount,
                dest_amount,
                ..
            } => Some(Leaf::new(index, beneficiary, source_amount, dest_amount)),
            _ => None,
        })
        .collect();
    let tree = ProofTree::from_leaves(leaves.iter().map(Leaf::hash).collect());

    // Send the root
    a.bridge.flush(&TOKEN_A, 0).unwrap();
    assert_eq!(a.bridge.pending_balance_of(&TOKEN_A), 0);
    assert!(b.pump().into_iter().all(|result| result.is_ok()));

    let inbox = b.bridge.inbox_of(&TOKEN_B);
    assert_eq!(inbox.nonce, 1);
    assert_eq!(inbox.root, tree.root());
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 70);

    // Claim the first leaf
    let claim = Claim::new(TOKEN_B, leaves[0].clone(), tree.proof(0).unwrap());
    b.bridge.claim(&claim).unwrap();

    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 20);
    assert_eq!(b.accounting.balance_of(&beneficiary), 100);
    assert_eq!(b.accounting.current_surplus(&TOKEN_B), 50);

    // Second attempt is a replay
    let err = b.bridge.claim(&claim).unwrap_err();
    assert!(matches!(err, BridgeError::Replay { index: 0, .. }));
    assert!(err.to_string().contains("LEAF_ALREADY_EXECUTED"));
}

/// Tests that roots arriving out of order only move the inbox forward.
#[test]
fn test_root_nonce_ordering() {
    let (_a, mut b) = bridge_pair(BridgeConfig::default());
    let peer = b.bridge.config().peer;

    for nonce in [3u64, 1, 5, 2] {
        b.bridge
            .receive_root(&peer, &TOKEN_B, 10, nonce, [nonce as u8; 32])
            .unwrap();
    }

    let updates = b
        .bridge
        .events()
        .iter()
        .filter(|event| matches!(event, BridgeEvent::NewInboxTreeRoot { .. }))
        .count();
    let stale = b
        .bridge
        .events()
        .iter()
        .filter(|event| matches!(event, BridgeEvent::StaleRootRejected { .. }))
        .count();

    assert_eq!(updates, 2);
    assert_eq!(stale, 2);
    assert_eq!(b.bridge.inbox_of(&TOKEN_B).nonce, 5);
    assert_eq!(b.bridge.inbox_of(&TOKEN_B).root, [5; 32]);

    // Stale roots still deliver their funds
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 40);
}

/// Tests that roots flushed in order but delivered in reverse keep the newest one.
#[test]
fn test_reordered_delivery() {
    let (mut a, mut b) = bridge_pair(BridgeConfig::default());

    a.bridge.prepare(&HOLDER, 100, &random_address(), 0, &TOKEN_A).unwrap();
    a.bridge.flush(&TOKEN_A, 0).unwrap();
    a.bridge.prepare(&HOLDER, 40, &random_address(), 0, &TOKEN_A).unwrap();
    a.bridge.flush(&TOKEN_A, 0).unwrap();
    let latest = a.bridge.outbox_of(&TOKEN_A).unwrap().root();

    let first = b.inbound.try_recv().unwrap();
    let second = b.inbound.try_recv().unwrap();
    b.bridge.receive(second).unwrap();
    b.bridge.receive(first).unwrap();

    assert_eq!(b.bridge.inbox_of(&TOKEN_B).nonce, 2);
    assert_eq!(b.bridge.inbox_of(&TOKEN_B).root, latest);
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 70);
}

/// Tests that envelopes from anyone but the peer are rejected.
#[test]
fn test_unauthenticated_envelope() {
    let (_a, mut b) = bridge_pair(BridgeConfig::default());
    let envelope = Envelope {
        origin: PeerIdentity {
            chain_id: 77,
            bridge: random_address(),
        },
        execution_budget: 200_000,
        message: OutboundMessage::Root(ferry_bridge::RootMessage {
            token: TOKEN_B,
            amount: 1_000,
            root: ferry_core::RemoteRoot { nonce: 1, root: [1; 32] },
        }),
    };

    assert!(matches!(b.bridge.receive(envelope), Err(BridgeError::Authorization(_))));
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 0);
    assert_eq!(b.bridge.inbox_of(&TOKEN_B).nonce, 0);
}

/// Tests the execution budget floor for non-native tokens.
#[test]
fn test_execution_budget_floor() {
    let (mut a, _b) = bridge_pair(BridgeConfig::default());
    let token = random_address();

    let err = a
        .bridge
        .map_token(&OWNER, TokenMapping::new(token, TOKEN_B, 199_999, 0))
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::InsufficientResource {
            required: 200_000,
            available: 199_999,
            ..
        }
    ));

    a.bridge
        .map_token(&OWNER, TokenMapping::new(token, TOKEN_B, 200_000, 0))
        .unwrap();

    // The native token has no floor
    a.bridge
        .map_token(&OWNER, TokenMapping::new(NATIVE_TOKEN, NATIVE_TOKEN, 0, 0))
        .unwrap();
    assert!(a.bridge.is_mapped(&NATIVE_TOKEN));

    a.bridge
        .map_token(&OWNER, TokenMapping::new(NATIVE_TOKEN, ZERO_ADDRESS, 0, 0))
        .unwrap();
    assert!(!a.bridge.is_mapped(&NATIVE_TOKEN));
}

/// Tests that a failing operation leaves no trace.
#[test]
fn test_failed_operations_roll_back() {
    let (mut a, mut b) = bridge_pair(BridgeConfig::default());
    let beneficiary = random_address();

    a.bridge.prepare(&HOLDER, 100, &beneficiary, 0, &TOKEN_A).unwrap();
    a.bridge.flush(&TOKEN_A, 0).unwrap();
    b.pump();
    b.bridge.drain_events();

    let leaf = Leaf::new(0, beneficiary, 100, 50);
    let tree = ProofTree::from_leaves(vec![leaf.hash()]);

    // A forged amount fails the proof and does not burn the leaf
    let mut forged = leaf.clone();
    forged.source_amount = 10_000;
    let bad = Claim::new(TOKEN_B, forged, tree.proof(0).unwrap());
    let err = b.bridge.claim(&bad).unwrap_err();
    assert!(err.to_string().contains("INVALID_PROOF"));

    assert!(!b.bridge.is_executed(&TOKEN_B, 0));
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 50);
    assert!(b.bridge.events().is_empty());
    assert_eq!(b.accounting.total_supply(), 0);

    b.bridge
        .claim(&Claim::new(TOKEN_B, leaf, tree.proof(0).unwrap()))
        .unwrap();
    assert_eq!(b.accounting.total_supply(), 100);
}

/// Tests pending credit handling in manual credit mode.
#[test]
fn test_manual_credit() {
    let config = BridgeConfig {
        credit_mode: CreditMode::Manual,
        ..BridgeConfig::default()
    };
    let (mut a, mut b) = bridge_pair(config);
    let beneficiary = random_address();

    a.bridge.prepare(&HOLDER, 100, &beneficiary, 0, &TOKEN_A).unwrap();
    a.bridge.flush(&TOKEN_A, 0).unwrap();
    b.pump();

    let leaf = Leaf::new(0, beneficiary, 100, 50);
    let tree = ProofTree::from_leaves(vec![leaf.hash()]);
    b.bridge
        .claim(&Claim::new(TOKEN_B, leaf, tree.proof(0).unwrap()))
        .unwrap();

    // Claims mint but leave the backing assets pending
    assert_eq!(b.accounting.balance_of(&beneficiary), 100);
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 50);

    b.bridge.credit_pending(&TOKEN_B, 50).unwrap();
    assert_eq!(b.accounting.current_surplus(&TOKEN_B), 50);
    assert!(matches!(
        b.bridge.credit_pending(&TOKEN_B, 1),
        Err(BridgeError::InsufficientResource { .. })
    ));
}

/// Tests claiming a batch of randomly sized transfers.
#[test]
fn test_claim_batch() {
    let (mut a, mut b) = bridge_pair(BridgeConfig::default());
    let mut rng = rand::thread_rng();

    let mut leaves = Vec::new();
    for index in 0..10u64 {
        let beneficiary = random_address();
        let amount: Balance = rng.gen_range(1..50) * 2;
        let dest = a.bridge.prepare(&HOLDER, amount, &beneficiary, 0, &TOKEN_A).unwrap();
        leaves.push(Leaf::new(index, beneficiary, amount, dest));
    }
    a.bridge.flush(&TOKEN_A, 0).unwrap();
    b.pump();

    let tree = ProofTree::from_leaves(leaves.iter().map(Leaf::hash).collect());
    let claims: Vec<Claim> = leaves
        .iter()
        .map(|leaf| Claim::new(TOKEN_B, leaf.clone(), tree.proof(leaf.index).unwrap()))
        .collect();
    b.bridge.claim_batch(&claims).unwrap();

    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 0);
    for leaf in &leaves {
        assert!(b.bridge.is_executed(&TOKEN_B, leaf.index));
        assert_eq!(b.accounting.balance_of(&leaf.beneficiary), leaf.source_amount);
    }
}

/// Tests that a mint refused in the middle of a batch never lets a settled leaf
/// be claimed twice.
#[test]
fn test_refused_mint_mid_batch() {
    let frozen = Arc::new(Mutex::new(HashSet::new()));
    let wrapped = frozen.clone();
    let (mut a, mut b) = bridge_pair_with(BridgeConfig::default(), 0, move |books| {
        Arc::new(FrozenAccounting {
            books,
            frozen: wrapped,
        }) as Arc<dyn AccountingBackend>
    });

    let mut leaves = Vec::new();
    for index in 0..3u64 {
        let beneficiary = random_address();
        let dest = a.bridge.prepare(&HOLDER, 100, &beneficiary, 0, &TOKEN_A).unwrap();
        leaves.push(Leaf::new(index, beneficiary, 100, dest));
    }
    a.bridge.flush(&TOKEN_A, 0).unwrap();
    assert!(b.pump().into_iter().all(|result| result.is_ok()));

    let tree = ProofTree::from_leaves(leaves.iter().map(Leaf::hash).collect());
    let claims: Vec<Claim> = leaves
        .iter()
        .map(|leaf| Claim::new(TOKEN_B, leaf.clone(), tree.proof(leaf.index).unwrap()))
        .collect();

    frozen.lock().unwrap().insert(leaves[1].beneficiary);
    assert!(matches!(b.bridge.claim_batch(&claims), Err(BridgeError::Backend(_))));

    assert!(b.bridge.is_executed(&TOKEN_B, 0));
    assert!(!b.bridge.is_executed(&TOKEN_B, 1));
    assert!(!b.bridge.is_executed(&TOKEN_B, 2));
    assert_eq!(b.accounting.balance_of(&leaves[0].beneficiary), 100);
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 100);
    assert_eq!(b.accounting.current_surplus(&TOKEN_B), 50);

    // Retrying the whole batch is rejected before anything settles
    assert!(matches!(
        b.bridge.claim_batch(&claims),
        Err(BridgeError::Replay { index: 0, .. })
    ));
    assert_eq!(b.accounting.total_supply(), 100);

    frozen.lock().unwrap().clear();
    b.bridge.claim_batch(&claims[1..]).unwrap();
    assert_eq!(b.accounting.total_supply(), 300);
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 0);
    assert_eq!(b.accounting.current_surplus(&TOKEN_B), 150);
}

/// Tests that a mapping list with a bad entry does not flush a token it disables.
#[test]
fn test_rejected_mapping_list_flushes_nothing() {
    let (mut a, mut b) = bridge_pair(BridgeConfig::default());
    a.bridge.prepare(&HOLDER, 100, &random_address(), 0, &TOKEN_A).unwrap();

    let result = a.bridge.map_tokens(
        &OWNER,
        vec![
            TokenMapping::new(TOKEN_A, ZERO_ADDRESS, 200_000, 0),
            TokenMapping::new(NATIVE_TOKEN, TOKEN_B, 0, 0),
        ],
    );
    assert!(matches!(result, Err(BridgeError::Validation(_))));
    assert!(b.inbound.try_recv().is_err());
    assert!(a.bridge.is_mapped(&TOKEN_A));

    a.bridge
        .map_token(&OWNER, TokenMapping::new(TOKEN_A, ZERO_ADDRESS, 200_000, 0))
        .unwrap();
    assert!(b.pump().into_iter().all(|result| result.is_ok()));
    assert!(b.inbound.try_recv().is_err());
    assert_eq!(b.bridge.pending_credit_of(&TOKEN_B), 50);
}
