//! Tests for the queued ledger.

use crate::bridge_tests::{bridge_pair, bridge_pair_with, random_address, HOLDER, TOKEN_A, TOKEN_B};
use ferry_bridge::{
    AccountingBackend, BridgeConfig, BridgeError, BridgeEvent, LedgerKind, OutboundMessage, QueueConfig,
};
use std::sync::Arc;

fn queued_config() -> BridgeConfig {
    BridgeConfig {
        ledger: LedgerKind::Queued,
        queue: QueueConfig {
            max_batch_size: 6,
            base_budget: 100_000,
            per_item_budget: 50_000,
        },
        ..BridgeConfig::default()
    }
}

/// Tests that the sixth transfer ships the whole queue and the peer settles it.
#[test]
fn test_queue_auto_dispatch() {
    let (mut a, mut b) = bridge_pair(queued_config());
    assert_eq!(a.bridge.ledger_kind(), LedgerKind::Queued);

    let beneficiaries: Vec<_> = (0..6).map(|_| random_address()).collect();

    for beneficiary in &beneficiaries[..5] {
        a.bridge.prepare(&HOLDER, 20, beneficiary, 10, &TOKEN_A).unwrap();
    }
    assert_eq!(a.bridge.queue_of(&TOKEN_A).unwrap().len(), 5);
    assert_eq!(a.bridge.pending_balance_of(&TOKEN_A), 50);
    assert!(b.inbound.try_recv().is_err());

    // The sixth entry fills the queue
    a.bridge.prepare(&HOLDER, 20, &beneficiaries[5], 10, &TOKEN_A).unwrap();
    assert!(a.bridge.queue_of(&TOKEN_A).unwrap().is_empty());
    assert_eq!(a.bridge.pending_balance_of(&TOKEN_A), 0);

    let dispatched = a.bridge.events().iter().find_map(|event| match event {
        BridgeEvent::BatchToRemote {
            items,
            amount,
            execution_budget,
            ..
        } => Some((*items, *amount, *execution_budget)),
        _ => None,
    });
    assert_eq!(dispatched, Some((6, 60, 100_000 + 6 * 50_000)));

    let envelope = b.inbound.try_recv().unwrap();
    assert_eq!(envelope.execution_budget, 400_000);
    match &envelope.message {
        OutboundMessage::Batch(batch) => {
            assert_eq!(batch.token, TOKEN_B);
            assert_eq!(batch.items.len(), 6);
            assert_eq!(batch.total_amount, 60);
        }
        other => panic!("unexpected message {}", other),
    }

    // Settlement needs no proof
    b.bridge.receive(envelope).unwrap();
    for beneficiary in &beneficiaries {
        assert_eq!(b.accounting.balance_of(beneficiary), 20);
    }
    assert_eq!(b.accounting.current_surplus(&TOKEN_B), 60);
}

/// Tests that a full queue whose fee exceeds the allowance keeps every transfer
/// until someone pays for the flush.
#[test]
fn test_full_queue_waits_for_paid_flush() {
    let (mut a, mut b) = bridge_pair_with(queued_config(), 5, |books| books as Arc<dyn AccountingBackend>);
    let beneficiaries: Vec<_> = (0..7).map(|_| random_address()).collect();

    for beneficiary in &beneficiaries {
        assert_eq!(a.bridge.prepare(&HOLDER, 20, beneficiary, 10, &TOKEN_A).unwrap(), 10);
    }

    // Every prepare past the sixth retries and fails the same way
    assert_eq!(a.accounting.balance_of(&HOLDER), 1_000 - 7 * 20);
    assert_eq!(a.bridge.queue_of(&TOKEN_A).unwrap().len(), 7);
    assert_eq!(a.bridge.pending_balance_of(&TOKEN_A), 70);
    assert!(b.inbound.try_recv().is_err());

    assert!(matches!(
        a.bridge.flush(&TOKEN_A, 4),
        Err(BridgeError::InsufficientResource { required: 5, .. })
    ));
    a.bridge.flush(&TOKEN_A, 5).unwrap();

    assert!(b.pump().into_iter().all(|result| result.is_ok()));
    for beneficiary in &beneficiaries {
        assert_eq!(b.accounting.balance_of(beneficiary), 20);
    }
    assert_eq!(b.accounting.current_surplus(&TOKEN_B), 70);
}

/// Tests that a full queue goes out on its own when the allowance covers the fee.
#[test]
fn test_allowance_pays_for_full_queue() {
    let config = BridgeConfig {
        dispatch_fee_allowance: 5,
        ..queued_config()
    };
    let (mut a, mut b) = bridge_pair_with(config, 5, |books| books as Arc<dyn AccountingBackend>);

    for _ in 0..6 {
        a.bridge.prepare(&HOLDER, 20, &random_address(), 0, &TOKEN_A).unwrap();
    }
    assert!(a.bridge.queue_of(&TOKEN_A).unwrap().is_empty());
    assert_eq!(b.pump().len(), 1);
    assert_eq!(b.accounting.current_surplus(&TOKEN_B), 60);
}

/// Tests that a short queue is flushed regardless of its size.
#[test]
fn test_queue_manual_flush() {
    let (mut a, mut b) = bridge_pair(queued_config());

    // Nothing to flush yet
    assert!(matches!(
        a.bridge.flush(&TOKEN_A, 0),
        Err(BridgeError::Validation(_))
    ));

    let beneficiary = random_address();
    a.bridge.prepare(&HOLDER, 2, &beneficiary, 0, &TOKEN_A).unwrap();
    a.bridge.flush(&TOKEN_A, 0).unwrap();

    assert!(b.pump().into_iter().all(|result| result.is_ok()));
    assert_eq!(b.accounting.balance_of(&beneficiary), 2);
    assert_eq!(b.accounting.current_surplus(&TOKEN_B), 1);
}

/// Tests that a batch for another project is refused.
#[test]
fn test_batch_for_other_project() {
    let config = BridgeConfig {
        peer_project_id: 9,
        ..queued_config()
    };
    let (mut a, mut b) = bridge_pair(config);

    a.bridge.prepare(&HOLDER, 10, &random_address(), 0, &TOKEN_A).unwrap();
    a.bridge.flush(&TOKEN_A, 0).unwrap();

    // Retarget the batch at project 1
    let mut envelope = b.inbound.try_recv().unwrap();
    if let OutboundMessage::Batch(batch) = &mut envelope.message {
        batch.destination_project_id = 1;
    }
    assert!(matches!(b.bridge.receive(envelope), Err(BridgeError::Validation(_))));
    assert_eq!(b.accounting.total_supply(), 0);
    assert!(b.bridge.events().iter().all(|event| !matches!(event, BridgeEvent::BatchSettled { .. })));
}
