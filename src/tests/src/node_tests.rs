//! Tests for the node.

use ferry_bridge::{metrics, AccountingBackend, BridgeEvent, LedgerKind};
use ferry_core::Address;
use ferry_node::{Devnet, NodeConfig, Side};
use rand::Rng;
use serial_test::serial;
use tempfile::tempdir;
use tokio::runtime::Runtime;

/// Tests transfers in both directions through the devnet.
#[test]
#[serial]
fn test_devnet_round_trip() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let config = NodeConfig::default();
        let holder = config.devnet.holder;
        let mut devnet = Devnet::new(&config).unwrap();
        let mut rng = rand::thread_rng();

        let beneficiaries: Vec<Address> = (0..4).map(|_| rng.gen()).collect();
        for beneficiary in &beneficiaries {
            devnet.prepare(Side::Local, &holder, 200, beneficiary).await.unwrap();
        }
        devnet.flush(Side::Local, 0).await.unwrap();

        assert_eq!(devnet.relay().await.unwrap(), 1);
        assert_eq!(devnet.claim_ready(Side::Remote).await.unwrap(), 4);
        // Nothing left to claim
        assert_eq!(devnet.claim_ready(Side::Remote).await.unwrap(), 0);

        let remote = devnet.endpoint(Side::Remote);
        for beneficiary in &beneficiaries {
            assert_eq!(remote.accounting.balance_of(beneficiary), 200);
        }
        assert_eq!(
            remote.accounting.current_surplus(&remote.token),
            config.devnet.initial_surplus + 400
        );

        // Send half back
        for beneficiary in &beneficiaries {
            devnet.prepare(Side::Remote, beneficiary, 100, &holder).await.unwrap();
        }
        devnet.flush(Side::Remote, 0).await.unwrap();
        devnet.relay().await.unwrap();
        assert_eq!(devnet.claim_ready(Side::Local).await.unwrap(), 4);

        let local = devnet.endpoint(Side::Local);
        assert_eq!(
            local.accounting.balance_of(&holder),
            config.devnet.holder_balance - 800 + 400
        );

        let claims = devnet
            .events()
            .iter()
            .filter(|(_, event)| matches!(event, BridgeEvent::Claimed { .. }))
            .count();
        assert_eq!(claims, 8);
    });
}

/// Tests that a second root is claimed from where the first one stopped.
#[test]
#[serial]
fn test_devnet_incremental_claims() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let config = NodeConfig::default();
        let holder = config.devnet.holder;
        let mut devnet = Devnet::new(&config).unwrap();

        devnet.prepare(Side::Local, &holder, 10, &[0x21; 32]).await.unwrap();
        devnet.flush(Side::Local, 0).await.unwrap();
        devnet.relay().await.unwrap();
        assert_eq!(devnet.claim_ready(Side::Remote).await.unwrap(), 1);

        devnet.prepare(Side::Local, &holder, 10, &[0x22; 32]).await.unwrap();
        devnet.prepare(Side::Local, &holder, 10, &[0x23; 32]).await.unwrap();
        devnet.flush(Side::Local, 0).await.unwrap();
        devnet.relay().await.unwrap();
        assert_eq!(devnet.claim_ready(Side::Remote).await.unwrap(), 2);

        let remote = devnet.endpoint(Side::Remote);
        let bridge = remote.bridge.lock().await;
        assert_eq!(bridge.inbox_of(&remote.token).nonce, 2);
        assert_eq!(bridge.pending_credit_of(&remote.token), 0);
    });
}

/// Tests the devnet with queued ledgers.
#[test]
#[serial]
fn test_devnet_queued() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut config = NodeConfig::default();
        config.local.ledger = LedgerKind::Queued;
        config.remote.ledger = LedgerKind::Queued;
        let holder = config.devnet.holder;
        let mut devnet = Devnet::new(&config).unwrap();

        devnet.prepare(Side::Local, &holder, 30, &[0x31; 32]).await.unwrap();
        devnet.flush(Side::Local, 0).await.unwrap();
        assert_eq!(devnet.relay().await.unwrap(), 1);

        // Batches settle on arrival
        assert_eq!(devnet.claim_ready(Side::Remote).await.unwrap(), 0);
        let remote = devnet.endpoint(Side::Remote);
        assert_eq!(remote.accounting.balance_of(&[0x31; 32]), 30);
    });
}

/// Tests that both sides come back from disk.
#[test]
#[serial]
fn test_devnet_persistence() {
    let dir = tempdir().unwrap();
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let config = NodeConfig::default().with_data_dir(dir.path());
        let holder = config.devnet.holder;

        {
            let mut devnet = Devnet::new(&config).unwrap();
            devnet.prepare(Side::Local, &holder, 10, &[0x41; 32]).await.unwrap();
            devnet.flush(Side::Local, 0).await.unwrap();
            devnet.relay().await.unwrap();
        }

        let devnet = Devnet::new(&config).unwrap();
        let remote = devnet.endpoint(Side::Remote);
        let bridge = remote.bridge.lock().await;
        assert_eq!(bridge.inbox_of(&remote.token).nonce, 1);
        assert_eq!(bridge.pending_credit_of(&remote.token), 5);
        // Mapping was loaded, not applied again
        assert!(devnet.events().is_empty());
    });
}

/// Tests that committed events show up in the metrics.
#[test]
#[serial]
fn test_metrics_after_claims() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let config = NodeConfig::default();
        let holder = config.devnet.holder;
        let mut devnet = Devnet::new(&config).unwrap();

        let before = metrics::CLAIMS_SETTLED.get();
        devnet.prepare(Side::Local, &holder, 10, &[0x51; 32]).await.unwrap();
        devnet.flush(Side::Local, 0).await.unwrap();
        devnet.relay().await.unwrap();
        devnet.claim_ready(Side::Remote).await.unwrap();

        assert!(metrics::CLAIMS_SETTLED.get() > before);
        let text = metrics::gather_text().unwrap();
        assert!(text.contains("ferry_claims_settled_total"));
        assert!(text.contains("ferry_leaves_inserted_total"));
    });
}
