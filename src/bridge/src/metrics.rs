//! Prometheus metrics for bridge activity.

use crate::errors::BridgeError;
use crate::events::BridgeEvent;
use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, Opts};

lazy_static! {
    /// Leaves inserted into outbox accumulators.
    pub static ref LEAVES_INSERTED: IntCounter = register_int_counter!(
        Opts::new(
            "ferry_leaves_inserted_total",
            "Total number of leaves inserted into outbox accumulators"
        )
    )
    .unwrap();

    /// Transfers appended to outbound queues.
    pub static ref TRANSFERS_QUEUED: IntCounter = register_int_counter!(
        Opts::new(
            "ferry_transfers_queued_total",
            "Total number of transfers appended to outbound queues"
        )
    )
    .unwrap();

    /// Messages handed to the transport, by kind.
    pub static ref MESSAGES_SENT: IntCounterVec = register_int_counter_vec!(
        Opts::new(
            "ferry_messages_sent_total",
            "Total number of messages handed to the transport"
        ),
        &["kind"]
    )
    .unwrap();

    /// Roots received from the peer, by outcome.
    pub static ref ROOTS_RECEIVED: IntCounterVec = register_int_counter_vec!(
        Opts::new(
            "ferry_roots_received_total",
            "Total number of roots received from the peer"
        ),
        &["outcome"]
    )
    .unwrap();

    /// Leaf claims settled.
    pub static ref CLAIMS_SETTLED: IntCounter = register_int_counter!(
        Opts::new(
            "ferry_claims_settled_total",
            "Total number of leaf claims settled"
        )
    )
    .unwrap();

    /// Queued batches from the peer settled.
    pub static ref BATCHES_SETTLED: IntCounter = register_int_counter!(
        Opts::new(
            "ferry_batches_settled_total",
            "Total number of queued batches settled"
        )
    )
    .unwrap();

    /// Commits that could not be written to storage.
    pub static ref STORAGE_FAILURES: IntCounter = register_int_counter!(
        Opts::new(
            "ferry_storage_failures_total",
            "Total number of committed operations that failed to persist"
        )
    )
    .unwrap();

    /// Token mapping changes.
    pub static ref MAPPINGS_CHANGED: IntCounter = register_int_counter!(
        Opts::new(
            "ferry_token_mappings_changed_total",
            "Total number of token mapping changes"
        )
    )
    .unwrap();
}

/// Updates the counters for a committed event.
pub fn observe(event: &BridgeEvent) {
    match event {
        BridgeEvent::InsertToOutbox { .. } => LEAVES_INSERTED.inc(),
        BridgeEvent::TransferQueued { .. } => TRANSFERS_QUEUED.inc(),
        BridgeEvent::RootToRemote { .. } => MESSAGES_SENT.with_label_values(&["root"]).inc(),
        BridgeEvent::BatchToRemote { .. } => MESSAGES_SENT.with_label_values(&["batch"]).inc(),
        BridgeEvent::NewInboxTreeRoot { .. } => ROOTS_RECEIVED.with_label_values(&["accepted"]).inc(),
        BridgeEvent::StaleRootRejected { .. } => ROOTS_RECEIVED.with_label_values(&["stale"]).inc(),
        BridgeEvent::Claimed { .. } => CLAIMS_SETTLED.inc(),
        BridgeEvent::BatchSettled { .. } => BATCHES_SETTLED.inc(),
        BridgeEvent::TokenMapped { .. } => MAPPINGS_CHANGED.inc(),
        BridgeEvent::CreditReceived { .. } | BridgeEvent::PendingCreditApplied { .. } => {}
    }
}

/// Renders every registered metric in the Prometheus text format.
pub fn gather_text() -> Result<String, BridgeError> {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| BridgeError::Serialization(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| BridgeError::Serialization(e.to_string()))
}
