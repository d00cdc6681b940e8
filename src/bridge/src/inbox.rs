//! Inbound roots from the peer.

use crate::errors::BridgeError;
use crate::events::BridgeEvent;
use crate::state::TokenState;
use ferry_core::{branch_root, types::short_hex, Balance, Hash, Leaf, Proof, RemoteRoot, TokenId};
use tracing::{info, warn};

/// Applies a root received from the peer to the inbox of `token`.
///
/// The carried `amount` is always added to pending credit: roots may arrive out
/// of order, and an older root still delivers funds. The stored root only moves
/// forward, to roots with a strictly greater nonce.
pub fn apply_root(token: &TokenId, state: &mut TokenState, amount: Balance, root: RemoteRoot) -> Result<Vec<BridgeEvent>, BridgeError> {
    let pending = state.pending_credit.checked_add(amount).ok_or_else(|| {
        BridgeError::Validation(format!("pending credit of {} would overflow", short_hex(token)))
    })?;
    state.pending_credit = pending;

    let mut events = vec![BridgeEvent::CreditReceived {
        token: *token,
        amount,
        pending,
    }];

    if root.nonce > state.inbox.nonce {
        info!(
            "New inbox root for {}: nonce {} -> {}, root {}",
            short_hex(token),
            state.inbox.nonce,
            root.nonce,
            short_hex(&root.root)
        );
        state.inbox = root;
        events.push(BridgeEvent::NewInboxTreeRoot {
            token: *token,
            nonce: root.nonce,
            root: root.root,
        });
    } else {
        warn!(
            "Ignoring stale root for {}: nonce {} is not above {}",
            short_hex(token),
            root.nonce,
            state.inbox.nonce
        );
        events.push(BridgeEvent::StaleRootRejected {
            token: *token,
            nonce: root.nonce,
            current_nonce: state.inbox.nonce,
        });
    }

    Ok(events)
}

/// Checks that `leaf` is included under the stored inbox root of `token`.
pub fn verify_leaf(token: &TokenId, state: &TokenState, leaf: &Leaf, proof: &Proof) -> Result<Hash, BridgeError> {
    let computed = branch_root(leaf.hash(), proof.siblings(), leaf.index);
    if computed != state.inbox.root {
        return Err(BridgeError::Proof {
            token: *token,
            index: leaf.index,
        });
    }
    Ok(computed)
}
