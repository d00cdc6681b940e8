//! Cross-ledger message transports.

use crate::errors::BridgeError;
use crate::message::{Envelope, OutboundMessage, PeerIdentity};
use ferry_core::Balance;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Carries envelopes between a bridge and its peer.
///
/// The transport makes no delivery-order or retry promises; the bridge only relies
/// on it to authenticate the origin of inbound envelopes.
pub trait TransportAdapter: Send + Sync {
    /// Human-readable transport name.
    fn name(&self) -> &str;

    /// Fee charged to deliver `message` with the given execution budget.
    fn quote(&self, message: &OutboundMessage, execution_budget: u64) -> Balance;

    /// Hands an envelope to the transport.
    fn send(&self, envelope: Envelope) -> Result<(), BridgeError>;

    /// Returns true if `origin` is the peer this transport is bound to.
    fn authenticate(&self, origin: &PeerIdentity) -> bool;
}

/// In-process transport backed by an unbounded tokio channel.
#[derive(Debug)]
pub struct ChannelTransport {
    name: String,
    peer: PeerIdentity,
    fee: Balance,
    outbound: mpsc::UnboundedSender<Envelope>,
}

/// One side of a [`ChannelTransport::pair`].
#[derive(Debug)]
pub struct ChannelEnd {
    /// Transport to hand to the local bridge
    pub transport: Arc<ChannelTransport>,
    /// Envelopes sent by the peer, to be fed into the local bridge
    pub inbound: mpsc::UnboundedReceiver<Envelope>,
}

impl ChannelTransport {
    /// Creates a transport bound to `peer` that forwards into `outbound`.
    pub fn new(peer: PeerIdentity, fee: Balance, outbound: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            name: format!("channel->{}", peer),
            peer,
            fee,
            outbound,
        }
    }

    /// Connects two bridges: `a` and `b` each get the transport that reaches the other.
    pub fn pair(a: PeerIdentity, b: PeerIdentity, fee: Balance) -> (ChannelEnd, ChannelEnd) {
        let (to_b, from_a) = mpsc::unbounded_channel();
        let (to_a, from_b) = mpsc::unbounded_channel();

        let end_a = ChannelEnd {
            transport: Arc::new(ChannelTransport::new(b, fee, to_b)),
            inbound: from_b,
        };
        let end_b = ChannelEnd {
            transport: Arc::new(ChannelTransport::new(a, fee, to_a)),
            inbound: from_a,
        };
        (end_a, end_b)
    }

    /// The flat fee charged per message.
    pub fn fee(&self) -> Balance {
        self.fee
    }
}

impl TransportAdapter for ChannelTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn quote(&self, _message: &OutboundMessage, _execution_budget: u64) -> Balance {
        self.fee
    }

    fn send(&self, envelope: Envelope) -> Result<(), BridgeError> {
        debug!("{} sending {}", self.name, envelope.message);
        self.outbound
            .send(envelope)
            .map_err(|_| BridgeError::Transport(format!("{}: peer receiver closed", self.name)))
    }

    fn authenticate(&self, origin: &PeerIdentity) -> bool {
        *origin == self.peer
    }
}
