//! Bidirectional accumulator bridge engine.
//!
//! This crate moves a project's token and its backing assets between two ledgers.
//! Outbound transfers are batched per token, either in a Merkle accumulator whose
//! root is sent to the peer (and settled by proof-verified claims) or in a bounded
//! queue that is shipped and settled as a whole.

pub mod backend;
pub mod bridge;
pub mod config;
pub mod errors;
pub mod events;
pub mod inbox;
pub mod ledger;
pub mod message;
pub mod metrics;
pub mod outbox;
pub mod queue;
pub mod replay;
pub mod settlement;
pub mod state;
pub mod storage;
pub mod transport;

pub use backend::{AccountingBackend, MemoryAccounting, OwnerPermissions, Permission, PermissionProvider};
pub use bridge::Bridge;
pub use config::{BridgeConfig, CreditMode, LedgerKind, QueueConfig, StorageConfig};
pub use errors::BridgeError;
pub use events::BridgeEvent;
pub use message::{BatchMessage, Claim, Envelope, OutboundMessage, PeerIdentity, QueueItem, RootMessage};
pub use state::TokenMapping;
pub use transport::{ChannelEnd, ChannelTransport, TransportAdapter};
