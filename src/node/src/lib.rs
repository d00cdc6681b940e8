//! Node for the Ferry bridge.
//!
//! Runs both sides of a bridge in one process: two [`ferry_bridge::Bridge`]
//! instances over an in-process transport, with a relay that delivers envelopes
//! and a claimant that proves leaves against the roots each side received.

pub mod config;
pub mod devnet;
pub mod errors;
pub mod metrics;

pub use config::NodeConfig;
pub use devnet::{Devnet, Side};
pub use errors::NodeError;
