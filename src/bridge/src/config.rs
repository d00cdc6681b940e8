//! Configuration for a bridge instance.

use crate::message::PeerIdentity;
use anyhow::Result;
use ferry_core::Balance;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// When funds delivered by the peer are applied to local accounting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditMode {
    /// Each claim forwards its leaf's backing amount.
    OnClaim,
    /// Delivered funds wait for an explicit `credit_pending` call.
    Manual,
}

/// Strategy used to track outbound transfers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Merkle accumulator with proof-gated claims
    Accumulator,
    /// Bounded queue settled on arrival
    Queued,
}

/// Configuration for a bridge instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// This bridge
    pub identity: PeerIdentity,
    /// The counterpart bridge on the other ledger
    pub peer: PeerIdentity,
    /// Project whose token this bridge moves
    pub project_id: u64,
    /// The same project on the peer ledger
    pub peer_project_id: u64,
    /// Credit mode for delivered funds
    pub credit_mode: CreditMode,
    /// Outbound transfer strategy
    pub ledger: LedgerKind,
    /// Lowest execution budget a non-native token mapping may request
    pub min_execution_budget_floor: u64,
    /// Transport payment available to dispatches the bridge triggers on its own
    /// (queue auto-flush, flush on unmapping)
    pub dispatch_fee_allowance: Balance,
    /// Queued ledger settings
    pub queue: QueueConfig,
    /// Storage configuration, in-memory only when absent
    pub storage: Option<StorageConfig>,
}

/// Queued ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of entries that triggers an automatic dispatch
    pub max_batch_size: usize,
    /// Execution budget of an empty batch
    pub base_budget: u64,
    /// Execution budget added per queued entry
    pub per_item_budget: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory
    pub data_dir: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            identity: PeerIdentity {
                chain_id: 1,
                bridge: [0x01; 32],
            },
            peer: PeerIdentity {
                chain_id: 2,
                bridge: [0x02; 32],
            },
            project_id: 1,
            peer_project_id: 1,
            credit_mode: CreditMode::OnClaim,
            ledger: LedgerKind::Accumulator,
            min_execution_budget_floor: 200_000,
            dispatch_fee_allowance: 0,
            queue: QueueConfig::default(),
            storage: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 6,
            base_budget: 100_000,
            per_item_budget: 50_000,
        }
    }
}

impl QueueConfig {
    /// Execution budget for a batch of `entries` transfers.
    pub fn budget_for(&self, entries: usize) -> u64 {
        self.base_budget
            .saturating_add(self.per_item_budget.saturating_mul(entries as u64))
    }
}

impl BridgeConfig {
    /// Returns the configuration of the peer bridge, mirrored from this one.
    pub fn mirrored(&self) -> Self {
        Self {
            identity: self.peer,
            peer: self.identity,
            project_id: self.peer_project_id,
            peer_project_id: self.project_id,
            ..self.clone()
        }
    }

    /// Loads configuration from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Saves configuration to a file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Serializes 32-byte addresses as `0x`-prefixed hex strings.
pub mod hex_address {
    use ferry_core::Address;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serializes an address as hex.
    pub fn serialize<S>(address: &Address, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(address)))
    }

    /// Deserializes an address from hex, with or without the `0x` prefix.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        parse(&text).map_err(de::Error::custom)
    }

    /// Parses a 32-byte hex address.
    pub fn parse(text: &str) -> Result<Address, String> {
        let digits = text.strip_prefix("0x").unwrap_or(text);
        let bytes = hex::decode(digits).map_err(|e| format!("invalid hex address: {}", e))?;
        bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| format!("invalid address length: {} (expected 32)", bytes.len()))
    }
}
