//! Configuration for the node.

use anyhow::Result;
use ferry_bridge::config::{hex_address, BridgeConfig, StorageConfig};
use ferry_core::{Address, Balance, TokenId};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Configuration for the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Bridge on the local ledger
    pub local: BridgeConfig,
    /// Bridge on the remote ledger
    pub remote: BridgeConfig,
    /// In-process ledgers the bridges settle against
    pub devnet: DevnetConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Settings of the in-process ledgers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevnetConfig {
    /// Address allowed to map tokens on both sides
    #[serde(with = "hex_address")]
    pub owner: Address,
    /// Address that starts out holding project tokens on both sides
    #[serde(with = "hex_address")]
    pub holder: Address,
    /// Project tokens issued to the holder on each side
    pub holder_balance: Balance,
    /// The project token
    #[serde(with = "hex_address")]
    pub project_token: TokenId,
    /// Backing asset on the local ledger
    #[serde(with = "hex_address")]
    pub local_token: TokenId,
    /// Backing asset on the remote ledger
    #[serde(with = "hex_address")]
    pub remote_token: TokenId,
    /// Backing assets the project holds on each side at start
    pub initial_surplus: Balance,
    /// Redemption rate in basis points
    pub redemption_rate_bps: u32,
    /// Flat fee charged by the transport per message
    pub transport_fee: Balance,
    /// Execution budget of the token mappings
    pub min_execution_budget: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to enable the metrics server
    pub enabled: bool,
    /// Listen address for the metrics server
    pub listen_addr: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let local = BridgeConfig::default();
        let remote = local.mirrored();
        Self {
            local,
            remote,
            devnet: DevnetConfig {
                owner: [0x0F; 32],
                holder: [0x11; 32],
                holder_balance: 1_000_000,
                project_token: [0x10; 32],
                local_token: [0xAA; 32],
                remote_token: [0xBB; 32],
                initial_surplus: 1_000_000,
                redemption_rate_bps: 5_000,
                transport_fee: 0,
                min_execution_budget: 200_000,
            },
            metrics: MetricsConfig {
                enabled: false,
                listen_addr: "127.0.0.1:9090".to_string(),
            },
        }
    }
}

impl NodeConfig {
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

    /// Points both bridges at subdirectories of `data_dir`.
    pub fn with_data_dir<P: AsRef<Path>>(mut self, data_dir: P) -> Self {
        let data_dir = data_dir.as_ref();
        self.local.storage = Some(StorageConfig {
            data_dir: data_dir.join("local").to_string_lossy().into_owned(),
        });
        self.remote.storage = Some(StorageConfig {
            data_dir: data_dir.join("remote").to_string_lossy().into_owned(),
        });
        self
    }
}
