//! wallet配置：TOML 文件、环境变量与默认值

use crate::core::domain::{AppVersion, Chain, NetworkParams, Operation};
use crate::core::errors::WalletError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "AVAX_WALLET_CONFIG";

/// Largest `limit` the node honours for one `getUTXOs` page.
pub const MAX_UTXO_PAGE_LIMIT: u32 = 1024;

/// Node connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Base URL of the node (e.g. http://localhost:9650)
    #[serde(default = "NodeConfig::default_url")]
    pub url: String,

    /// HTTP request timeout (seconds)
    #[serde(default = "NodeConfig::default_timeout_secs")]
    pub timeout_secs: u64,

    /// Page size for UTXO queries (1..=1024)
    #[serde(default = "NodeConfig::default_page_limit")]
    pub page_limit: u32,
}

impl NodeConfig {
    fn default_url() -> String { "http://localhost:9650".to_string() }
    fn default_timeout_secs() -> u64 { 30 }
    fn default_page_limit() -> u32 { MAX_UTXO_PAGE_LIMIT }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            timeout_secs: Self::default_timeout_secs(),
            page_limit: Self::default_page_limit(),
        }
    }
}

/// Address discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Indices per batch; also the gap limit
    #[serde(default = "DiscoveryConfig::default_gap_limit")]
    pub gap_limit: u32,

    /// Minimum number of indices examined before an empty batch may stop the scan
    #[serde(default = "DiscoveryConfig::default_scan_floor")]
    pub scan_floor: u32,
}

impl DiscoveryConfig {
    fn default_gap_limit() -> u32 { 20 }
    fn default_scan_floor() -> u32 { 70 }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            gap_limit: Self::default_gap_limit(),
            scan_floor: Self::default_scan_floor(),
        }
    }
}

/// Minimum app version for transaction signing of one (chain, operation) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionThreshold {
    pub chain: Chain,
    pub operation: Operation,
    pub min_version: AppVersion,
}

/// Signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// BIP32 account prefix held on the device
    #[serde(default = "SigningConfig::default_account_prefix")]
    pub account_prefix: String,

    /// Version gates for transaction signing
    #[serde(default = "SigningConfig::default_thresholds")]
    pub thresholds: Vec<VersionThreshold>,
}

impl SigningConfig {
    fn default_account_prefix() -> String { "m/44'/9000'/0'".to_string() }

    fn default_thresholds() -> Vec<VersionThreshold> {
        let gate = |chain, operation, v: (u8, u8, u8)| VersionThreshold {
            chain,
            operation,
            min_version: AppVersion::new(v.0, v.1, v.2),
        };
        vec![
            gate(Chain::X, Operation::Transfer, (0, 3, 0)),
            gate(Chain::X, Operation::Export, (0, 4, 0)),
            gate(Chain::X, Operation::Import, (0, 4, 0)),
            gate(Chain::P, Operation::Transfer, (0, 5, 0)),
            gate(Chain::P, Operation::Export, (0, 4, 0)),
            gate(Chain::P, Operation::Import, (0, 4, 0)),
            gate(Chain::C, Operation::Transfer, (0, 5, 0)),
            gate(Chain::C, Operation::Export, (0, 5, 0)),
            gate(Chain::C, Operation::Import, (0, 5, 0)),
        ]
    }

    /// Threshold configured for the pair, if any.
    pub fn threshold_for(&self, chain: Chain, operation: Operation) -> Option<AppVersion> {
        self.thresholds
            .iter()
            .find(|t| t.chain == chain && t.operation == operation)
            .map(|t| t.min_version)
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            account_prefix: Self::default_account_prefix(),
            thresholds: Self::default_thresholds(),
        }
    }
}

/// wallet配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Active network name; a preset or a key of `networks`
    #[serde(default = "WalletConfig::default_network")]
    pub network: String,

    /// Extra networks beyond mainnet/fuji/local
    #[serde(default)]
    pub networks: HashMap<String, NetworkParams>,

    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub signing: SigningConfig,
}

impl WalletConfig {
    fn default_network() -> String { "local".to_string() }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, WalletError> {
        let config: WalletConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from `$AVAX_WALLET_CONFIG`, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, WalletError> {
        let env_path = std::env::var(CONFIG_ENV_VAR).ok();
        let resolved = path
            .map(|p| p.to_path_buf())
            .or_else(|| env_path.map(Into::into));

        match resolved {
            Some(p) => {
                info!(path = %p.display(), "Loading wallet configuration");
                let content = std::fs::read_to_string(&p)
                    .map_err(|e| WalletError::Config(format!("{}: {}", p.display(), e)))?;
                Self::from_toml_str(&content)
            }
            None => {
                debug!("No configuration file given; using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Resolve the active network parameters.
    pub fn network_params(&self) -> Result<NetworkParams, WalletError> {
        if let Some(custom) = self.networks.get(&self.network) {
            return Ok(custom.clone());
        }
        NetworkParams::preset(&self.network)
            .ok_or_else(|| WalletError::Config(format!("unknown network: {}", self.network)))
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.discovery.gap_limit == 0 {
            return Err(WalletError::Config("discovery.gap_limit must be > 0".to_string()));
        }
        if !(1..=MAX_UTXO_PAGE_LIMIT).contains(&self.node.page_limit) {
            return Err(WalletError::Config(format!(
                "node.page_limit must be within 1..={}, got {}",
                MAX_UTXO_PAGE_LIMIT, self.node.page_limit
            )));
        }
        for (name, params) in &self.networks {
            if params.hrp.is_empty() || params.hrp.chars().any(|c| c.is_ascii_uppercase()) {
                return Err(WalletError::Config(format!(
                    "network {}: hrp must be non-empty lowercase",
                    name
                )));
            }
        }
        self.network_params()?;
        Ok(())
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Self::default_network(),
            networks: HashMap::new(),
            node: NodeConfig::default(),
            discovery: DiscoveryConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}
