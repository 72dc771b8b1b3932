use crate::core::bip44::DerivationPath;
use crate::core::config::WalletConfig;
use crate::core::domain::Chain;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Avalanche Ledger wallet CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(name = "wallet-cli", about = "Avalanche hardware wallet CLI", version)]
pub struct Cli {
    /// TOML config file (defaults to $AVAX_WALLET_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Network name (mainnet, fuji, local or a configured one)
    #[arg(long, global = true)]
    pub network: Option<String>,

    /// Node base URL
    #[arg(long, global = true)]
    pub node: Option<String>,

    /// Chain alias (X, P or C)
    #[arg(long, global = true, default_value = "X")]
    pub chain: Chain,

    /// Sign with a seeded software signer instead of a device (hex seed)
    #[arg(long, global = true, hide = true)]
    pub mock_seed: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List connected Ledger devices
    ListDevices,
    /// Model of the first connected device
    GetDeviceModel,
    /// Name and version of the Avalanche app
    GetAppVersion,
    /// Wallet id of the device seed
    GetWalletId,
    /// Extended public key at a hardened path
    GetExtendedPublicKey {
        #[arg(default_value = "m/44'/9000'/0'")]
        path: String,
    },
    /// Address of one derivation path
    GetAddress {
        chain: Chain,
        /// `<branch>/<index>`
        path: DerivationPath,
    },
    /// First unused receive address
    GetNewReceiveAddress,
    /// Total balance of the account
    GetBalance {
        /// Also print every funded address
        #[arg(long)]
        list_addresses: bool,
    },
    /// UTXOs of one address
    GetUtxos { address: String },
    /// From-address list and change address for a transaction builder
    PrepareTransfer,
    /// Sign an unsigned transaction (JSON)
    SignUnsigned {
        #[arg(long)]
        tx: PathBuf,
        /// Submit the signed transaction to the node
        #[arg(long)]
        broadcast: bool,
    },
}

impl Cli {
    /// Command-line flags take precedence over the config file.
    pub fn apply_overrides(&self, config: &mut WalletConfig) {
        if let Some(network) = &self.network {
            config.network = network.clone();
        }
        if let Some(node) = &self.node {
            config.node.url = node.clone();
        }
    }
}
