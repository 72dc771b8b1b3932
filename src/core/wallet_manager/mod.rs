//! Wallet Manager Core Module
//!
//! The HD discovery-and-signing pipeline.
//!
//! ## Module Structure
//! - `record` - address ↔ path ↔ pkh association of one command
//! - `discovery` - gap-limited address discovery
//! - `balance` - balance aggregation
//! - `transfer` - from-address ordering and change address
//! - `signing` - batched hardware signing and credential assembly

pub mod balance;
pub mod discovery;
pub mod record;
pub mod signing;
pub mod transfer;

pub use balance::{AddressBalance, BalanceReport};
pub use discovery::{BatchCursor, DiscoveryResult, DiscoveryScanner};
pub use record::{AddressEntry, AddressRecord};
pub use signing::{SigningMode, SigningOrchestrator};
pub use transfer::{TransferPlan, TransferSummary};

use crate::blockchain::avalanche::address::AddressCodec;
use crate::blockchain::avalanche::transaction::{InputSelector, SignedTransaction, UnsignedTransaction};
use crate::blockchain::traits::ChainQuery;
use crate::core::bip44::{Bip32Path, DerivationPath, KeyDeriver};
use crate::core::config::WalletConfig;
use crate::core::domain::{Chain, NetworkParams};
use crate::core::errors::WalletError;
use crate::hardware::SignerSession;
use tracing::info;

/// Entry point of the pipeline for one configured network.
pub struct WalletManager {
    config: WalletConfig,
    network: NetworkParams,
    codec: AddressCodec,
    prefix: Bip32Path,
}

impl WalletManager {
    pub fn new(config: WalletConfig) -> Result<Self, WalletError> {
        config.validate()?;
        let network = config.network_params()?;
        let codec = AddressCodec::new(&network)?;
        let prefix: Bip32Path = config.signing.account_prefix.parse()?;
        info!(network = %network.name, hrp = %network.hrp, "Wallet manager ready");
        Ok(Self {
            config,
            network,
            codec,
            prefix,
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn network(&self) -> &NetworkParams {
        &self.network
    }

    pub fn codec(&self) -> &AddressCodec {
        &self.codec
    }

    pub fn account_prefix(&self) -> &Bip32Path {
        &self.prefix
    }

    /// Fetch the account key once and build the deriver for this command.
    pub async fn account_deriver(&self, session: &mut SignerSession) -> Result<KeyDeriver, WalletError> {
        let account = session.account_key(&self.prefix).await?;
        KeyDeriver::new(&account)
    }

    pub fn derive_address(&self, deriver: &KeyDeriver, chain: Chain, path: &DerivationPath) -> Result<String, WalletError> {
        let pkh = deriver.derive_pkh(path)?;
        self.codec.pkh_to_address(chain, &pkh)
    }

    pub async fn discover(
        &self,
        deriver: &KeyDeriver,
        chain: Chain,
        query: &dyn ChainQuery,
    ) -> Result<DiscoveryResult, WalletError> {
        DiscoveryScanner::new(chain, &self.codec, deriver, self.config.discovery.clone())
            .scan(query)
            .await
    }

    /// Total balance and per-address breakdown of the device's account.
    pub async fn discover_balance(
        &self,
        session: &mut SignerSession,
        chain: Chain,
        query: &dyn ChainQuery,
    ) -> Result<BalanceReport, WalletError> {
        let deriver = self.account_deriver(session).await?;
        let result = self.discover(&deriver, chain, query).await?;
        Ok(BalanceReport::from_discovery(&result))
    }

    /// UTXOs, spend order, change address and address record for a transfer.
    pub async fn discover_for_transfer(
        &self,
        session: &mut SignerSession,
        chain: Chain,
        query: &dyn ChainQuery,
    ) -> Result<TransferPlan, WalletError> {
        let deriver = self.account_deriver(session).await?;
        let result = self.discover(&deriver, chain, query).await?;
        TransferPlan::from_discovery(result)
    }

    /// Sign `tx` with the session's device, choosing the signing mode from the
    /// device app version and the configured threshold for the transaction's
    /// chain and operation.
    pub async fn sign_unsigned(
        &self,
        tx: &UnsignedTransaction,
        record: &AddressRecord,
        session: &mut SignerSession,
    ) -> Result<SignedTransaction, WalletError> {
        let version = session.app_version().await?;
        let threshold = self.config.signing.threshold_for(tx.chain, tx.operation);
        let mode = SigningMode::select(version, threshold);
        info!(
            chain = %tx.chain,
            operation = %tx.operation,
            version = %version,
            ?mode,
            "Selected signing mode"
        );

        let selector = InputSelector::for_transaction(tx.chain, tx.operation);
        SigningOrchestrator::new(&self.codec, record, self.prefix.clone())
            .sign(tx, selector, mode, session.signer())
            .await
    }
}
