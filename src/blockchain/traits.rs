use async_trait::async_trait;

use crate::{
    blockchain::avalanche::{transaction::SignedTransaction, utxo::UtxoSet},
    core::{domain::Chain, errors::WalletError},
};

/// UTXO lookup against a node.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// All UTXOs owned by any of `addresses` on `chain`.
    ///
    /// One call per discovery batch; implementations page internally.
    async fn get_utxos(&self, chain: Chain, addresses: &[String]) -> Result<UtxoSet, WalletError>;
}

/// Submits signed transactions.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Returns the transaction id assigned by the node.
    async fn issue_tx(&self, chain: Chain, signed: &SignedTransaction) -> Result<String, WalletError>;
}
