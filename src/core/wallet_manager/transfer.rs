//! 转账准备模块
//!
//! Everything an external transaction builder needs from discovery.

use super::discovery::DiscoveryResult;
use super::record::AddressRecord;
use crate::blockchain::avalanche::utxo::UtxoSet;
use crate::core::bip44::{Branch, DerivationPath};
use crate::core::errors::WalletError;
use serde::Serialize;

/// Inputs to the transaction builder.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub utxos: UtxoSet,
    /// Change addresses then non-change, each by ascending index
    pub from_addresses: Vec<String>,
    pub change_path: DerivationPath,
    pub change_address: String,
    pub record: AddressRecord,
}

impl TransferPlan {
    pub fn from_discovery(result: DiscoveryResult) -> Result<Self, WalletError> {
        let from_addresses = result.from_addresses();
        let (change_path, change_address) = result.next_unused_address(Branch::Change)?;
        Ok(Self {
            from_addresses,
            change_path,
            change_address,
            utxos: result.utxos,
            record: result.record,
        })
    }

    /// Serializable view handed to the builder.
    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            from_addresses: self.from_addresses.clone(),
            change_address: self.change_address.clone(),
            change_path: self.change_path.to_string(),
            utxo_ids: self.utxos.iter().map(|u| u.id.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub from_addresses: Vec<String>,
    pub change_address: String,
    pub change_path: String,
    pub utxo_ids: Vec<String>,
}
