//! balance汇总模块

use super::discovery::DiscoveryResult;
use crate::blockchain::avalanche::utxo::UtxoSet;
use crate::core::bip44::DerivationPath;
use crate::core::domain::format_avax;
use serde::Serialize;

/// Sum of all entry amounts, in nAVAX.
pub fn balance(utxos: &UtxoSet) -> u128 {
    utxos.iter().map(|e| e.amount as u128).sum()
}

/// Balance of one discovered address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressBalance {
    pub address: String,
    pub path: String,
    pub amount: u128,
}

/// Total plus per-address breakdown, ordered by branch then index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub total: u128,
    pub per_address: Vec<AddressBalance>,
}

impl BalanceReport {
    pub fn from_discovery(result: &DiscoveryResult) -> Self {
        let per_address = result
            .record
            .iter()
            .filter_map(|entry| {
                let amount: u128 = result.utxos.by_owner(&entry.pkh).map(|u| u.amount as u128).sum();
                (amount > 0).then(|| AddressBalance {
                    address: entry.address.clone(),
                    path: entry.path.to_string(),
                    amount,
                })
            })
            .collect();

        Self {
            total: balance(&result.utxos),
            per_address,
        }
    }

    /// Amount held at `path`, zero if absent.
    pub fn amount_at(&self, path: &DerivationPath) -> u128 {
        let path = path.to_string();
        self.per_address
            .iter()
            .find(|b| b.path == path)
            .map_or(0, |b| b.amount)
    }

    pub fn total_avax(&self) -> String {
        format_avax(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::avalanche::utxo::UtxoEntry;
    use crate::core::domain::{PublicKeyHash, PKH_LEN};

    #[test]
    fn test_balance_exceeds_u64() {
        let owner = PublicKeyHash([1; PKH_LEN]);
        let set: UtxoSet = (0..3)
            .map(|i| UtxoEntry::new(format!("u:{}", i), "avax", u64::MAX, owner))
            .collect();
        assert_eq!(balance(&set), 3 * u64::MAX as u128);
    }

    #[test]
    fn test_empty_balance() {
        assert_eq!(balance(&UtxoSet::new()), 0);
    }
}
