//! address发现模块
//!
//! Gap-limited traversal of the `<branch>/<index>` tree. Batches of `G`
//! indices are derived on both branches and queried together; the scan stops
//! once a batch comes back empty and at least the scan floor of indices has
//! been examined.

use super::record::{AddressEntry, AddressRecord};
use crate::blockchain::avalanche::address::AddressCodec;
use crate::blockchain::avalanche::utxo::UtxoSet;
use crate::blockchain::traits::ChainQuery;
use crate::core::bip44::{Branch, DerivationPath, KeyDeriver, HARDENED_OFFSET};
use crate::core::config::DiscoveryConfig;
use crate::core::domain::Chain;
use crate::core::errors::WalletError;
use std::collections::BTreeSet;
use std::ops::Range;
use tracing::{debug, info};

/// Termination predicate of the scan.
pub fn is_done(indices_examined: u32, last_batch_exhausted: bool, scan_floor: u32) -> bool {
    last_batch_exhausted && indices_examined >= scan_floor
}

/// Lazy sequence of index batches.
#[derive(Debug, Clone)]
pub struct BatchCursor {
    gap_limit: u32,
    scan_floor: u32,
    examined: u32,
    last_exhausted: bool,
}

impl BatchCursor {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            gap_limit: config.gap_limit.max(1),
            scan_floor: config.scan_floor,
            examined: 0,
            last_exhausted: false,
        }
    }

    /// Next index range to examine, or `None` once the scan is complete.
    pub fn next_batch(&self) -> Option<Range<u32>> {
        if is_done(self.examined, self.last_exhausted, self.scan_floor) || self.examined >= HARDENED_OFFSET {
            return None;
        }
        let end = self.examined.saturating_add(self.gap_limit).min(HARDENED_OFFSET);
        Some(self.examined..end)
    }

    /// Record the outcome of the batch returned by [`next_batch`](Self::next_batch).
    pub fn complete(&mut self, batch: &Range<u32>, exhausted: bool) {
        self.examined = batch.end;
        self.last_exhausted = exhausted;
    }

    pub fn indices_examined(&self) -> u32 {
        self.examined
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    pub chain: Chain,
    pub utxos: UtxoSet,
    pub record: AddressRecord,
    pub indices_examined: u32,
    used: BTreeSet<DerivationPath>,
}

impl DiscoveryResult {
    fn new(chain: Chain, utxos: UtxoSet, record: AddressRecord, indices_examined: u32) -> Self {
        let used = utxos
            .owners()
            .iter()
            .filter_map(|pkh| record.path_for_pkh(pkh))
            .collect();
        Self {
            chain,
            utxos,
            record,
            indices_examined,
            used,
        }
    }

    /// Whether the address at `path` holds at least one UTXO.
    pub fn is_used(&self, path: &DerivationPath) -> bool {
        self.used.contains(path)
    }

    /// Funded entries of one branch by ascending index.
    pub fn funded(&self, branch: Branch) -> impl Iterator<Item = &AddressEntry> {
        self.record.branch(branch).filter(|e| self.used.contains(&e.path))
    }

    /// Funded addresses of one branch by ascending index.
    pub fn ordered_addresses(&self, branch: Branch) -> Vec<String> {
        self.funded(branch).map(|e| e.address.clone()).collect()
    }

    /// Spend order: change addresses, then non-change, each by ascending index.
    pub fn from_addresses(&self) -> Vec<String> {
        let mut addresses = self.ordered_addresses(Branch::Change);
        addresses.extend(self.ordered_addresses(Branch::NonChange));
        addresses
    }

    /// First index of `branch` past the last used one.
    ///
    /// Walks backward from the last examined index and stops at the first used
    /// address; an earlier unused hole is not reported.
    pub fn next_unused(&self, branch: Branch) -> DerivationPath {
        let index = (0..self.indices_examined)
            .rev()
            .find(|i| self.used.contains(&DerivationPath::new(branch, *i)))
            .map_or(0, |i| i + 1);
        DerivationPath::new(branch, index)
    }

    /// Path and address of the next unused index of `branch`.
    pub fn next_unused_address(&self, branch: Branch) -> Result<(DerivationPath, String), WalletError> {
        let path = self.next_unused(branch);
        let address = self
            .record
            .address_for_path(&path)
            .ok_or_else(|| WalletError::PathNotFound(format!("{} was not examined during discovery", path)))?;
        Ok((path, address.to_string()))
    }
}

/// Batched, gap-limited address discovery on one chain.
pub struct DiscoveryScanner<'a> {
    chain: Chain,
    codec: &'a AddressCodec,
    deriver: &'a KeyDeriver,
    config: DiscoveryConfig,
}

impl<'a> DiscoveryScanner<'a> {
    pub fn new(chain: Chain, codec: &'a AddressCodec, deriver: &'a KeyDeriver, config: DiscoveryConfig) -> Self {
        Self {
            chain,
            codec,
            deriver,
            config,
        }
    }

    /// Scan until the termination predicate holds.
    ///
    /// Batches are queried strictly in increasing index order.
    pub async fn scan(&self, query: &dyn ChainQuery) -> Result<DiscoveryResult, WalletError> {
        let mut cursor = BatchCursor::new(&self.config);
        let mut record = AddressRecord::new();
        let mut utxos = UtxoSet::new();

        while let Some(batch) = cursor.next_batch() {
            let mut non_change = Vec::with_capacity(batch.len());
            let mut change = Vec::with_capacity(batch.len());
            for index in batch.clone() {
                for path in [DerivationPath::non_change(index), DerivationPath::change(index)] {
                    let pkh = self.deriver.derive_pkh(&path)?;
                    let address = self.codec.pkh_to_address(self.chain, &pkh)?;
                    match path.branch {
                        Branch::NonChange => non_change.push(address.clone()),
                        Branch::Change => change.push(address.clone()),
                    }
                    record.insert(path, address, pkh);
                }
            }
            non_change.extend(change);

            let found = query.get_utxos(self.chain, &non_change).await?;
            let exhausted = found.is_empty();
            debug!(
                chain = %self.chain,
                start = batch.start,
                end = batch.end,
                utxos = found.len(),
                "Discovery batch"
            );
            utxos.merge(&found);
            cursor.complete(&batch, exhausted);
        }

        let result = DiscoveryResult::new(self.chain, utxos, record, cursor.indices_examined());
        info!(
            chain = %self.chain,
            indices = result.indices_examined,
            used = result.used.len(),
            utxos = result.utxos.len(),
            "Discovery complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, false, false ; "nothing examined")]
    #[test_case(20, true, false ; "empty first batch below floor")]
    #[test_case(60, true, false ; "still below floor")]
    #[test_case(80, false, false ; "past floor but funded")]
    #[test_case(80, true, true ; "past floor and exhausted")]
    #[test_case(70, true, true ; "floor is inclusive")]
    fn test_is_done(examined: u32, exhausted: bool, expected: bool) {
        assert_eq!(is_done(examined, exhausted, 70), expected);
    }

    #[test]
    fn test_cursor_walks_until_floor() {
        let mut cursor = BatchCursor::new(&DiscoveryConfig::default());
        let mut batches = Vec::new();
        while let Some(batch) = cursor.next_batch() {
            batches.push(batch.clone());
            cursor.complete(&batch, true);
        }
        assert_eq!(batches, vec![0..20, 20..40, 40..60, 60..80]);
        assert_eq!(cursor.indices_examined(), 80);
    }

    #[test]
    fn test_cursor_continues_while_funded() {
        let config = DiscoveryConfig { gap_limit: 10, scan_floor: 0 };
        let mut cursor = BatchCursor::new(&config);
        let first = cursor.next_batch().unwrap();
        cursor.complete(&first, false);
        let second = cursor.next_batch().unwrap();
        assert_eq!(second, 10..20);
        cursor.complete(&second, true);
        assert!(cursor.next_batch().is_none());
    }
}
