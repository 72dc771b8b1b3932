//! address ↔ path ↔ pkh 映射

use crate::core::bip44::{Branch, DerivationPath};
use crate::core::domain::PublicKeyHash;
use std::collections::{BTreeMap, HashMap};

/// One derived address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressEntry {
    pub path: DerivationPath,
    pub address: String,
    pub pkh: PublicKeyHash,
}

/// Command-scoped association between derived addresses, their paths and
/// their public-key hashes.
///
/// A path maps to exactly one address and vice versa; re-inserting a path
/// replaces its previous entry.
#[derive(Debug, Clone, Default)]
pub struct AddressRecord {
    by_path: BTreeMap<DerivationPath, AddressEntry>,
    by_address: HashMap<String, DerivationPath>,
    by_pkh: HashMap<PublicKeyHash, DerivationPath>,
}

impl AddressRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: DerivationPath, address: String, pkh: PublicKeyHash) {
        if let Some(old) = self.by_path.remove(&path) {
            self.by_address.remove(&old.address);
            self.by_pkh.remove(&old.pkh);
        }
        self.by_address.insert(address.clone(), path);
        self.by_pkh.insert(pkh, path);
        self.by_path.insert(path, AddressEntry { path, address, pkh });
    }

    pub fn path_for_address(&self, address: &str) -> Option<DerivationPath> {
        self.by_address.get(address).copied()
    }

    pub fn path_for_pkh(&self, pkh: &PublicKeyHash) -> Option<DerivationPath> {
        self.by_pkh.get(pkh).copied()
    }

    pub fn entry(&self, path: &DerivationPath) -> Option<&AddressEntry> {
        self.by_path.get(path)
    }

    pub fn address_for_path(&self, path: &DerivationPath) -> Option<&str> {
        self.by_path.get(path).map(|e| e.address.as_str())
    }

    /// Entries ordered by branch, then index.
    pub fn iter(&self) -> impl Iterator<Item = &AddressEntry> {
        self.by_path.values()
    }

    /// Entries of one branch by ascending index.
    pub fn branch(&self, branch: Branch) -> impl Iterator<Item = &AddressEntry> {
        self.by_path.values().filter(move |e| e.path.branch == branch)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
