//! UTXO (Unspent Transaction Output) 管理
//!
//! UTXO entries as returned by the node, the merged UTXO set of a discovery
//! pass, and parsing of the node's binary UTXO encoding.

use crate::core::domain::{PublicKeyHash, PKH_LEN};
use crate::core::errors::WalletError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Type id of a secp256k1 transfer output.
pub const SECP256K1_TRANSFER_OUTPUT_TYPE_ID: u32 = 7;

/// UTXO 结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    /// Unique id: `<txid hex>:<output index>`
    pub id: String,
    /// Asset id (hex)
    pub asset_id: String,
    /// 金额（nAVAX）
    pub amount: u64,
    /// Owning public-key hash
    pub owner: PublicKeyHash,
}

impl UtxoEntry {
    pub fn new(id: impl Into<String>, asset_id: impl Into<String>, amount: u64, owner: PublicKeyHash) -> Self {
        Self {
            id: id.into(),
            asset_id: asset_id.into(),
            amount,
            owner,
        }
    }
}

/// Union of UTXO entries keyed by id.
///
/// Merging is idempotent and commutative: an id seen twice is kept once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSet {
    entries: BTreeMap<String, UtxoEntry>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one entry. Returns false if the id was already present.
    pub fn insert(&mut self, entry: UtxoEntry) -> bool {
        match self.entries.entry(entry.id.clone()) {
            Entry::Occupied(existing) => {
                if existing.get() != &entry {
                    warn!(id = %entry.id, "Conflicting UTXO data for the same id; keeping the first");
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: &UtxoSet) {
        for entry in other.iter() {
            self.insert(entry.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&UtxoEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UtxoEntry> {
        self.entries.values()
    }

    /// Entries owned by `pkh`.
    pub fn by_owner<'a>(&'a self, pkh: &'a PublicKeyHash) -> impl Iterator<Item = &'a UtxoEntry> + 'a {
        self.entries.values().filter(move |e| &e.owner == pkh)
    }

    /// Distinct owners present in the set.
    pub fn owners(&self) -> HashSet<PublicKeyHash> {
        self.entries.values().map(|e| e.owner).collect()
    }
}

impl FromIterator<UtxoEntry> for UtxoSet {
    fn from_iter<I: IntoIterator<Item = UtxoEntry>>(iter: I) -> Self {
        let mut set = UtxoSet::new();
        for entry in iter {
            set.insert(entry);
        }
        set
    }
}

/// Decode the node's hex encoding: `0x` + hex(payload || sha256(payload)[28..32]).
pub fn decode_checksummed_hex(encoded: &str) -> Result<Vec<u8>, WalletError> {
    let raw = hex::decode(encoded.trim_start_matches("0x"))
        .map_err(|e| WalletError::Serialization(format!("invalid hex: {}", e)))?;
    if raw.len() < 4 {
        return Err(WalletError::Serialization("encoded payload too short".to_string()));
    }
    let (payload, checksum) = raw.split_at(raw.len() - 4);
    let digest = Sha256::digest(payload);
    if &digest[28..] != checksum {
        return Err(WalletError::Serialization("checksum mismatch".to_string()));
    }
    Ok(payload.to_vec())
}

/// Encode bytes with the trailing 4-byte checksum used by the node API.
pub fn encode_checksummed_hex(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    let mut raw = payload.to_vec();
    raw.extend_from_slice(&digest[28..]);
    format!("0x{}", hex::encode(raw))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], WalletError> {
        let end = self.offset.checked_add(n).filter(|end| *end <= self.bytes.len()).ok_or_else(|| {
            WalletError::Serialization(format!("UTXO truncated at offset {}", self.offset))
        })?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, WalletError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64, WalletError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }
}

/// Parse one serialized UTXO.
///
/// Layout: codec(2) txid(32) index(4) asset(32) type(4) then, for a
/// secp256k1 transfer output: amount(8) locktime(8) threshold(4) n(4) addrs(20*n).
///
/// Returns `Ok(None)` for output types the wallet does not spend. The owner is
/// the first address that appears in `wanted`, or the first address if none do.
pub fn parse_utxo(
    bytes: &[u8],
    wanted: &HashSet<PublicKeyHash>,
) -> Result<Option<UtxoEntry>, WalletError> {
    let mut reader = Reader { bytes, offset: 0 };
    reader.take(2)?;
    let txid = reader.take(32)?;
    let output_index = reader.u32()?;
    let asset_id = reader.take(32)?;
    let type_id = reader.u32()?;

    if type_id != SECP256K1_TRANSFER_OUTPUT_TYPE_ID {
        debug!(type_id, "Skipping UTXO with unsupported output type");
        return Ok(None);
    }

    let amount = reader.u64()?;
    let _locktime = reader.u64()?;
    let _threshold = reader.u32()?;
    let count = reader.u32()? as usize;
    let mut owners = Vec::with_capacity(count);
    for _ in 0..count {
        owners.push(PublicKeyHash::from_slice(reader.take(PKH_LEN)?)?);
    }

    let owner = owners
        .iter()
        .find(|pkh| wanted.contains(pkh))
        .or_else(|| owners.first())
        .copied()
        .ok_or_else(|| WalletError::Serialization("UTXO output has no owners".to_string()))?;

    Ok(Some(UtxoEntry::new(
        format!("{}:{}", hex::encode(txid), output_index),
        hex::encode(asset_id),
        amount,
        owner,
    )))
}

/// Serialize a secp256k1 transfer UTXO in the node's layout.
pub fn encode_utxo(txid: &[u8; 32], output_index: u32, asset_id: &[u8; 32], amount: u64, owners: &[PublicKeyHash]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(2 + 32 + 4 + 32 + 4 + 8 + 8 + 4 + 4 + PKH_LEN * owners.len());
    bytes.extend_from_slice(&0u16.to_be_bytes());
    bytes.extend_from_slice(txid);
    bytes.extend_from_slice(&output_index.to_be_bytes());
    bytes.extend_from_slice(asset_id);
    bytes.extend_from_slice(&SECP256K1_TRANSFER_OUTPUT_TYPE_ID.to_be_bytes());
    bytes.extend_from_slice(&amount.to_be_bytes());
    bytes.extend_from_slice(&0u64.to_be_bytes());
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&(owners.len() as u32).to_be_bytes());
    for owner in owners {
        bytes.extend_from_slice(owner.as_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, amount: u64, owner: u8) -> UtxoEntry {
        UtxoEntry::new(id, "aa", amount, PublicKeyHash([owner; PKH_LEN]))
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch: UtxoSet = vec![entry("a:0", 5, 1), entry("b:1", 7, 2)].into_iter().collect();
        let mut once = UtxoSet::new();
        once.merge(&batch);
        let mut twice = once.clone();
        twice.merge(&batch);
        assert_eq!(once, twice);
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a: UtxoSet = vec![entry("a:0", 5, 1)].into_iter().collect();
        let b: UtxoSet = vec![entry("b:0", 6, 2), entry("c:0", 1, 2)].into_iter().collect();
        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_by_owner() {
        let set: UtxoSet = vec![entry("a:0", 5, 1), entry("b:0", 6, 2), entry("c:0", 1, 2)]
            .into_iter()
            .collect();
        let owner = PublicKeyHash([2; PKH_LEN]);
        assert_eq!(set.by_owner(&owner).count(), 2);
        assert_eq!(set.owners().len(), 2);
    }

    #[test]
    fn test_checksummed_hex() {
        let encoded = encode_checksummed_hex(b"hello");
        assert_eq!(decode_checksummed_hex(&encoded).unwrap(), b"hello");

        let mut tampered = encoded.clone();
        tampered.replace_range(2..4, "00");
        assert!(decode_checksummed_hex(&tampered).is_err());
    }

    #[test]
    fn test_parse_transfer_output_prefers_wanted_owner() {
        let other = PublicKeyHash([9; PKH_LEN]);
        let ours = PublicKeyHash([4; PKH_LEN]);
        let bytes = encode_utxo(&[1; 32], 3, &[2; 32], 1_000, &[other, ours]);
        let wanted: HashSet<_> = [ours].into_iter().collect();

        let parsed = parse_utxo(&bytes, &wanted).unwrap().unwrap();
        assert_eq!(parsed.id, format!("{}:3", "01".repeat(32)));
        assert_eq!(parsed.amount, 1_000);
        assert_eq!(parsed.owner, ours);
    }

    #[test]
    fn test_parse_skips_other_output_types() {
        let mut bytes = encode_utxo(&[1; 32], 0, &[2; 32], 1, &[PublicKeyHash([1; PKH_LEN])]);
        bytes[70..74].copy_from_slice(&6u32.to_be_bytes());
        assert!(parse_utxo(&bytes, &HashSet::new()).unwrap().is_none());
    }

    #[test]
    fn test_parse_truncated() {
        let bytes = encode_utxo(&[1; 32], 0, &[2; 32], 1, &[PublicKeyHash([1; PKH_LEN])]);
        assert!(parse_utxo(&bytes[..bytes.len() - 1], &HashSet::new()).is_err());
    }
}
