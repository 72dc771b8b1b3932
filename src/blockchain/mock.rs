//! In-memory UTXO oracle
//!
//! Answers UTXO queries from a fixed table and records every batch it was
//! asked about.

use crate::blockchain::avalanche::transaction::SignedTransaction;
use crate::blockchain::avalanche::utxo::{UtxoEntry, UtxoSet};
use crate::blockchain::traits::{Broadcaster, ChainQuery};
use crate::core::domain::{Chain, PublicKeyHash};
use crate::core::errors::WalletError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MockChainQuery {
    utxos: HashMap<(Chain, String), Vec<UtxoEntry>>,
    batches: Mutex<Vec<Vec<String>>>,
    issued: Mutex<Vec<SignedTransaction>>,
    fail: bool,
}

impl MockChainQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fund `address` with one UTXO of `amount`.
    pub fn fund(mut self, chain: Chain, address: &str, owner: PublicKeyHash, amount: u64) -> Self {
        let entries = self.utxos.entry((chain, address.to_string())).or_default();
        let id = format!("{}:{}", address, entries.len());
        entries.push(UtxoEntry::new(id, "avax", amount, owner));
        self
    }

    /// Every query fails with `QueryFailure`.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Address batches seen so far, in query order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }

    pub fn issued(&self) -> Vec<SignedTransaction> {
        self.issued.lock().clone()
    }
}

#[async_trait]
impl ChainQuery for MockChainQuery {
    async fn get_utxos(&self, chain: Chain, addresses: &[String]) -> Result<UtxoSet, WalletError> {
        self.batches.lock().push(addresses.to_vec());
        if self.fail {
            return Err(WalletError::QueryFailure("node unreachable".to_string()));
        }
        Ok(addresses
            .iter()
            .filter_map(|address| self.utxos.get(&(chain, address.clone())))
            .flatten()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Broadcaster for MockChainQuery {
    async fn issue_tx(&self, _chain: Chain, signed: &SignedTransaction) -> Result<String, WalletError> {
        if self.fail {
            return Err(WalletError::QueryFailure("node unreachable".to_string()));
        }
        let bytes = signed.to_bytes()?;
        let mut issued = self.issued.lock();
        issued.push(signed.clone());
        Ok(format!("tx-{}-{}", issued.len(), bytes.len()))
    }
}
