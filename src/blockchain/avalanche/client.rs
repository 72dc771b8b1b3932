//! Avalanche 节点 JSON-RPC 客户端
//!
//! UTXO queries (`*.getUTXOs`, paged) and transaction submission
//! (`*.issueTx`) against the X, P and C chain endpoints of a node.

use super::address::AddressCodec;
use super::transaction::SignedTransaction;
use super::utxo::{decode_checksummed_hex, encode_checksummed_hex, parse_utxo, UtxoSet};
use crate::blockchain::traits::{Broadcaster, ChainQuery};
use crate::core::config::{NodeConfig, MAX_UTXO_PAGE_LIMIT};
use crate::core::domain::{Chain, NetworkParams, PublicKeyHash};
use crate::core::errors::WalletError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

/// Chain the C chain imports from when querying atomic UTXOs.
const C_CHAIN_SOURCE: &str = "X";

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct UtxoIndex {
    address: String,
    utxo: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetUtxosReply {
    num_fetched: String,
    utxos: Vec<String>,
    end_index: Option<UtxoIndex>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueTxReply {
    #[serde(rename = "txID")]
    tx_id: String,
}

/// Avalanche 节点客户端
pub struct AvalancheClient {
    base_url: String,
    page_limit: u32,
    codec: AddressCodec,
    client: reqwest::Client,
}

impl AvalancheClient {
    pub fn new(node: &NodeConfig, network: &NetworkParams) -> Result<Self, WalletError> {
        let base_url = reqwest::Url::parse(node.url.trim())
            .map_err(|e| WalletError::Config(format!("invalid node URL {:?}: {}", node.url, e)))?
            .to_string()
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(node.timeout_secs))
            .build()
            .map_err(|e| WalletError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(url = %base_url, network = %network.name, "Using Avalanche node");
        Ok(Self {
            base_url,
            // The node silently caps larger limits; a full page must compare equal.
            page_limit: node.page_limit.clamp(1, MAX_UTXO_PAGE_LIMIT),
            codec: AddressCodec::new(network)?,
            client,
        })
    }

    fn endpoint(&self, chain: Chain) -> String {
        match chain {
            Chain::X => format!("{}/ext/bc/X", self.base_url),
            Chain::P => format!("{}/ext/bc/P", self.base_url),
            Chain::C => format!("{}/ext/bc/C/avax", self.base_url),
        }
    }

    fn method(chain: Chain, name: &str) -> String {
        let namespace = match chain {
            Chain::X => "avm",
            Chain::P => "platform",
            Chain::C => "avax",
        };
        format!("{}.{}", namespace, name)
    }

    async fn call<T: DeserializeOwned>(&self, chain: Chain, method: &str, params: Value) -> Result<T, WalletError> {
        let method = Self::method(chain, method);
        debug!(%method, "JSON-RPC request");
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(self.endpoint(chain))
            .json(&body)
            .send()
            .await
            .map_err(|e| WalletError::QueryFailure(format!("{}: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WalletError::QueryFailure(format!("{}: HTTP {}", method, status)));
        }

        let reply: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| WalletError::QueryFailure(format!("{}: malformed reply: {}", method, e)))?;

        match (reply.result, reply.error) {
            (_, Some(err)) => Err(WalletError::QueryFailure(format!(
                "{}: node error {}: {}",
                method, err.code, err.message
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Err(WalletError::QueryFailure(format!("{}: empty reply", method))),
        }
    }

    /// Addresses in the form the node expects, plus the set of wanted owners.
    fn query_addresses(&self, chain: Chain, addresses: &[String]) -> Result<(Vec<String>, HashSet<PublicKeyHash>), WalletError> {
        let mut wanted = HashSet::new();
        let mut query = Vec::with_capacity(addresses.len());
        for address in addresses {
            let (_, pkh) = self.codec.address_to_chain(address)?;
            wanted.insert(pkh);
            query.push(self.codec.bech32_address(chain, &pkh)?);
        }
        Ok((query, wanted))
    }
}

#[async_trait]
impl ChainQuery for AvalancheClient {
    async fn get_utxos(&self, chain: Chain, addresses: &[String]) -> Result<UtxoSet, WalletError> {
        if addresses.is_empty() {
            return Ok(UtxoSet::new());
        }
        let (query, wanted) = self.query_addresses(chain, addresses)?;

        let mut set = UtxoSet::new();
        let mut start_index: Option<UtxoIndex> = None;
        loop {
            let mut params = json!({
                "addresses": query,
                "limit": self.page_limit,
                "encoding": "hex",
            });
            if chain == Chain::C {
                params["sourceChain"] = json!(C_CHAIN_SOURCE);
            }
            if let Some(index) = &start_index {
                params["startIndex"] = json!({ "address": index.address, "utxo": index.utxo });
            }

            let reply: GetUtxosReply = self.call(chain, "getUTXOs", params).await?;
            for encoded in &reply.utxos {
                let bytes = decode_checksummed_hex(encoded)?;
                if let Some(entry) = parse_utxo(&bytes, &wanted)? {
                    set.insert(entry);
                }
            }

            let fetched: u32 = reply
                .num_fetched
                .parse()
                .map_err(|_| WalletError::QueryFailure(format!("invalid numFetched {:?}", reply.num_fetched)))?;
            if fetched < self.page_limit || reply.end_index.is_none() {
                break;
            }
            start_index = reply.end_index;
        }

        debug!(chain = %chain, addresses = addresses.len(), utxos = set.len(), "UTXO query complete");
        Ok(set)
    }
}

#[async_trait]
impl Broadcaster for AvalancheClient {
    async fn issue_tx(&self, chain: Chain, signed: &SignedTransaction) -> Result<String, WalletError> {
        let tx = encode_checksummed_hex(&signed.to_bytes()?);
        let reply: IssueTxReply = self
            .call(chain, "issueTx", json!({ "tx": tx, "encoding": "hex" }))
            .await?;
        info!(chain = %chain, tx_id = %reply.tx_id, "Transaction issued");
        Ok(reply.tx_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_and_methods() {
        let node = NodeConfig {
            url: "http://127.0.0.1:9650/".to_string(),
            ..NodeConfig::default()
        };
        let client = AvalancheClient::new(&node, &NetworkParams::local()).unwrap();
        assert_eq!(client.endpoint(Chain::X), "http://127.0.0.1:9650/ext/bc/X");
        assert_eq!(client.endpoint(Chain::C), "http://127.0.0.1:9650/ext/bc/C/avax");
        assert_eq!(AvalancheClient::method(Chain::P, "getUTXOs"), "platform.getUTXOs");
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let node = NodeConfig {
            url: "not a url".to_string(),
            ..NodeConfig::default()
        };
        assert!(matches!(
            AvalancheClient::new(&node, &NetworkParams::local()),
            Err(WalletError::Config(_))
        ));
    }
}
