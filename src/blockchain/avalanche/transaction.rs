//! Unsigned / signed transaction envelopes
//!
//! The transaction body is built and serialized by an external builder. The
//! wallet only sees the serialized bytes plus, for every input, which
//! public-key hashes must sign and in which slot order.

use crate::core::domain::{Chain, Operation, PublicKeyHash};
use crate::core::errors::WalletError;
use serde::{Deserialize, Serialize};

/// Codec version prefix of a signed transaction.
pub const CODEC_VERSION: u16 = 0;

/// Type id of a secp256k1 credential.
pub const SECP256K1_CREDENTIAL_TYPE_ID: u32 = 9;

/// Length of a recoverable signature (r || s || v).
pub const SIGNATURE_LEN: usize = 65;

/// One signature slot of an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigSlot {
    /// Index into the spent output's owner list
    pub sig_idx: u32,
    /// Key that must provide this signature
    pub pkh: PublicKeyHash,
}

/// An input of the unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferableInput {
    /// Spent UTXO id
    pub utxo_id: String,
    /// Signature slots, in the order the credential must list them
    pub sig_slots: Vec<SigSlot>,
}

/// Transaction as produced by the external builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub chain: Chain,
    pub operation: Operation,
    /// Serialized unsigned transaction
    #[serde(with = "hex")]
    pub bytes: Vec<u8>,
    /// Regular inputs
    #[serde(default)]
    pub inputs: Vec<TransferableInput>,
    /// Inputs consumed from shared memory (import transactions)
    #[serde(default)]
    pub imported_inputs: Vec<TransferableInput>,
}

impl UnsignedTransaction {
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Which input lists the signer walks, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSelector {
    /// Regular inputs only
    Base,
    /// Imported inputs only (C-chain import)
    Imported,
    /// Regular inputs followed by imported inputs (X/P import)
    BaseThenImported,
}

impl InputSelector {
    /// Default selector for a transaction of the given kind.
    pub fn for_transaction(chain: Chain, operation: Operation) -> Self {
        match (chain, operation) {
            (Chain::C, Operation::Import) => InputSelector::Imported,
            (_, Operation::Import) => InputSelector::BaseThenImported,
            _ => InputSelector::Base,
        }
    }

    /// Inputs of `tx` selected for signing, in credential order.
    pub fn select<'a>(&self, tx: &'a UnsignedTransaction) -> Vec<&'a TransferableInput> {
        match self {
            InputSelector::Base => tx.inputs.iter().collect(),
            InputSelector::Imported => tx.imported_inputs.iter().collect(),
            InputSelector::BaseThenImported => {
                tx.inputs.iter().chain(tx.imported_inputs.iter()).collect()
            }
        }
    }
}

/// Signatures for one input, in slot order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub signatures: Vec<Vec<u8>>,
}

impl Credential {
    pub fn push(&mut self, signature: Vec<u8>) {
        self.signatures.push(signature);
    }
}

/// Unsigned transaction plus one credential per selected input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub unsigned: UnsignedTransaction,
    pub credentials: Vec<Credential>,
}

impl SignedTransaction {
    /// Wire bytes: unsigned bytes || n(4) || (type(4) || m(4) || sig(65)*m)*n.
    ///
    /// The unsigned bytes already carry the codec version prefix.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WalletError> {
        let mut bytes = self.unsigned.bytes.clone();
        bytes.extend_from_slice(&(self.credentials.len() as u32).to_be_bytes());
        for credential in &self.credentials {
            bytes.extend_from_slice(&SECP256K1_CREDENTIAL_TYPE_ID.to_be_bytes());
            bytes.extend_from_slice(&(credential.signatures.len() as u32).to_be_bytes());
            for signature in &credential.signatures {
                if signature.len() != SIGNATURE_LEN {
                    return Err(WalletError::Serialization(format!(
                        "signature must be {} bytes, got {}",
                        SIGNATURE_LEN,
                        signature.len()
                    )));
                }
                bytes.extend_from_slice(signature);
            }
        }
        Ok(bytes)
    }
}
