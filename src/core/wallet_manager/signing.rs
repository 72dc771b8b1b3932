//! transaction签名模块
//!
//! Resolves every signature slot of an unsigned transaction to a derivation
//! path, obtains all signatures in one device round-trip, and rebuilds the
//! per-input credentials in slot order.
//!
//! CollectPaths → RequestDeviceSignature → MapSignatures → AssembleCredentials → Done.
//! Any failure is terminal; a partially signed transaction is never returned.

use super::record::AddressRecord;
use crate::blockchain::avalanche::address::AddressCodec;
use crate::blockchain::avalanche::transaction::{
    Credential, InputSelector, SignedTransaction, TransferableInput, UnsignedTransaction, SIGNATURE_LEN,
};
use crate::core::bip44::{pubkey_to_pkh, Bip32Path, DerivationPath};
use crate::core::domain::{AppVersion, PublicKeyHash};
use crate::core::errors::WalletError;
use crate::hardware::{HardwareSigner, SignatureMap};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, VerifyOnly};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

/// What the device is asked to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningMode {
    /// SHA-256 of the transaction; the device cannot display the contents
    Hash,
    /// Raw transaction bytes, parsed and shown on the device
    Transaction,
}

impl SigningMode {
    /// Transaction signing from `threshold` upwards (inclusive).
    ///
    /// Without a configured threshold the device is assumed unable to parse
    /// the transaction.
    pub fn select(app_version: AppVersion, threshold: Option<AppVersion>) -> Self {
        match threshold {
            Some(min) if app_version >= min => SigningMode::Transaction,
            _ => SigningMode::Hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SigningState {
    CollectPaths,
    RequestDeviceSignature,
    MapSignatures,
    AssembleCredentials,
    Done,
}

impl fmt::Display for SigningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SigningState::CollectPaths => "CollectPaths",
            SigningState::RequestDeviceSignature => "RequestDeviceSignature",
            SigningState::MapSignatures => "MapSignatures",
            SigningState::AssembleCredentials => "AssembleCredentials",
            SigningState::Done => "Done",
        };
        f.write_str(name)
    }
}

/// Signs unsigned transactions against the addresses of one discovery pass.
pub struct SigningOrchestrator<'a> {
    codec: &'a AddressCodec,
    record: &'a AddressRecord,
    prefix: Bip32Path,
    secp: Secp256k1<VerifyOnly>,
}

impl<'a> SigningOrchestrator<'a> {
    pub fn new(codec: &'a AddressCodec, record: &'a AddressRecord, prefix: Bip32Path) -> Self {
        Self {
            codec,
            record,
            prefix,
            secp: Secp256k1::verification_only(),
        }
    }

    fn resolve(&self, tx: &UnsignedTransaction, pkh: &PublicKeyHash) -> Result<DerivationPath, WalletError> {
        let address = self.codec.pkh_to_address(tx.chain, pkh)?;
        self.record
            .path_for_address(&address)
            .ok_or_else(|| WalletError::PathNotFound(format!("no derivation path for {}", address)))
    }

    /// Distinct paths required by the selected inputs, ascending.
    pub fn collect_paths(
        &self,
        tx: &UnsignedTransaction,
        inputs: &[&TransferableInput],
    ) -> Result<Vec<DerivationPath>, WalletError> {
        let mut paths = BTreeSet::new();
        for input in inputs {
            for slot in &input.sig_slots {
                paths.insert(self.resolve(tx, &slot.pkh)?);
            }
        }
        Ok(paths.into_iter().collect())
    }

    fn verify(&self, digest: &[u8; 32], signature: &[u8], expected: &PublicKeyHash) -> Result<(), WalletError> {
        if signature.len() != SIGNATURE_LEN {
            return Err(WalletError::SignatureMismatch(format!(
                "signature has {} bytes, expected {}",
                signature.len(),
                SIGNATURE_LEN
            )));
        }
        let mismatch = |e: secp256k1::Error| WalletError::SignatureMismatch(e.to_string());
        let recovery_id = RecoveryId::from_i32(signature[64] as i32).map_err(mismatch)?;
        let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id).map_err(mismatch)?;
        let message = Message::from_slice(digest).map_err(mismatch)?;
        let public_key = self.secp.recover_ecdsa(&message, &recoverable).map_err(mismatch)?;

        let recovered = pubkey_to_pkh(&public_key);
        if &recovered != expected {
            return Err(WalletError::SignatureMismatch(format!(
                "signature recovers to {}, slot expects {}",
                recovered, expected
            )));
        }
        Ok(())
    }

    /// Sign the inputs picked by `selector` with one device request.
    pub async fn sign(
        &self,
        tx: &UnsignedTransaction,
        selector: InputSelector,
        mode: SigningMode,
        signer: &mut dyn HardwareSigner,
    ) -> Result<SignedTransaction, WalletError> {
        let mut state = SigningState::CollectPaths;
        debug!(%state, chain = %tx.chain, operation = %tx.operation, "Signing");
        let inputs = selector.select(tx);
        let paths = self.collect_paths(tx, &inputs)?;
        let digest: [u8; 32] = Sha256::digest(&tx.bytes).into();

        state = SigningState::RequestDeviceSignature;
        debug!(%state, paths = paths.len(), ?mode, "Signing");
        let signatures: SignatureMap = if paths.is_empty() {
            SignatureMap::new()
        } else {
            match mode {
                SigningMode::Transaction => {
                    info!("Please review and accept the transaction on your ledger device");
                    signer.sign_transaction(&self.prefix, &paths, &tx.bytes).await?
                }
                SigningMode::Hash => {
                    warn!("Signing the transaction hash: the device cannot display what is being signed");
                    signer.sign_hash(&self.prefix, &paths, &digest).await?
                }
            }
        };

        state = SigningState::MapSignatures;
        debug!(%state, received = signatures.len(), "Signing");
        if let Some(missing) = paths.iter().find(|p| signatures.get(p).is_none()) {
            return Err(WalletError::MissingSignature(format!("device returned no signature for {}", missing)));
        }

        state = SigningState::AssembleCredentials;
        debug!(%state, inputs = inputs.len(), "Signing");
        let mut credentials = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let mut credential = Credential::default();
            for slot in &input.sig_slots {
                let path = self.resolve(tx, &slot.pkh)?;
                let signature = signatures
                    .get(&path)
                    .ok_or_else(|| WalletError::MissingSignature(path.to_string()))?;
                self.verify(&digest, signature, &slot.pkh)?;
                credential.push(signature.clone());
            }
            credentials.push(credential);
        }

        state = SigningState::Done;
        info!(%state, credentials = credentials.len(), "Transaction signed");
        Ok(SignedTransaction {
            unsigned: tx.clone(),
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const THRESHOLD: AppVersion = AppVersion::new(0, 4, 0);

    #[test_case(AppVersion::new(0, 3, 9), SigningMode::Hash ; "below threshold")]
    #[test_case(AppVersion::new(0, 4, 0), SigningMode::Transaction ; "at threshold")]
    #[test_case(AppVersion::new(0, 4, 1), SigningMode::Transaction ; "above threshold")]
    #[test_case(AppVersion::new(1, 0, 0), SigningMode::Transaction ; "major above")]
    fn test_mode_selection(version: AppVersion, expected: SigningMode) {
        assert_eq!(SigningMode::select(version, Some(THRESHOLD)), expected);
    }

    #[test]
    fn test_missing_threshold_selects_hash() {
        assert_eq!(SigningMode::select(AppVersion::new(9, 9, 9), None), SigningMode::Hash);
    }
}
