//! Seeded software signer
//!
//! Behaves like a device running the Avalanche app: derives private keys from
//! a seed, signs SHA-256(tx) for transaction requests and the raw digest for
//! hash requests, and records every request for inspection.

use super::{HardwareSigner, SignatureMap};
use crate::core::bip44::{Bip32Path, DerivationPath, ExtendedKey, HARDENED_OFFSET};
use crate::core::domain::AppVersion;
use crate::core::errors::WalletError;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use secp256k1::{All, Message, PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

/// A signing request as the device saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignRequest {
    Transaction {
        prefix: Bip32Path,
        suffixes: Vec<DerivationPath>,
        tx: Vec<u8>,
    },
    Hash {
        prefix: Bip32Path,
        suffixes: Vec<DerivationPath>,
        digest: [u8; 32],
    },
}

impl SignRequest {
    pub fn suffixes(&self) -> &[DerivationPath] {
        match self {
            SignRequest::Transaction { suffixes, .. } | SignRequest::Hash { suffixes, .. } => suffixes,
        }
    }
}

/// Observable state shared with the test.
#[derive(Debug, Default)]
pub struct MockSignerStats {
    pub requests: Mutex<Vec<SignRequest>>,
    pub version_queries: AtomicUsize,
    pub closed: AtomicBool,
}

struct PrivateNode {
    key: Zeroizing<[u8; 32]>,
    chain_code: [u8; 32],
}

pub struct MockSigner {
    secp: Secp256k1<All>,
    master: PrivateNode,
    version: AppVersion,
    stats: Arc<MockSignerStats>,
    omitted: Vec<DerivationPath>,
    substitutions: HashMap<DerivationPath, DerivationPath>,
    reject: bool,
}

impl MockSigner {
    /// Master node from HMAC-SHA512("Bitcoin seed", seed).
    pub fn from_seed(seed: &[u8], version: AppVersion) -> Result<Self, WalletError> {
        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        mac.update(seed);
        let result = mac.finalize().into_bytes();

        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&result[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&result[32..]);

        Ok(Self {
            secp: Secp256k1::new(),
            master: PrivateNode { key, chain_code },
            version,
            stats: Arc::new(MockSignerStats::default()),
            omitted: Vec::new(),
            substitutions: HashMap::new(),
            reject: false,
        })
    }

    /// Leave `path` out of every signature response.
    pub fn omitting(mut self, path: DerivationPath) -> Self {
        self.omitted.push(path);
        self
    }

    /// Answer requests for `requested` with a signature made by `actual`.
    pub fn substituting(mut self, requested: DerivationPath, actual: DerivationPath) -> Self {
        self.substitutions.insert(requested, actual);
        self
    }

    /// Decline every prompt.
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn stats(&self) -> Arc<MockSignerStats> {
        self.stats.clone()
    }

    fn derive(&self, path: &Bip32Path) -> Result<PrivateNode, WalletError> {
        let mut node = PrivateNode {
            key: self.master.key.clone(),
            chain_code: self.master.chain_code,
        };
        for index in &path.path {
            node = self.derive_child(&node, *index)?;
        }
        Ok(node)
    }

    fn derive_child(&self, parent: &PrivateNode, index: u32) -> Result<PrivateNode, WalletError> {
        let secret = SecretKey::from_slice(&parent.key[..])
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;

        let mut mac = HmacSha512::new_from_slice(&parent.chain_code)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        if index >= HARDENED_OFFSET {
            mac.update(&[0u8]);
            mac.update(&parent.key[..]);
        } else {
            mac.update(&PublicKey::from_secret_key(&self.secp, &secret).serialize());
        }
        mac.update(&index.to_be_bytes());
        let result = mac.finalize().into_bytes();

        let mut il = [0u8; 32];
        il.copy_from_slice(&result[..32]);
        let tweak = Scalar::from_be_bytes(il).map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        let child = secret
            .add_tweak(&tweak)
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&result[32..]);
        Ok(PrivateNode {
            key: Zeroizing::new(child.secret_bytes()),
            chain_code,
        })
    }

    fn sign_digest(
        &self,
        prefix: &Bip32Path,
        suffixes: &[DerivationPath],
        digest: &[u8; 32],
    ) -> Result<SignatureMap, WalletError> {
        if self.reject {
            return Err(WalletError::DeviceRejected("user declined the signing prompt".to_string()));
        }
        let message = Message::from_slice(digest).map_err(|e| WalletError::DeviceIOError(e.to_string()))?;

        let mut signatures = SignatureMap::new();
        for suffix in suffixes {
            if self.omitted.contains(suffix) {
                continue;
            }
            let signing_path = self.substitutions.get(suffix).unwrap_or(suffix);
            let node = self.derive(&prefix.join(signing_path))?;
            let secret = SecretKey::from_slice(&node.key[..])
                .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;

            let (recovery_id, compact) = self
                .secp
                .sign_ecdsa_recoverable(&message, &secret)
                .serialize_compact();
            let mut signature = compact.to_vec();
            signature.push(recovery_id.to_i32() as u8);
            signatures.insert(*suffix, signature);
        }
        Ok(signatures)
    }
}

#[async_trait]
impl HardwareSigner for MockSigner {
    async fn get_extended_public_key(&mut self, path: &Bip32Path) -> Result<ExtendedKey, WalletError> {
        if self.reject {
            return Err(WalletError::DeviceRejected("user declined the public key prompt".to_string()));
        }
        let node = self.derive(path)?;
        let secret = SecretKey::from_slice(&node.key[..])
            .map_err(|e| WalletError::KeyDerivation(e.to_string()))?;
        Ok(ExtendedKey::new(
            PublicKey::from_secret_key(&self.secp, &secret),
            node.chain_code,
        ))
    }

    async fn sign_transaction(
        &mut self,
        prefix: &Bip32Path,
        suffixes: &[DerivationPath],
        tx: &[u8],
    ) -> Result<SignatureMap, WalletError> {
        self.stats.requests.lock().push(SignRequest::Transaction {
            prefix: prefix.clone(),
            suffixes: suffixes.to_vec(),
            tx: tx.to_vec(),
        });
        let digest: [u8; 32] = Sha256::digest(tx).into();
        self.sign_digest(prefix, suffixes, &digest)
    }

    async fn sign_hash(
        &mut self,
        prefix: &Bip32Path,
        suffixes: &[DerivationPath],
        digest: &[u8; 32],
    ) -> Result<SignatureMap, WalletError> {
        self.stats.requests.lock().push(SignRequest::Hash {
            prefix: prefix.clone(),
            suffixes: suffixes.to_vec(),
            digest: *digest,
        });
        self.sign_digest(prefix, suffixes, digest)
    }

    async fn get_app_version(&mut self) -> Result<AppVersion, WalletError> {
        self.stats.version_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.version)
    }

    fn close(&mut self) {
        self.stats.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bip44::KeyDeriver;

    #[tokio::test]
    async fn test_public_derivation_matches_private() {
        let mut signer = MockSigner::from_seed(b"mock seed for derivation", AppVersion::new(0, 5, 0)).unwrap();
        let prefix = Bip32Path::avalanche_account(0);
        let account = signer.get_extended_public_key(&prefix).await.unwrap();
        let deriver = KeyDeriver::new(&account).unwrap();

        for path in [DerivationPath::non_change(0), DerivationPath::change(7)] {
            let from_public = deriver.derive(&path).unwrap();
            let from_private = signer.get_extended_public_key(&prefix.join(&path)).await.unwrap();
            assert_eq!(from_public, from_private, "mismatch at {}", path);
        }
    }

    #[tokio::test]
    async fn test_omitted_path_missing_from_response() {
        let mut signer = MockSigner::from_seed(b"seed", AppVersion::new(0, 5, 0))
            .unwrap()
            .omitting(DerivationPath::change(1));
        let prefix = Bip32Path::avalanche_account(0);
        let sigs = signer
            .sign_hash(&prefix, &[DerivationPath::non_change(0), DerivationPath::change(1)], &[1; 32])
            .await
            .unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs.get(&DerivationPath::non_change(0)).unwrap().len(), 65);
    }
}
