//! 硬件wallet集成模块
//!
//! The signer capability the pipeline consumes, the scoped session that owns
//! it for one command, and the implementations: the Ledger Avalanche app
//! and a seeded software signer for tests.

pub mod ledger;
pub mod mock;

use crate::core::bip44::{Bip32Path, DerivationPath, ExtendedKey};
use crate::core::domain::AppVersion;
use crate::core::errors::WalletError;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info};

pub use ledger::LedgerAvalancheApp;
pub use mock::MockSigner;

/// Signatures returned by one device round-trip, keyed by path suffix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureMap {
    signatures: HashMap<DerivationPath, Vec<u8>>,
}

impl SignatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: DerivationPath, signature: Vec<u8>) {
        self.signatures.insert(path, signature);
    }

    pub fn get(&self, path: &DerivationPath) -> Option<&Vec<u8>> {
        self.signatures.get(path)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Detached hardware signer.
///
/// Methods take `&mut self`: a session never has two requests in flight.
#[async_trait]
pub trait HardwareSigner: Send {
    /// Extended public key at a (hardened) path; the device may prompt.
    async fn get_extended_public_key(&mut self, path: &Bip32Path) -> Result<ExtendedKey, WalletError>;

    /// Sign the raw transaction bytes once per suffix below `prefix`.
    async fn sign_transaction(
        &mut self,
        prefix: &Bip32Path,
        suffixes: &[DerivationPath],
        tx: &[u8],
    ) -> Result<SignatureMap, WalletError>;

    /// Sign a 32-byte digest once per suffix below `prefix`.
    ///
    /// The device cannot show what the digest commits to.
    async fn sign_hash(
        &mut self,
        prefix: &Bip32Path,
        suffixes: &[DerivationPath],
        digest: &[u8; 32],
    ) -> Result<SignatureMap, WalletError>;

    async fn get_app_version(&mut self) -> Result<AppVersion, WalletError>;

    /// Release the underlying transport.
    fn close(&mut self) {}
}

/// Scoped ownership of a signer for one command.
///
/// The signer is closed when the session drops, whatever the exit path.
pub struct SignerSession {
    signer: Box<dyn HardwareSigner>,
    app_version: Option<AppVersion>,
}

impl SignerSession {
    pub fn new(signer: Box<dyn HardwareSigner>) -> Self {
        info!("Signer session opened");
        Self { signer, app_version: None }
    }

    /// App version, queried from the device at most once per session.
    pub async fn app_version(&mut self) -> Result<AppVersion, WalletError> {
        if let Some(version) = self.app_version {
            return Ok(version);
        }
        let version = self.signer.get_app_version().await?;
        info!(version = %version, "Device app version");
        self.app_version = Some(version);
        Ok(version)
    }

    pub async fn account_key(&mut self, prefix: &Bip32Path) -> Result<ExtendedKey, WalletError> {
        info!(path = %prefix, "Please accept on your ledger device");
        self.signer.get_extended_public_key(prefix).await
    }

    pub fn signer(&mut self) -> &mut dyn HardwareSigner {
        self.signer.as_mut()
    }
}

impl Drop for SignerSession {
    fn drop(&mut self) {
        self.signer.close();
        debug!("Signer session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_session_memoizes_version_and_closes() {
        let signer = MockSigner::from_seed(&[7u8; 32], AppVersion::new(0, 5, 0)).unwrap();
        let stats = signer.stats();
        let mut session = SignerSession::new(Box::new(signer));

        assert_eq!(session.app_version().await.unwrap(), AppVersion::new(0, 5, 0));
        assert_eq!(session.app_version().await.unwrap(), AppVersion::new(0, 5, 0));
        assert_eq!(stats.version_queries.load(Ordering::SeqCst), 1);

        drop(session);
        assert!(stats.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_session_closes_after_rejection() {
        let closes = Arc::new(AtomicUsize::new(0));

        struct Rejecting(Arc<AtomicUsize>);

        #[async_trait]
        impl HardwareSigner for Rejecting {
            async fn get_extended_public_key(&mut self, _: &Bip32Path) -> Result<ExtendedKey, WalletError> {
                Err(WalletError::DeviceRejected("user declined".into()))
            }
            async fn sign_transaction(&mut self, _: &Bip32Path, _: &[DerivationPath], _: &[u8]) -> Result<SignatureMap, WalletError> {
                Err(WalletError::DeviceRejected("user declined".into()))
            }
            async fn sign_hash(&mut self, _: &Bip32Path, _: &[DerivationPath], _: &[u8; 32]) -> Result<SignatureMap, WalletError> {
                Err(WalletError::DeviceRejected("user declined".into()))
            }
            async fn get_app_version(&mut self) -> Result<AppVersion, WalletError> {
                Ok(AppVersion::new(0, 5, 0))
            }
            fn close(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let result = {
            let mut session = SignerSession::new(Box::new(Rejecting(closes.clone())));
            session.account_key(&Bip32Path::avalanche_account(0)).await
        };
        assert!(matches!(result, Err(WalletError::DeviceRejected(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
