//! Ledger Avalanche App 集成
//!
//! Drives the Avalanche app over any [`ApduExchange`]: version, wallet id,
//! extended public keys, and the multi-APDU hash and transaction signing flows.

use super::apdu::{ApduCommand, ApduExchange, ApduInstruction};
use crate::core::bip44::{Bip32Path, DerivationPath, ExtendedKey};
use crate::core::domain::AppVersion;
use crate::core::errors::WalletError;
use crate::hardware::{HardwareSigner, SignatureMap};
use crate::blockchain::avalanche::transaction::SIGNATURE_LEN;
use async_trait::async_trait;
use tracing::{debug, info};

/// Transaction bytes carried per APDU.
pub const TX_CHUNK_SIZE: usize = 230;

const P1_FIRST: u8 = 0x00;
const P1_PATH: u8 = 0x01;
const P1_PATH_LAST: u8 = 0x81;
const P1_TX_CHUNK: u8 = 0x01;
const P1_TX_CHUNK_LAST: u8 = 0x81;
const P1_SIGN: u8 = 0x02;
const P1_SIGN_LAST: u8 = 0x82;

/// Avalanche 应用信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvalancheAppInfo {
    pub name: String,
    pub version: AppVersion,
}

/// Ledger Avalanche App
pub struct LedgerAvalancheApp<T: ApduExchange> {
    transport: T,
}

impl<T: ApduExchange> LedgerAvalancheApp<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn call(&mut self, command: ApduCommand, context: &str) -> Result<Vec<u8>, WalletError> {
        self.transport.exchange(&command)?.into_result(context)
    }

    /// fetch应用名称和版本
    pub fn app_info(&mut self) -> Result<AvalancheAppInfo, WalletError> {
        let data = self.call(
            ApduCommand::avalanche(ApduInstruction::GetVersion, P1_FIRST, vec![]),
            "get app version",
        )?;
        if data.len() < 3 {
            return Err(WalletError::DeviceIOError(format!(
                "version response too short: {} bytes",
                data.len()
            )));
        }
        let version = AppVersion::new(data[0], data[1], data[2]);
        let name = String::from_utf8_lossy(&data[3..])
            .trim_end_matches('\0')
            .to_string();
        Ok(AvalancheAppInfo { name, version })
    }

    /// Device wallet id, stable per seed.
    pub fn wallet_id(&mut self) -> Result<Vec<u8>, WalletError> {
        let data = self.call(
            ApduCommand::avalanche(ApduInstruction::GetWalletId, P1_FIRST, vec![]),
            "get wallet id",
        )?;
        if data.is_empty() {
            return Err(WalletError::DeviceIOError("empty wallet id".to_string()));
        }
        Ok(data)
    }

    fn extended_public_key(&mut self, path: &Bip32Path) -> Result<ExtendedKey, WalletError> {
        info!(path = %path, "Requesting extended public key");
        let data = self.call(
            ApduCommand::avalanche(ApduInstruction::GetExtendedPublicKey, P1_FIRST, path.to_bytes()),
            "get extended public key",
        )?;
        parse_extended_key(&data)
    }

    /// Collect one signature per suffix; the last request carries `last_p1`.
    fn collect_signatures(
        &mut self,
        ins: ApduInstruction,
        p1: u8,
        last_p1: u8,
        suffixes: &[DerivationPath],
    ) -> Result<SignatureMap, WalletError> {
        let mut signatures = SignatureMap::new();
        for (i, suffix) in suffixes.iter().enumerate() {
            let p1 = if i + 1 == suffixes.len() { last_p1 } else { p1 };
            let data = self.call(
                ApduCommand::avalanche(ins, p1, suffix_bytes(suffix)),
                "sign",
            )?;
            if data.len() != SIGNATURE_LEN {
                return Err(WalletError::DeviceIOError(format!(
                    "signature for {} has {} bytes",
                    suffix,
                    data.len()
                )));
            }
            debug!(path = %suffix, "Signature received");
            signatures.insert(*suffix, data);
        }
        Ok(signatures)
    }

    fn sign_header(count: usize, body: &[u8], prefix: &Bip32Path) -> Result<Vec<u8>, WalletError> {
        let count = u8::try_from(count)
            .map_err(|_| WalletError::DeviceIOError(format!("too many signing paths: {}", count)))?;
        let mut data = vec![count];
        data.extend_from_slice(body);
        data.extend_from_slice(&prefix.to_bytes());
        Ok(data)
    }
}

/// Suffix encoded as a two-component path.
fn suffix_bytes(suffix: &DerivationPath) -> Vec<u8> {
    Bip32Path::new(vec![suffix.branch.index(), suffix.index]).to_bytes()
}

/// Parse `[pk_len, pk, cc_len, cc]`.
fn parse_extended_key(data: &[u8]) -> Result<ExtendedKey, WalletError> {
    let truncated = || WalletError::DeviceIOError("extended public key response truncated".to_string());

    let pk_len = *data.first().ok_or_else(truncated)? as usize;
    let pk = data.get(1..1 + pk_len).ok_or_else(truncated)?;
    let cc_len = *data.get(1 + pk_len).ok_or_else(truncated)? as usize;
    let cc = data.get(2 + pk_len..2 + pk_len + cc_len).ok_or_else(truncated)?;

    ExtendedKey::from_device_bytes(pk, cc)
}

#[async_trait]
impl<T: ApduExchange> HardwareSigner for LedgerAvalancheApp<T> {
    async fn get_extended_public_key(&mut self, path: &Bip32Path) -> Result<ExtendedKey, WalletError> {
        self.extended_public_key(path)
    }

    async fn sign_transaction(
        &mut self,
        prefix: &Bip32Path,
        suffixes: &[DerivationPath],
        tx: &[u8],
    ) -> Result<SignatureMap, WalletError> {
        if suffixes.is_empty() {
            return Ok(SignatureMap::new());
        }
        info!(paths = suffixes.len(), bytes = tx.len(), "Signing transaction on device");

        let header = Self::sign_header(suffixes.len(), &[], prefix)?;
        self.call(
            ApduCommand::avalanche(ApduInstruction::SignTransaction, P1_FIRST, header),
            "sign transaction",
        )?;

        let chunks: Vec<&[u8]> = tx.chunks(TX_CHUNK_SIZE).collect();
        for (i, chunk) in chunks.iter().enumerate() {
            let p1 = if i + 1 == chunks.len() { P1_TX_CHUNK_LAST } else { P1_TX_CHUNK };
            self.call(
                ApduCommand::avalanche(ApduInstruction::SignTransaction, p1, chunk.to_vec()),
                "send transaction",
            )?;
        }

        self.collect_signatures(ApduInstruction::SignTransaction, P1_SIGN, P1_SIGN_LAST, suffixes)
    }

    async fn sign_hash(
        &mut self,
        prefix: &Bip32Path,
        suffixes: &[DerivationPath],
        digest: &[u8; 32],
    ) -> Result<SignatureMap, WalletError> {
        if suffixes.is_empty() {
            return Ok(SignatureMap::new());
        }
        info!(paths = suffixes.len(), "Signing hash on device");

        let header = Self::sign_header(suffixes.len(), digest, prefix)?;
        self.call(
            ApduCommand::avalanche(ApduInstruction::SignHash, P1_FIRST, header),
            "sign hash",
        )?;

        self.collect_signatures(ApduInstruction::SignHash, P1_PATH, P1_PATH_LAST, suffixes)
    }

    async fn get_app_version(&mut self) -> Result<AppVersion, WalletError> {
        Ok(self.app_info()?.version)
    }

    fn close(&mut self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ledger::apdu::ApduResponse;
    use secp256k1::{PublicKey, Secp256k1, SecretKey};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned responses and records every command.
    #[derive(Default)]
    struct Scripted {
        responses: VecDeque<ApduResponse>,
        sent: Arc<Mutex<Vec<ApduCommand>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl Scripted {
        fn new(responses: Vec<ApduResponse>) -> Self {
            Self {
                responses: responses.into(),
                ..Default::default()
            }
        }
    }

    impl ApduExchange for Scripted {
        fn exchange(&mut self, command: &ApduCommand) -> Result<ApduResponse, WalletError> {
            self.sent.lock().unwrap().push(command.clone());
            self.responses
                .pop_front()
                .ok_or_else(|| WalletError::DeviceIOError("script exhausted".into()))
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    #[test]
    fn test_app_info() {
        let mut data = vec![0, 4, 1];
        data.extend_from_slice(b"Avalanche");
        let mut app = LedgerAvalancheApp::new(Scripted::new(vec![ApduResponse::ok(data)]));
        let info = app.app_info().unwrap();
        assert_eq!(info.version, AppVersion::new(0, 4, 1));
        assert_eq!(info.name, "Avalanche");
    }

    #[tokio::test]
    async fn test_extended_public_key_parsing() {
        let secp = Secp256k1::new();
        let pk = PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[3; 32]).unwrap());
        let mut data = vec![33];
        data.extend_from_slice(&pk.serialize());
        data.push(32);
        data.extend_from_slice(&[5; 32]);

        let transport = Scripted::new(vec![ApduResponse::ok(data)]);
        let sent = transport.sent.clone();
        let mut app = LedgerAvalancheApp::new(transport);
        let key = app
            .get_extended_public_key(&Bip32Path::avalanche_account(0))
            .await
            .unwrap();
        assert_eq!(key.public_key(), &pk);
        assert_eq!(key.chain_code(), &[5; 32]);

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].ins, ApduInstruction::GetExtendedPublicKey as u8);
        assert_eq!(sent[0].data, Bip32Path::avalanche_account(0).to_bytes());
    }

    #[test]
    fn test_truncated_extended_key() {
        assert!(matches!(
            parse_extended_key(&[33, 2, 3]),
            Err(WalletError::DeviceIOError(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_hash_apdu_sequence() {
        let transport = Scripted::new(vec![
            ApduResponse::ok(vec![]),
            ApduResponse::ok(vec![1; SIGNATURE_LEN]),
            ApduResponse::ok(vec![2; SIGNATURE_LEN]),
        ]);
        let sent = transport.sent.clone();
        let mut app = LedgerAvalancheApp::new(transport);
        let suffixes = [DerivationPath::non_change(0), DerivationPath::change(4)];

        let sigs = app
            .sign_hash(&Bip32Path::avalanche_account(0), &suffixes, &[9; 32])
            .await
            .unwrap();
        assert_eq!(sigs.get(&suffixes[1]).unwrap(), &vec![2; SIGNATURE_LEN]);

        let sent = sent.lock().unwrap();
        let p1s: Vec<u8> = sent.iter().map(|c| c.p1).collect();
        assert_eq!(p1s, vec![0x00, 0x01, 0x81]);
        assert_eq!(sent[0].data[0], 2);
        assert_eq!(&sent[0].data[1..33], &[9; 32]);
        assert_eq!(sent[2].data, vec![2, 0, 0, 0, 1, 0, 0, 0, 4]);
    }

    #[tokio::test]
    async fn test_sign_transaction_chunks() {
        let tx = vec![7u8; TX_CHUNK_SIZE + 10];
        let transport = Scripted::new(vec![
            ApduResponse::ok(vec![]),
            ApduResponse::ok(vec![]),
            ApduResponse::ok(vec![]),
            ApduResponse::ok(vec![3; SIGNATURE_LEN]),
        ]);
        let sent = transport.sent.clone();
        let mut app = LedgerAvalancheApp::new(transport);

        let sigs = app
            .sign_transaction(&Bip32Path::avalanche_account(0), &[DerivationPath::non_change(1)], &tx)
            .await
            .unwrap();
        assert_eq!(sigs.len(), 1);

        let sent = sent.lock().unwrap();
        let p1s: Vec<u8> = sent.iter().map(|c| c.p1).collect();
        assert_eq!(p1s, vec![0x00, 0x01, 0x81, 0x82]);
        assert_eq!(sent[1].data.len(), TX_CHUNK_SIZE);
        assert_eq!(sent[2].data.len(), 10);
    }

    #[tokio::test]
    async fn test_rejection_propagates() {
        let transport = Scripted::new(vec![ApduResponse { data: vec![], sw1: 0x69, sw2: 0x85 }]);
        let mut app = LedgerAvalancheApp::new(transport);
        let err = app
            .sign_hash(&Bip32Path::avalanche_account(0), &[DerivationPath::non_change(0)], &[0; 32])
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::DeviceRejected(_)));
    }

    #[test]
    fn test_close_reaches_transport() {
        let transport = Scripted::new(vec![]);
        let closed = transport.closed.clone();
        let mut app = LedgerAvalancheApp::new(transport);
        HardwareSigner::close(&mut app);
        assert!(*closed.lock().unwrap());
    }
}
