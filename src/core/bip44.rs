//! BIP44 HD key derivation
//!
//! The account level `m/44'/9000'/account'` stays on the device. The host
//! receives the account extended public key once per command and derives
//! the two non-hardened levels below it: `<branch>/<index>`.
//!
//! Branch 0 is the non-change (receive) chain, branch 1 the change chain.

use crate::core::domain::PublicKeyHash;
use crate::core::errors::WalletError;
use bitcoin::hashes::{hash160, Hash};
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, VerifyOnly};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

type HmacSha512 = Hmac<Sha512>;

/// First hardened index.
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Avalanche BIP44 coin type.
pub const AVAX_COIN_TYPE: u32 = 9000;

/// Full BIP32 path, as sent to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip32Path {
    pub path: Vec<u32>,
}

impl Bip32Path {
    pub fn new(path: Vec<u32>) -> Self {
        Self { path }
    }

    /// Default account prefix `m/44'/9000'/<account>'`.
    pub fn avalanche_account(account: u32) -> Self {
        Self::new(vec![
            HARDENED_OFFSET | 44,
            HARDENED_OFFSET | AVAX_COIN_TYPE,
            HARDENED_OFFSET | account,
        ])
    }

    /// Append a `<branch>/<index>` suffix.
    pub fn join(&self, suffix: &DerivationPath) -> Self {
        let mut path = self.path.clone();
        path.push(suffix.branch.index());
        path.push(suffix.index);
        Self { path }
    }

    /// Serialize as `len || u32be*` (device path encoding).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 4 * self.path.len());
        bytes.push(self.path.len() as u8);
        for index in &self.path {
            bytes.extend_from_slice(&index.to_be_bytes());
        }
        bytes
    }
}

impl FromStr for Bip32Path {
    type Err = WalletError;

    /// Parse "m/44'/9000'/0'" style paths. Accepts `'` or `h` as hardened marker.
    fn from_str(path_str: &str) -> Result<Self, Self::Err> {
        let invalid = |why: &str| WalletError::KeyDerivation(format!("{}: {}", why, path_str));

        let rest = path_str
            .strip_prefix("m/")
            .ok_or_else(|| invalid("path must start with m/"))?;
        if rest.is_empty() {
            return Err(invalid("path needs at least one component"));
        }

        let mut path = Vec::new();
        for part in rest.split('/') {
            let hardened = part.ends_with('\'') || part.ends_with('h');
            let num_str = part.trim_end_matches('\'').trim_end_matches('h');
            let num: u32 = num_str.parse().map_err(|_| invalid("invalid path component"))?;
            if num >= HARDENED_OFFSET {
                return Err(invalid("path component out of range"));
            }
            path.push(if hardened { HARDENED_OFFSET | num } else { num });
        }

        Ok(Self { path })
    }
}

impl fmt::Display for Bip32Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for index in &self.path {
            if index & HARDENED_OFFSET != 0 {
                write!(f, "/{}'", index & !HARDENED_OFFSET)?;
            } else {
                write!(f, "/{}", index)?;
            }
        }
        Ok(())
    }
}

/// External/internal chain of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Branch {
    NonChange,
    Change,
}

impl Branch {
    pub fn index(&self) -> u32 {
        match self {
            Branch::NonChange => 0,
            Branch::Change => 1,
        }
    }
}

/// `<branch>/<index>` below the account key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DerivationPath {
    pub branch: Branch,
    pub index: u32,
}

impl DerivationPath {
    pub fn new(branch: Branch, index: u32) -> Self {
        Self { branch, index }
    }

    pub fn non_change(index: u32) -> Self {
        Self::new(Branch::NonChange, index)
    }

    pub fn change(index: u32) -> Self {
        Self::new(Branch::Change, index)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.branch.index(), self.index)
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WalletError::KeyDerivation(format!("expected <branch>/<index>, got {}", s));
        let (branch, index) = s.split_once('/').ok_or_else(invalid)?;
        let branch = match branch {
            "0" => Branch::NonChange,
            "1" => Branch::Change,
            _ => return Err(invalid()),
        };
        let index: u32 = index.parse().map_err(|_| invalid())?;
        if index >= HARDENED_OFFSET {
            return Err(invalid());
        }
        Ok(Self { branch, index })
    }
}

/// Public key plus chain code.
#[derive(Clone, PartialEq, Eq)]
pub struct ExtendedKey {
    public_key: PublicKey,
    chain_code: [u8; 32],
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("public_key", &hex::encode(self.public_key.serialize()))
            .finish_non_exhaustive()
    }
}

impl ExtendedKey {
    pub fn new(public_key: PublicKey, chain_code: [u8; 32]) -> Self {
        Self { public_key, chain_code }
    }

    /// Build from the raw bytes a device returns (33- or 65-byte SEC1 key).
    pub fn from_device_bytes(public_key: &[u8], chain_code: &[u8]) -> Result<Self, WalletError> {
        let public_key = PublicKey::from_slice(public_key)
            .map_err(|e| WalletError::KeyDerivation(format!("invalid public key: {}", e)))?;
        let chain_code: [u8; 32] = chain_code.try_into().map_err(|_| {
            WalletError::KeyDerivation(format!(
                "chain code must be 32 bytes, got {}",
                chain_code.len()
            ))
        })?;
        Ok(Self::new(public_key, chain_code))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    /// CKDpub: non-hardened child derivation.
    pub fn derive_child(
        &self,
        secp: &Secp256k1<VerifyOnly>,
        index: u32,
    ) -> Result<Self, WalletError> {
        if index >= HARDENED_OFFSET {
            return Err(WalletError::KeyDerivation(format!(
                "cannot derive hardened child {} from a public key",
                index
            )));
        }

        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| WalletError::KeyDerivation(format!("HMAC initialization failed: {}", e)))?;
        mac.update(&self.public_key.serialize());
        mac.update(&index.to_be_bytes());
        let result = mac.finalize().into_bytes();

        let mut il = [0u8; 32];
        il.copy_from_slice(&result[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&result[32..]);

        let tweak = Scalar::from_be_bytes(il)
            .map_err(|_| WalletError::KeyDerivation(format!("invalid child at index {}", index)))?;
        let public_key = self
            .public_key
            .add_exp_tweak(secp, &tweak)
            .map_err(|e| WalletError::KeyDerivation(format!("invalid child at index {}: {}", index, e)))?;

        Ok(Self { public_key, chain_code })
    }

    /// hash160 of the compressed public key.
    pub fn pkh(&self) -> PublicKeyHash {
        pubkey_to_pkh(&self.public_key)
    }
}

/// RIPEMD-160(SHA-256(compressed pubkey)).
pub fn pubkey_to_pkh(public_key: &PublicKey) -> PublicKeyHash {
    PublicKeyHash(hash160::Hash::hash(&public_key.serialize()).to_byte_array())
}

/// Derives `<branch>/<index>` keys from an account-level extended key.
///
/// The two branch keys are computed once up front.
pub struct KeyDeriver {
    secp: Secp256k1<VerifyOnly>,
    non_change: ExtendedKey,
    change: ExtendedKey,
}

impl KeyDeriver {
    pub fn new(account_key: &ExtendedKey) -> Result<Self, WalletError> {
        let secp = Secp256k1::verification_only();
        let non_change = account_key.derive_child(&secp, Branch::NonChange.index())?;
        let change = account_key.derive_child(&secp, Branch::Change.index())?;
        Ok(Self { secp, non_change, change })
    }

    pub fn derive(&self, path: &DerivationPath) -> Result<ExtendedKey, WalletError> {
        let branch_key = match path.branch {
            Branch::NonChange => &self.non_change,
            Branch::Change => &self.change,
        };
        let child = branch_key.derive_child(&self.secp, path.index)?;
        debug!(path = %path, "Derived child key");
        Ok(child)
    }

    pub fn derive_pkh(&self, path: &DerivationPath) -> Result<PublicKeyHash, WalletError> {
        Ok(self.derive(path)?.pkh())
    }
}
