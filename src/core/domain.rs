//! Domain value types shared across the wallet
//!
//! Chains, networks, public-key hashes, app versions and amount formatting.

use crate::core::errors::WalletError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places between one AVAX and its sub-unit (nAVAX).
pub const AVAX_DECIMALS: u32 = 9;

/// Length of a public-key hash in bytes.
pub const PKH_LEN: usize = 20;

/// The three parallel chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Chain {
    /// Asset-transfer chain (UTXO model)
    X,
    /// Staking / validator chain (UTXO model)
    P,
    /// Contract chain (account model)
    C,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::X, Chain::P, Chain::C];

    /// Alias used as the address prefix.
    pub fn alias(&self) -> &'static str {
        match self {
            Chain::X => "X",
            Chain::P => "P",
            Chain::C => "C",
        }
    }

    /// Whether addresses on this chain use a bech32 payload.
    pub fn is_utxo_model(&self) -> bool {
        !matches!(self, Chain::C)
    }

    /// Parse a chain alias (case-insensitive).
    pub fn from_alias(alias: &str) -> Result<Self, WalletError> {
        match alias.trim() {
            "X" | "x" => Ok(Chain::X),
            "P" | "p" => Ok(Chain::P),
            "C" | "c" => Ok(Chain::C),
            other => Err(WalletError::UnsupportedChain(other.to_string())),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}

impl FromStr for Chain {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::from_alias(s)
    }
}

/// Network identity. Always taken from trusted configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// Network name (e.g. "mainnet", "fuji", "local")
    pub name: String,
    /// bech32 human-readable part
    pub hrp: String,
    /// Numeric network id
    pub network_id: u32,
}

impl NetworkParams {
    pub fn mainnet() -> Self {
        Self { name: "mainnet".to_string(), hrp: "avax".to_string(), network_id: 1 }
    }

    pub fn fuji() -> Self {
        Self { name: "fuji".to_string(), hrp: "fuji".to_string(), network_id: 5 }
    }

    pub fn local() -> Self {
        Self { name: "local".to_string(), hrp: "local".to_string(), network_id: 12345 }
    }

    /// Look up one of the built-in networks by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "mainnet" | "avax" => Some(Self::mainnet()),
            "fuji" | "testnet" => Some(Self::fuji()),
            "local" => Some(Self::local()),
            _ => None,
        }
    }
}

/// Public-key hash: RIPEMD-160(SHA-256(compressed pubkey)).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKeyHash(pub [u8; PKH_LEN]);

impl PublicKeyHash {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WalletError> {
        let arr: [u8; PKH_LEN] = bytes.try_into().map_err(|_| {
            WalletError::InvalidAddressFormat(format!(
                "public-key hash must be {} bytes, got {}",
                PKH_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; PKH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyHash({})", self.to_hex())
    }
}

impl fmt::Display for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKeyHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKeyHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        PublicKeyHash::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Kind of operation being signed. Each (chain, operation) pair carries its
/// own minimum app version for transaction signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Transfer,
    Export,
    Import,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Transfer => f.write_str("transfer"),
            Operation::Export => f.write_str("export"),
            Operation::Import => f.write_str("import"),
        }
    }
}

/// Device application version (major, minor, patch), ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl AppVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for AppVersion {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(WalletError::Config(format!("invalid version: {}", s)));
        }
        let parse = |p: &str| {
            p.parse::<u8>()
                .map_err(|_| WalletError::Config(format!("invalid version component: {}", s)))
        };
        Ok(Self::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl Serialize for AppVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AppVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Format a sub-unit amount as a decimal AVAX string.
pub fn format_avax(amount: u128) -> String {
    match i128::try_from(amount)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, AVAX_DECIMALS).ok())
    {
        Some(d) => d.normalize().to_string(),
        // Beyond Decimal's 96-bit mantissa; fall back to integer arithmetic.
        None => {
            let unit = 10u128.pow(AVAX_DECIMALS);
            format!("{}.{:09}", amount / unit, amount % unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_alias_parsing() {
        assert_eq!(Chain::from_alias("X").unwrap(), Chain::X);
        assert_eq!(Chain::from_alias("p").unwrap(), Chain::P);
        assert!(matches!(
            Chain::from_alias("Q"),
            Err(WalletError::UnsupportedChain(_))
        ));
    }

    #[test]
    fn test_app_version_ordering() {
        let v = |s: &str| s.parse::<AppVersion>().unwrap();
        assert!(v("0.3.0") < v("0.3.1"));
        assert!(v("0.9.9") < v("1.0.0"));
        assert_eq!(v("0.5.0"), AppVersion::new(0, 5, 0));
        assert!("0.5".parse::<AppVersion>().is_err());
    }

    #[test]
    fn test_format_avax() {
        assert_eq!(format_avax(1_000_000_000), "1");
        assert_eq!(format_avax(1_500_000_000), "1.5");
        assert_eq!(format_avax(1), "0.000000001");
        assert_eq!(format_avax(0), "0");
    }

    #[test]
    fn test_pkh_length_checked() {
        assert!(PublicKeyHash::from_slice(&[0u8; 20]).is_ok());
        assert!(PublicKeyHash::from_slice(&[0u8; 19]).is_err());
    }

    #[test]
    fn test_network_presets() {
        assert_eq!(NetworkParams::preset("mainnet").unwrap().hrp, "avax");
        assert_eq!(NetworkParams::preset("local").unwrap().network_id, 12345);
        assert!(NetworkParams::preset("nope").is_none());
    }
}
