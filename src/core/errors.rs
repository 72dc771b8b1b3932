//! Crate-wide error type

use thiserror::Error;

/// Error type shared by every stage of the discovery and signing pipeline.
///
/// All variants are local to one command invocation. Nothing is retried
/// and no partially signed transaction is kept.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Malformed or network-mismatched address string.
    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),

    /// Chain alias outside of the known X/P/C set.
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    /// A public-key hash that must sign is not covered by the address record.
    #[error("No derivation path known for {0}")]
    PathNotFound(String),

    /// The device response lacks a signature for a requested path.
    #[error("Device returned no signature for path {0}")]
    MissingSignature(String),

    /// A returned signature does not recover to the key its slot names.
    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    /// The user declined the prompt on the device.
    #[error("Rejected on device: {0}")]
    DeviceRejected(String),

    /// Transport or protocol failure while talking to the device.
    #[error("Device I/O error: {0}")]
    DeviceIOError(String),

    /// Network failure while fetching UTXOs or issuing a transaction.
    #[error("Query failure: {0}")]
    QueryFailure(String),

    /// Public child key derivation failed.
    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WalletError {
    /// 判断是否为关键error
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            WalletError::PathNotFound(_)
                | WalletError::MissingSignature(_)
                | WalletError::SignatureMismatch(_)
        )
    }

    /// Whether a caller could sensibly retry the command from scratch.
    ///
    /// The pipeline itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalletError::QueryFailure(_) | WalletError::DeviceIOError(_)
        )
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WalletError {
    fn from(err: toml::de::Error) -> Self {
        WalletError::Config(err.to_string())
    }
}

impl From<std::io::Error> for WalletError {
    fn from(err: std::io::Error) -> Self {
        WalletError::Config(err.to_string())
    }
}
