pub mod bip44;
pub mod config;
pub mod domain;
pub mod errors;
pub mod wallet_manager;

pub use errors::WalletError;
pub use wallet_manager::WalletManager;
