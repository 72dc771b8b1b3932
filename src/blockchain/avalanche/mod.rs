//! Avalanche X/P/C chain support

pub mod address;
pub mod client;
pub mod transaction;
pub mod utxo;

pub use address::AddressCodec;
pub use client::AvalancheClient;
pub use transaction::{
    Credential, InputSelector, SigSlot, SignedTransaction, TransferableInput, UnsignedTransaction,
};
pub use utxo::{UtxoEntry, UtxoSet};
