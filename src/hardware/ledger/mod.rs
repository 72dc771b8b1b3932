//! Ledger 硬件wallet集成
//!
//! 此模块实现与 Ledger Avalanche 应用的通信：
//! APDU 编码, HID 传输（`ledger` feature）, 设备管理

pub mod apdu;
pub mod avalanche_app;
pub mod device;
pub mod transport;

pub use apdu::{ApduCommand, ApduExchange, ApduResponse};
pub use avalanche_app::{AvalancheAppInfo, LedgerAvalancheApp};
pub use device::{LedgerDeviceInfo, LedgerModel};
#[cfg(feature = "ledger")]
pub use transport::LedgerTransport;
