//! Ledger 设备管理
//!
//! Device enumeration and model identification.

use serde::Serialize;

/// Ledger 设备型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LedgerModel {
    NanoS,
    NanoX,
    NanoSPlus,
    Stax,
    Unknown,
}

impl LedgerModel {
    /// Model from the USB product id.
    ///
    /// Older firmware reports the bare model id, newer firmware puts it in the
    /// high byte.
    pub fn from_product_id(product_id: u16) -> Self {
        let model_id = if product_id > 0xFF { product_id >> 8 } else { product_id << 4 };
        match model_id {
            0x10 => LedgerModel::NanoS,
            0x40 => LedgerModel::NanoX,
            0x50 => LedgerModel::NanoSPlus,
            0x60 => LedgerModel::Stax,
            _ => LedgerModel::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerModel::NanoS => "Ledger Nano S",
            LedgerModel::NanoX => "Ledger Nano X",
            LedgerModel::NanoSPlus => "Ledger Nano S Plus",
            LedgerModel::Stax => "Ledger Stax",
            LedgerModel::Unknown => "Unknown Ledger",
        }
    }
}

/// Ledger 设备信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerDeviceInfo {
    pub product_id: u16,
    pub model: LedgerModel,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

#[cfg(feature = "ledger")]
pub use hid::{list_devices, open_first};

#[cfg(feature = "ledger")]
mod hid {
    use super::*;
    use crate::core::errors::WalletError;
    use crate::hardware::ledger::transport::{LedgerTransport, LEDGER_USAGE_PAGE, LEDGER_VENDOR_ID};
    use crate::hardware::ledger::LedgerAvalancheApp;
    use hidapi::HidApi;
    use std::time::Duration;
    use tracing::info;

    fn api() -> Result<HidApi, WalletError> {
        HidApi::new().map_err(|e| WalletError::DeviceIOError(format!("HID API init failed: {}", e)))
    }

    /// 枚举所有 Ledger 设备
    pub fn list_devices() -> Result<Vec<LedgerDeviceInfo>, WalletError> {
        let api = api()?;
        Ok(api
            .device_list()
            .filter(|d| d.vendor_id() == LEDGER_VENDOR_ID && d.usage_page() == LEDGER_USAGE_PAGE)
            .map(|d| LedgerDeviceInfo {
                product_id: d.product_id(),
                model: LedgerModel::from_product_id(d.product_id()),
                product: d.product_string().map(str::to_string),
                serial_number: d.serial_number().map(str::to_string),
            })
            .collect())
    }

    /// Open the first connected device running the Avalanche app.
    pub fn open_first(
        timeout: Duration,
    ) -> Result<(LedgerDeviceInfo, LedgerAvalancheApp<LedgerTransport>), WalletError> {
        let api = api()?;
        let device = api
            .device_list()
            .find(|d| d.vendor_id() == LEDGER_VENDOR_ID && d.usage_page() == LEDGER_USAGE_PAGE)
            .ok_or_else(|| {
                WalletError::DeviceIOError(
                    "no Ledger device found; make sure it is connected and unlocked".to_string(),
                )
            })?;

        let info = LedgerDeviceInfo {
            product_id: device.product_id(),
            model: LedgerModel::from_product_id(device.product_id()),
            product: device.product_string().map(str::to_string),
            serial_number: device.serial_number().map(str::to_string),
        };
        info!(model = info.model.name(), "Opening Ledger device");
        let transport = LedgerTransport::open(&api, device, timeout)?;
        Ok((info, LedgerAvalancheApp::new(transport)))
    }
}
