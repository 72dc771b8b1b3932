//! APDU (Application Protocol Data Unit) 命令处理
//!
//! Command/response framing for the Avalanche Ledger app.

use crate::core::errors::WalletError;
use tracing::debug;

/// Maximum data length of a short APDU.
pub const MAX_APDU_DATA: usize = 255;

/// APDU 命令类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApduClass {
    /// Avalanche app CLA
    Avalanche = 0x80,
}

/// APDU 指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApduInstruction {
    /// fetch应用版本
    GetVersion = 0x00,
    /// fetch wallet id
    GetWalletId = 0x01,
    /// fetch extended public key (prompts)
    GetExtendedPublicKey = 0x03,
    /// sign a 32-byte hash
    SignHash = 0x04,
    /// Sign transaction
    SignTransaction = 0x05,
}

/// APDU 命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
}

impl ApduCommand {
    pub fn new(cla: ApduClass, ins: ApduInstruction, p1: u8, p2: u8, data: Vec<u8>) -> Self {
        Self {
            cla: cla as u8,
            ins: ins as u8,
            p1,
            p2,
            data,
        }
    }

    /// Command for the Avalanche app.
    pub fn avalanche(ins: ApduInstruction, p1: u8, data: Vec<u8>) -> Self {
        Self::new(ApduClass::Avalanche, ins, p1, 0x00, data)
    }

    /// 序列化为字节数组
    pub fn to_bytes(&self) -> Result<Vec<u8>, WalletError> {
        if self.data.len() > MAX_APDU_DATA {
            return Err(WalletError::DeviceIOError(format!(
                "APDU data too long: {} bytes",
                self.data.len()
            )));
        }

        let mut bytes = Vec::with_capacity(5 + self.data.len());
        bytes.push(self.cla);
        bytes.push(self.ins);
        bytes.push(self.p1);
        bytes.push(self.p2);
        bytes.push(self.data.len() as u8);
        bytes.extend_from_slice(&self.data);

        debug!(
            "APDU 命令: CLA={:02X} INS={:02X} P1={:02X} P2={:02X} Len={}",
            self.cla, self.ins, self.p1, self.p2, self.data.len()
        );

        Ok(bytes)
    }
}

/// APDU 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub sw1: u8,
    pub sw2: u8,
}

impl ApduResponse {
    /// from字节数组解析
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() < 2 {
            return Err(WalletError::DeviceIOError("APDU response too short".to_string()));
        }

        let len = bytes.len();
        let sw1 = bytes[len - 2];
        let sw2 = bytes[len - 1];
        let data = bytes[..len - 2].to_vec();

        debug!("APDU 响应: SW1={:02X} SW2={:02X} DataLen={}", sw1, sw2, data.len());

        Ok(Self { data, sw1, sw2 })
    }

    pub fn ok(data: Vec<u8>) -> Self {
        Self { data, sw1: 0x90, sw2: 0x00 }
    }

    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    pub fn status_code(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// User declined the prompt on the device.
    pub fn is_rejection(&self) -> bool {
        matches!(self.status_code(), 0x6985 | 0x6986)
    }

    pub fn error_description(&self) -> String {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "success".to_string(),
            (0x69, 0x82) => "security status not satisfied (device locked?)".to_string(),
            (0x69, 0x85) | (0x69, 0x86) => "rejected by user".to_string(),
            (0x6A, 0x80) => "invalid data".to_string(),
            (0x6D, 0x00) => "instruction not supported (wrong app open?)".to_string(),
            (0x6E, 0x00) => "class not supported (wrong app open?)".to_string(),
            (0x67, 0x00) => "wrong data length".to_string(),
            (0x6B, 0x00) => "invalid parameters".to_string(),
            (0x6F, 0x00) => "unknown error".to_string(),
            _ => format!("unknown status: {:04X}", self.status_code()),
        }
    }

    /// Map a failed status word to the wallet error taxonomy.
    pub fn into_result(self, context: &str) -> Result<Vec<u8>, WalletError> {
        if self.is_success() {
            Ok(self.data)
        } else if self.is_rejection() {
            Err(WalletError::DeviceRejected(format!("{}: {}", context, self.error_description())))
        } else {
            Err(WalletError::DeviceIOError(format!(
                "{}: {:04X} {}",
                context,
                self.status_code(),
                self.error_description()
            )))
        }
    }
}

/// Anything that can carry one APDU to the device and return its answer.
pub trait ApduExchange: Send {
    fn exchange(&mut self, command: &ApduCommand) -> Result<ApduResponse, WalletError>;

    fn close(&mut self) {}
}
