//! Ledger 传输层
//!
//! HID framing of APDUs (channel, tag, sequence number, 64-byte reports) and,
//! with the `ledger` feature, the hidapi-backed transport.

use crate::core::errors::WalletError;

/// Ledger 设备 USB 参数
pub const LEDGER_VENDOR_ID: u16 = 0x2C97;
pub const LEDGER_USAGE_PAGE: u16 = 0xFFA0;

/// HID 数据包大小
pub const HID_PACKET_SIZE: usize = 64;

/// APDU 传输通道
const CHANNEL: u16 = 0x0101;

/// HID 命令标签
const TAG_APDU: u8 = 0x05;

/// Packets a single response may span.
const MAX_RESPONSE_PACKETS: u16 = 100;

/// hidapi read timeout in milliseconds, saturating at `i32::MAX`.
pub fn read_timeout_ms(timeout: std::time::Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}

/// Split an APDU into HID reports, each prefixed with report id 0.
pub fn frame_apdu(apdu: &[u8]) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let total_len = apdu.len();
    let mut offset = 0;
    let mut sequence = 0u16;

    while offset < total_len || sequence == 0 {
        let mut packet = vec![0u8; HID_PACKET_SIZE + 1];
        packet[1..3].copy_from_slice(&CHANNEL.to_be_bytes());
        packet[3] = TAG_APDU;
        packet[4..6].copy_from_slice(&sequence.to_be_bytes());

        let data_start = if sequence == 0 {
            // 第一个包：包含总长度
            packet[6..8].copy_from_slice(&(total_len as u16).to_be_bytes());
            8
        } else {
            6
        };
        let chunk_size = (packet.len() - data_start).min(total_len - offset);
        packet[data_start..data_start + chunk_size].copy_from_slice(&apdu[offset..offset + chunk_size]);
        offset += chunk_size;

        packets.push(packet);
        sequence += 1;
    }

    packets
}

/// Reassembles a response from HID reports (without report id).
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    data: Vec<u8>,
    sequence: u16,
    total_len: Option<usize>,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one report. Returns the full response once complete.
    ///
    /// Reports from other channels or with other tags are ignored.
    pub fn push(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, WalletError> {
        if packet.len() < 5 {
            return Err(WalletError::DeviceIOError("HID report too short".to_string()));
        }
        let channel = u16::from_be_bytes([packet[0], packet[1]]);
        if channel != CHANNEL || packet[2] != TAG_APDU {
            return Ok(None);
        }

        let seq = u16::from_be_bytes([packet[3], packet[4]]);
        if seq != self.sequence {
            return Err(WalletError::DeviceIOError(format!(
                "sequence mismatch: expected {}, got {}",
                self.sequence, seq
            )));
        }
        if seq >= MAX_RESPONSE_PACKETS {
            return Err(WalletError::DeviceIOError("response too long".to_string()));
        }

        let payload = if seq == 0 {
            if packet.len() < 7 {
                return Err(WalletError::DeviceIOError("HID report too short".to_string()));
            }
            self.total_len = Some(u16::from_be_bytes([packet[5], packet[6]]) as usize);
            &packet[7..]
        } else {
            &packet[5..]
        };
        self.sequence += 1;

        let total = self.total_len.unwrap_or(0);
        let take = payload.len().min(total.saturating_sub(self.data.len()));
        self.data.extend_from_slice(&payload[..take]);

        if self.data.len() >= total {
            Ok(Some(std::mem::take(&mut self.data)))
        } else {
            Ok(None)
        }
    }
}

#[cfg(feature = "ledger")]
pub use hid::LedgerTransport;

#[cfg(feature = "ledger")]
mod hid {
    use super::*;
    use crate::hardware::ledger::apdu::{ApduCommand, ApduExchange, ApduResponse};
    use hidapi::{DeviceInfo, HidApi, HidDevice};
    use std::time::Duration;
    use tracing::{debug, info, warn};

    /// Ledger HID 传输
    pub struct LedgerTransport {
        device: Option<HidDevice>,
        timeout: Duration,
    }

    impl LedgerTransport {
        pub fn open(api: &HidApi, info: &DeviceInfo, timeout: Duration) -> Result<Self, WalletError> {
            let device = info
                .open_device(api)
                .map_err(|e| WalletError::DeviceIOError(format!("failed to open device: {}", e)))?;
            info!(
                product = info.product_string().unwrap_or("unknown"),
                "Connected to Ledger device"
            );
            Ok(Self {
                device: Some(device),
                timeout,
            })
        }

        fn device(&self) -> Result<&HidDevice, WalletError> {
            self.device
                .as_ref()
                .ok_or_else(|| WalletError::DeviceIOError("transport closed".to_string()))
        }
    }

    impl ApduExchange for LedgerTransport {
        fn exchange(&mut self, command: &ApduCommand) -> Result<ApduResponse, WalletError> {
            let device = self.device()?;
            let packets = frame_apdu(&command.to_bytes()?);
            for (i, packet) in packets.iter().enumerate() {
                debug!("发送数据包 {}/{}", i + 1, packets.len());
                device
                    .write(packet)
                    .map_err(|e| WalletError::DeviceIOError(format!("write failed: {}", e)))?;
            }

            let timeout_ms = read_timeout_ms(self.timeout);
            let mut assembler = ResponseAssembler::new();
            loop {
                let mut buf = [0u8; HID_PACKET_SIZE];
                let read = device
                    .read_timeout(&mut buf, timeout_ms)
                    .map_err(|e| WalletError::DeviceIOError(format!("read failed: {}", e)))?;
                if read == 0 {
                    return Err(WalletError::DeviceIOError("device read timed out".to_string()));
                }
                if let Some(bytes) = assembler.push(&buf[..read])? {
                    let response = ApduResponse::from_bytes(&bytes)?;
                    if !response.is_success() {
                        warn!(
                            "APDU failed: {:04X} - {}",
                            response.status_code(),
                            response.error_description()
                        );
                    }
                    return Ok(response);
                }
            }
        }

        fn close(&mut self) {
            if self.device.take().is_some() {
                debug!("HID device released");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Strip the report id the way the device echoes frames back.
    fn echo(packets: &[Vec<u8>]) -> Vec<Vec<u8>> {
        packets.iter().map(|p| p[1..].to_vec()).collect()
    }

    #[test]
    fn test_read_timeout_saturates() {
        use std::time::Duration;
        assert_eq!(read_timeout_ms(Duration::from_secs(120)), 120_000);
        assert_eq!(read_timeout_ms(Duration::from_secs(30 * 24 * 3600)), i32::MAX);
    }

    #[test]
    fn test_single_packet_frame() {
        let packets = frame_apdu(&[0x80, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), HID_PACKET_SIZE + 1);
        assert_eq!(&packets[0][..8], &[0x00, 0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x05]);
    }

    #[test]
    fn test_multi_packet_frame() {
        let apdu: Vec<u8> = (0..200u8).collect();
        let packets = frame_apdu(&apdu);
        // 57 in the first report, 59 in each following one
        assert_eq!(packets.len(), 4);
        assert_eq!(&packets[1][4..6], &[0x00, 0x01]);
        assert_eq!(packets[1][6], 57);
    }

    #[test]
    fn test_reassembly_roundtrip() {
        let apdu: Vec<u8> = (0..=255u8).cycle().take(300).collect();
        let mut assembler = ResponseAssembler::new();
        let mut out = None;
        for packet in echo(&frame_apdu(&apdu)) {
            out = assembler.push(&packet).unwrap();
        }
        assert_eq!(out.unwrap(), apdu);
    }

    #[test]
    fn test_foreign_channel_ignored() {
        let mut assembler = ResponseAssembler::new();
        let mut packet = echo(&frame_apdu(&[0x90, 0x00])).remove(0);
        packet[0] = 0x02;
        assert!(assembler.push(&packet).unwrap().is_none());
    }

    #[test]
    fn test_out_of_order_sequence() {
        let apdu = vec![1u8; 120];
        let packets = echo(&frame_apdu(&apdu));
        let mut assembler = ResponseAssembler::new();
        assert!(matches!(
            assembler.push(&packets[1]),
            Err(WalletError::DeviceIOError(_))
        ));
    }
}
