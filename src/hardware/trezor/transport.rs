//! Trezor 传输层
//!
//! 实现与 Trezor 设备的 USB HID 通信

use super::messages::HEADER_LEN;
use crate::core::config::TrezorConfig;
use crate::hardware::transport::{chunk_reports, DeviceTransport, TransportError};
use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Trezor USB 参数
pub const TREZOR_VENDOR_ID: u16 = 0x534C; // SatoshiLabs
pub const TREZOR_ONE_PRODUCT_ID: u16 = 0x0001;
pub const TREZOR_T_VENDOR_ID: u16 = 0x1209;
pub const TREZOR_T_PRODUCT_ID: u16 = 0x53C1;

/// HID 数据包大小
const HID_PACKET_SIZE: usize = 64;

/// Trezor 传输协议魔术字节
const HEADER_MAGIC: &[u8] = b"?##";
const CONTINUATION_MAGIC: u8 = b'?';

/// Frame a serialized message into HID reports, report ID byte first.
fn build_packets(message: &[u8]) -> Vec<Vec<u8>> {
    let mut first = vec![0x00];
    first.extend_from_slice(HEADER_MAGIC);
    chunk_reports(message, HID_PACKET_SIZE + 1, &first, |_| vec![0x00, CONTINUATION_MAGIC])
}

/// Reassembles one message from HID reports (no report ID).
#[derive(Debug, Default)]
struct MessageAssembler {
    data: Vec<u8>,
    expected: Option<usize>,
}

impl MessageAssembler {
    fn push(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        match self.expected {
            None => {
                if packet.len() < 9 || &packet[..3] != HEADER_MAGIC {
                    return Err(TransportError::Io("Invalid Trezor response header".to_string()));
                }
                let len = u32::from_be_bytes([packet[5], packet[6], packet[7], packet[8]]) as usize;
                self.expected = Some(HEADER_LEN + len);
                self.data.extend_from_slice(&packet[3..]);
            }
            Some(_) => {
                if packet.first() != Some(&CONTINUATION_MAGIC) {
                    return Err(TransportError::Io("Invalid Trezor continuation packet".to_string()));
                }
                self.data.extend_from_slice(&packet[1..]);
            }
        }

        match self.expected {
            Some(len) if self.data.len() >= len => {
                let mut data = std::mem::take(&mut self.data);
                data.truncate(len);
                Ok(Some(data))
            }
            _ => Ok(None),
        }
    }
}

/// Trezor HID 传输
pub struct TrezorHidTransport {
    device: Arc<Mutex<HidDevice>>,
    timeout: Duration,
}

impl TrezorHidTransport {
    /// 打开 Trezor 设备 (One or Model T)
    pub fn open(config: &TrezorConfig) -> Result<Self, TransportError> {
        info!("正在连接 Trezor 设备...");

        let api = HidApi::new().map_err(|e| TransportError::NotSupported(e.to_string()))?;
        let device = api
            .open(TREZOR_VENDOR_ID, TREZOR_ONE_PRODUCT_ID)
            .or_else(|_| api.open(TREZOR_T_VENDOR_ID, TREZOR_T_PRODUCT_ID))
            .map_err(|e| TransportError::OpenFailed(format!("No Trezor device found: {}", e)))?;

        info!("✅ 已连接到 Trezor 设备");

        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            timeout: config.timeout(),
        })
    }

    fn exchange_blocking(device: &HidDevice, message: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let packets = build_packets(message);
        for (i, packet) in packets.iter().enumerate() {
            debug!("发送数据包 {}/{}", i + 1, packets.len());
            device
                .write(packet)
                .map_err(|e| TransportError::Disconnected(e.to_string()))?;
        }

        let mut assembler = MessageAssembler::default();
        loop {
            let mut packet = [0u8; HID_PACKET_SIZE];
            let read = device
                .read_timeout(&mut packet, timeout.as_millis() as i32)
                .map_err(|e| TransportError::Disconnected(e.to_string()))?;
            if read == 0 {
                return Err(TransportError::Timeout);
            }
            if let Some(message) = assembler.push(&packet[..read])? {
                return Ok(message);
            }
        }
    }
}

#[async_trait]
impl DeviceTransport for TrezorHidTransport {
    async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let device = Arc::clone(&self.device);
        let request = request.to_vec();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            let device = device
                .lock()
                .map_err(|_| TransportError::Io("HID device lock poisoned".to_string()))?;
            Self::exchange_blocking(&device, &request, timeout)
        })
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::trezor::messages::{MessageType, TrezorMessage};

    #[test]
    fn test_first_packet_header() {
        let message = TrezorMessage::new(MessageType::Initialize, vec![]).serialize();
        let packets = build_packets(&message);

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), HID_PACKET_SIZE + 1);
        assert_eq!(&packets[0][..4], &[0x00, b'?', b'#', b'#']);
        assert_eq!(&packets[0][4..10], &message[..]);
    }

    #[test]
    fn test_reassemble_own_framing() {
        let message = TrezorMessage::new(MessageType::EthereumSignMessage, vec![0x5A; 150]).serialize();
        let mut assembler = MessageAssembler::default();
        let mut result = None;
        for packet in build_packets(&message) {
            result = assembler.push(&packet[1..]).unwrap();
        }
        assert_eq!(result.unwrap(), message);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut assembler = MessageAssembler::default();
        assert!(assembler.push(&[0u8; 64]).is_err());
    }
}
