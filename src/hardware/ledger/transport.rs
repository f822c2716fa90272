//! Ledger 传输层
//!
//! 实现与 Ledger 设备的 HID 通信

use crate::core::config::LedgerConfig;
use crate::hardware::transport::{chunk_reports, DeviceTransport, TransportError};
use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Ledger 设备 USB 参数
pub const LEDGER_VENDOR_ID: u16 = 0x2C97;
pub const LEDGER_USAGE_PAGE: u16 = 0xFFA0;

/// HID 数据包大小
const HID_PACKET_SIZE: usize = 64;

/// APDU 传输通道
const CHANNEL: u16 = 0x0101;

/// HID 命令标签
const TAG_APDU: u8 = 0x05;

/// Upper bound on continuation packets for one response.
const MAX_RESPONSE_PACKETS: u16 = 100;

/// Frame an APDU into HID reports, report ID byte first.
fn build_hid_packets(apdu: &[u8]) -> Vec<Vec<u8>> {
    let len = apdu.len() as u16;
    let mut first = vec![0x00];
    first.extend_from_slice(&CHANNEL.to_be_bytes());
    first.push(TAG_APDU);
    first.extend_from_slice(&0u16.to_be_bytes());
    first.extend_from_slice(&len.to_be_bytes());

    chunk_reports(apdu, HID_PACKET_SIZE + 1, &first, |sequence| {
        let mut header = vec![0x00];
        header.extend_from_slice(&CHANNEL.to_be_bytes());
        header.push(TAG_APDU);
        header.extend_from_slice(&sequence.to_be_bytes());
        header
    })
}

/// Reassembles a response from HID reports (no report ID).
#[derive(Debug, Default)]
struct ResponseAssembler {
    data: Vec<u8>,
    expected: Option<usize>,
    sequence: u16,
}

impl ResponseAssembler {
    /// Feed one report; returns the full response once complete.
    fn push(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        if packet.len() < 5 {
            return Err(TransportError::Io("HID report too short".to_string()));
        }
        let channel = u16::from_be_bytes([packet[0], packet[1]]);
        if channel != CHANNEL || packet[2] != TAG_APDU {
            return Ok(None);
        }

        let sequence = u16::from_be_bytes([packet[3], packet[4]]);
        if sequence != self.sequence {
            return Err(TransportError::Io(format!(
                "Sequence mismatch: expected {}, got {}",
                self.sequence, sequence
            )));
        }

        if sequence == 0 {
            if packet.len() < 7 {
                return Err(TransportError::Io("HID report too short".to_string()));
            }
            self.expected = Some(u16::from_be_bytes([packet[5], packet[6]]) as usize);
            self.data.extend_from_slice(&packet[7..]);
        } else {
            self.data.extend_from_slice(&packet[5..]);
        }
        self.sequence += 1;

        match self.expected {
            Some(len) if self.data.len() >= len => {
                let mut data = std::mem::take(&mut self.data);
                data.truncate(len);
                Ok(Some(data))
            }
            _ if self.sequence > MAX_RESPONSE_PACKETS => {
                Err(TransportError::Io("Too many response packets".to_string()))
            }
            _ => Ok(None),
        }
    }
}

/// Ledger HID 传输
pub struct LedgerHidTransport {
    device: Arc<Mutex<HidDevice>>,
    timeout: Duration,
}

impl LedgerHidTransport {
    /// 打开第一个 Ledger 设备
    pub fn open(config: &LedgerConfig) -> Result<Self, TransportError> {
        info!("正在连接 Ledger 设备...");

        let api = HidApi::new().map_err(|e| TransportError::NotSupported(e.to_string()))?;
        let device_info = api
            .device_list()
            .filter(|d| d.vendor_id() == LEDGER_VENDOR_ID)
            .find(|d| d.usage_page() == LEDGER_USAGE_PAGE)
            .ok_or_else(|| TransportError::OpenFailed("No Ledger device found".to_string()))?;

        let device = device_info
            .open_device(&api)
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        info!("✅ 已连接到 Ledger 设备");
        if let Some(product) = device_info.product_string() {
            info!("  产品: {}", product);
        }

        Ok(Self {
            device: Arc::new(Mutex::new(device)),
            timeout: config.timeout(),
        })
    }

    fn exchange_blocking(device: &HidDevice, apdu: &[u8], timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let packets = build_hid_packets(apdu);
        for (i, packet) in packets.iter().enumerate() {
            debug!("发送数据包 {}/{}", i + 1, packets.len());
            device
                .write(packet)
                .map_err(|e| TransportError::Disconnected(e.to_string()))?;
        }

        let mut assembler = ResponseAssembler::default();
        loop {
            let mut packet = [0u8; HID_PACKET_SIZE];
            let read = device
                .read_timeout(&mut packet, timeout.as_millis() as i32)
                .map_err(|e| TransportError::Disconnected(e.to_string()))?;
            if read == 0 {
                return Err(TransportError::Timeout);
            }
            if let Some(response) = assembler.push(&packet[..read])? {
                return Ok(response);
            }
        }
    }
}

#[async_trait]
impl DeviceTransport for LedgerHidTransport {
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
