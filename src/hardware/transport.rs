//! 设备传输层抽象
//!
//! A transport moves one framed request to the device and returns the
//! reassembled response. Framing (HID packets, channel IDs, magic headers) is
//! the transport's concern; the vendor apps only see whole messages.

use async_trait::async_trait;

/// Lifecycle failures of a physical channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to open device: {0}")]
    OpenFailed(String),
    #[error("Transport not supported: {0}")]
    NotSupported(String),
    #[error("Device disconnected: {0}")]
    Disconnected(String),
    #[error("The request timed out.")]
    Timeout,
    #[error("Transport I/O error: {0}")]
    Io(String),
}

/// Request/response channel to one device.
#[async_trait]
pub trait DeviceTransport: Send {
    async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(request).await
    }
}

/// Split `data` into HID reports. The first report carries `first_header`
/// followed by data; later ones carry `next_header(seq)`.
#[cfg(any(feature = "ledger", feature = "trezor"))]
pub(crate) fn chunk_reports(
    data: &[u8],
    packet_size: usize,
    first_header: &[u8],
    next_header: impl Fn(u16) -> Vec<u8>,
) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut offset = 0;
    let mut sequence = 0u16;

    loop {
        let header = if sequence == 0 {
            first_header.to_vec()
        } else {
            next_header(sequence)
        };
        let mut packet = vec![0u8; packet_size];
        packet[..header.len()].copy_from_slice(&header);
        let room = packet_size - header.len();
        let chunk = room.min(data.len() - offset);
        packet[header.len()..header.len() + chunk].copy_from_slice(&data[offset..offset + chunk]);
        packets.push(packet);
        offset += chunk;
        sequence = sequence.wrapping_add(1);
        if offset >= data.len() {
            break;
        }
    }

    packets
}
