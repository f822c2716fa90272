//! Ledger Ethereum App 集成
//!
//! 实现与 Ledger Ethereum 应用的交互

use super::apdu::{
    chunk_payload, chunk_payload_keeping_tail, response_body, split_status, Apdu, Instruction, LedgerError,
    P1_FIRST_CHUNK, P1_MORE_CHUNKS, SW_OK,
};
use crate::core::address::to_checksum_address;
use crate::core::dpath::{parse_path, path_to_bytes};
use crate::core::errors::Result;
use crate::hardware::errors::normalize;
use crate::hardware::hardware_wallet::DeviceSignature;
use crate::hardware::transport::DeviceTransport;
use ethers::utils::rlp::Rlp;
use tracing::{debug, info, warn};

/// Answer to `GET_ADDRESS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAddress {
    /// Uncompressed, 65 bytes.
    pub public_key: Vec<u8>,
    /// EIP-55 checksummed.
    pub address: String,
    /// Present only when requested.
    pub chain_code: Option<[u8; 32]>,
}

/// Ledger Ethereum App
pub struct LedgerEthereumApp<T> {
    transport: T,
}

impl<T: DeviceTransport> LedgerEthereumApp<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn exchange(&mut self, command: &Apdu) -> Result<Vec<u8>> {
        let raw = self
            .transport
            .exchange(&command.encode()?)
            .await
            .map_err(normalize)?;
        let (_, status) = split_status(&raw).map_err(normalize)?;
        if status != SW_OK {
            warn!("⚠️ APDU 命令failed: {:04X}", status);
        }
        response_body(&raw).map_err(normalize)
    }

    /// fetch以太坊address
    pub async fn get_address(&mut self, path: &str, display: bool, chain_code: bool) -> Result<LedgerAddress> {
        debug!("fetch Ethereum address，路径: {}", path);

        let command = Apdu::new(Instruction::GetAddress, path_to_bytes(&parse_path(path)?)?)
            .params(u8::from(display), u8::from(chain_code));
        let data = self.exchange(&command).await?;
        parse_address(&data, chain_code).map_err(normalize)
    }

    /// sign以太坊transaction; `payload` is the unsigned RLP.
    pub async fn sign_transaction(&mut self, path: &str, payload: &[u8]) -> Result<DeviceSignature> {
        info!("Ledger sign Ethereum transaction，路径: {}", path);

        let header = path_to_bytes(&parse_path(path)?)?;
        let data = self
            .send_chunks(Instruction::SignTransaction, transaction_chunks(&header, payload))
            .await?;
        let signature = parse_signature(&data).map_err(normalize)?;

        info!("✅ signsuccess");
        Ok(signature)
    }

    /// sign个人消息（EIP-191）
    pub async fn sign_personal_message(&mut self, path: &str, message: &[u8]) -> Result<DeviceSignature> {
        info!("Ledger sign个人消息，长度: {}", message.len());

        let mut header = path_to_bytes(&parse_path(path)?)?;
        header.extend_from_slice(&(message.len() as u32).to_be_bytes());
        let data = self
            .send_chunks(Instruction::SignPersonalMessage, chunk_payload(&header, message))
            .await?;
        let signature = parse_signature(&data).map_err(normalize)?;

        info!("✅ 消息signsuccess");
        Ok(signature)
    }

    /// Only the last chunk's answer carries the signature.
    async fn send_chunks(&mut self, ins: Instruction, chunks: Vec<Vec<u8>>) -> Result<Vec<u8>> {
        let mut response = Vec::new();
        for (i, chunk) in chunks.into_iter().enumerate() {
            let p1 = if i == 0 { P1_FIRST_CHUNK } else { P1_MORE_CHUNKS };
            let command = Apdu::new(ins, chunk).params(p1, 0x00);
            response = self.exchange(&command).await?;
        }
        Ok(response)
    }
}

/// Command data fields for an unsigned transaction.
pub(crate) fn transaction_chunks(header: &[u8], payload: &[u8]) -> Vec<Vec<u8>> {
    match eip155_tail_start(payload) {
        Some(tail_start) => chunk_payload_keeping_tail(header, payload, tail_start),
        None => chunk_payload(header, payload),
    }
}

/// Offset of `chainId, 0, 0` in an EIP-155 legacy payload. Typed payloads
/// start with their type byte and have no such tail.
fn eip155_tail_start(payload: &[u8]) -> Option<usize> {
    if payload.first().map_or(true, |&first| first < 0xc0) {
        return None;
    }
    let rlp = Rlp::new(payload);
    let count = rlp.item_count().ok()?;
    let mut tail = 0;
    for i in 6..count {
        tail += rlp.at(i).ok()?.as_raw().len();
    }
    (tail > 0).then(|| payload.len() - tail)
}

/// `v || r || s`
fn parse_signature(data: &[u8]) -> std::result::Result<DeviceSignature, LedgerError> {
    if data.len() < 65 {
        return Err(LedgerError::MalformedResponse(format!(
            "signature is {} bytes",
            data.len()
        )));
    }
    Ok(DeviceSignature {
        v: data[0] as u64,
        r: data[1..33].to_vec(),
        s: data[33..65].to_vec(),
    })
}

fn parse_address(data: &[u8], with_chain_code: bool) -> std::result::Result<LedgerAddress, LedgerError> {
    let malformed = |what: &str| LedgerError::MalformedResponse(what.to_string());

    let key_len = *data.first().ok_or_else(|| malformed("empty address response"))? as usize;
    let public_key = data
        .get(1..1 + key_len)
        .ok_or_else(|| malformed("public key truncated"))?
        .to_vec();

    let mut offset = 1 + key_len;
    let address_len = *data.get(offset).ok_or_else(|| malformed("address length missing"))? as usize;
    offset += 1;
    let ascii = data
        .get(offset..offset + address_len)
        .ok_or_else(|| malformed("address truncated"))?;
    offset += address_len;

    let ascii = std::str::from_utf8(ascii).map_err(|_| malformed("address is not ASCII"))?;
    let address = to_checksum_address(ascii).map_err(|e| malformed(e.message()))?;

    let chain_code = if with_chain_code {
        let bytes = data
            .get(offset..offset + 32)
            .ok_or_else(|| malformed("chain code truncated"))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(bytes);
        Some(chain_code)
    } else {
        None
    };

    Ok(LedgerAddress {
        public_key,
        address,
        chain_code,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::errors::WalletsErrorKind;
    use crate::hardware::ledger::apdu::MAX_APDU_DATA;
    use crate::hardware::transport::TransportError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub(crate) const GET_ADDRESS_0: &str = "e002000015058000002c8000003c800000000000000000000000";
    pub(crate) const ADDRESS_0: &str = "4104b884d0c53b60fb8aafba20ca84870f20428082863f1d39a402c36c2de356cb0c6c0a582f54ee29911ca6f1823d34405623f4a7418db8ebb0203bc3acba08ba6428633644356133633938454339303733423534464130393639393537426435383265384438373462669000";
    pub(crate) const GET_ADDRESS_1: &str = "e002000015058000002c8000003c800000000000000000000001";
    pub(crate) const ADDRESS_1: &str = "4104b21938e18aec1e2e7478988ccae5b556597d771c8e46ac2c8ea2a4a1a80619679230a109cd30e8af15856b15799e38991e45e55f406a8a24d5605ba0757da53c28353941383937413264626435354432306243433942353264356561413134453238353944633436379000";
    pub(crate) const GET_KEY_0: &str = "e002000115058000002c8000003c800000000000000000000000";
    pub(crate) const KEY_0: &str = "4104b884d0c53b60fb8aafba20ca84870f20428082863f1d39a402c36c2de356cb0c6c0a582f54ee29911ca6f1823d34405623f4a7418db8ebb0203bc3acba08ba642863364435613363393845433930373342353446413039363939353742643538326538443837346266968a2e8e9aa80d3c3416b33e3d912b6a919af9909f42d29d2eb0b8f28ea4dcfd9000";

    /// Replays recorded exchanges in order and counts them.
    pub(crate) struct ReplayTransport {
        exchanges: VecDeque<(Vec<u8>, Vec<u8>)>,
        pub(crate) calls: Arc<AtomicUsize>,
    }

    impl ReplayTransport {
        pub(crate) fn new(exchanges: &[(&str, &str)]) -> Self {
            Self {
                exchanges: exchanges
                    .iter()
                    .map(|(req, res)| (hex::decode(req).unwrap(), hex::decode(res).unwrap()))
                    .collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl DeviceTransport for ReplayTransport {
        async fn exchange(&mut self, request: &[u8]) -> std::result::Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (expected, response) = self
                .exchanges
                .pop_front()
                .ok_or_else(|| TransportError::Disconnected("no more recorded exchanges".into()))?;
            assert_eq!(hex::encode(request), hex::encode(&expected));
            Ok(response)
        }
    }

    #[tokio::test]
    async fn test_get_address_replay() {
        let mut app = LedgerEthereumApp::new(ReplayTransport::new(&[
            (GET_ADDRESS_0, ADDRESS_0),
            (GET_ADDRESS_1, ADDRESS_1),
        ]));

        let first = app.get_address("m/44'/60'/0'/0/0", false, false).await.unwrap();
        assert_eq!(first.address, "0xc6D5a3c98EC9073B54FA0969957Bd582e8D874bf");
        assert_eq!(first.public_key.len(), 65);
        assert_eq!(first.chain_code, None);

        let second = app.get_address("m/44'/60'/0'/0/1", false, false).await.unwrap();
        assert_eq!(second.address, "0x59A897A2dbd55D20bCC9B52d5eaA14E2859Dc467");
    }

    #[tokio::test]
    async fn test_get_address_with_chain_code() {
        let mut app = LedgerEthereumApp::new(ReplayTransport::new(&[(GET_KEY_0, KEY_0)]));
        let key = app.get_address("m/44'/60'/0'/0/0", false, true).await.unwrap();
        assert_eq!(
            hex::encode(key.chain_code.unwrap()),
            "968a2e8e9aa80d3c3416b33e3d912b6a919af9909f42d29d2eb0b8f28ea4dcfd"
        );
    }

    #[tokio::test]
    async fn test_wrong_app_is_normalized() {
        let mut app = LedgerEthereumApp::new(ReplayTransport::new(&[(GET_ADDRESS_0, "6d00")]));
        let err = app.get_address("m/44'/60'/0'/0/0", false, false).await.unwrap_err();
        assert_eq!(err.kind(), WalletsErrorKind::WrongApplicationSelected);
    }

    #[tokio::test]
    async fn test_rejected_on_device() {
        let request = "e00800001b058000002c8000003c800000000000000000000000000000026869";
        let mut app = LedgerEthereumApp::new(ReplayTransport::new(&[(request, "6985")]));
        let err = app
            .sign_personal_message("m/44'/60'/0'/0/0", b"hi")
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_truncated_response() {
        let mut app = LedgerEthereumApp::new(ReplayTransport::new(&[(GET_ADDRESS_0, "41049000")]));
        let err = app.get_address("m/44'/60'/0'/0/0", false, false).await.unwrap_err();
        assert_eq!(err.kind(), WalletsErrorKind::Unknown);
    }

    fn eip155_payload(data_len: usize) -> Vec<u8> {
        let tx: ethers::types::transaction::eip2718::TypedTransaction = ethers::types::TransactionRequest::new()
            .nonce(6)
            .gas_price(0x012a05f200u64)
            .gas(0x5208)
            .to("0xb2bb2b958afa2e96dab3f3ce7162b87daea39017"
                .parse::<ethers::types::Address>()
                .unwrap())
            .value(0x2386f26fc10000u64)
            .data(vec![0x5a; data_len])
            .chain_id(1)
            .into();
        crate::core::signing::unsigned_payload(&tx)
    }

    #[test]
    fn test_eip155_tail_offset() {
        let payload = eip155_payload(191);
        assert_eq!(payload.len(), 237);
        assert_eq!(eip155_tail_start(&payload), Some(234));
        assert_eq!(payload[234..], [0x01, 0x80, 0x80]);
        assert_eq!(eip155_tail_start(&[0x02, 0xc0]), None);
    }

    #[test]
    fn test_chain_id_never_sent_alone() {
        let header = path_to_bytes(&parse_path("m/44'/60'/0'/0/0").unwrap()).unwrap();
        for data_len in 150..=260 {
            let payload = eip155_payload(data_len);
            let tail_start = eip155_tail_start(&payload).unwrap();
            let chunks = transaction_chunks(&header, &payload);

            assert_eq!(chunks.concat()[header.len()..].to_vec(), payload, "data_len {}", data_len);
            let mut sent = 0;
            for chunk in &chunks[..chunks.len() - 1] {
                sent += chunk.len();
                assert_ne!(sent - header.len(), tail_start, "data_len {}", data_len);
            }
            assert!(chunks.iter().all(|chunk| chunk.len() <= MAX_APDU_DATA));
        }
    }

    #[tokio::test]
    async fn test_sign_transaction_chunks() {
        let payload = vec![0xAB; 300];
        let first_room = 255 - 21;
        let first = format!(
            "e0040000ff058000002c8000003c800000000000000000000000{}",
            hex::encode(&payload[..first_room])
        );
        let second = format!("e0048000{:02x}{}", 300 - first_room, hex::encode(&payload[first_room..]));
        let signature = format!("26{}{}9000", "11".repeat(32), "22".repeat(32));

        let mut app = LedgerEthereumApp::new(ReplayTransport::new(&[
            (first.as_str(), "9000"),
            (second.as_str(), signature.as_str()),
        ]));
        let sig = app.sign_transaction("m/44'/60'/0'/0/0", &payload).await.unwrap();
        assert_eq!(sig.v, 0x26);
        assert_eq!(sig.r, vec![0x11; 32]);
        assert_eq!(sig.s, vec![0x22; 32]);
    }
}
