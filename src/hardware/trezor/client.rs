//! Trezor client
//!
//! `TrezorClient` is the narrow request surface the backend needs. The
//! device-backed implementation speaks the wire protocol over any
//! [`DeviceTransport`], acknowledging button requests and turning `Failure`
//! messages into [`TrezorFailure`].

use super::messages::{parse_failure, FieldWriter, Fields, MessageType, TrezorMessage};
use crate::core::address::to_checksum_address;
use crate::core::dpath::parse_path;
use crate::core::errors::{Result, WalletsError};
use crate::core::extended_key::ExtendedKeyPair;
use crate::core::signing::validate_transaction;
use crate::hardware::errors::NativeError;
use crate::hardware::hardware_wallet::DeviceSignature;
use crate::hardware::transport::DeviceTransport;
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{NameOrAddress, U256};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Largest data chunk sent with `EthereumSignTx`.
const DATA_INITIAL_CHUNK: usize = 1024;

/// Native Trezor failure: the error text plus an optional failure code such
/// as `Failure_ActionCancelled`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{error}")]
pub struct TrezorFailure {
    pub error: String,
    pub code: Option<String>,
}

impl TrezorFailure {
    pub fn new(error: &str, code: Option<&str>) -> Self {
        Self {
            error: error.to_string(),
            code: code.map(str::to_string),
        }
    }
}

/// Client answers carry either a Trezor failure or a transport error.
pub type ClientResult<T> = std::result::Result<T, NativeError>;

/// Public key and chain code returned for one path of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdNodeResponse {
    pub serialized_path: String,
    pub key: ExtendedKeyPair,
}

/// Fee fields of a transaction to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxFees {
    Legacy { gas_price: U256 },
    Eip1559 { max_fee_per_gas: U256, max_priority_fee_per_gas: U256 },
}

/// Transaction fields in the shape the device expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthereumTransaction {
    pub nonce: U256,
    pub gas_limit: U256,
    pub to: Option<String>,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
    pub fees: TxFees,
}

impl EthereumTransaction {
    /// Requires `chainId` and `nonce`; access lists are not forwarded.
    pub fn from_transaction(tx: &TypedTransaction) -> Result<Self> {
        let requirements = validate_transaction(tx, true)?;
        let nonce = requirements
            .nonce
            .ok_or_else(|| WalletsError::missing_arguments("Missing nonce on transaction"))?;

        let fees = match tx {
            TypedTransaction::Eip1559(inner) => TxFees::Eip1559 {
                max_fee_per_gas: inner.max_fee_per_gas.unwrap_or_default(),
                max_priority_fee_per_gas: inner.max_priority_fee_per_gas.unwrap_or_default(),
            },
            TypedTransaction::Eip2930(_) => {
                return Err(WalletsError::invalid_argument(
                    "EIP-2930 transactions cannot be signed on Trezor",
                ))
            }
            TypedTransaction::Legacy(_) => TxFees::Legacy {
                gas_price: tx.gas_price().unwrap_or_default(),
            },
        };

        let to = match tx.to() {
            Some(NameOrAddress::Address(address)) => Some(ethers::utils::to_checksum(address, None)),
            Some(NameOrAddress::Name(name)) => {
                return Err(WalletsError::invalid_argument(format!(
                    "Recipient must be an address, got {}",
                    name
                )))
            }
            None => None,
        };

        Ok(Self {
            nonce,
            gas_limit: tx.gas().copied().unwrap_or_default(),
            to,
            value: tx.value().copied().unwrap_or_default(),
            data: tx.data().map(|d| d.to_vec()).unwrap_or_default(),
            chain_id: requirements.chain_id,
            fees,
        })
    }

    fn encode(&self, address_n: &[u32]) -> (MessageType, Vec<u8>, usize) {
        let split = self.data.len().min(DATA_INITIAL_CHUNK);
        let first_chunk = &self.data[..split];
        let body = FieldWriter::new().path(address_n).bytes(2, &be_bytes(self.nonce));

        let (msg_type, body) = match &self.fees {
            TxFees::Legacy { gas_price } => {
                let mut body = body
                    .bytes(3, &be_bytes(*gas_price))
                    .bytes(4, &be_bytes(self.gas_limit));
                if let Some(to) = &self.to {
                    body = body.string(11, to);
                }
                body = body.bytes(6, &be_bytes(self.value));
                if !first_chunk.is_empty() {
                    body = body.bytes(7, first_chunk);
                }
                let body = body
                    .varint(8, self.data.len() as u64)
                    .varint(9, self.chain_id);
                (MessageType::EthereumSignTx, body)
            }
            TxFees::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let body = body
                    .bytes(3, &be_bytes(*max_fee_per_gas))
                    .bytes(4, &be_bytes(*max_priority_fee_per_gas))
                    .bytes(5, &be_bytes(self.gas_limit))
                    .string(6, self.to.as_deref().unwrap_or(""))
                    .bytes(7, &be_bytes(self.value))
                    .bytes(8, first_chunk)
                    .varint(9, self.data.len() as u64)
                    .varint(10, self.chain_id);
                (MessageType::EthereumSignTxEip1559, body)
            }
        };

        let payload = body.finish();
        (msg_type, payload, split)
    }
}

/// Big-endian without leading zeros, as protobuf `bytes`.
fn be_bytes(value: U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let start = buf.iter().position(|&b| b != 0).unwrap_or(32);
    buf[start..].to_vec()
}

/// Requests the Trezor backend makes.
#[async_trait]
pub trait TrezorClient: Send + Sync {
    /// Public keys for every path, in one device session.
    async fn get_public_keys(&self, paths: &[String]) -> ClientResult<Vec<HdNodeResponse>>;

    /// Ethereum address at a resolved path.
    async fn ethereum_get_address(&self, path: &str, show_on_device: bool) -> ClientResult<String>;

    async fn ethereum_sign_transaction(
        &self,
        path: &str,
        tx: &EthereumTransaction,
    ) -> ClientResult<DeviceSignature>;

    /// 65-byte `r || s || v` signature.
    async fn ethereum_sign_message(&self, path: &str, message: &[u8]) -> ClientResult<Vec<u8>>;
}

/// Client speaking the wire protocol over a transport.
pub struct TrezorDeviceClient<T> {
    transport: Mutex<T>,
}

impl<T: DeviceTransport> TrezorDeviceClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
        }
    }

    /// One request plus however many `ButtonAck` round trips the device asks for.
    async fn call(transport: &mut T, message: TrezorMessage) -> ClientResult<TrezorMessage> {
        debug!("发送 Trezor 消息: {:?}", message.msg_type);
        let mut response = TrezorMessage::deserialize(&transport.exchange(&message.serialize()).await?)?;

        loop {
            debug!("接收 Trezor 消息: {:?}", response.msg_type);
            match response.msg_type {
                MessageType::ButtonRequest => {
                    debug!("处理按钮请求...");
                    let ack = TrezorMessage::new(MessageType::ButtonAck, vec![]);
                    response = TrezorMessage::deserialize(&transport.exchange(&ack.serialize()).await?)?;
                }
                MessageType::Failure => return Err(parse_failure(&response.payload).into()),
                MessageType::PinMatrixRequest | MessageType::PassphraseRequest => {
                    return Err(TrezorFailure::new(
                        "Unlock the device and enter the passphrase on the Trezor",
                        Some("Failure_PinExpected"),
                    )
                    .into())
                }
                _ => return Ok(response),
            }
        }
    }

    fn expect(message: &TrezorMessage, expected: MessageType) -> std::result::Result<Fields, TrezorFailure> {
        if message.msg_type != expected {
            return Err(TrezorFailure::new(
                &format!("Expected {:?}, got {:?}", expected, message.msg_type),
                None,
            ));
        }
        Fields::decode(&message.payload)
    }
}

#[async_trait]
impl<T: DeviceTransport> TrezorClient for TrezorDeviceClient<T> {
    async fn get_public_keys(&self, paths: &[String]) -> ClientResult<Vec<HdNodeResponse>> {
        let mut transport = self.transport.lock().await;
        let mut nodes = Vec::with_capacity(paths.len());

        for path in paths {
            let body = FieldWriter::new().path(&parse_path(path)?).finish();
            let request = TrezorMessage::new(MessageType::GetPublicKey, body);
            let response = Self::call(&mut transport, request).await?;
            let fields = Self::expect(&response, MessageType::PublicKey)?;

            let node = Fields::decode(fields.require_bytes(1, "node")?)?;
            let chain_code: [u8; 32] = node
                .require_bytes(4, "chain_code")?
                .try_into()
                .map_err(|_| TrezorFailure::new("Chain code must be 32 bytes", None))?;
            let public_key = node.require_bytes(6, "public_key")?.to_vec();

            nodes.push(HdNodeResponse {
                serialized_path: path.clone(),
                key: ExtendedKeyPair::new(public_key, chain_code),
            });
        }

        Ok(nodes)
    }

    async fn ethereum_get_address(&self, path: &str, show_on_device: bool) -> ClientResult<String> {
        let mut body = FieldWriter::new().path(&parse_path(path)?);
        if show_on_device {
            body = body.flag(2, true);
        }
        let payload = body.finish();

        let mut transport = self.transport.lock().await;
        let response = Self::call(&mut transport, TrezorMessage::new(MessageType::EthereumGetAddress, payload)).await?;
        let fields = Self::expect(&response, MessageType::EthereumAddress)?;

        // older firmware answers with the raw 20 bytes in field 1
        let raw = match fields.string(2) {
            Some(address) => address,
            None => hex::encode(fields.require_bytes(1, "address")?),
        };
        Ok(to_checksum_address(&raw)?)
    }

    async fn ethereum_sign_transaction(
        &self,
        path: &str,
        tx: &EthereumTransaction,
    ) -> ClientResult<DeviceSignature> {
        info!("Trezor sign Ethereum transaction，路径: {}", path);
        let (msg_type, payload, mut sent) = tx.encode(&parse_path(path)?);

        let mut transport = self.transport.lock().await;
        let mut response = Self::call(&mut transport, TrezorMessage::new(msg_type, payload)).await?;

        loop {
            let fields = Self::expect(&response, MessageType::EthereumTxRequest)?;
            match fields.varint(1) {
                Some(requested) if requested > 0 => {
                    let end = usize::try_from(requested)
                        .ok()
                        .and_then(|requested| sent.checked_add(requested))
                        .ok_or_else(|| TrezorFailure::new("Requested data length out of range", None))?
                        .min(tx.data.len());
                    let chunk = FieldWriter::new().bytes(1, &tx.data[sent..end]).finish();
                    sent = end;
                    response = Self::call(&mut transport, TrezorMessage::new(MessageType::EthereumTxAck, chunk)).await?;
                }
                _ => {
                    let v = fields
                        .varint(2)
                        .ok_or_else(|| TrezorFailure::new("Missing signature_v", None))?;
                    return Ok(DeviceSignature {
                        v,
                        r: fields.require_bytes(3, "signature_r")?.to_vec(),
                        s: fields.require_bytes(4, "signature_s")?.to_vec(),
                    });
                }
            }
        }
    }

    async fn ethereum_sign_message(&self, path: &str, message: &[u8]) -> ClientResult<Vec<u8>> {
        let payload = FieldWriter::new()
            .path(&parse_path(path)?)
            .bytes(2, message)
            .finish();

        let mut transport = self.transport.lock().await;
        let response = Self::call(&mut transport, TrezorMessage::new(MessageType::EthereumSignMessage, payload)).await?;
        let fields = Self::expect(&response, MessageType::EthereumMessageSignature)?;
        Ok(fields.require_bytes(2, "signature")?.to_vec())
    }
}
