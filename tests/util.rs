// tests/util.rs
// Shared test helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use eth_wallets::core::address::decompress_public_key;
use eth_wallets::core::hd::ExtendedPrivateKey;
use eth_wallets::hardware::transport::{DeviceTransport, TransportError};
use ethers::signers::LocalWallet;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Signature, TransactionRequest, H256, U256};
use ethers::utils::rlp::Rlp;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const MNEMONIC: &str = "test test test test test test test test test test test ball";

/// Key at `m/44'/60'/0'/0/0` of [`MNEMONIC`].
pub const PRIVATE_KEY: &str = "eaf2c50dfd10524651e7e459c1286f0c2404eb0f34ffd2a1eb14373db49fceb6";

pub const SIGNED_LEGACY: &str = "0xf86b0685012a05f20082520894b2bb2b958afa2e96dab3f3ce7162b87daea39017872386f26fc100008029a075b96c4423ea79037099e0f8a0fa7d8538f00c6aaddea26e151320aac65ae3bda05266d81476adedc28c5e769f8bf016de33bdaa49f341435df429e01fe5f9b16e";

pub const DEFAULT_ETH_ADDRESSES: [&str; 5] = [
    "0xc6D5a3c98EC9073B54FA0969957Bd582e8D874bf",
    "0x59A897A2dbd55D20bCC9B52d5eaA14E2859Dc467",
    "0x7D5e716Bbc8771af9c5ec3b0555B48a4a84d4ba7",
    "0x8137eC5954A8ed45A90F3bd58f717228b5670858",
    "0xc0C386F7f0B02FAC0d63B2de00a01e77992B011B",
];

/// Legacy Ropsten transfer signed by [`PRIVATE_KEY`] into [`SIGNED_LEGACY`].
pub fn legacy_tx() -> TypedTransaction {
    TransactionRequest::new()
        .nonce(6)
        .gas_price(U256::from(0x012a05f200u64))
        .gas(0x5208)
        .to(Address::from_str("0xB2BB2b958aFA2e96dAb3F3Ce7162B87dAea39017").unwrap())
        .value(U256::from(0x2386f26fc10000u64))
        .data(Vec::<u8>::new())
        .chain_id(3)
        .into()
}

/// Chain 1 transfer with `data_len` bytes of calldata. At 191 bytes the
/// unsigned RLP is 237 bytes with the chain id at offset 234, right where a
/// full first command ends behind a 21 byte path header.
pub fn mainnet_tx_with_data(data_len: usize) -> TypedTransaction {
    TransactionRequest::new()
        .nonce(6)
        .gas_price(U256::from(0x012a05f200u64))
        .gas(0x5208)
        .to(Address::from_str("0xB2BB2b958aFA2e96dAb3F3Ce7162B87dAea39017").unwrap())
        .value(U256::from(0x2386f26fc10000u64))
        .data(vec![0x5a; data_len])
        .chain_id(1)
        .into()
}

pub fn root_key() -> ExtendedPrivateKey {
    let seed = bip39::Mnemonic::parse(MNEMONIC).unwrap().to_seed("");
    ExtendedPrivateKey::from_seed(&seed).unwrap()
}

const SW_OK: [u8; 2] = [0x90, 0x00];
const SW_WRONG_APP: [u8; 2] = [0x6D, 0x00];
const SW_DENIED: [u8; 2] = [0x69, 0x85];

struct PendingSignature {
    ins: u8,
    path: Vec<u32>,
    message_len: Option<usize>,
    data: Vec<u8>,
}

/// Ledger Ethereum app answering APDUs from keys derived off [`MNEMONIC`].
pub struct SimulatedLedger {
    root: ExtendedPrivateKey,
    pending: Option<PendingSignature>,
    pub exchanges: Arc<AtomicUsize>,
    pub app_open: Arc<AtomicBool>,
    pub reject_signing: bool,
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self {
            root: root_key(),
            pending: None,
            exchanges: Arc::new(AtomicUsize::new(0)),
            app_open: Arc::new(AtomicBool::new(true)),
            reject_signing: false,
        }
    }

    /// Device whose user declines every signing request.
    pub fn rejecting() -> Self {
        Self {
            reject_signing: true,
            ..Self::new()
        }
    }

    fn get_address(&self, data: &[u8], with_chain_code: bool) -> Vec<u8> {
        let (path, _) = read_path(data);
        let node = self.root.derive_path(&path).unwrap();
        let public_key = decompress_public_key(&node.public_key()).unwrap();
        let address = node.to_extended_public_key().address().unwrap();
        let ascii = address.trim_start_matches("0x");

        let mut response = vec![public_key.len() as u8];
        response.extend_from_slice(&public_key);
        response.push(ascii.len() as u8);
        response.extend_from_slice(ascii.as_bytes());
        if with_chain_code {
            response.extend_from_slice(&node.chain_code());
        }
        response.extend_from_slice(&SW_OK);
        response
    }

    fn sign_chunk(&mut self, ins: u8, p1: u8, data: &[u8]) -> Vec<u8> {
        if p1 == 0x00 {
            let (path, mut rest) = read_path(data);
            let message_len = if ins == 0x08 {
                let len = u32::from_be_bytes(rest[..4].try_into().unwrap()) as usize;
                rest = &rest[4..];
                Some(len)
            } else {
                None
            };
            self.pending = Some(PendingSignature {
                ins,
                path,
                message_len,
                data: rest.to_vec(),
            });
        } else if let Some(pending) = self.pending.as_mut() {
            pending.data.extend_from_slice(data);
        }

        // Like the app, a legacy transaction whose chunk ends right before
        // the chain id is taken as a finished pre-EIP-155 transaction.
        let pre_eip155 = matches!(self.pending.as_ref(), Some(p) if p.message_len.is_none() && ends_at_v_field(&p.data));
        let complete = match self.pending.as_ref() {
            Some(pending) => match pending.message_len {
                Some(len) => pending.data.len() >= len,
                None => pre_eip155 || rlp_complete(&pending.data),
            },
            None => false,
        };
        if !complete {
            return SW_OK.to_vec();
        }
        if self.reject_signing {
            self.pending = None;
            return SW_DENIED.to_vec();
        }

        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return SW_OK.to_vec(),
        };
        let key = self.root.derive_path(&pending.path).unwrap().private_key();
        let wallet = LocalWallet::from_bytes(&key[..]).unwrap();

        let (signature, v) = if pending.ins == 0x08 {
            let signature = wallet.sign_hash(ethers::utils::hash_message(&pending.data)).unwrap();
            let v = signature.v as u8;
            (signature, v)
        } else {
            let signature = wallet
                .sign_hash(H256::from(ethers::utils::keccak256(&pending.data)))
                .unwrap();
            let parity = signature.v - 27;
            let v = if pre_eip155 {
                (27 + parity) as u8
            } else if pending.data[0] >= 0xc0 {
                let chain_id: u64 = Rlp::new(&pending.data).val_at(6).unwrap();
                // The app only has one byte for v.
                (chain_id * 2 + 35 + parity) as u8
            } else {
                parity as u8
            };
            (signature, v)
        };

        let mut response = vec![v];
        response.extend_from_slice(&scalar_bytes(&signature, true));
        response.extend_from_slice(&scalar_bytes(&signature, false));
        response.extend_from_slice(&SW_OK);
        response
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceTransport for SimulatedLedger {
    async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if request.len() < 5 {
            return Err(TransportError::Io("short APDU".to_string()));
        }
        if !self.app_open.load(Ordering::SeqCst) {
            return Ok(SW_WRONG_APP.to_vec());
        }

        let (ins, p1, p2) = (request[1], request[2], request[3]);
        let data = &request[5..5 + request[4] as usize];
        let response = match ins {
            0x02 => self.get_address(data, p2 == 0x01),
            0x04 | 0x08 => self.sign_chunk(ins, p1, data),
            _ => SW_WRONG_APP.to_vec(),
        };
        Ok(response)
    }
}

fn read_path(data: &[u8]) -> (Vec<u32>, &[u8]) {
    let depth = data[0] as usize;
    let path = (0..depth)
        .map(|i| u32::from_be_bytes(data[1 + i * 4..5 + i * 4].try_into().unwrap()))
        .collect();
    (path, &data[1 + depth * 4..])
}

/// Whether `payload` holds a whole (optionally typed) RLP transaction.
fn rlp_complete(payload: &[u8]) -> bool {
    let body = match payload.first() {
        Some(&first) if first < 0xc0 => &payload[1..],
        Some(_) => payload,
        None => return false,
    };
    match Rlp::new(body).payload_info() {
        Ok(info) => body.len() >= info.header_len + info.value_len,
        Err(_) => false,
    }
}

/// Whether `data` is a legacy transaction cut right after its sixth field.
fn ends_at_v_field(data: &[u8]) -> bool {
    if data.first().map_or(true, |&first| first < 0xc0) {
        return false;
    }
    let mut offset = match Rlp::new(data).payload_info() {
        Ok(info) => info.header_len,
        Err(_) => return false,
    };
    for _ in 0..6 {
        match data.get(offset..).map(|rest| Rlp::new(rest).payload_info()) {
            Some(Ok(info)) => offset += info.header_len + info.value_len,
            _ => return false,
        }
    }
    offset == data.len()
}

fn scalar_bytes(signature: &Signature, r: bool) -> [u8; 32] {
    let mut out = [0u8; 32];
    if r {
        signature.r.to_big_endian(&mut out);
    } else {
        signature.s.to_big_endian(&mut out);
    }
    out
}
