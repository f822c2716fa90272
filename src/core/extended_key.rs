//! BIP32 extended public key reconstruction
//!
//! Devices only hand out raw key material (public key + chain code), so the
//! serialized `xpub` is rebuilt from the node and its parent.

use crate::core::address::compress_public_key;
use crate::core::dpath::parse_segment;
use crate::core::errors::{Result, WalletsError};
use ripemd::Ripemd160;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Mainnet public version bytes (`xpub`).
pub const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];

/// Raw key material at one resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtendedKeyPair {
    /// 33-byte compressed or 65-byte uncompressed SEC1 key.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub chain_code: [u8; 32],
}

impl ExtendedKeyPair {
    pub fn new(public_key: Vec<u8>, chain_code: [u8; 32]) -> Self {
        Self {
            public_key,
            chain_code,
        }
    }

    /// Build from hex strings, with or without `0x`.
    pub fn from_hex(public_key: &str, chain_code: &str) -> Result<Self> {
        let public_key = hex::decode(public_key.trim_start_matches("0x"))?;
        let chain_code_bytes = hex::decode(chain_code.trim_start_matches("0x"))?;
        let chain_code: [u8; 32] = chain_code_bytes.as_slice().try_into().map_err(|_| {
            WalletsError::invalid_argument(format!(
                "Chain code must be 32 bytes, got {}",
                chain_code_bytes.len()
            ))
        })?;
        Ok(Self::new(public_key, chain_code))
    }
}

mod hex_bytes {
    use serde::Serializer;

    pub fn serialize<S: Serializer, T: AsRef<[u8]>>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes.as_ref())))
    }
}

/// First four bytes of `RIPEMD160(SHA256(public_key))`.
pub fn fingerprint(public_key: &[u8]) -> [u8; 4] {
    let sha = Sha256::digest(public_key);
    let hash = Ripemd160::digest(sha);
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Base58 with a 4-byte double SHA-256 checksum.
pub fn base58check(data: &[u8]) -> String {
    let checksum = Sha256::digest(Sha256::digest(data));
    let mut payload = Vec::with_capacity(data.len() + 4);
    payload.extend_from_slice(data);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

/// Serialize the key at `child_path` as a BIP32 `xpub`.
///
/// `parent` must be the node at the parent prefix of `child_path`; only its
/// public key is used (for the fingerprint).
pub fn build_extended_public_key(
    child_path: &str,
    parent: &ExtendedKeyPair,
    child: &ExtendedKeyPair,
) -> Result<String> {
    let segments: Vec<&str> = child_path
        .strip_prefix("m/")
        .ok_or_else(|| WalletsError::invalid_argument(format!("Invalid derivation path: {}", child_path)))?
        .split('/')
        .collect();

    let depth = u8::try_from(segments.len())
        .map_err(|_| WalletsError::invalid_argument("Derivation path is too deep"))?;
    let last = segments.last().copied().unwrap_or_default();
    let index = parse_segment(last)?;

    let parent_fingerprint = fingerprint(&compress_public_key(&parent.public_key)?);
    let child_key = compress_public_key(&child.public_key)?;

    let mut data = Vec::with_capacity(78);
    data.extend_from_slice(&XPUB_VERSION);
    data.push(depth);
    data.extend_from_slice(&parent_fingerprint);
    data.extend_from_slice(&index.to_be_bytes());
    data.extend_from_slice(&child.chain_code);
    data.extend_from_slice(&child_key);

    Ok(base58check(&data))
}
