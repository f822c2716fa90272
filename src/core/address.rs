//! Public key → EIP-55 address helpers

use crate::core::errors::{Result, WalletsError};
use ethers::types::Address;
use ethers::utils::to_checksum;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use sha3::{Digest, Keccak256};

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    PublicKey::from_sec1_bytes(bytes).map_err(|e| {
        WalletsError::invalid_argument(format!("Invalid secp256k1 public key: {}", e))
    })
}

/// 33-byte SEC1 compressed form of a 33 or 65 byte public key.
pub fn compress_public_key(bytes: &[u8]) -> Result<[u8; 33]> {
    let point = parse_public_key(bytes)?.to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(point.as_bytes());
    Ok(out)
}

/// 65-byte SEC1 uncompressed form of a 33 or 65 byte public key.
pub fn decompress_public_key(bytes: &[u8]) -> Result<[u8; 65]> {
    let point = parse_public_key(bytes)?.to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(point.as_bytes());
    Ok(out)
}

/// Keccak-256 of the uncompressed point (without the `0x04` tag), last 20 bytes.
pub fn public_key_to_address(public_key: &[u8]) -> Result<Address> {
    let uncompressed = decompress_public_key(public_key)?;
    let hash = Keccak256::digest(&uncompressed[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Checksummed (EIP-55) address string for a public key.
pub fn public_key_to_checksum_address(public_key: &[u8]) -> Result<String> {
    Ok(to_checksum(&public_key_to_address(public_key)?, None))
}

/// Normalize an address string from a device or caller to EIP-55.
///
/// Accepts the value with or without `0x` and in any letter case.
pub fn to_checksum_address(raw: &str) -> Result<String> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    if stripped.len() != 40 {
        return Err(WalletsError::invalid_argument(format!("Invalid address: {}", raw)));
    }
    let bytes = hex::decode(stripped)?;
    Ok(to_checksum(&Address::from_slice(&bytes), None))
}
