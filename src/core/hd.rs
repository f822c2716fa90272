//! BIP32 hierarchical deterministic key derivation
//!
//! Private derivation from a BIP39 seed and public (non-hardened) derivation
//! from an extended public key. Path format: `m/44'/60'/0'/0/<index>`.

use crate::core::address::{compress_public_key, public_key_to_checksum_address};
use crate::core::dpaths::HARDENED_OFFSET;
use crate::core::errors::{Result, WalletsError};
use crate::core::extended_key::{base58check, fingerprint, ExtendedKeyPair, XPUB_VERSION};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{FieldBytes, NonZeroScalar, ProjectivePoint, PublicKey, Scalar, SecretKey};
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| WalletsError::unknown(format!("HMAC initialization failed: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

fn split_chain_code(i: &[u8; 64]) -> [u8; 32] {
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&i[32..]);
    chain_code
}

/// `IL` interpreted as a scalar; values `>= n` make the index invalid.
fn tweak_scalar(il: &[u8]) -> Result<Scalar> {
    let scalar = NonZeroScalar::try_from(il)
        .map_err(|_| WalletsError::invalid_argument("Derived key is invalid for this index"))?;
    Ok(*scalar)
}

/// Extended private key node.
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    secret: SecretKey,
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
}

impl std::fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .finish_non_exhaustive()
    }
}

impl ExtendedPrivateKey {
    /// Master node from a BIP39 seed: `HMAC-SHA512("Bitcoin seed", seed)`.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if seed.len() < 16 || seed.len() > 64 {
            return Err(WalletsError::invalid_argument(
                "Seed length must be between 16 and 64 bytes",
            ));
        }
        let i = hmac_sha512(b"Bitcoin seed", &[seed])?;
        let secret = SecretKey::from_slice(&i[..32])
            .map_err(|_| WalletsError::invalid_argument("Seed produces an invalid master key"))?;
        Ok(Self {
            secret,
            chain_code: split_chain_code(&i),
            depth: 0,
            parent_fingerprint: [0; 4],
            child_number: 0,
        })
    }

    /// CKDpriv
    pub fn derive_child(&self, index: u32) -> Result<Self> {
        let secret_bytes = self.private_key();
        let public_key = self.public_key();
        let index_bytes = index.to_be_bytes();

        let i = if index >= HARDENED_OFFSET {
            hmac_sha512(&self.chain_code, &[&[0u8][..], &secret_bytes[..], &index_bytes[..]])?
        } else {
            hmac_sha512(&self.chain_code, &[&public_key[..], &index_bytes[..]])?
        };

        let tweak = tweak_scalar(&i[..32])?;
        let child = tweak + *self.secret.to_nonzero_scalar();
        let child_bytes: FieldBytes = child.to_bytes();
        let secret = SecretKey::from_bytes(&child_bytes)
            .map_err(|_| WalletsError::invalid_argument("Derived key is invalid for this index"))?;

        Ok(Self {
            secret,
            chain_code: split_chain_code(&i),
            depth: self.depth.saturating_add(1),
            parent_fingerprint: fingerprint(&public_key),
            child_number: index,
        })
    }

    pub fn derive_path(&self, indices: &[u32]) -> Result<Self> {
        indices
            .iter()
            .try_fold(self.clone(), |node, &index| node.derive_child(index))
    }

    /// 33-byte compressed public key.
    pub fn public_key(&self) -> [u8; 33] {
        let point = self.secret.public_key().to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }

    pub fn private_key(&self) -> Zeroizing<[u8; 32]> {
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&self.secret.to_bytes());
        out
    }

    pub fn chain_code(&self) -> [u8; 32] {
        self.chain_code
    }

    pub fn to_extended_public_key(&self) -> ExtendedPublicKey {
        ExtendedPublicKey {
            public_key: self.public_key(),
            chain_code: self.chain_code,
            depth: self.depth,
            parent_fingerprint: self.parent_fingerprint,
            child_number: self.child_number,
        }
    }

    pub fn to_key_pair(&self) -> ExtendedKeyPair {
        ExtendedKeyPair::new(self.public_key().to_vec(), self.chain_code)
    }
}

/// Extended public key node; only non-hardened children are reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    public_key: [u8; 33],
    chain_code: [u8; 32],
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
}

impl ExtendedPublicKey {
    /// Node built from raw key material returned by a device.
    ///
    /// Depth and parent fingerprint are unknown at this point and left zeroed;
    /// they do not influence child derivation.
    pub fn from_key_pair(pair: &ExtendedKeyPair) -> Result<Self> {
        Ok(Self {
            public_key: compress_public_key(&pair.public_key)?,
            chain_code: pair.chain_code,
            depth: 0,
            parent_fingerprint: [0; 4],
            child_number: 0,
        })
    }

    /// Parse a base58check serialized `xpub`.
    pub fn parse(xpub: &str) -> Result<Self> {
        let data = bs58::decode(xpub)
            .into_vec()
            .map_err(|e| WalletsError::invalid_argument(format!("Invalid extended key: {}", e)))?;
        if data.len() != 82 {
            return Err(WalletsError::invalid_argument("Invalid extended key length"));
        }

        let (payload, checksum) = data.split_at(78);
        let expected = Sha256::digest(Sha256::digest(payload));
        if checksum != &expected[..4] {
            return Err(WalletsError::invalid_argument("Invalid extended key checksum"));
        }
        if payload[..4] != XPUB_VERSION {
            return Err(WalletsError::invalid_argument("Extended key is not an xpub"));
        }

        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&payload[5..9]);
        let mut child_number = [0u8; 4];
        child_number.copy_from_slice(&payload[9..13]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&payload[13..45]);

        Ok(Self {
            public_key: compress_public_key(&payload[45..78])?,
            chain_code,
            depth: payload[4],
            parent_fingerprint,
            child_number: u32::from_be_bytes(child_number),
        })
    }

    /// CKDpub
    pub fn derive_child(&self, index: u32) -> Result<Self> {
        if index >= HARDENED_OFFSET {
            return Err(WalletsError::invalid_argument(
                "Cannot derive a hardened child from a public key",
            ));
        }

        let index_bytes = index.to_be_bytes();
        let i = hmac_sha512(&self.chain_code, &[&self.public_key[..], &index_bytes[..]])?;
        let tweak = tweak_scalar(&i[..32])?;
        let parent = PublicKey::from_sec1_bytes(&self.public_key)
            .map_err(|_| WalletsError::invalid_argument("Invalid parent public key"))?;
        let point = ProjectivePoint::GENERATOR * tweak + parent.to_projective();
        let child = PublicKey::from_affine(point.to_affine())
            .map_err(|_| WalletsError::invalid_argument("Derived key is invalid for this index"))?;

        let mut public_key = [0u8; 33];
        public_key.copy_from_slice(child.to_encoded_point(true).as_bytes());

        Ok(Self {
            public_key,
            chain_code: split_chain_code(&i),
            depth: self.depth.saturating_add(1),
            parent_fingerprint: fingerprint(&self.public_key),
            child_number: index,
        })
    }

    pub fn derive_path(&self, indices: &[u32]) -> Result<Self> {
        indices
            .iter()
            .try_fold(self.clone(), |node, &index| node.derive_child(index))
    }

    pub fn public_key(&self) -> &[u8; 33] {
        &self.public_key
    }

    pub fn chain_code(&self) -> [u8; 32] {
        self.chain_code
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn child_number(&self) -> u32 {
        self.child_number
    }

    pub fn address(&self) -> Result<String> {
        public_key_to_checksum_address(&self.public_key)
    }

    pub fn to_key_pair(&self) -> ExtendedKeyPair {
        ExtendedKeyPair::new(self.public_key.to_vec(), self.chain_code)
    }

    /// BIP32 `xpub` serialization.
    pub fn to_xpub(&self) -> String {
        let mut data = Vec::with_capacity(78);
        data.extend_from_slice(&XPUB_VERSION);
        data.push(self.depth);
        data.extend_from_slice(&self.parent_fingerprint);
        data.extend_from_slice(&self.child_number.to_be_bytes());
        data.extend_from_slice(&self.chain_code);
        data.extend_from_slice(&self.public_key);
        base58check(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dpath::parse_path;

    const MNEMONIC: &str = "test test test test test test test test test test test ball";

    fn master() -> ExtendedPrivateKey {
        let mnemonic = bip39::Mnemonic::parse(MNEMONIC).unwrap();
        ExtendedPrivateKey::from_seed(&mnemonic.to_seed("")).unwrap()
    }

    #[test]
    fn test_private_derivation_golden_key() {
        let node = master().derive_path(&parse_path("m/44'/60'/0'/0/0").unwrap()).unwrap();
        assert_eq!(
            hex::encode(node.private_key().as_slice()),
            "eaf2c50dfd10524651e7e459c1286f0c2404eb0f34ffd2a1eb14373db49fceb6"
        );
        assert_eq!(
            hex::encode(node.chain_code()),
            "968a2e8e9aa80d3c3416b33e3d912b6a919af9909f42d29d2eb0b8f28ea4dcfd"
        );
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let parent = master().derive_path(&parse_path("m/44'/60'/0'/0").unwrap()).unwrap();
        let xpub = parent.to_extended_public_key();
        for index in 0..4 {
            let from_private = parent.derive_child(index).unwrap().to_extended_public_key();
            let from_public = xpub.derive_child(index).unwrap();
            assert_eq!(from_private, from_public);
        }
    }

    #[test]
    fn test_xpub_serialization_golden() {
        let parent = master().derive_path(&parse_path("m/44'/60'/0'/0").unwrap()).unwrap();
        let xpub = parent.to_extended_public_key().to_xpub();
        assert_eq!(
            xpub,
            "xpub6DreGKvTo5gf1tXu5N86sz922cFfACvEj8oUrL1nJAbngaMriFQDYk3vA1vpXXGyD5MtH2tbQ8JJScFki5TNSJtRF9T2Qq6ZNLSDhRk2bqc"
        );
        let parsed = ExtendedPublicKey::parse(&xpub).unwrap();
        assert_eq!(parsed.depth(), 4);
        assert_eq!(parsed.to_xpub(), xpub);
        assert_eq!(
            parsed.derive_child(0).unwrap().address().unwrap(),
            "0xc6D5a3c98EC9073B54FA0969957Bd582e8D874bf"
        );
    }

    #[test]
    fn test_hardened_public_derivation_rejected() {
        let xpub = master().to_extended_public_key();
        assert!(xpub.derive_child(HARDENED_OFFSET).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let mut xpub = master().to_extended_public_key().to_xpub();
        xpub.pop();
        xpub.push('1');
        assert!(ExtendedPublicKey::parse(&xpub).is_err());
    }

    #[test]
    fn test_seed_length_checked() {
        assert!(ExtendedPrivateKey::from_seed(&[0u8; 8]).is_err());
    }
}
