//! Raw private key custody
//!
//! No derivation tree: the key itself is the signing handle.

use crate::core::errors::{Result, WalletsError};
use crate::core::signing;
use crate::core::wallet::Wallet;
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use zeroize::Zeroizing;

/// Signing handle over an in-memory secp256k1 private key.
pub struct PrivateKey {
    key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl PrivateKey {
    pub fn new(key: &[u8]) -> Result<Self> {
        let bytes: [u8; 32] = key.try_into().map_err(|_| {
            WalletsError::invalid_argument(format!("Private key must be 32 bytes, got {}", key.len()))
        })?;
        let key = Zeroizing::new(bytes);
        // rejects zero and values >= n
        signing::address_of(key.as_slice())?;
        Ok(Self { key })
    }

    /// Accepts the key with or without `0x`.
    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = Zeroizing::new(hex::decode(key.trim().trim_start_matches("0x"))?);
        Self::new(&bytes)
    }
}

#[async_trait]
impl Wallet for PrivateKey {
    async fn get_address(&self) -> Result<String> {
        signing::address_of(self.key.as_slice())
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<String> {
        signing::sign_transaction_with_key(self.key.as_slice(), tx)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String> {
        signing::sign_message_with_key(self.key.as_slice(), message).await
    }

    async fn get_private_key(&self) -> Result<Zeroizing<String>> {
        Ok(Zeroizing::new(format!("0x{}", hex::encode(self.key.as_slice()))))
    }
}
