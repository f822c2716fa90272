//! Lattice client
//!
//! The Lattice SDK surface the backend needs: connection state, address
//! scans from a start path and signing requests.

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Error string reported by the Lattice SDK.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct LatticeError {
    pub message: String,
}

impl LatticeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Signature as returned by the Lattice. An empty `v` means zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatticeSignature {
    pub v: Vec<u8>,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

impl LatticeSignature {
    pub fn v_value(&self) -> u64 {
        self.v.iter().take(8).fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }
}

/// What the Lattice is asked to sign.
#[derive(Debug, Clone, PartialEq)]
pub enum SignRequest {
    /// `ETH` currency: a transaction, fields forwarded as-is.
    Transaction { signer_path: Vec<u32>, tx: TypedTransaction },
    /// `ETH_MSG` currency with the `signPersonal` protocol.
    PersonalMessage { signer_path: Vec<u32>, payload: Vec<u8> },
}

/// Parameters a client is built from once credentials are known.
pub struct LatticeClientConfig {
    pub name: String,
    pub base_url: String,
    pub private_key: Zeroizing<[u8; 32]>,
}

/// Connected Lattice SDK client.
#[async_trait]
pub trait LatticeClient: Send {
    fn is_paired(&self) -> bool;

    fn has_active_wallet(&self) -> bool;

    /// Reconnect to a paired device; `false` means the pairing is gone.
    async fn connect(&mut self, device_id: &str) -> std::result::Result<bool, LatticeError>;

    /// `n` consecutive addresses starting at `start_path`.
    async fn get_addresses(
        &mut self,
        start_path: &[u32],
        n: u32,
    ) -> std::result::Result<Vec<String>, LatticeError>;

    async fn sign(&mut self, request: SignRequest) -> std::result::Result<LatticeSignature, LatticeError>;
}

/// Builds SDK clients.
pub trait LatticeConnector: Send + Sync {
    fn create(&self, config: LatticeClientConfig) -> Box<dyn LatticeClient>;
}

/// Client key derived from the pairing credentials:
/// `SHA256(password || deviceID || name)`.
pub fn connector_private_key(password: &str, device_id: &str, name: &str) -> Zeroizing<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(device_id.as_bytes());
    hasher.update(name.as_bytes());
    Zeroizing::new(hasher.finalize().into())
}
