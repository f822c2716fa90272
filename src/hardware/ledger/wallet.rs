//! Ledger backend
//!
//! One Ethereum app session per backend. Handles share it and never own the
//! transport.

use super::ethereum_app::LedgerEthereumApp;
use crate::core::dpath::resolve;
use crate::core::dpaths::DerivationPath;
use crate::core::errors::{Result, WalletsError};
use crate::core::extended_key::ExtendedKeyPair;
use crate::core::signing::{message_signature, serialize_with_signature, unsigned_payload, validate_transaction};
use crate::core::wallet::{
    collect_hardened_addresses, derive_regular_addresses, AddressBatchRequest, DeterministicAddress,
    DeterministicWallet, Wallet,
};
use crate::hardware::hardware_wallet::{prefix_node, prefix_xpub, HardwareWallet};
use crate::hardware::transport::DeviceTransport;
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;
use zeroize::Zeroizing;

type SharedApp = Arc<Mutex<LedgerEthereumApp<Box<dyn DeviceTransport>>>>;

/// Ledger 硬件wallet
pub struct LedgerWallet {
    app: SharedApp,
}

impl LedgerWallet {
    pub fn new<T: DeviceTransport + 'static>(transport: T) -> Self {
        let transport: Box<dyn DeviceTransport> = Box::new(transport);
        Self {
            app: Arc::new(Mutex::new(LedgerEthereumApp::new(transport))),
        }
    }

    /// Open the first Ledger found over HID.
    #[cfg(feature = "ledger")]
    pub fn connect(config: &crate::core::config::LedgerConfig) -> Result<Self> {
        let transport = super::transport::LedgerHidTransport::open(config)
            .map_err(crate::hardware::errors::normalize)?;
        Ok(Self::new(transport))
    }
}

#[async_trait]
impl HardwareWallet for LedgerWallet {
    async fn get_extended_key(&self, path: &str) -> Result<ExtendedKeyPair> {
        let key = self.app.lock().await.get_address(path, false, true).await?;
        let chain_code = key
            .chain_code
            .ok_or_else(|| WalletsError::unknown("Ledger did not return a chain code"))?;
        Ok(ExtendedKeyPair::new(key.public_key, chain_code))
    }
}

#[async_trait]
impl DeterministicWallet for LedgerWallet {
    async fn get_hardened_address(&self, path: &DerivationPath, index: u32) -> Result<String> {
        let resolved = resolve(path, index)?;
        let key = self.app.lock().await.get_address(&resolved, false, false).await?;
        Ok(key.address)
    }

    async fn get_wallet(
        &self,
        path: &DerivationPath,
        index: u32,
        known_address: Option<String>,
    ) -> Result<Box<dyn Wallet>> {
        Ok(Box::new(LedgerWalletInstance {
            app: Arc::clone(&self.app),
            path: resolve(path, index)?,
            address: OnceCell::new_with(known_address),
        }))
    }

    async fn get_addresses(&self, request: &AddressBatchRequest) -> Result<Vec<DeterministicAddress>> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }
        request.indices()?;
        if request.path.is_hardened {
            return collect_hardened_addresses(self, request).await;
        }
        let node = prefix_node(self, &request.path).await?;
        derive_regular_addresses(&node, request)
    }

    async fn get_extended_public_key(&self, path: &DerivationPath) -> Result<String> {
        prefix_xpub(self, path).await
    }
}

/// Signing handle at one resolved path.
pub struct LedgerWalletInstance {
    app: SharedApp,
    path: String,
    address: OnceCell<String>,
}

impl LedgerWalletInstance {
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Wallet for LedgerWalletInstance {
    async fn get_address(&self) -> Result<String> {
        let address = self
            .address
            .get_or_try_init(|| async {
                let key = self.app.lock().await.get_address(&self.path, false, false).await?;
                Ok::<_, WalletsError>(key.address)
            })
            .await?;
        Ok(address.clone())
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<String> {
        validate_transaction(tx, true)?;
        let payload = unsigned_payload(tx);
        let signature = self.app.lock().await.sign_transaction(&self.path, &payload).await?;
        let signed = serialize_with_signature(tx, signature.v, &signature.r, &signature.s)?;
        info!("✅ Ledger transaction signed at {}", self.path);
        Ok(signed)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String> {
        let signature = self
            .app
            .lock()
            .await
            .sign_personal_message(&self.path, message)
            .await?;
        message_signature(signature.v, &signature.r, &signature.s)
    }

    async fn get_private_key(&self) -> Result<Zeroizing<String>> {
        Err(WalletsError::not_supported())
    }
}
