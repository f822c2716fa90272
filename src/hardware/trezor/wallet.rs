//! Trezor backend
//!
//! Regular paths are served from public keys fetched in bundles, so a
//! multi-path scan costs one device session.

use super::client::{EthereumTransaction, TrezorClient};
use crate::core::dpath::{parent_prefix, resolve};
use crate::core::dpaths::DerivationPath;
use crate::core::errors::{Result, WalletsError};
use crate::core::extended_key::{build_extended_public_key, ExtendedKeyPair};
use crate::core::hd::ExtendedPublicKey;
use crate::core::signing::{message_signature, serialize_with_signature};
use crate::core::wallet::{
    collect_hardened_addresses, derive_regular_addresses, AddressBatchRequest, DeterministicAddress,
    DeterministicWallet, TemplateParts, Wallet,
};
use crate::hardware::errors::normalize;
use crate::hardware::hardware_wallet::{prefix_node, prefix_xpub, HardwareWallet};
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Trezor 硬件wallet
pub struct TrezorWallet {
    client: Arc<dyn TrezorClient>,
}

impl TrezorWallet {
    pub fn new<C: TrezorClient + 'static>(client: C) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Open the first Trezor found over HID.
    #[cfg(feature = "trezor")]
    pub fn connect(config: &crate::core::config::TrezorConfig) -> Result<Self> {
        let transport = super::transport::TrezorHidTransport::open(config).map_err(normalize)?;
        Ok(Self::new(super::client::TrezorDeviceClient::new(transport)))
    }

    async fn addresses_from(
        &self,
        request: &AddressBatchRequest,
        node: Option<&ExtendedPublicKey>,
    ) -> Result<Vec<DeterministicAddress>> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }
        request.indices()?;
        if request.path.is_hardened {
            return collect_hardened_addresses(self, request).await;
        }
        match node {
            Some(node) => derive_regular_addresses(node, request),
            None => {
                let node = prefix_node(self, &request.path).await?;
                derive_regular_addresses(&node, request)
            }
        }
    }

    /// Fetch every regular prefix and its parent in one bundle and rebuild
    /// the prefix nodes.
    async fn prefetch_nodes(&self, requests: &[AddressBatchRequest]) -> Result<HashMap<String, ExtendedPublicKey>> {
        let mut prefixes = Vec::new();
        for request in requests {
            if request.path.is_hardened || request.limit == 0 {
                continue;
            }
            let prefix = TemplateParts::of(&request.path)?.prefix;
            if !prefixes.contains(&prefix) {
                prefixes.push(prefix);
            }
        }
        if prefixes.is_empty() {
            return Ok(HashMap::new());
        }

        let mut bundle: Vec<String> = Vec::new();
        for prefix in &prefixes {
            for path in [prefix.clone(), parent_prefix(prefix)] {
                if !path.is_empty() && !bundle.contains(&path) {
                    bundle.push(path);
                }
            }
        }

        debug!("Trezor bundle: {} public keys", bundle.len());
        let responses = self.client.get_public_keys(&bundle).await.map_err(normalize)?;
        let keys: HashMap<String, ExtendedKeyPair> = responses
            .into_iter()
            .map(|response| (response.serialized_path, response.key))
            .collect();

        let mut nodes = HashMap::new();
        for prefix in prefixes {
            let child = keys
                .get(&prefix)
                .ok_or_else(|| WalletsError::unknown(format!("Trezor returned no key for {}", prefix)))?;
            let node = match keys.get(&parent_prefix(&prefix)) {
                Some(parent) => ExtendedPublicKey::parse(&build_extended_public_key(&prefix, parent, child)?)?,
                None => ExtendedPublicKey::from_key_pair(child)?,
            };
            nodes.insert(prefix, node);
        }
        Ok(nodes)
    }
}

#[async_trait]
impl HardwareWallet for TrezorWallet {
    async fn get_extended_key(&self, path: &str) -> Result<ExtendedKeyPair> {
        let mut nodes = self
            .client
            .get_public_keys(&[path.to_string()])
            .await
            .map_err(normalize)?;
        nodes
            .pop()
            .map(|node| node.key)
            .ok_or_else(|| WalletsError::unknown(format!("Trezor returned no key for {}", path)))
    }
}

#[async_trait]
impl DeterministicWallet for TrezorWallet {
    async fn get_hardened_address(&self, path: &DerivationPath, index: u32) -> Result<String> {
        let resolved = resolve(path, index)?;
        self.client
            .ethereum_get_address(&resolved, false)
            .await
            .map_err(normalize)
    }

    async fn get_wallet(
        &self,
        path: &DerivationPath,
        index: u32,
        known_address: Option<String>,
    ) -> Result<Box<dyn Wallet>> {
        Ok(Box::new(TrezorWalletInstance {
            client: Arc::clone(&self.client),
            path: resolve(path, index)?,
            address: OnceCell::new_with(known_address),
        }))
    }

    async fn get_addresses(&self, request: &AddressBatchRequest) -> Result<Vec<DeterministicAddress>> {
        self.addresses_from(request, None).await
    }

    async fn get_addresses_with_multiple_dpaths(
        &self,
        requests: &[AddressBatchRequest],
    ) -> Result<Vec<DeterministicAddress>> {
        for request in requests {
            request.indices()?;
        }
        let nodes = self.prefetch_nodes(requests).await?;

        let mut addresses = Vec::new();
        for request in requests {
            let node = if request.path.is_hardened {
                None
            } else {
                TemplateParts::of(&request.path)
                    .ok()
                    .and_then(|parts| nodes.get(&parts.prefix))
            };
            addresses.extend(self.addresses_from(request, node).await?);
        }
        Ok(addresses)
    }

    async fn get_extended_public_key(&self, path: &DerivationPath) -> Result<String> {
        prefix_xpub(self, path).await
    }
}

/// Signing handle at one resolved path.
pub struct TrezorWalletInstance {
    client: Arc<dyn TrezorClient>,
    path: String,
    address: OnceCell<String>,
}

#[async_trait]
impl Wallet for TrezorWalletInstance {
    async fn get_address(&self) -> Result<String> {
        let address = self
            .address
            .get_or_try_init(|| async { self.client.ethereum_get_address(&self.path, false).await.map_err(normalize) })
            .await?;
        Ok(address.clone())
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<String> {
        let request = EthereumTransaction::from_transaction(tx)?;
        let signature = self
            .client
            .ethereum_sign_transaction(&self.path, &request)
            .await
            .map_err(normalize)?;
        let signed = serialize_with_signature(tx, signature.v, &signature.r, &signature.s)?;
        info!("✅ Trezor transaction signed at {}", self.path);
        Ok(signed)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String> {
        let signature = self
            .client
            .ethereum_sign_message(&self.path, message)
            .await
            .map_err(normalize)?;
        if signature.len() != 65 {
            return Err(WalletsError::unknown(format!(
                "Trezor returned a {}-byte signature",
                signature.len()
            )));
        }
        message_signature(signature[64] as u64, &signature[..32], &signature[32..64])
    }

    async fn get_private_key(&self) -> Result<Zeroizing<String>> {
        Err(WalletsError::not_supported())
    }
}
