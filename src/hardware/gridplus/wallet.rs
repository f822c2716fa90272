//! GridPlus Lattice backend
//!
//! The Lattice does not hand out extended keys, so regular batches are one
//! address scan from the first resolved path. The session (credentials and
//! SDK client) is shared by the backend and every handle it issues.

use super::client::{connector_private_key, LatticeClient, LatticeClientConfig, LatticeConnector, SignRequest};
use super::pairing::{AuthorizationSurface, GridPlusCredentials, PairingFlow};
use crate::core::address::to_checksum_address;
use crate::core::config::GridPlusConfig;
use crate::core::dpath::{parse_path, resolve};
use crate::core::dpaths::DerivationPath;
use crate::core::errors::{Result, WalletsError};
use crate::core::extended_key::ExtendedKeyPair;
use crate::core::signing::{message_signature, serialize_with_signature, validate_transaction};
use crate::core::wallet::{
    collect_hardened_addresses, AddressBatchRequest, DeterministicAddress, DeterministicWallet, Wallet,
};
use crate::hardware::errors::normalize;
use crate::hardware::hardware_wallet::{prefix_xpub, HardwareWallet};
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};
use zeroize::Zeroizing;

struct Session {
    name: String,
    base_url: String,
    poll_interval: Duration,
    credentials: Option<GridPlusCredentials>,
    client: Option<Box<dyn LatticeClient>>,
    connector: Box<dyn LatticeConnector>,
    surface: Box<dyn AuthorizationSurface>,
}

impl Session {
    /// Reuse the client while it is paired; otherwise reconnect with the known
    /// credentials, pairing again when the device no longer accepts them.
    async fn ensure_paired(&mut self) -> Result<()> {
        if let Some(client) = &self.client {
            if client.is_paired() && client.has_active_wallet() {
                return Ok(());
            }
        }

        if let Some(mut client) = self.client.take() {
            if let Some(credentials) = &self.credentials {
                if client.connect(&credentials.device_id).await.map_err(normalize)? {
                    self.client = Some(client);
                    return Ok(());
                }
            }
            warn!("Lattice 配对已失效, 重新配对");
            self.credentials = None;
        }

        loop {
            let (credentials, fresh) = match self.credentials.clone() {
                Some(credentials) => (credentials, false),
                None => {
                    let mut flow = PairingFlow::new(self.surface.as_mut(), &self.base_url, &self.name, self.poll_interval);
                    let credentials = flow.run().await?;
                    self.credentials = Some(credentials.clone());
                    (credentials, true)
                }
            };

            let mut client = self.connector.create(LatticeClientConfig {
                name: self.name.clone(),
                base_url: self.base_url.clone(),
                private_key: connector_private_key(&credentials.password, &credentials.device_id, &self.name),
            });
            if client.connect(&credentials.device_id).await.map_err(normalize)? {
                info!("✅ 已连接到 Lattice {}", credentials.device_id);
                self.client = Some(client);
                return Ok(());
            }

            self.credentials = None;
            if fresh {
                return Err(WalletsError::unknown("Lattice rejected the pairing credentials"));
            }
            warn!("Stored Lattice credentials rejected, pairing again");
        }
    }

    async fn client(&mut self) -> Result<&mut Box<dyn LatticeClient>> {
        self.ensure_paired().await?;
        self.client
            .as_mut()
            .ok_or_else(|| WalletsError::unknown("Lattice client unavailable"))
    }

    async fn get_addresses(&mut self, start_path: &str, n: u32) -> Result<Vec<String>> {
        let start = parse_path(start_path)?;
        let addresses = self
            .client()
            .await?
            .get_addresses(&start, n)
            .await
            .map_err(normalize)?;
        if addresses.len() != n as usize {
            return Err(WalletsError::unknown(format!(
                "Lattice returned {} addresses, expected {}",
                addresses.len(),
                n
            )));
        }
        addresses.iter().map(|address| to_checksum_address(address)).collect()
    }
}

/// GridPlus Lattice 硬件wallet
pub struct GridPlusWallet {
    session: Arc<Mutex<Session>>,
}

impl GridPlusWallet {
    /// Stored `device_id`/`password` in `config` skip the first pairing.
    pub fn new<C, S>(config: &GridPlusConfig, connector: C, surface: S) -> Self
    where
        C: LatticeConnector + 'static,
        S: AuthorizationSurface + 'static,
    {
        Self::from_boxed(config, Box::new(connector), Box::new(surface))
    }

    pub fn from_boxed(
        config: &GridPlusConfig,
        connector: Box<dyn LatticeConnector>,
        surface: Box<dyn AuthorizationSurface>,
    ) -> Self {
        let credentials = match (&config.device_id, &config.password) {
            (Some(device_id), Some(password)) => Some(GridPlusCredentials {
                device_id: device_id.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        Self {
            session: Arc::new(Mutex::new(Session {
                name: config.name.clone(),
                base_url: config.base_url.clone(),
                poll_interval: config.poll_interval(),
                credentials,
                client: None,
                connector,
                surface,
            })),
        }
    }

    /// Current pairing credentials, for the caller to persist.
    pub async fn credentials(&self) -> Option<GridPlusCredentials> {
        self.session.lock().await.credentials.clone()
    }
}

#[async_trait]
impl HardwareWallet for GridPlusWallet {
    async fn get_extended_key(&self, _path: &str) -> Result<ExtendedKeyPair> {
        Err(WalletsError::not_supported())
    }
}

#[async_trait]
impl DeterministicWallet for GridPlusWallet {
    async fn get_hardened_address(&self, path: &DerivationPath, index: u32) -> Result<String> {
        let resolved = resolve(path, index)?;
        let mut addresses = self.session.lock().await.get_addresses(&resolved, 1).await?;
        addresses
            .pop()
            .ok_or_else(|| WalletsError::unknown("No address returned"))
    }

    async fn get_wallet(
        &self,
        path: &DerivationPath,
        index: u32,
        known_address: Option<String>,
    ) -> Result<Box<dyn Wallet>> {
        let path = resolve(path, index)?;
        self.session.lock().await.ensure_paired().await?;
        Ok(Box::new(GridPlusWalletInstance {
            session: Arc::clone(&self.session),
            path,
            address: OnceCell::new_with(known_address),
        }))
    }

    async fn get_addresses(&self, request: &AddressBatchRequest) -> Result<Vec<DeterministicAddress>> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }
        let indices = request.indices()?;
        if request.path.is_hardened {
            return collect_hardened_addresses(self, request).await;
        }

        let start = resolve(&request.path, request.offset)?;
        let addresses = self.session.lock().await.get_addresses(&start, request.limit).await?;

        indices
            .into_iter()
            .zip(addresses)
            .map(|(index, address)| -> Result<DeterministicAddress> {
                Ok(DeterministicAddress {
                    address,
                    d_path: resolve(&request.path, index)?,
                    index,
                    d_path_info: request.path,
                })
            })
            .collect()
    }

    async fn get_extended_public_key(&self, path: &DerivationPath) -> Result<String> {
        prefix_xpub(self, path).await
    }
}

/// Signing handle at one resolved path.
pub struct GridPlusWalletInstance {
    session: Arc<Mutex<Session>>,
    path: String,
    address: OnceCell<String>,
}

/// Lattice drops leading zero bytes of `r` and `s`.
fn left_pad(bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 32usize.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

#[async_trait]
impl Wallet for GridPlusWalletInstance {
    async fn get_address(&self) -> Result<String> {
        let address = self
            .address
            .get_or_try_init(|| async {
                let mut addresses = self.session.lock().await.get_addresses(&self.path, 1).await?;
                addresses
                    .pop()
                    .ok_or_else(|| WalletsError::unknown("No address returned"))
            })
            .await?;
        Ok(address.clone())
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<String> {
        validate_transaction(tx, true)?;
        let request = SignRequest::Transaction {
            signer_path: parse_path(&self.path)?,
            tx: tx.clone(),
        };

        let mut session = self.session.lock().await;
        let signature = session.client().await?.sign(request).await.map_err(normalize)?;
        let signed = serialize_with_signature(tx, signature.v_value(), &signature.r, &signature.s)?;
        info!("✅ Lattice transaction signed at {}", self.path);
        Ok(signed)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String> {
        let request = SignRequest::PersonalMessage {
            signer_path: parse_path(&self.path)?,
            payload: message.to_vec(),
        };

        let mut session = self.session.lock().await;
        let signature = session.client().await?.sign(request).await.map_err(normalize)?;
        message_signature(signature.v_value(), &left_pad(&signature.r), &left_pad(&signature.s))
    }

    async fn get_private_key(&self) -> Result<Zeroizing<String>> {
        Err(WalletsError::not_supported())
    }
}
