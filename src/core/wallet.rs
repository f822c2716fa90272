//! Backend contract
//!
//! `Wallet` is a signing handle bound to one resolved path. `DeterministicWallet`
//! is implemented by every backend that owns a derivation tree (seed phrase and
//! the three hardware families) and hides whether addresses come from a local
//! extended key or from one device request per index.

use crate::core::dpath::{parse_path, parse_segment, placeholder_value, resolve};
use crate::core::dpaths::{DerivationPath, ACCOUNT_PLACEHOLDER, HARDENED_OFFSET};
use crate::core::errors::{Result, WalletsError};
use crate::core::hd::ExtendedPublicKey;
use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use serde::Serialize;
use zeroize::Zeroizing;

/// Address produced by a deterministic backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeterministicAddress {
    pub address: String,
    #[serde(rename = "dPath")]
    pub d_path: String,
    /// Logical account index substituted into the template.
    pub index: u32,
    #[serde(rename = "dPathInfo")]
    pub d_path_info: DerivationPath,
}

/// One `get_addresses` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressBatchRequest {
    pub path: DerivationPath,
    pub limit: u32,
    pub offset: u32,
}

impl AddressBatchRequest {
    pub fn new(path: DerivationPath, limit: u32) -> Self {
        Self {
            path,
            limit,
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Account indices covered by the request. The whole range is checked
    /// against the template before any index is handed out.
    pub fn indices(&self) -> Result<impl Iterator<Item = u32>> {
        let end = self.offset.checked_add(self.limit).ok_or_else(|| {
            WalletsError::invalid_argument(format!(
                "Address range {}+{} exceeds the index space",
                self.offset, self.limit
            ))
        })?;
        if let Some(last) = end.checked_sub(1).filter(|_| self.limit > 0) {
            placeholder_value(&self.path, last)?;
        }
        Ok(self.offset..end)
    }
}

/// Signing handle bound to one resolved derivation path (or one raw key).
#[async_trait]
pub trait Wallet: Send + Sync {
    /// EIP-55 checksummed address of the handle.
    async fn get_address(&self) -> Result<String>;

    /// Sign an unsigned legacy or EIP-1559 transaction and return the
    /// `0x`-prefixed serialized signed transaction.
    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<String>;

    /// EIP-191 personal message signature, `0x`-prefixed `r || s || v`.
    async fn sign_message(&self, message: &[u8]) -> Result<String>;

    /// `0x`-prefixed private key. Hardware handles fail with `NotSupported`.
    async fn get_private_key(&self) -> Result<Zeroizing<String>>;
}

/// Backend owning a derivation tree.
#[async_trait]
pub trait DeterministicWallet: Send + Sync {
    /// Single address. Regular paths go through the batch algorithm with
    /// `limit = 1`; hardened paths are queried directly.
    async fn get_address(&self, path: &DerivationPath, index: u32) -> Result<String> {
        if path.is_hardened {
            return self.get_hardened_address(path, index).await;
        }

        let request = AddressBatchRequest::new(*path, 1).with_offset(index);
        self.get_addresses(&request)
            .await?
            .into_iter()
            .next()
            .map(|entry| entry.address)
            .ok_or_else(|| WalletsError::unknown("No address returned"))
    }

    /// One root-to-leaf query for a single index.
    async fn get_hardened_address(&self, path: &DerivationPath, index: u32) -> Result<String>;

    /// Signing handle for `path` at `index`. `known_address` seeds the handle's
    /// address cache.
    async fn get_wallet(
        &self,
        path: &DerivationPath,
        index: u32,
        known_address: Option<String>,
    ) -> Result<Box<dyn Wallet>>;

    /// Batch address derivation.
    async fn get_addresses(&self, request: &AddressBatchRequest) -> Result<Vec<DeterministicAddress>>;

    /// Concatenation of `get_addresses` over `requests`, in request order.
    async fn get_addresses_with_multiple_dpaths(
        &self,
        requests: &[AddressBatchRequest],
    ) -> Result<Vec<DeterministicAddress>> {
        for request in requests {
            request.indices()?;
        }
        let mut addresses = Vec::new();
        for request in requests {
            addresses.extend(self.get_addresses(request).await?);
        }
        Ok(addresses)
    }

    /// Serialized `xpub` of the node every address of a regular path is
    /// derived from.
    async fn get_extended_public_key(&self, path: &DerivationPath) -> Result<String>;
}

/// Regular template split around its placeholder: the resolved prefix the
/// extended key is fetched at, and the fixed non-hardened segments after the
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParts {
    pub prefix: String,
    pub suffix: Vec<u32>,
}

impl TemplateParts {
    pub fn of(path: &DerivationPath) -> Result<Self> {
        let segments: Vec<&str> = path.path.split('/').collect();
        let position = segments
            .iter()
            .position(|segment| segment.starts_with(ACCOUNT_PLACEHOLDER))
            .ok_or_else(|| {
                WalletsError::invalid_argument(format!("Template has no placeholder: {}", path.path))
            })?;

        let prefix = segments[..position].join("/");
        let mut suffix = Vec::new();
        for segment in &segments[position + 1..] {
            suffix.push(parse_segment(segment)?);
        }

        if path.placeholder_is_hardened() || suffix.iter().any(|&i| i >= HARDENED_OFFSET) {
            return Err(WalletsError::invalid_argument(format!(
                "{} is not locally derivable",
                path.path
            )));
        }

        Ok(Self { prefix, suffix })
    }

    /// Child numbers of the prefix, for backends that talk to devices.
    pub fn prefix_indices(&self) -> Result<Vec<u32>> {
        parse_path(&self.prefix)
    }
}

/// Core of the regular branch: every index of `request` is derived locally
/// from `node`, the extended key at the template's parent prefix.
pub fn derive_regular_addresses(
    node: &ExtendedPublicKey,
    request: &AddressBatchRequest,
) -> Result<Vec<DeterministicAddress>> {
    let parts = TemplateParts::of(&request.path)?;

    request
        .indices()?
        .map(|index| {
            let child = node
                .derive_child(placeholder_value(&request.path, index)?)?
                .derive_path(&parts.suffix)?;
            Ok(DeterministicAddress {
                address: child.address()?,
                d_path: resolve(&request.path, index)?,
                index,
                d_path_info: request.path,
            })
        })
        .collect()
}

/// Hardened branch: sequential per-index queries, failing the whole batch on
/// the first error.
pub async fn collect_hardened_addresses<W>(
    wallet: &W,
    request: &AddressBatchRequest,
) -> Result<Vec<DeterministicAddress>>
where
    W: DeterministicWallet + ?Sized,
{
    let mut addresses = Vec::new();
    for index in request.indices()? {
        let address = wallet.get_hardened_address(&request.path, index).await?;
        addresses.push(DeterministicAddress {
            address,
            d_path: resolve(&request.path, index)?,
            index,
            d_path_info: request.path,
        });
    }
    Ok(addresses)
}
