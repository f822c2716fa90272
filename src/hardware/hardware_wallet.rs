//! 硬件wallet公共逻辑
//!
//! Devices never hand out an xpub directly. They answer with a public key and
//! chain code for one resolved path, so the node a regular template derives
//! from is rebuilt here from that raw material.

use crate::core::dpath::parent_prefix;
use crate::core::dpaths::DerivationPath;
use crate::core::errors::{Result, WalletsError};
use crate::core::extended_key::{build_extended_public_key, ExtendedKeyPair};
use crate::core::hd::ExtendedPublicKey;
use crate::core::wallet::{DeterministicWallet, TemplateParts};
use async_trait::async_trait;

/// Signature components as reported by a device. `v` is whatever the device
/// answered; [`crate::core::signing::recovery_parity`] normalizes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSignature {
    pub v: u64,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

/// Deterministic backend whose keys live on a device.
#[async_trait]
pub trait HardwareWallet: DeterministicWallet {
    /// Public key and chain code at a resolved path.
    async fn get_extended_key(&self, path: &str) -> Result<ExtendedKeyPair>;
}

/// Node every address of the regular template `path` is derived from.
pub async fn prefix_node<W>(wallet: &W, path: &DerivationPath) -> Result<ExtendedPublicKey>
where
    W: HardwareWallet + ?Sized,
{
    let parts = TemplateParts::of(path)?;
    let pair = wallet.get_extended_key(&parts.prefix).await?;
    ExtendedPublicKey::from_key_pair(&pair)
}

/// Serialized xpub of the prefix node; needs the parent key for the fingerprint.
pub async fn prefix_xpub<W>(wallet: &W, path: &DerivationPath) -> Result<String>
where
    W: HardwareWallet + ?Sized,
{
    let parts = TemplateParts::of(path)?;
    let parent_path = parent_prefix(&parts.prefix);
    if parent_path.is_empty() {
        return Err(WalletsError::invalid_argument(format!(
            "{} has no parent to fingerprint",
            parts.prefix
        )));
    }

    let child = wallet.get_extended_key(&parts.prefix).await?;
    let parent = wallet.get_extended_key(&parent_path).await?;
    build_extended_public_key(&parts.prefix, &parent, &child)
}
