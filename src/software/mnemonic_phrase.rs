//! BIP39 mnemonic phrase custody
//!
//! Every address is derived locally from the seed; hardened paths walk from
//! the master node, regular paths derive children of the prefix node.

use crate::core::dpath::{parse_path, resolve};
use crate::core::dpaths::DerivationPath;
use crate::core::errors::{Result, WalletsError};
use crate::core::hd::ExtendedPrivateKey;
use crate::core::wallet::{
    collect_hardened_addresses, derive_regular_addresses, AddressBatchRequest, DeterministicAddress,
    DeterministicWallet, TemplateParts, Wallet,
};
use crate::software::private_key::PrivateKey;
use async_trait::async_trait;
use bip39::{Language, Mnemonic};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use tracing::debug;
use zeroize::Zeroizing;

/// Entropy used when the caller does not choose (24 words).
pub const DEFAULT_ENTROPY_BYTES: usize = 32;

/// Seed phrase backend.
pub struct MnemonicPhrase {
    phrase: Zeroizing<String>,
    master: ExtendedPrivateKey,
}

impl std::fmt::Debug for MnemonicPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MnemonicPhrase(..)")
    }
}

impl MnemonicPhrase {
    /// Validate the phrase and derive the BIP39 seed with the optional passphrase.
    pub fn new(phrase: &str, passphrase: Option<&str>) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase.trim())?;
        let seed = Zeroizing::new(mnemonic.to_seed(passphrase.unwrap_or("")));
        let master = ExtendedPrivateKey::from_seed(seed.as_slice())?;
        Ok(Self {
            phrase: Zeroizing::new(mnemonic.to_string()),
            master,
        })
    }

    /// New random phrase with entropy drawn from `rng`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, passphrase: Option<&str>) -> Result<Self> {
        Self::generate_with_entropy(rng, DEFAULT_ENTROPY_BYTES, passphrase)
    }

    /// `entropy_bytes` must be 16, 20, 24, 28 or 32.
    pub fn generate_with_entropy<R: RngCore + CryptoRng>(
        rng: &mut R,
        entropy_bytes: usize,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        if ![16, 20, 24, 28, 32].contains(&entropy_bytes) {
            return Err(WalletsError::invalid_argument(format!(
                "Unsupported entropy length: {} bytes",
                entropy_bytes
            )));
        }
        let mut entropy = Zeroizing::new(vec![0u8; entropy_bytes]);
        rng.fill_bytes(entropy.as_mut_slice());
        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)?;
        let phrase = Zeroizing::new(mnemonic.to_string());
        Self::new(&phrase, passphrase)
    }

    /// New random phrase from the operating system RNG.
    pub fn generate_random(passphrase: Option<&str>) -> Result<Self> {
        Self::generate(&mut OsRng, passphrase)
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    fn node_at(&self, path: &str) -> Result<ExtendedPrivateKey> {
        self.master.derive_path(&parse_path(path)?)
    }
}

#[async_trait]
impl DeterministicWallet for MnemonicPhrase {
    async fn get_hardened_address(&self, path: &DerivationPath, index: u32) -> Result<String> {
        let resolved = resolve(path, index)?;
        self.node_at(&resolved)?.to_extended_public_key().address()
    }

    async fn get_wallet(
        &self,
        path: &DerivationPath,
        index: u32,
        _known_address: Option<String>,
    ) -> Result<Box<dyn Wallet>> {
        let resolved = resolve(path, index)?;
        debug!("Deriving signing key at {}", resolved);
        let node = self.node_at(&resolved)?;
        Ok(Box::new(PrivateKey::new(node.private_key().as_slice())?))
    }

    async fn get_addresses(&self, request: &AddressBatchRequest) -> Result<Vec<DeterministicAddress>> {
        if request.limit == 0 {
            return Ok(Vec::new());
        }
        if request.path.is_hardened {
            return collect_hardened_addresses(self, request).await;
        }

        let parts = TemplateParts::of(&request.path)?;
        let node = self.node_at(&parts.prefix)?.to_extended_public_key();
        derive_regular_addresses(&node, request)
    }

    async fn get_extended_public_key(&self, path: &DerivationPath) -> Result<String> {
        let parts = TemplateParts::of(path)?;
        Ok(self.node_at(&parts.prefix)?.to_extended_public_key().to_xpub())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dpaths::{DEFAULT_ETH, LEDGER_LIVE_ETH};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const MNEMONIC: &str = "test test test test test test test test test test test ball";

    #[test]
    fn test_generate_is_deterministic_for_seeded_rng() {
        let a = MnemonicPhrase::generate(&mut StdRng::seed_from_u64(7), None).unwrap();
        let b = MnemonicPhrase::generate(&mut StdRng::seed_from_u64(7), None).unwrap();
        assert_eq!(a.phrase(), b.phrase());
        assert_eq!(a.phrase().split_whitespace().count(), 24);
    }

    #[test]
    fn test_generate_with_short_entropy() {
        let wallet = MnemonicPhrase::generate_with_entropy(&mut StdRng::seed_from_u64(1), 16, None).unwrap();
        assert_eq!(wallet.phrase().split_whitespace().count(), 12);
        assert!(MnemonicPhrase::generate_with_entropy(&mut StdRng::seed_from_u64(1), 15, None).is_err());
    }

    #[test]
    fn test_invalid_phrase() {
        let err = MnemonicPhrase::new("test test test", None).unwrap_err();
        assert_eq!(err.kind(), crate::core::errors::WalletsErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn test_limit_zero_is_empty() {
        let wallet = MnemonicPhrase::new(MNEMONIC, None).unwrap();
        let request = AddressBatchRequest::new(DEFAULT_ETH, 0).with_offset(100);
        assert!(wallet.get_addresses(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hardened_single_lookup() {
        let wallet = MnemonicPhrase::new(MNEMONIC, None).unwrap();
        assert_eq!(
            wallet.get_address(&LEDGER_LIVE_ETH, 1).await.unwrap(),
            "0x3FE703a2035CB3590C865a09F556eDda02b2Cf12"
        );
    }

    #[tokio::test]
    async fn test_passphrase_changes_addresses() {
        let plain = MnemonicPhrase::new(MNEMONIC, None).unwrap();
        let salted = MnemonicPhrase::new(MNEMONIC, Some("secret")).unwrap();
        assert_ne!(
            plain.get_address(&DEFAULT_ETH, 0).await.unwrap(),
            salted.get_address(&DEFAULT_ETH, 0).await.unwrap()
        );
    }
}
