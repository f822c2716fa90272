//! Backend factory
//!
//! Callers pick the custody mechanism explicitly; every variant comes back as
//! the same `DeterministicWallet` trait object.

use crate::core::config::GridPlusConfig;
use crate::core::errors::Result;
use crate::core::wallet::{DeterministicWallet, Wallet};
use crate::hardware::gridplus::{AuthorizationSurface, GridPlusWallet, LatticeConnector};
use crate::hardware::ledger::LedgerWallet;
use crate::hardware::transport::DeviceTransport;
use crate::hardware::trezor::{TrezorDeviceClient, TrezorWallet};
use crate::software::{MnemonicPhrase, PrivateKey};
use tracing::info;
use zeroize::Zeroizing;

/// Which backend to build, with what it needs.
pub enum BackendConfig {
    MnemonicPhrase {
        phrase: Zeroizing<String>,
        passphrase: Option<Zeroizing<String>>,
    },
    /// Ledger Ethereum app over the given transport.
    Ledger(Box<dyn DeviceTransport>),
    /// Trezor over the given transport.
    Trezor(Box<dyn DeviceTransport>),
    GridPlus {
        config: GridPlusConfig,
        connector: Box<dyn LatticeConnector>,
        surface: Box<dyn AuthorizationSurface>,
    },
}

impl BackendConfig {
    pub fn mnemonic(phrase: &str, passphrase: Option<&str>) -> Self {
        BackendConfig::MnemonicPhrase {
            phrase: Zeroizing::new(phrase.to_string()),
            passphrase: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    /// First Ledger found over HID.
    #[cfg(feature = "ledger")]
    pub fn ledger_hid(config: &crate::core::config::LedgerConfig) -> Result<Self> {
        let transport = crate::hardware::ledger::LedgerHidTransport::open(config)
            .map_err(crate::hardware::errors::normalize)?;
        Ok(BackendConfig::Ledger(Box::new(transport)))
    }

    /// First Trezor found over HID.
    #[cfg(feature = "trezor")]
    pub fn trezor_hid(config: &crate::core::config::TrezorConfig) -> Result<Self> {
        let transport = crate::hardware::trezor::TrezorHidTransport::open(config)
            .map_err(crate::hardware::errors::normalize)?;
        Ok(BackendConfig::Trezor(Box::new(transport)))
    }

    fn name(&self) -> &'static str {
        match self {
            BackendConfig::MnemonicPhrase { .. } => "mnemonic phrase",
            BackendConfig::Ledger(_) => "Ledger",
            BackendConfig::Trezor(_) => "Trezor",
            BackendConfig::GridPlus { .. } => "GridPlus",
        }
    }
}

/// Build the deterministic backend described by `config`.
pub fn create_deterministic_wallet(config: BackendConfig) -> Result<Box<dyn DeterministicWallet>> {
    info!("创建 {} 后端", config.name());
    let wallet: Box<dyn DeterministicWallet> = match config {
        BackendConfig::MnemonicPhrase { phrase, passphrase } => {
            Box::new(MnemonicPhrase::new(&phrase, passphrase.as_deref().map(String::as_str))?)
        }
        BackendConfig::Ledger(transport) => Box::new(LedgerWallet::new(transport)),
        BackendConfig::Trezor(transport) => Box::new(TrezorWallet::new(TrezorDeviceClient::new(transport))),
        BackendConfig::GridPlus {
            config,
            connector,
            surface,
        } => Box::new(GridPlusWallet::from_boxed(&config, connector, surface)),
    };
    Ok(wallet)
}

/// Signing handle over a raw `0x`-prefixed (or bare) hex private key.
pub fn create_private_key_wallet(private_key: &str) -> Result<Box<dyn Wallet>> {
    Ok(Box::new(PrivateKey::from_hex(private_key)?))
}
