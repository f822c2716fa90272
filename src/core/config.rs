use crate::core::errors::{Result, WalletsError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Environment variable holding the configuration file path.
pub const CONFIG_ENV: &str = "WALLETS_CONFIG";
/// Configuration file used when `WALLETS_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "wallets.toml";

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Per-exchange HID read timeout (seconds)
    #[serde(default = "LedgerConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LedgerConfig {
    fn default_timeout_secs() -> u64 { 30 }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// Trezor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrezorConfig {
    /// Trezor waits for on-device confirmation, so the timeout is longer
    #[serde(default = "TrezorConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TrezorConfig {
    fn default_timeout_secs() -> u64 { 60 }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TrezorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

/// GridPlus Lattice configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPlusConfig {
    /// Application name shown on the Lattice when pairing
    #[serde(default = "GridPlusConfig::default_name")]
    pub name: String,

    /// Connector page the credentials are requested from
    #[serde(default = "GridPlusConfig::default_base_url")]
    pub base_url: String,

    /// How often the authorization surface is checked for closure (ms)
    #[serde(default = "GridPlusConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Previously obtained credentials, skipping the pairing flow
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl GridPlusConfig {
    fn default_name() -> String { "eth-wallets".to_string() }
    fn default_base_url() -> String { "https://wallet.gridplus.io".to_string() }
    fn default_poll_interval_ms() -> u64 { 1000 }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for GridPlusConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            base_url: Self::default_base_url(),
            poll_interval_ms: Self::default_poll_interval_ms(),
            device_id: None,
            password: None,
        }
    }
}

/// Mnemonic generation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MnemonicConfig {
    /// Entropy length in bytes (16, 20, 24, 28 or 32)
    #[serde(default = "MnemonicConfig::default_entropy_bytes")]
    pub entropy_bytes: usize,
}

impl MnemonicConfig {
    fn default_entropy_bytes() -> usize { 32 }
}

impl Default for MnemonicConfig {
    fn default() -> Self {
        Self {
            entropy_bytes: Self::default_entropy_bytes(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletsConfig {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub trezor: TrezorConfig,
    #[serde(default)]
    pub gridplus: GridPlusConfig,
    #[serde(default)]
    pub mnemonic: MnemonicConfig,
}

impl WalletsConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            WalletsError::invalid_argument(format!("Invalid configuration: {}", e)).with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file falls back to the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(WalletsError::unknown(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
            .with_source(e)),
        }
    }

    /// Load from `WALLETS_CONFIG` or `wallets.toml`.
    pub fn load_from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        if ![16, 20, 24, 28, 32].contains(&self.mnemonic.entropy_bytes) {
            return Err(WalletsError::invalid_argument(format!(
                "mnemonic.entropy_bytes must be one of 16, 20, 24, 28, 32 (got {})",
                self.mnemonic.entropy_bytes
            )));
        }
        if self.gridplus.poll_interval_ms == 0 {
            return Err(WalletsError::invalid_argument("gridplus.poll_interval_ms must be positive"));
        }
        Ok(())
    }
}
