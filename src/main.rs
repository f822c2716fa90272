// src/main.rs
//! eth-wallets entry point
//! Offline inspection of derivation paths, addresses and xpubs.
use anyhow::{anyhow, Result};
use clap::Parser;
use eth_wallets::backend::{create_deterministic_wallet, BackendConfig};
use eth_wallets::cli::{Cli, Commands, Device};
use eth_wallets::core::config::WalletsConfig;
use eth_wallets::core::dpaths::{
    find_by_name, trezor_derivation_paths, DerivationPath, ALL_DERIVATION_PATHS, LEDGER_DERIVATION_PATHS,
};
use eth_wallets::core::AddressBatchRequest;
use eth_wallets::software::MnemonicPhrase;
use rand::rngs::OsRng;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging()?;

    info!("Starting eth-wallets v{}", env!("CARGO_PKG_VERSION"));
    let config = WalletsConfig::load_from_env()?;

    match cli.command {
        Commands::Paths { device } => {
            let paths: Vec<&DerivationPath> = match device {
                None => ALL_DERIVATION_PATHS.iter().collect(),
                Some(Device::Ledger) => LEDGER_DERIVATION_PATHS.iter().collect(),
                Some(Device::Trezor) => trezor_derivation_paths().collect(),
            };
            println!("{}", serde_json::to_string_pretty(&paths)?);
        }
        Commands::Addresses {
            mnemonic,
            passphrase,
            path,
            limit,
            offset,
        } => {
            let path = lookup_path(&path)?;
            let wallet = create_deterministic_wallet(BackendConfig::mnemonic(&mnemonic, passphrase.as_deref()))?;
            let request = AddressBatchRequest::new(*path, limit).with_offset(offset);
            let addresses = wallet.get_addresses(&request).await?;
            println!("{}", serde_json::to_string_pretty(&addresses)?);
        }
        Commands::Xpub {
            mnemonic,
            passphrase,
            path,
        } => {
            let path = lookup_path(&path)?;
            let wallet = create_deterministic_wallet(BackendConfig::mnemonic(&mnemonic, passphrase.as_deref()))?;
            let xpub = wallet.get_extended_public_key(path).await?;
            println!("{}", serde_json::json!({ "path": path.path, "xpub": xpub }));
        }
        Commands::GenerateMnemonic => {
            let phrase = MnemonicPhrase::generate_with_entropy(&mut OsRng, config.mnemonic.entropy_bytes, None)?;
            println!("{}", phrase.phrase());
        }
    }

    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Registry entry by display name or by template.
fn lookup_path(name: &str) -> Result<&'static DerivationPath> {
    find_by_name(name)
        .or_else(|| ALL_DERIVATION_PATHS.iter().find(|candidate| candidate.path == name))
        .ok_or_else(|| anyhow!("Unknown derivation path: {}", name))
}
