use clap::{Parser, Subcommand, ValueEnum};

/// eth-wallets CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(name = "eth-wallets", about = "Ethereum HD address derivation", disable_help_subcommand = true)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Device {
    Ledger,
    Trezor,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List registered derivation paths
    Paths {
        /// Only paths offered for this device
        #[arg(long, value_enum)]
        device: Option<Device>,
    },
    /// Derive addresses from a mnemonic phrase
    Addresses {
        #[arg(long)]
        mnemonic: String,
        #[arg(long)]
        passphrase: Option<String>,
        /// Registry name ("Default (ETH)") or template ("m/44'/60'/0'/0/<account>")
        #[arg(long, default_value = "Default (ETH)")]
        path: String,
        #[arg(long, default_value_t = 5)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Print the xpub of the node a path's addresses derive from
    Xpub {
        #[arg(long)]
        mnemonic: String,
        #[arg(long)]
        passphrase: Option<String>,
        #[arg(long, default_value = "Default (ETH)")]
        path: String,
    },
    /// Generate a new random mnemonic phrase
    GenerateMnemonic,
}
