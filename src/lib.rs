// src/lib.rs
//! Uniform Ethereum address derivation and signing over seed phrases, raw
//! private keys and hardware wallets (Ledger, Trezor, GridPlus Lattice).

pub mod backend;
pub mod cli;
pub mod core;
pub mod hardware;
pub mod software;

pub use backend::{create_deterministic_wallet, create_private_key_wallet, BackendConfig};
pub use crate::core::{
    AddressBatchRequest, DerivationPath, DeterministicAddress, DeterministicWallet, Result, Wallet, WalletsError,
    WalletsErrorKind,
};
