//! Ledger 硬件wallet集成
//!
//! 此模块实现与 Ledger Ethereum 应用的通信：
//! - APDU 编解码
//! - Ethereum App
//! - HID 传输 (feature `ledger`)

pub mod apdu;
pub mod ethereum_app;
#[cfg(feature = "ledger")]
pub mod transport;
pub mod wallet;

pub use apdu::LedgerError;
#[cfg(feature = "ledger")]
pub use transport::LedgerHidTransport;
pub use wallet::{LedgerWallet, LedgerWalletInstance};
