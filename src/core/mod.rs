pub mod address;
pub mod config;
pub mod dpath;
pub mod dpaths;
pub mod errors;
pub mod extended_key;
pub mod hd;
pub mod signing;
pub mod wallet;

// 重新导出关键结构
pub use dpaths::DerivationPath;
pub use errors::{Result, WalletsError, WalletsErrorKind};
pub use extended_key::{build_extended_public_key, ExtendedKeyPair};
pub use wallet::{AddressBatchRequest, DeterministicAddress, DeterministicWallet, Wallet};
