//! GridPlus Lattice 集成
//!
//! - Lattice SDK 客户端接口
//! - 配对状态机
//! - 后端

pub mod client;
pub mod pairing;
pub mod wallet;

pub use client::{LatticeClient, LatticeConnector, LatticeError};
pub use pairing::{AuthorizationSurface, GridPlusCredentials, PairingError, PairingState};
pub use wallet::{GridPlusWallet, GridPlusWalletInstance};
