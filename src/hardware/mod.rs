//! 硬件wallet集成模块
//!
//! 此模块提供与硬件wallet (Ledger, Trezor, GridPlus Lattice) 的集成。
//! Protocol and backend code is always built; the HID transports need the
//! `ledger` / `trezor` features.

pub mod errors;
pub mod gridplus;
pub mod hardware_wallet;
pub mod ledger;
pub mod transport;
pub mod trezor;

pub use errors::{normalize, NativeError};
pub use gridplus::GridPlusWallet;
pub use hardware_wallet::{DeviceSignature, HardwareWallet};
pub use ledger::LedgerWallet;
pub use transport::{DeviceTransport, TransportError};
pub use trezor::TrezorWallet;
