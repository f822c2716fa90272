//! Trezor 硬件wallet集成
//!
//! 此模块实现与 Trezor 设备的通信：
//! - Protobuf 消息编解码
//! - 客户端 (按钮确认, Failure 解析)
//! - HID 传输 (feature `trezor`)

pub mod client;
pub mod messages;
#[cfg(feature = "trezor")]
pub mod transport;
pub mod wallet;

pub use client::{TrezorClient, TrezorDeviceClient, TrezorFailure};
#[cfg(feature = "trezor")]
pub use transport::TrezorHidTransport;
pub use wallet::{TrezorWallet, TrezorWalletInstance};
