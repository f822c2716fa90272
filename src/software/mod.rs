//! 内存中的密钥托管 (seed phrase and raw private key)

pub mod mnemonic_phrase;
pub mod private_key;

pub use mnemonic_phrase::MnemonicPhrase;
pub use private_key::PrivateKey;
