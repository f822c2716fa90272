//! Signing provider
//!
//! Transaction validation, signature assembly and serialization on top of
//! `ethers`. Local keys sign through `LocalWallet`; signatures returned by
//! devices are normalized here before the transaction is serialized.

use crate::core::errors::{Result, WalletsError, WalletsErrorKind};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Signature, U256};

/// 交易签名所需字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionRequirements {
    pub chain_id: u64,
    pub nonce: Option<U256>,
}

/// Ensure the transaction carries what the backend needs before any device
/// is touched. `chainId` is always required; `nonce` only when asked for.
pub fn validate_transaction(tx: &TypedTransaction, require_nonce: bool) -> Result<TransactionRequirements> {
    let chain_id = tx
        .chain_id()
        .ok_or_else(|| WalletsError::missing_arguments("Missing chainId on transaction"))?
        .as_u64();

    let nonce = tx.nonce().copied();
    if require_nonce && nonce.is_none() {
        return Err(WalletsError::missing_arguments("Missing nonce on transaction"));
    }

    Ok(TransactionRequirements { chain_id, nonce })
}

/// Unsigned serialization as it is sent to a device (type byte included for
/// typed transactions, EIP-155 fields for legacy ones).
pub fn unsigned_payload(tx: &TypedTransaction) -> Vec<u8> {
    tx.rlp().to_vec()
}

fn local_wallet(private_key: &[u8]) -> Result<LocalWallet> {
    LocalWallet::from_bytes(private_key)
        .map_err(|e| WalletsError::invalid_argument(format!("Invalid private key: {}", e)).with_source(e))
}

/// Address controlled by a raw private key.
pub fn address_of(private_key: &[u8]) -> Result<String> {
    let wallet = local_wallet(private_key)?;
    Ok(ethers::utils::to_checksum(&wallet.address(), None))
}

/// Sign and serialize with a local key.
pub fn sign_transaction_with_key(private_key: &[u8], tx: &TypedTransaction) -> Result<String> {
    let TransactionRequirements { chain_id, .. } = validate_transaction(tx, false)?;
    let wallet = local_wallet(private_key)?.with_chain_id(chain_id);
    let signature = wallet
        .sign_transaction_sync(tx)
        .map_err(|e| WalletsError::unknown(format!("Signing failed: {}", e)).with_source(e))?;
    Ok(format!("0x{}", hex::encode(tx.rlp_signed(&signature))))
}

/// EIP-191 personal message signature with a local key.
pub async fn sign_message_with_key(private_key: &[u8], message: &[u8]) -> Result<String> {
    let wallet = local_wallet(private_key)?;
    let signature = wallet
        .sign_message(message)
        .await
        .map_err(|e| WalletsError::unknown(format!("Signing failed: {}", e)).with_source(e))?;
    Ok(format!("0x{}", hex::encode(signature.to_vec())))
}

/// Recovery parity (0 or 1) from whatever `v` a device reports.
///
/// Devices answer with the raw parity, with `27/28`, or with an EIP-155 value
/// that may be truncated to one byte for large chain IDs.
pub fn recovery_parity(v: u64, chain_id: u64) -> u8 {
    match v {
        0 | 1 => v as u8,
        27 | 28 => (v - 27) as u8,
        _ => {
            let base = (chain_id.wrapping_mul(2).wrapping_add(35)) & 0xff;
            (((v & 0xff) + 256 - base) & 0xff & 1) as u8
        }
    }
}

/// `v` for the serialized transaction: EIP-155 for legacy, parity for typed.
pub fn transaction_v(tx: &TypedTransaction, parity: u8, chain_id: u64) -> u64 {
    match tx {
        TypedTransaction::Legacy(_) => chain_id * 2 + 35 + parity as u64,
        _ => parity as u64,
    }
}

/// Serialize a transaction with a device-produced `(v, r, s)`.
pub fn serialize_with_signature(tx: &TypedTransaction, v: u64, r: &[u8], s: &[u8]) -> Result<String> {
    let TransactionRequirements { chain_id, .. } = validate_transaction(tx, false)?;
    if r.len() != 32 || s.len() != 32 {
        return Err(WalletsError::new(
            WalletsErrorKind::Unknown,
            "Device returned a malformed signature",
        ));
    }

    let parity = recovery_parity(v, chain_id);
    let signature = Signature {
        r: U256::from_big_endian(r),
        s: U256::from_big_endian(s),
        v: transaction_v(tx, parity, chain_id),
    };
    Ok(format!("0x{}", hex::encode(tx.rlp_signed(&signature))))
}

/// Personal message signature assembled from device output, `v` as 27/28.
pub fn message_signature(v: u64, r: &[u8], s: &[u8]) -> Result<String> {
    if r.len() != 32 || s.len() != 32 {
        return Err(WalletsError::unknown("Device returned a malformed signature"));
    }
    let parity = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => other & 1,
    };
    let mut bytes = Vec::with_capacity(65);
    bytes.extend_from_slice(r);
    bytes.extend_from_slice(s);
    bytes.push(27 + parity as u8);
    Ok(format!("0x{}", hex::encode(bytes)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ethers::types::{Address, Eip1559TransactionRequest, TransactionRequest};
    use std::str::FromStr;

    pub(crate) const PRIVATE_KEY: &str = "eaf2c50dfd10524651e7e459c1286f0c2404eb0f34ffd2a1eb14373db49fceb6";
    pub(crate) const SIGNED_LEGACY: &str = "0xf86b0685012a05f20082520894b2bb2b958afa2e96dab3f3ce7162b87daea39017872386f26fc100008029a075b96c4423ea79037099e0f8a0fa7d8538f00c6aaddea26e151320aac65ae3bda05266d81476adedc28c5e769f8bf016de33bdaa49f341435df429e01fe5f9b16e";

    pub(crate) fn legacy_tx() -> TypedTransaction {
        TransactionRequest::new()
            .nonce(6)
            .gas_price(U256::from(0x012a05f200u64))
            .gas(0x5208)
            .to(Address::from_str("0xB2BB2b958aFA2e96dAb3F3Ce7162B87dAea39017").unwrap())
            .value(U256::from(0x2386f26fc10000u64))
            .data(Vec::<u8>::new())
            .chain_id(3)
            .into()
    }

    #[test]
    fn test_sign_legacy_golden() {
        let key = hex::decode(PRIVATE_KEY).unwrap();
        assert_eq!(sign_transaction_with_key(&key, &legacy_tx()).unwrap(), SIGNED_LEGACY);
    }

    #[test]
    fn test_missing_chain_id() {
        let key = hex::decode(PRIVATE_KEY).unwrap();
        let tx: TypedTransaction = TransactionRequest::new().nonce(1).into();
        let err = sign_transaction_with_key(&key, &tx).unwrap_err();
        assert_eq!(err.kind(), WalletsErrorKind::MissingArguments);
    }

    #[test]
    fn test_missing_nonce_when_required() {
        let tx: TypedTransaction = TransactionRequest::new().chain_id(1).into();
        assert!(validate_transaction(&tx, false).is_ok());
        assert_eq!(
            validate_transaction(&tx, true).unwrap_err().kind(),
            WalletsErrorKind::MissingArguments
        );
    }

    #[test]
    fn test_serialize_with_device_signature_matches_local() {
        let tx = legacy_tx();
        let r = hex::decode("75b96c4423ea79037099e0f8a0fa7d8538f00c6aaddea26e151320aac65ae3bd").unwrap();
        let s = hex::decode("5266d81476adedc28c5e769f8bf016de33bdaa49f341435df429e01fe5f9b16e").unwrap();
        // Ledger reports the low byte of the EIP-155 value.
        assert_eq!(serialize_with_signature(&tx, 0x29, &r, &s).unwrap(), SIGNED_LEGACY);
        assert_eq!(serialize_with_signature(&tx, 0, &r, &s).unwrap(), SIGNED_LEGACY);
        assert_eq!(serialize_with_signature(&tx, 27, &r, &s).unwrap(), SIGNED_LEGACY);
    }

    #[test]
    fn test_recovery_parity() {
        assert_eq!(recovery_parity(1, 1), 1);
        assert_eq!(recovery_parity(28, 1), 1);
        assert_eq!(recovery_parity(37, 1), 0);
        assert_eq!(recovery_parity(38, 1), 1);
        // chain 1337 -> 2709 = 0x0a95, truncated to 0x95 / 0x96
        assert_eq!(recovery_parity(0x95, 1337), 0);
        assert_eq!(recovery_parity(0x96, 1337), 1);
    }

    #[test]
    fn test_typed_transaction_uses_parity() {
        let tx: TypedTransaction = Eip1559TransactionRequest::new().chain_id(1).nonce(0).into();
        assert_eq!(transaction_v(&tx, 1, 1), 1);
        assert_eq!(transaction_v(&legacy_tx(), 1, 3), 42);
    }

    #[tokio::test]
    async fn test_sign_message_recovers_signer() {
        let key = hex::decode(PRIVATE_KEY).unwrap();
        let signature = sign_message_with_key(&key, b"hello").await.unwrap();
        let sig = Signature::from_str(signature.trim_start_matches("0x")).unwrap();
        let recovered = sig.recover(ethers::utils::hash_message(b"hello")).unwrap();
        assert_eq!(
            ethers::utils::to_checksum(&recovered, None),
            "0xc6D5a3c98EC9073B54FA0969957Bd582e8D874bf"
        );
    }

    #[test]
    fn test_message_signature_layout() {
        let sig = message_signature(1, &[0x11; 32], &[0x22; 32]).unwrap();
        assert_eq!(sig.len(), 2 + 130);
        assert!(sig.ends_with("1c"));
        assert!(message_signature(27, &[0; 31], &[0; 32]).is_err());
    }
}
