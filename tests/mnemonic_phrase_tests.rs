//! 助记词后端集成测试
//!
//! Golden addresses and extended keys for the well-known test phrase.

mod util;

use eth_wallets::core::dpaths::{DEFAULT_ETH, DEFAULT_EWC, EXTENDED_KEY_CHILDREN, LEDGER_ETH, LEDGER_LIVE_ETH};
use eth_wallets::core::hd::ExtendedPublicKey;
use eth_wallets::{create_deterministic_wallet, AddressBatchRequest, BackendConfig, DeterministicWallet, Wallet};
use pretty_assertions::assert_eq;
use util::{DEFAULT_ETH_ADDRESSES, MNEMONIC, SIGNED_LEGACY};

fn wallet() -> Box<dyn DeterministicWallet> {
    create_deterministic_wallet(BackendConfig::mnemonic(MNEMONIC, None)).unwrap()
}

#[tokio::test]
async fn test_default_eth_batch() {
    let addresses = wallet()
        .get_addresses(&AddressBatchRequest::new(DEFAULT_ETH, 5))
        .await
        .unwrap();

    let got: Vec<&str> = addresses.iter().map(|a| a.address.as_str()).collect();
    assert_eq!(got, DEFAULT_ETH_ADDRESSES);
    for (i, entry) in addresses.iter().enumerate() {
        assert_eq!(entry.index, i as u32);
        assert_eq!(entry.d_path, format!("m/44'/60'/0'/0/{}", i));
        assert_eq!(entry.d_path_info, DEFAULT_ETH);
    }
}

#[tokio::test]
async fn test_offset_window_matches_full_batch() {
    let wallet = wallet();
    let window = wallet
        .get_addresses(&AddressBatchRequest::new(DEFAULT_ETH, 2).with_offset(3))
        .await
        .unwrap();

    assert_eq!(window.len(), 2);
    assert_eq!(window[0].address, DEFAULT_ETH_ADDRESSES[3]);
    assert_eq!(window[0].index, 3);
    assert_eq!(window[1].address, DEFAULT_ETH_ADDRESSES[4]);
}

#[tokio::test]
async fn test_single_address_agrees_with_batch() {
    let wallet = wallet();
    for (i, expected) in DEFAULT_ETH_ADDRESSES.iter().enumerate() {
        assert_eq!(wallet.get_address(&DEFAULT_ETH, i as u32).await.unwrap(), *expected);
    }
}

#[tokio::test]
async fn test_hardened_template_batch() {
    let addresses = wallet()
        .get_addresses(&AddressBatchRequest::new(LEDGER_LIVE_ETH, 2))
        .await
        .unwrap();

    assert_eq!(addresses[0].address, "0xc6D5a3c98EC9073B54FA0969957Bd582e8D874bf");
    assert_eq!(addresses[0].d_path, "m/44'/60'/0'/0/0");
    assert_eq!(addresses[1].address, "0x3FE703a2035CB3590C865a09F556eDda02b2Cf12");
    assert_eq!(addresses[1].d_path, "m/44'/60'/1'/0/0");
}

#[tokio::test]
async fn test_multiple_dpaths_keep_request_order() {
    let requests = [
        AddressBatchRequest::new(LEDGER_LIVE_ETH, 1).with_offset(1),
        AddressBatchRequest::new(DEFAULT_ETH, 2),
        AddressBatchRequest::new(LEDGER_ETH, 0),
    ];
    let addresses = wallet().get_addresses_with_multiple_dpaths(&requests).await.unwrap();

    let paths: Vec<&str> = addresses.iter().map(|a| a.d_path.as_str()).collect();
    assert_eq!(paths, ["m/44'/60'/1'/0/0", "m/44'/60'/0'/0/0", "m/44'/60'/0'/0/1"]);
    assert_eq!(addresses[0].d_path_info, LEDGER_LIVE_ETH);
    assert_eq!(addresses[2].d_path_info, DEFAULT_ETH);
}

#[tokio::test]
async fn test_extended_public_keys() {
    let wallet = wallet();
    assert_eq!(
        wallet.get_extended_public_key(&DEFAULT_ETH).await.unwrap(),
        "xpub6DreGKvTo5gf1tXu5N86sz922cFfACvEj8oUrL1nJAbngaMriFQDYk3vA1vpXXGyD5MtH2tbQ8JJScFki5TNSJtRF9T2Qq6ZNLSDhRk2bqc"
    );
    assert_eq!(
        wallet.get_extended_public_key(&DEFAULT_EWC).await.unwrap(),
        "xpub6FQGu6T9QDS9sgVVCskXh4Q9nFtZHtB8vYFe93yGkbyn7E8JPzh5RJJoiJYEC1RgoXYc232VhSPpGRBtjU5hPY42QtdkphzXTgJWgHxZ4dT"
    );
}

#[tokio::test]
async fn test_xpub_derives_the_same_addresses() {
    let xpub = wallet().get_extended_public_key(&DEFAULT_ETH).await.unwrap();
    let node = ExtendedPublicKey::parse(&xpub).unwrap();
    for (i, expected) in DEFAULT_ETH_ADDRESSES.iter().enumerate() {
        assert_eq!(node.derive_child(i as u32).unwrap().address().unwrap(), *expected);
    }
}

#[tokio::test]
async fn test_hardened_templates_have_no_xpub() {
    let err = wallet().get_extended_public_key(&LEDGER_LIVE_ETH).await.unwrap_err();
    assert_eq!(err.kind(), eth_wallets::WalletsErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_root_children_template() {
    let wallet = wallet();
    let root_child = wallet.get_address(&EXTENDED_KEY_CHILDREN, 0).await.unwrap();
    assert_ne!(root_child, DEFAULT_ETH_ADDRESSES[0]);
    assert_eq!(
        wallet
            .get_addresses(&AddressBatchRequest::new(EXTENDED_KEY_CHILDREN, 1))
            .await
            .unwrap()[0]
            .d_path,
        "m/0"
    );
}

#[tokio::test]
async fn test_handle_signs_golden_transaction() {
    let handle = wallet().get_wallet(&DEFAULT_ETH, 0, None).await.unwrap();
    assert_eq!(handle.get_address().await.unwrap(), DEFAULT_ETH_ADDRESSES[0]);
    assert_eq!(handle.sign_transaction(&util::legacy_tx()).await.unwrap(), SIGNED_LEGACY);
    assert_eq!(
        handle.get_private_key().await.unwrap().as_str(),
        format!("0x{}", util::PRIVATE_KEY)
    );
}
