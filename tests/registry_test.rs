use keycustody::{
    CreateWalletRequest, CustodyConfig, FileWalletStore, KdfParams, MemoryWalletStore,
    UnlockPath, WalletRegistry, WalletStore, create_wallet, generate_device_key, recover_wallet,
};
use tempfile::tempdir;

fn fast_config() -> CustodyConfig {
    CustodyConfig::new()
        .with_kdf(KdfParams::Pbkdf2Sha256 { iterations: 2_000 })
        .unwrap()
}

#[test]
fn test_card_lookup_across_wallets() {
    let mut registry = WalletRegistry::new(MemoryWalletStore::new());
    let config = fast_config();

    let mut created = Vec::new();
    for card in ["04:A2:1F:9C", "04:B7:00:01"] {
        let device_key = generate_device_key("pending").unwrap();
        let wallet = create_wallet(
            &CreateWalletRequest::new(card, &device_key).with_pin("1234"),
            &config,
        )
        .unwrap();
        registry.persist_created_wallet(&wallet, &device_key).unwrap();
        created.push(wallet);
    }

    assert_eq!(registry.list_profiles().unwrap().len(), 2);
    assert_eq!(
        registry.find_by_card("04b70001").unwrap().unwrap().wallet_id,
        created[1].wallet_id
    );
    assert_eq!(
        registry.find_by_card("04-a2-1f-9c").unwrap().unwrap().address,
        created[0].address
    );
    assert!(registry.find_by_card("ffffffff").unwrap().is_none());
}

#[test]
fn test_store_never_holds_plaintext_shares() {
    let mut registry = WalletRegistry::new(MemoryWalletStore::new());
    let device_key = generate_device_key("pending").unwrap();
    let wallet = create_wallet(
        &CreateWalletRequest::new("04:A2:1F:9C", &device_key).with_pin("1234"),
        &fast_config(),
    )
    .unwrap();
    registry.persist_created_wallet(&wallet, &device_key).unwrap();

    let store = registry.into_inner();
    let share_hex = hex::encode(&wallet.passkey_share.data);
    for key in [
        "wallet_index".to_string(),
        format!("device_object:{}", wallet.wallet_id),
        format!("recovery_file:{}", wallet.wallet_id),
    ] {
        let bytes = store.get(&key).unwrap().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(!text.contains(&share_hex), "{key} leaks the passkey share");
        assert!(!text.contains("04a21f9c"), "{key} leaks the raw card id");
    }
    assert!(store.get(&format!("passkey_share:{}", wallet.wallet_id)).unwrap().is_none());
}

#[test]
fn test_passkey_share_slot_and_removal() {
    let temp_dir = tempdir().unwrap();
    let mut registry = WalletRegistry::new(FileWalletStore::new(temp_dir.path()).unwrap());
    let device_key = generate_device_key("pending").unwrap();
    let wallet = create_wallet(
        &CreateWalletRequest::new("c0ffee", &device_key).with_pin("1234"),
        &fast_config(),
    )
    .unwrap();
    registry.persist_created_wallet(&wallet, &device_key).unwrap();

    registry
        .store_passkey_share(&wallet.wallet_id, b"opaque-wrapped-blob")
        .unwrap();
    assert_eq!(
        registry.load_passkey_share(&wallet.wallet_id).unwrap().as_deref(),
        Some(&b"opaque-wrapped-blob"[..])
    );

    registry.remove_wallet(&wallet.wallet_id).unwrap();
    assert!(registry.load_profile(&wallet.wallet_id).unwrap().is_none());
    assert!(registry.load_device_object(&wallet.wallet_id).unwrap().is_none());
    assert!(registry.load_device_key(&wallet.wallet_id).unwrap().is_none());
    assert!(registry.load_recovery_file(&wallet.wallet_id).unwrap().is_none());
    assert!(registry.load_passkey_share(&wallet.wallet_id).unwrap().is_none());
}

#[test]
fn test_device_path_from_store() {
    let mut registry = WalletRegistry::new(MemoryWalletStore::new());
    let device_key = generate_device_key("pending").unwrap();
    let wallet = create_wallet(
        &CreateWalletRequest::new("c0ffee", &device_key).with_pin("1234"),
        &fast_config(),
    )
    .unwrap();
    registry.persist_created_wallet(&wallet, &device_key).unwrap();

    let profile = registry.find_by_card("C0:FF:EE").unwrap().unwrap();
    let device_object = registry.load_device_object(&profile.wallet_id).unwrap().unwrap();
    let stored_key = registry.load_device_key(&profile.wallet_id).unwrap().unwrap();

    let path = UnlockPath::DeviceWithPasskey {
        device_object: &device_object,
        device_key: &stored_key,
        passkey_share: &wallet.passkey_share,
    };
    assert_eq!(recover_wallet(&path, &profile).unwrap().address, wallet.address);
}
