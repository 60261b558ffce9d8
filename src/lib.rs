//! Key custody core for a self-custodial wallet
//!
//! A wallet's 32-byte master secret is split into three Shamir shares with
//! threshold 2. Share A lives in an exportable recovery file under a key
//! derived from the user's PIN and/or passphrase, share B lives on the device
//! under a device-resident key, and share C goes to a passkey/biometric vault
//! (with a backup copy in the recovery file). Any two shares rebuild the
//! wallet keypair.
//!
//! # Quick Start
//!
//! ```
//! use keycustody::{
//!     create_wallet, generate_device_key, recover_wallet, CreateWalletRequest, CustodyConfig,
//!     KdfParams, RecoveryFileObject, UnlockPath, UserCredentials,
//! };
//!
//! let config = CustodyConfig::new()
//!     .with_kdf(KdfParams::Pbkdf2Sha256 { iterations: 2_000 })
//!     .unwrap();
//! let device_key = generate_device_key("new-wallet").unwrap();
//!
//! let request = CreateWalletRequest::new("04:A2:1F:9C", &device_key).with_pin("483920");
//! let created = create_wallet(&request, &config).unwrap();
//!
//! // Export and re-import the recovery file
//! let exported = created.recovery_file.to_json().unwrap();
//! let imported = RecoveryFileObject::from_json(&exported).unwrap();
//!
//! let path = UnlockPath::FileWithCredentials {
//!     recovery_file: &imported,
//!     credentials: UserCredentials::pin("483920"),
//!     passkey_share: None,
//! };
//! let recovered = recover_wallet(&path, &created.profile).unwrap();
//! assert_eq!(recovered.address, created.address);
//! ```

mod artifacts;
mod config;
mod creation;
mod envelope;
mod error;
mod finite_field;
mod identity;
mod kdf;
mod random;
mod recovery;
mod shamir;
mod storage;

pub use artifacts::{
    AuthPolicy, BackupShareSlot, CustodyLocation, DEVICE_OBJECT_SCHEMA, DeviceRecoveryObject,
    DeviceShareSlot, FileShareSlot, PasskeyMetadata, RECOVERY_FILE_SCHEMA, RecoveryFileObject,
    SHARE_A_INDEX, SHARE_B_INDEX, SHARE_C_INDEX, SHARE_C_ROLE, WalletProfile,
};
pub use config::{CustodyConfig, SplitMode};
pub use creation::{CreateWalletRequest, CreatedWallet, create_wallet};
pub use envelope::{
    AeadAlgorithm, ENVELOPE_VERSION, EncryptedEnvelope, PROTOCOL_TAG, XNONCE_LEN,
    associated_data_for, decrypt, encrypt, share_associated_data,
};
pub use error::{CustodyError, Result, WRONG_CREDENTIAL_MESSAGE};
pub use finite_field::FiniteField;
pub use identity::{
    MASTER_SECRET_LEN, WalletKeypair, address_from_public_key, hash_card_id, normalize_card_id,
};
pub use kdf::{
    DEFAULT_PBKDF2_ITERATIONS, DeviceKey, FALLBACK_PBKDF2_ITERATIONS, KEY_LEN, KdfEnvelope,
    KdfParams, SALT_LEN, SymmetricKey, derive_user_key, generate_device_key, generate_salt,
};
pub use recovery::{RecoveredWallet, UnlockPath, UserCredentials, recover_wallet};
pub use shamir::{ShamirShare, ShamirShareBuilder, Share, WALLET_SHARE_COUNT, WALLET_THRESHOLD};
pub use storage::{FileWalletStore, MemoryWalletStore, StoreKey, WalletRegistry, WalletStore};

// Re-export common types for convenience
pub mod prelude {
    pub use super::{
        CreateWalletRequest, CustodyConfig, CustodyError, DeviceKey, DeviceRecoveryObject,
        RecoveryFileObject, Result, ShamirShare, Share, UnlockPath, UserCredentials,
        WalletProfile, WalletRegistry, WalletStore, create_wallet, recover_wallet,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn fast_config() -> CustodyConfig {
        CustodyConfig::new()
            .with_kdf(KdfParams::Pbkdf2Sha256 { iterations: 2_000 })
            .unwrap()
    }

    #[test]
    fn test_full_workflow_through_file_store() -> Result<()> {
        let temp_dir = tempdir()?;
        let mut registry = WalletRegistry::new(FileWalletStore::new(temp_dir.path())?);

        let device_key = generate_device_key("pending")?;
        let request = CreateWalletRequest::new("04:A2:1F:9C", &device_key).with_pin("483920");
        let created = create_wallet(&request, &fast_config())?;
        registry.persist_created_wallet(&created, &device_key)?;

        // A later session only has the store and the scanned card
        let profile = registry
            .find_by_card("04a2 1f9c")?
            .expect("card should map to the wallet");
        let device_object = registry.load_device_object(&profile.wallet_id)?.unwrap();
        let stored_key = registry.load_device_key(&profile.wallet_id)?.unwrap();
        let recovery_file = registry.load_recovery_file(&profile.wallet_id)?.unwrap();

        let path = UnlockPath::FileWithDevice {
            recovery_file: &recovery_file,
            credentials: UserCredentials::pin("483920"),
            device_object: &device_object,
            device_key: &stored_key,
        };
        let recovered = recover_wallet(&path, &profile)?;
        assert_eq!(recovered.address, created.address);

        Ok(())
    }

    #[test]
    fn test_error_handling() {
        assert!(matches!(
            ShamirShare::builder(2, 3).build(),
            Err(CustodyError::InvalidParameters(_))
        ));

        let mut shamir = ShamirShare::builder(3, 2).build().unwrap();
        let shares = shamir.split(b"test").unwrap();
        assert!(matches!(
            ShamirShare::combine(&shares[0..1]),
            Err(CustodyError::InvalidShares(_))
        ));
    }
}
