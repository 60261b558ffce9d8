use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::{
    AuthPolicy, BackupShareSlot, CustodyLocation, DEVICE_OBJECT_SCHEMA, DeviceRecoveryObject,
    DeviceShareSlot, FileShareSlot, PasskeyMetadata, RECOVERY_FILE_SCHEMA, RecoveryFileObject,
    SHARE_A_INDEX, SHARE_B_INDEX, SHARE_C_INDEX, SHARE_C_ROLE, WalletProfile,
};
use crate::config::CustodyConfig;
use crate::envelope::{encrypt, share_associated_data};
use crate::error::{CustodyError, Result};
use crate::identity::{MasterSecret, WalletKeypair, hash_card_id};
use crate::kdf::{DeviceKey, KdfEnvelope, derive_user_key, generate_salt};
use crate::shamir::{ShamirShare, Share};

/// Inputs for creating a wallet
pub struct CreateWalletRequest<'a> {
    pub pin: Option<&'a str>,
    pub passphrase: Option<&'a str>,
    /// Raw identifier read from the physical card
    pub card_id: &'a str,
    /// Key from the device-confidential store that seals share B
    pub device_key: &'a DeviceKey,
    pub passkey: PasskeyMetadata,
    pub device_hint: Option<String>,
}

impl<'a> CreateWalletRequest<'a> {
    pub fn new(card_id: &'a str, device_key: &'a DeviceKey) -> Self {
        Self {
            pin: None,
            passphrase: None,
            card_id,
            device_key,
            passkey: PasskeyMetadata::default(),
            device_hint: None,
        }
    }

    pub fn with_pin(mut self, pin: &'a str) -> Self {
        self.pin = Some(pin);
        self
    }

    pub fn with_passphrase(mut self, passphrase: &'a str) -> Self {
        self.passphrase = Some(passphrase);
        self
    }

    pub fn with_passkey(mut self, passkey: PasskeyMetadata) -> Self {
        self.passkey = passkey;
        self
    }

    pub fn with_device_hint(mut self, hint: impl Into<String>) -> Self {
        self.device_hint = Some(hint.into());
        self
    }
}

/// Everything a successful creation hands back to the caller
///
/// Nothing here has been persisted; storing the artifacts and passing
/// `passkey_share` to the passkey vault is up to the caller.
#[derive(Debug)]
pub struct CreatedWallet {
    pub wallet_id: String,
    pub address: String,
    pub recovery_file: RecoveryFileObject,
    pub device_object: DeviceRecoveryObject,
    /// Raw share C destined for the passkey/biometric vault
    pub passkey_share: Share,
    pub profile: WalletProfile,
}

/// Creates a wallet: fresh master secret, 2-of-3 split, and sealed artifacts
///
/// # Errors
/// Every failure is reported as [`CustodyError::WalletCreationFailed`]; no
/// partially built artifact escapes.
pub fn create_wallet(
    request: &CreateWalletRequest<'_>,
    config: &CustodyConfig,
) -> Result<CreatedWallet> {
    build_wallet(request, config).map_err(|e| {
        warn!(error = %e, "wallet creation aborted");
        match e {
            CustodyError::WalletCreationFailed(_) => e,
            other => CustodyError::WalletCreationFailed(other.to_string()),
        }
    })
}

fn build_wallet(
    request: &CreateWalletRequest<'_>,
    config: &CustodyConfig,
) -> Result<CreatedWallet> {
    config.validate()?;
    let card_id_hash = hash_card_id(request.card_id)?;
    if request.pin.is_none() && request.passphrase.is_none() {
        warn!("creating wallet without PIN or passphrase, user key derives from empty input");
    }

    let wallet_id = Uuid::new_v4().to_string();

    let master_secret = MasterSecret::generate()?;
    let keypair = WalletKeypair::from_master_secret(&master_secret);
    let address = keypair.address();

    let shares = ShamirShare::for_wallet(config.split_mode)?.split(master_secret.as_bytes())?;
    drop(master_secret);
    let [share_a, share_b, share_c] = pick_wallet_shares(shares)?;

    let kdf_params = config.kdf.resolve_available();
    let salt = generate_salt()?;
    let user_key = derive_user_key(request.pin, request.passphrase, &salt, &kdf_params)?;

    let share_a_envelope = encrypt(
        &share_a.data,
        user_key.as_bytes(),
        Some(&share_associated_data(&wallet_id, None)),
    )?;
    let share_c_envelope = encrypt(
        &share_c.data,
        user_key.as_bytes(),
        Some(&share_associated_data(&wallet_id, Some(SHARE_C_ROLE))),
    )?;
    drop(user_key);

    let share_b_envelope = encrypt(
        &share_b.data,
        request.device_key.as_bytes(),
        Some(&share_associated_data(&wallet_id, None)),
    )?;

    let now = Utc::now();
    let recovery_file = RecoveryFileObject {
        schema: RECOVERY_FILE_SCHEMA.to_string(),
        wallet_id: wallet_id.clone(),
        created_at: now,
        updated_at: now,
        share_a: FileShareSlot {
            custody: CustodyLocation::RecoveryFile,
            shamir_index: share_a.index,
            kdf: KdfEnvelope::new(&kdf_params, &salt),
            envelope: share_a_envelope,
        },
        share_c_backup: BackupShareSlot {
            shamir_index: share_c.index,
            envelope: share_c_envelope,
        },
        card_id_hash: card_id_hash.clone(),
        passkey: request.passkey.clone(),
        device_hint: request.device_hint.clone(),
    };

    let device_object = DeviceRecoveryObject {
        schema: DEVICE_OBJECT_SCHEMA.to_string(),
        wallet_id: wallet_id.clone(),
        share_b: DeviceShareSlot {
            custody: CustodyLocation::Device,
            shamir_index: share_b.index,
            envelope: share_b_envelope,
        },
    };

    let profile = WalletProfile {
        wallet_id: wallet_id.clone(),
        card_id_hash,
        address: address.clone(),
        auth_policy: AuthPolicy {
            pin_required: request.pin.is_some(),
            secret_required: request.passphrase.is_some(),
        },
        created_at: now,
    };

    info!(wallet_id = %wallet_id, address = %address, kdf = kdf_params.tag(), "wallet created");

    Ok(CreatedWallet {
        wallet_id,
        address,
        recovery_file,
        device_object,
        passkey_share: share_c,
        profile,
    })
}

/// Orders the split output as (A, B, C) by x-coordinate
fn pick_wallet_shares(shares: Vec<Share>) -> Result<[Share; 3]> {
    let mut slots: [Option<Share>; 3] = [None, None, None];
    for share in shares {
        let slot = match share.index {
            SHARE_A_INDEX => 0,
            SHARE_B_INDEX => 1,
            SHARE_C_INDEX => 2,
            other => {
                return Err(CustodyError::WalletCreationFailed(format!(
                    "unexpected share index {other}"
                )));
            }
        };
        slots[slot] = Some(share);
    }

    match slots {
        [Some(a), Some(b), Some(c)] => Ok([a, b, c]),
        _ => Err(CustodyError::WalletCreationFailed(
            "split did not produce three shares".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::decrypt;
    use crate::kdf::{KdfParams, generate_device_key};

    fn fast_config() -> CustodyConfig {
        CustodyConfig::new()
            .with_kdf(KdfParams::Pbkdf2Sha256 { iterations: 2_000 })
            .unwrap()
    }

    #[test]
    fn test_creates_consistent_artifacts() {
        let device_key = generate_device_key("pending").unwrap();
        let request = CreateWalletRequest::new("04:A2:1F:9C", &device_key)
            .with_pin("483920")
            .with_device_hint("test-device");
        let created = create_wallet(&request, &fast_config()).unwrap();

        assert_eq!(created.recovery_file.wallet_id, created.wallet_id);
        assert_eq!(created.device_object.wallet_id, created.wallet_id);
        assert_eq!(created.profile.wallet_id, created.wallet_id);
        assert_eq!(created.profile.address, created.address);
        assert_eq!(created.profile.card_id_hash, hash_card_id("04a21f9c").unwrap());
        assert_eq!(created.recovery_file.card_id_hash, created.profile.card_id_hash);
        assert!(created.profile.auth_policy.pin_required);
        assert!(!created.profile.auth_policy.secret_required);

        assert_eq!(created.recovery_file.share_a.shamir_index, SHARE_A_INDEX);
        assert_eq!(created.device_object.share_b.shamir_index, SHARE_B_INDEX);
        assert_eq!(created.recovery_file.share_c_backup.shamir_index, SHARE_C_INDEX);
        assert_eq!(created.passkey_share.index, SHARE_C_INDEX);
        assert_eq!(created.passkey_share.data.len(), 32);
        assert_eq!(created.recovery_file.device_hint.as_deref(), Some("test-device"));
        created.recovery_file.validate().unwrap();
        created.device_object.validate().unwrap();
    }

    #[test]
    fn test_share_b_bound_to_device_key() {
        let device_key = generate_device_key("pending").unwrap();
        let created = create_wallet(
            &CreateWalletRequest::new("c0ffee", &device_key).with_pin("1111"),
            &fast_config(),
        )
        .unwrap();

        let aad = share_associated_data(&created.wallet_id, None);
        let share_b = decrypt(
            &created.device_object.share_b.envelope,
            device_key.as_bytes(),
            Some(&aad),
        )
        .unwrap();
        assert_eq!(share_b.len(), 32);

        let other_key = generate_device_key("other").unwrap();
        assert!(matches!(
            decrypt(
                &created.device_object.share_b.envelope,
                other_key.as_bytes(),
                Some(&aad)
            ),
            Err(CustodyError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_share_c_backup_matches_passkey_share() {
        let device_key = generate_device_key("pending").unwrap();
        let created = create_wallet(
            &CreateWalletRequest::new("c0ffee", &device_key).with_pin("1111"),
            &fast_config(),
        )
        .unwrap();

        let kdf = &created.recovery_file.share_a.kdf;
        let user_key = derive_user_key(
            Some("1111"),
            None,
            &kdf.salt_bytes().unwrap(),
            &kdf.params().unwrap(),
        )
        .unwrap();
        let backup = decrypt(
            &created.recovery_file.share_c_backup.envelope,
            user_key.as_bytes(),
            Some(&share_associated_data(&created.wallet_id, Some(SHARE_C_ROLE))),
        )
        .unwrap();
        assert_eq!(&backup[..], &created.passkey_share.data[..]);

        // The backup slot does not open with share A's associated data
        assert!(matches!(
            decrypt(
                &created.recovery_file.share_c_backup.envelope,
                user_key.as_bytes(),
                Some(&share_associated_data(&created.wallet_id, None)),
            ),
            Err(CustodyError::AuthenticationFailure)
        ));
    }

    #[test]
    fn test_each_wallet_is_unique() {
        let device_key = generate_device_key("pending").unwrap();
        let request = CreateWalletRequest::new("c0ffee", &device_key).with_pin("1111");
        let a = create_wallet(&request, &fast_config()).unwrap();
        let b = create_wallet(&request, &fast_config()).unwrap();
        assert_ne!(a.wallet_id, b.wallet_id);
        assert_ne!(a.address, b.address);
        assert_ne!(
            a.recovery_file.share_a.kdf.salt,
            b.recovery_file.share_a.kdf.salt
        );
    }

    #[test]
    fn test_failure_is_wallet_creation_failed() {
        let device_key = generate_device_key("pending").unwrap();
        let request = CreateWalletRequest::new("xyz!", &device_key).with_pin("1111");
        assert!(matches!(
            create_wallet(&request, &fast_config()),
            Err(CustodyError::WalletCreationFailed(_))
        ));

        let weak = CustodyConfig {
            kdf: KdfParams::Pbkdf2Sha256 { iterations: 1 },
            ..CustodyConfig::default()
        };
        let request = CreateWalletRequest::new("c0ffee", &device_key).with_pin("1111");
        assert!(matches!(
            create_wallet(&request, &weak),
            Err(CustodyError::WalletCreationFailed(_))
        ));
    }
}
