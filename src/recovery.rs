use std::fmt;

use tracing::{debug, info};

use crate::artifacts::{
    DeviceRecoveryObject, RecoveryFileObject, SHARE_A_INDEX, SHARE_B_INDEX, SHARE_C_INDEX,
    SHARE_C_ROLE, WalletProfile,
};
use crate::envelope::{decrypt, share_associated_data};
use crate::error::{CustodyError, Result};
use crate::identity::{MasterSecret, WalletKeypair};
use crate::kdf::{DeviceKey, SymmetricKey, derive_user_key};
use crate::shamir::{ShamirShare, Share};

/// The human factors protecting the recovery file
#[derive(Clone, Copy, Default)]
pub struct UserCredentials<'a> {
    pub pin: Option<&'a str>,
    pub passphrase: Option<&'a str>,
}

impl<'a> UserCredentials<'a> {
    pub fn pin(pin: &'a str) -> Self {
        Self {
            pin: Some(pin),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: &'a str) -> Self {
        self.passphrase = Some(passphrase);
        self
    }
}

impl fmt::Debug for UserCredentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("pin", &self.pin.map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.map(|_| "<redacted>"))
            .finish()
    }
}

/// The supported combinations of two shares
#[derive(Debug)]
pub enum UnlockPath<'a> {
    /// Shares A and C from the recovery file, both under the user key.
    /// A raw passkey share, when supplied, replaces the C backup.
    FileWithCredentials {
        recovery_file: &'a RecoveryFileObject,
        credentials: UserCredentials<'a>,
        passkey_share: Option<&'a Share>,
    },
    /// Share B from the device plus the raw share C from the passkey vault
    DeviceWithPasskey {
        device_object: &'a DeviceRecoveryObject,
        device_key: &'a DeviceKey,
        passkey_share: &'a Share,
    },
    /// Share A from the recovery file plus share B from the device
    FileWithDevice {
        recovery_file: &'a RecoveryFileObject,
        credentials: UserCredentials<'a>,
        device_object: &'a DeviceRecoveryObject,
        device_key: &'a DeviceKey,
    },
}

impl UnlockPath<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            UnlockPath::FileWithCredentials { .. } => "file+credentials",
            UnlockPath::DeviceWithPasskey { .. } => "device+passkey",
            UnlockPath::FileWithDevice { .. } => "file+device",
        }
    }
}

/// A successfully unlocked wallet. The keypair is the only secret state.
#[derive(Debug)]
pub struct RecoveredWallet {
    pub wallet_id: String,
    pub address: String,
    pub keypair: WalletKeypair,
}

/// Reconstructs the wallet keypair through one unlock path
///
/// The recovered address must equal `expected.address`.
///
/// # Errors
/// Wrong PIN/passphrase, wrong device key, tampered envelopes, artifacts of a
/// different wallet and an address mismatch all return
/// [`CustodyError::WrongCredential`]. The underlying reason is only logged at
/// debug level.
pub fn recover_wallet(
    path: &UnlockPath<'_>,
    expected: &WalletProfile,
) -> Result<RecoveredWallet> {
    debug!(wallet_id = %expected.wallet_id, path = path.name(), "recovery attempt");

    let result = collect_shares(path, &expected.wallet_id)
        .and_then(|shares| {
            // Past this point every envelope opened, so a failure must not
            // read differently from a wrong credential
            rebuild_keypair(&shares).map_err(|e| {
                debug!(
                    wallet_id = %expected.wallet_id,
                    error = %e,
                    "decrypted shares do not combine"
                );
                CustodyError::WrongCredential
            })
        })
        .and_then(|keypair| {
            let address = keypair.address();
            if address != expected.address {
                debug!(
                    wallet_id = %expected.wallet_id,
                    "reconstructed address does not match profile"
                );
                return Err(CustodyError::WrongCredential);
            }
            Ok(RecoveredWallet {
                wallet_id: expected.wallet_id.clone(),
                address,
                keypair,
            })
        });

    match result {
        Ok(recovered) => {
            info!(wallet_id = %recovered.wallet_id, path = path.name(), "wallet recovered");
            Ok(recovered)
        }
        Err(CustodyError::AuthenticationFailure) => {
            debug!(
                wallet_id = %expected.wallet_id,
                path = path.name(),
                "envelope authentication failed"
            );
            Err(CustodyError::WrongCredential)
        }
        Err(e) => Err(e),
    }
}

fn collect_shares(path: &UnlockPath<'_>, wallet_id: &str) -> Result<Vec<Share>> {
    match *path {
        UnlockPath::FileWithCredentials {
            recovery_file,
            credentials,
            passkey_share,
        } => {
            ensure_wallet(&recovery_file.wallet_id, wallet_id)?;
            if let Some(share) = passkey_share {
                check_passkey_share(share, SHARE_C_INDEX)?;
            }
            let user_key = user_key_for(recovery_file, credentials)?;
            let share_a = open_share_a(recovery_file, &user_key)?;
            let share_c = match passkey_share {
                Some(share) => share.clone(),
                None => open_share_c_backup(recovery_file, &user_key)?,
            };
            Ok(vec![share_a, share_c])
        }
        UnlockPath::DeviceWithPasskey {
            device_object,
            device_key,
            passkey_share,
        } => {
            ensure_wallet(&device_object.wallet_id, wallet_id)?;
            check_passkey_share(passkey_share, SHARE_C_INDEX)?;
            let share_b = open_share_b(device_object, device_key)?;
            Ok(vec![share_b, passkey_share.clone()])
        }
        UnlockPath::FileWithDevice {
            recovery_file,
            credentials,
            device_object,
            device_key,
        } => {
            ensure_wallet(&recovery_file.wallet_id, wallet_id)?;
            ensure_wallet(&device_object.wallet_id, wallet_id)?;
            let user_key = user_key_for(recovery_file, credentials)?;
            let share_a = open_share_a(recovery_file, &user_key)?;
            drop(user_key);
            let share_b = open_share_b(device_object, device_key)?;
            Ok(vec![share_a, share_b])
        }
    }
}

fn rebuild_keypair(shares: &[Share]) -> Result<WalletKeypair> {
    let secret_bytes = ShamirShare::combine(shares)?;
    let master_secret = MasterSecret::from_slice(&secret_bytes)?;
    Ok(WalletKeypair::from_master_secret(&master_secret))
}

fn ensure_wallet(artifact_wallet_id: &str, expected: &str) -> Result<()> {
    if artifact_wallet_id != expected {
        debug!(artifact = artifact_wallet_id, expected, "artifact belongs to another wallet");
        return Err(CustodyError::WrongCredential);
    }
    Ok(())
}

fn check_passkey_share(share: &Share, expected_index: u8) -> Result<()> {
    if share.index != expected_index {
        return Err(CustodyError::InvalidShares(format!(
            "passkey share has index {}, expected {expected_index}",
            share.index
        )));
    }
    Ok(())
}

fn user_key_for(
    file: &RecoveryFileObject,
    credentials: UserCredentials<'_>,
) -> Result<SymmetricKey> {
    let kdf = &file.share_a.kdf;
    let params = kdf.params()?;
    let salt = kdf.salt_bytes()?;
    derive_user_key(credentials.pin, credentials.passphrase, &salt, &params)
}

/// Checked before decrypting so a bad slot fails the same way for any credential
fn check_slot_index(slot: &str, index: u8, expected: u8) -> Result<()> {
    if index != expected {
        return Err(CustodyError::InvalidRecoveryFile(format!(
            "{slot} carries index {index}, expected {expected}"
        )));
    }
    Ok(())
}

fn open_share_a(file: &RecoveryFileObject, user_key: &SymmetricKey) -> Result<Share> {
    check_slot_index("share A", file.share_a.shamir_index, SHARE_A_INDEX)?;
    let aad = share_associated_data(&file.wallet_id, None);
    let data = decrypt(&file.share_a.envelope, user_key.as_bytes(), Some(&aad))?;
    Share::wallet_share(file.share_a.shamir_index, data.to_vec())
}

fn open_share_c_backup(file: &RecoveryFileObject, user_key: &SymmetricKey) -> Result<Share> {
    check_slot_index("share C backup", file.share_c_backup.shamir_index, SHARE_C_INDEX)?;
    let aad = share_associated_data(&file.wallet_id, Some(SHARE_C_ROLE));
    let data = decrypt(&file.share_c_backup.envelope, user_key.as_bytes(), Some(&aad))?;
    Share::wallet_share(file.share_c_backup.shamir_index, data.to_vec())
}

fn open_share_b(device: &DeviceRecoveryObject, device_key: &DeviceKey) -> Result<Share> {
    check_slot_index("share B", device.share_b.shamir_index, SHARE_B_INDEX)?;
    let aad = share_associated_data(&device.wallet_id, None);
    let data = decrypt(&device.share_b.envelope, device_key.as_bytes(), Some(&aad))?;
    Share::wallet_share(device.share_b.shamir_index, data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustodyConfig;
    use crate::creation::{CreateWalletRequest, CreatedWallet, create_wallet};
    use crate::kdf::{KdfParams, generate_device_key};

    fn create(pin: &str, device_key: &DeviceKey) -> CreatedWallet {
        let config = CustodyConfig::new()
            .with_kdf(KdfParams::Pbkdf2Sha256 { iterations: 2_000 })
            .unwrap();
        create_wallet(&CreateWalletRequest::new("04a21f9c", device_key).with_pin(pin), &config)
            .unwrap()
    }

    #[test]
    fn test_file_with_device() {
        let device_key = generate_device_key("w").unwrap();
        let created = create("2468", &device_key);

        let path = UnlockPath::FileWithDevice {
            recovery_file: &created.recovery_file,
            credentials: UserCredentials::pin("2468"),
            device_object: &created.device_object,
            device_key: &device_key,
        };
        let recovered = recover_wallet(&path, &created.profile).unwrap();
        assert_eq!(recovered.address, created.address);
        assert_eq!(recovered.keypair.address(), created.address);
    }

    #[test]
    fn test_file_with_passkey_share_instead_of_backup() {
        let device_key = generate_device_key("w").unwrap();
        let created = create("2468", &device_key);

        let path = UnlockPath::FileWithCredentials {
            recovery_file: &created.recovery_file,
            credentials: UserCredentials::pin("2468"),
            passkey_share: Some(&created.passkey_share),
        };
        assert_eq!(
            recover_wallet(&path, &created.profile).unwrap().address,
            created.address
        );
    }

    #[test]
    fn test_wrong_device_key_is_wrong_credential() {
        let device_key = generate_device_key("w").unwrap();
        let created = create("2468", &device_key);
        let stranger = generate_device_key("w").unwrap();

        let path = UnlockPath::DeviceWithPasskey {
            device_object: &created.device_object,
            device_key: &stranger,
            passkey_share: &created.passkey_share,
        };
        assert!(matches!(
            recover_wallet(&path, &created.profile),
            Err(CustodyError::WrongCredential)
        ));
    }

    #[test]
    fn test_profile_mismatch_is_wrong_credential() {
        let device_key = generate_device_key("w").unwrap();
        let created = create("2468", &device_key);
        let other = create("2468", &device_key);

        // Artifacts of one wallet checked against another wallet's profile
        let path = UnlockPath::FileWithCredentials {
            recovery_file: &created.recovery_file,
            credentials: UserCredentials::pin("2468"),
            passkey_share: None,
        };
        assert!(matches!(
            recover_wallet(&path, &other.profile),
            Err(CustodyError::WrongCredential)
        ));

        // Correct wallet id but a different recorded address
        let mut forged = created.profile.clone();
        forged.address = other.address.clone();
        assert!(matches!(
            recover_wallet(&path, &forged),
            Err(CustodyError::WrongCredential)
        ));
    }

    #[test]
    fn test_passkey_share_from_other_wallet_is_rejected() {
        let device_key = generate_device_key("w").unwrap();
        let created = create("2468", &device_key);
        let other = create("2468", &device_key);

        let path = UnlockPath::DeviceWithPasskey {
            device_object: &created.device_object,
            device_key: &device_key,
            passkey_share: &other.passkey_share,
        };
        assert!(matches!(
            recover_wallet(&path, &created.profile),
            Err(CustodyError::WrongCredential)
        ));
    }

    #[test]
    fn test_passkey_share_with_wrong_index() {
        let device_key = generate_device_key("w").unwrap();
        let created = create("2468", &device_key);
        let mut share = created.passkey_share.clone();
        share.index = 1;

        let path = UnlockPath::DeviceWithPasskey {
            device_object: &created.device_object,
            device_key: &device_key,
            passkey_share: &share,
        };
        assert!(matches!(
            recover_wallet(&path, &created.profile),
            Err(CustodyError::InvalidShares(_))
        ));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let printed = format!("{:?}", UserCredentials::pin("2468").with_passphrase("hunter2"));
        assert!(!printed.contains("2468"));
        assert!(!printed.contains("hunter2"));
    }
}
