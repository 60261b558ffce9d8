//! Portable artifacts produced at wallet creation: the exportable recovery
//! file, the device-resident object and the public wallet profile.
//!
//! Imports validate the schema tag before any other field is read.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::envelope::EncryptedEnvelope;
use crate::error::{CustodyError, Result};
use crate::kdf::KdfEnvelope;

pub const RECOVERY_FILE_SCHEMA: &str = "keycustody.recovery-file/v1";
pub const DEVICE_OBJECT_SCHEMA: &str = "keycustody.device-object/v1";

/// x-coordinate of the share kept in the recovery file
pub const SHARE_A_INDEX: u8 = 1;
/// x-coordinate of the share kept in the device store
pub const SHARE_B_INDEX: u8 = 2;
/// x-coordinate of the share held by the passkey vault (backed up in the file)
pub const SHARE_C_INDEX: u8 = 3;

/// AAD role suffix of the share C backup slot
pub const SHARE_C_ROLE: &str = "shareC";

/// Where a share physically lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyLocation {
    RecoveryFile,
    Device,
    PasskeyVault,
}

/// Share A slot of the recovery file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileShareSlot {
    pub custody: CustodyLocation,
    pub shamir_index: u8,
    pub kdf: KdfEnvelope,
    pub envelope: EncryptedEnvelope,
}

/// Backup of the passkey share, sealed under the same user key as share A
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupShareSlot {
    pub shamir_index: u8,
    pub envelope: EncryptedEnvelope,
}

/// Share B slot of the device object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceShareSlot {
    pub custody: CustodyLocation,
    pub shamir_index: u8,
    pub envelope: EncryptedEnvelope,
}

/// Passkey registration details; the vault itself lives outside this crate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasskeyMetadata {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relying_party: Option<String>,
}

/// The exportable recovery artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryFileObject {
    pub schema: String,
    pub wallet_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub share_a: FileShareSlot,
    pub share_c_backup: BackupShareSlot,
    pub card_id_hash: String,
    #[serde(default)]
    pub passkey: PasskeyMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_hint: Option<String>,
}

impl RecoveryFileObject {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Imports an exported recovery file
    ///
    /// # Errors
    /// [`CustodyError::InvalidRecoveryFile`] when the schema tag is missing or
    /// unknown, a field does not parse, or the share slots are inconsistent.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let file: Self = parse_with_schema(bytes, RECOVERY_FILE_SCHEMA)?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema != RECOVERY_FILE_SCHEMA {
            return Err(invalid_file(format!("unknown schema {:?}", self.schema)));
        }
        validate_wallet_id(&self.wallet_id)?;
        if self.share_a.custody != CustodyLocation::RecoveryFile {
            return Err(invalid_file("share A must be held by the recovery file"));
        }
        expect_index("share A", self.share_a.shamir_index, SHARE_A_INDEX)?;
        expect_index("share C backup", self.share_c_backup.shamir_index, SHARE_C_INDEX)?;
        // Unknown algorithms are reported when the file is unlocked
        if let Err(CustodyError::InvalidParameters(reason)) = self.share_a.kdf.params() {
            return Err(invalid_file(reason));
        }
        let digest_like = self.card_id_hash.len() == 64
            && self.card_id_hash.bytes().all(|b| b.is_ascii_hexdigit());
        if !digest_like {
            return Err(invalid_file("card id hash is not a hex SHA-256 digest"));
        }
        Ok(())
    }
}

/// Device-resident artifact holding share B
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecoveryObject {
    pub schema: String,
    pub wallet_id: String,
    pub share_b: DeviceShareSlot,
}

impl DeviceRecoveryObject {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let object: Self = parse_with_schema(bytes, DEVICE_OBJECT_SCHEMA)?;
        object.validate()?;
        Ok(object)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema != DEVICE_OBJECT_SCHEMA {
            return Err(invalid_file(format!("unknown schema {:?}", self.schema)));
        }
        validate_wallet_id(&self.wallet_id)?;
        if self.share_b.custody != CustodyLocation::Device {
            return Err(invalid_file("share B must be held by the device"));
        }
        expect_index("share B", self.share_b.shamir_index, SHARE_B_INDEX)
    }
}

/// Which factors unlock the user key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicy {
    pub pin_required: bool,
    pub secret_required: bool,
}

/// Public index entry used for card-to-wallet lookup; holds no secrets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletProfile {
    pub wallet_id: String,
    pub card_id_hash: String,
    pub address: String,
    pub auth_policy: AuthPolicy,
    pub created_at: DateTime<Utc>,
}

/// Checks the schema tag on the raw JSON before deserializing the rest
fn parse_with_schema<T: DeserializeOwned>(bytes: &[u8], expected: &str) -> Result<T> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| invalid_file(format!("not JSON: {e}")))?;

    match value.get("schema").and_then(serde_json::Value::as_str) {
        Some(schema) if schema == expected => {}
        Some(schema) => return Err(invalid_file(format!("unknown schema {schema:?}"))),
        None => return Err(invalid_file("missing schema tag")),
    }

    serde_json::from_value(value).map_err(|e| invalid_file(e.to_string()))
}

fn validate_wallet_id(wallet_id: &str) -> Result<()> {
    Uuid::parse_str(wallet_id)
        .map(|_| ())
        .map_err(|_| invalid_file(format!("wallet id {wallet_id:?} is not a UUID")))
}

/// Every slot has a fixed x-coordinate; the index is not covered by the envelope tag
fn expect_index(slot: &str, index: u8, expected: u8) -> Result<()> {
    if index != expected {
        return Err(invalid_file(format!(
            "{slot} carries index {index}, expected {expected}"
        )));
    }
    Ok(())
}

fn invalid_file(reason: impl Into<String>) -> CustodyError {
    CustodyError::InvalidRecoveryFile(reason.into())
}
