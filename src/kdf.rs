//! Key derivation for the user factor (PIN and/or passphrase) and generation of
//! device-resident keys.
//!
//! Derivation parameters travel with the wallet as a [`KdfEnvelope`] so each
//! wallet can be unlocked with exactly the parameters it was created with.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CustodyError, Result};
use crate::random::{fill_random, random_array};

/// Length of every symmetric key in bytes
pub const KEY_LEN: usize = 32;
/// Length of freshly generated salts
pub const SALT_LEN: usize = 16;
/// Shortest salt accepted when deriving
pub const MIN_SALT_LEN: usize = 8;

pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;
pub const MIN_PBKDF2_ITERATIONS: u32 = 1_000;
/// Iteration count used when a requested algorithm is not compiled in
pub const FALLBACK_PBKDF2_ITERATIONS: u32 = 1_000_000;
/// Highest iteration count accepted from a stored envelope
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// Argon2id ceilings: 1 GiB of memory, 64 passes, 16 lanes
pub const MAX_ARGON2_MEMORY_KIB: u32 = 1024 * 1024;
pub const MAX_ARGON2_ITERATIONS: u32 = 64;
pub const MAX_ARGON2_PARALLELISM: u32 = 16;

pub const KDF_ENVELOPE_VERSION: u8 = 1;

const PBKDF2_SHA256_TAG: &str = "pbkdf2-sha256";
const ARGON2ID_TAG: &str = "argon2id";

const ARGON2_AVAILABLE: bool = cfg!(feature = "argon2");

/// Key derivation algorithm together with its cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfParams {
    /// PBKDF2-HMAC-SHA256
    Pbkdf2Sha256 { iterations: u32 },
    /// Argon2id v1.3; only usable with the `argon2` feature
    Argon2id {
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Pbkdf2Sha256 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Argon2id with the commonly recommended 19 MiB / 2 passes / 1 lane
    pub fn argon2id_default() -> Self {
        KdfParams::Argon2id {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }

    /// Persisted tag of the algorithm
    pub fn tag(&self) -> &'static str {
        match self {
            KdfParams::Pbkdf2Sha256 { .. } => PBKDF2_SHA256_TAG,
            KdfParams::Argon2id { .. } => ARGON2ID_TAG,
        }
    }

    /// Rejects parameters outside the supported range
    ///
    /// The ceilings matter for imported envelopes, where the cost parameters
    /// are not authenticated and would otherwise bound nothing.
    pub fn validate(&self) -> Result<()> {
        match *self {
            KdfParams::Pbkdf2Sha256 { iterations } => {
                if iterations < MIN_PBKDF2_ITERATIONS {
                    return Err(CustodyError::InvalidParameters(format!(
                        "pbkdf2 iterations {iterations} below minimum {MIN_PBKDF2_ITERATIONS}"
                    )));
                }
                if iterations > MAX_PBKDF2_ITERATIONS {
                    return Err(CustodyError::InvalidParameters(format!(
                        "pbkdf2 iterations {iterations} above maximum {MAX_PBKDF2_ITERATIONS}"
                    )));
                }
            }
            KdfParams::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => {
                if iterations == 0 || parallelism == 0 {
                    return Err(CustodyError::InvalidParameters(
                        "argon2id iterations and parallelism must be non-zero".into(),
                    ));
                }
                if iterations > MAX_ARGON2_ITERATIONS
                    || parallelism > MAX_ARGON2_PARALLELISM
                    || memory_kib > MAX_ARGON2_MEMORY_KIB
                {
                    return Err(CustodyError::InvalidParameters(format!(
                        "argon2id cost m={memory_kib} t={iterations} p={parallelism} exceeds \
                         m={MAX_ARGON2_MEMORY_KIB} t={MAX_ARGON2_ITERATIONS} \
                         p={MAX_ARGON2_PARALLELISM}"
                    )));
                }
                if memory_kib < 8 * parallelism {
                    return Err(CustodyError::InvalidParameters(format!(
                        "argon2id memory {memory_kib} KiB below 8 KiB per lane"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns parameters that this build can actually run.
    ///
    /// Used only when recording parameters for a new wallet: a requested
    /// Argon2id is replaced by PBKDF2 at [`FALLBACK_PBKDF2_ITERATIONS`] when the
    /// `argon2` feature is disabled. The replacement is what gets written into
    /// the wallet's [`KdfEnvelope`], so later unlocks use the same parameters.
    pub fn resolve_available(self) -> KdfParams {
        match self {
            KdfParams::Argon2id { .. } if !ARGON2_AVAILABLE => {
                warn!(
                    requested = ARGON2ID_TAG,
                    fallback = PBKDF2_SHA256_TAG,
                    iterations = FALLBACK_PBKDF2_ITERATIONS,
                    "requested KDF is not available in this build, falling back"
                );
                KdfParams::Pbkdf2Sha256 {
                    iterations: FALLBACK_PBKDF2_ITERATIONS,
                }
            }
            other => other,
        }
    }
}

/// Persisted description of how a user key was derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfEnvelope {
    pub version: u8,
    pub algorithm: String,
    /// Base64 salt
    pub salt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_kib: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<u32>,
}

impl KdfEnvelope {
    pub fn new(params: &KdfParams, salt: &[u8]) -> Self {
        let (iterations, memory_kib, parallelism) = match *params {
            KdfParams::Pbkdf2Sha256 { iterations } => (Some(iterations), None, None),
            KdfParams::Argon2id {
                memory_kib,
                iterations,
                parallelism,
            } => (Some(iterations), Some(memory_kib), Some(parallelism)),
        };
        Self {
            version: KDF_ENVELOPE_VERSION,
            algorithm: params.tag().to_string(),
            salt: BASE64.encode(salt),
            iterations,
            memory_kib,
            parallelism,
        }
    }

    /// Decodes the recorded parameters.
    ///
    /// # Errors
    /// [`CustodyError::UnsupportedAlgorithm`] for an unknown version or tag, and
    /// for `argon2id` when the `argon2` feature is disabled. Recorded parameters
    /// are never substituted.
    pub fn params(&self) -> Result<KdfParams> {
        if self.version != KDF_ENVELOPE_VERSION {
            return Err(CustodyError::UnsupportedAlgorithm(format!(
                "kdf envelope version {}",
                self.version
            )));
        }

        let params = match self.algorithm.as_str() {
            PBKDF2_SHA256_TAG => KdfParams::Pbkdf2Sha256 {
                iterations: required(self.iterations, "iterations")?,
            },
            ARGON2ID_TAG if ARGON2_AVAILABLE => KdfParams::Argon2id {
                memory_kib: required(self.memory_kib, "memoryKib")?,
                iterations: required(self.iterations, "iterations")?,
                parallelism: required(self.parallelism, "parallelism")?,
            },
            ARGON2ID_TAG => {
                return Err(CustodyError::UnsupportedAlgorithm(format!(
                    "{ARGON2ID_TAG} is not compiled into this build"
                )));
            }
            other => {
                return Err(CustodyError::UnsupportedAlgorithm(format!(
                    "unknown kdf algorithm {other:?}"
                )));
            }
        };
        params.validate()?;
        Ok(params)
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(&self.salt)?)
    }
}

fn required(value: Option<u32>, field: &str) -> Result<u32> {
    value.ok_or_else(|| CustodyError::InvalidParameters(format!("kdf envelope missing {field}")))
}

/// A 32-byte symmetric key that is wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

/// Key that stays in the device-confidential store and never leaves the device
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DeviceKey([u8; KEY_LEN]);

impl DeviceKey {
    /// Rebuilds a device key read back from the device store
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CustodyError::InvalidParameters(format!(
                "device key must be {KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Bytes to persist verbatim in the device store
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_vec())
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceKey(<redacted>)")
    }
}

/// Generates a fresh random salt for a new wallet
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    random_array()
}

/// Generates fresh key material for the device store.
///
/// The key never has to be re-derived, so it is random rather than derived
/// from `wallet_id`; the id only scopes the log line.
pub fn generate_device_key(wallet_id: &str) -> Result<DeviceKey> {
    let mut key = DeviceKey([0u8; KEY_LEN]);
    fill_random(&mut key.0)?;
    debug!(wallet_id, "generated device key");
    Ok(key)
}

/// Derives the user key from the optional PIN and passphrase.
///
/// The input is the PIN followed by the passphrase, a missing factor
/// contributing nothing. All intermediate buffers are wiped on every path.
pub fn derive_user_key(
    pin: Option<&str>,
    passphrase: Option<&str>,
    salt: &[u8],
    params: &KdfParams,
) -> Result<SymmetricKey> {
    params.validate()?;
    if salt.len() < MIN_SALT_LEN {
        return Err(CustodyError::InvalidParameters(format!(
            "salt must be at least {MIN_SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }

    let pin = pin.unwrap_or_default().as_bytes();
    let passphrase = passphrase.unwrap_or_default().as_bytes();
    let mut input = Zeroizing::new(Vec::with_capacity(pin.len() + passphrase.len()));
    input.extend_from_slice(pin);
    input.extend_from_slice(passphrase);

    let mut key = SymmetricKey([0u8; KEY_LEN]);
    match *params {
        KdfParams::Pbkdf2Sha256 { iterations } => {
            pbkdf2::pbkdf2_hmac::<Sha256>(&input, salt, iterations, &mut key.0);
        }
        KdfParams::Argon2id {
            memory_kib,
            iterations,
            parallelism,
        } => argon2id(&input, salt, memory_kib, iterations, parallelism, &mut key.0)?,
    }

    Ok(key)
}

#[cfg(feature = "argon2")]
fn argon2id(
    input: &[u8],
    salt: &[u8],
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
    out: &mut [u8; KEY_LEN],
) -> Result<()> {
    let params = argon2::Params::new(memory_kib, iterations, parallelism, Some(KEY_LEN))
        .map_err(|e| CustodyError::InvalidParameters(e.to_string()))?;
    argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
        .hash_password_into(input, salt, out)
        .map_err(|e| CustodyError::InvalidParameters(e.to_string()))
}

#[cfg(not(feature = "argon2"))]
fn argon2id(
    _input: &[u8],
    _salt: &[u8],
    _memory_kib: u32,
    _iterations: u32,
    _parallelism: u32,
    _out: &mut [u8; KEY_LEN],
) -> Result<()> {
    Err(CustodyError::UnsupportedAlgorithm(format!(
        "{ARGON2ID_TAG} is not compiled into this build"
    )))
}
