use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CustodyError, Result};
use crate::kdf::KEY_LEN;
use crate::random::random_array;

/// Domain-separation prefix of every associated-data string
pub const PROTOCOL_TAG: &str = "keycustody/v1";

pub const ENVELOPE_VERSION: u8 = 1;

/// Nonce length of XChaCha20-Poly1305
pub const XNONCE_LEN: usize = 24;

const XCHACHA20_POLY1305_TAG: &str = "xchacha20poly1305";

/// AEAD constructions an envelope can be sealed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadAlgorithm {
    XChaCha20Poly1305,
}

impl AeadAlgorithm {
    pub fn tag(&self) -> &'static str {
        match self {
            AeadAlgorithm::XChaCha20Poly1305 => XCHACHA20_POLY1305_TAG,
        }
    }

    /// Maps a persisted tag back to an algorithm; unknown tags are an error
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            XCHACHA20_POLY1305_TAG => Ok(AeadAlgorithm::XChaCha20Poly1305),
            other => Err(CustodyError::UnsupportedAlgorithm(format!(
                "unknown aead algorithm {other:?}"
            ))),
        }
    }
}

/// Versioned, self-describing encrypted container
///
/// Nonce and ciphertext are base64 so the envelope survives text transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub version: u8,
    pub algorithm: String,
    pub nonce: String,
    pub ciphertext: String,
}

impl EncryptedEnvelope {
    /// Decoded algorithm tag
    pub fn algorithm(&self) -> Result<AeadAlgorithm> {
        if self.version != ENVELOPE_VERSION {
            return Err(CustodyError::UnsupportedAlgorithm(format!(
                "envelope version {}",
                self.version
            )));
        }
        AeadAlgorithm::from_tag(&self.algorithm)
    }

    pub fn nonce_bytes(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(&self.nonce)?)
    }

    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>> {
        Ok(BASE64.decode(&self.ciphertext)?)
    }
}

/// Builds the associated data `"<protocol-tag>:<context>"`
///
/// # Example
/// ```
/// use keycustody::associated_data_for;
///
/// assert_eq!(associated_data_for("wallet-1:shareC"), b"keycustody/v1:wallet-1:shareC".to_vec());
/// ```
pub fn associated_data_for(context: &str) -> Vec<u8> {
    format!("{PROTOCOL_TAG}:{context}").into_bytes()
}

/// Associated data of a share slot: the wallet id, plus a role suffix for
/// slots that would otherwise share a key and context.
pub fn share_associated_data(wallet_id: &str, role: Option<&str>) -> Vec<u8> {
    match role {
        Some(role) => associated_data_for(&format!("{wallet_id}:{role}")),
        None => associated_data_for(wallet_id),
    }
}

fn cipher_for(key: &[u8]) -> Result<XChaCha20Poly1305> {
    if key.len() != KEY_LEN {
        return Err(CustodyError::InvalidParameters(format!(
            "key must be {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    Ok(XChaCha20Poly1305::new(Key::from_slice(key)))
}

/// Encrypts `plaintext` under `key` with a fresh random nonce
pub fn encrypt(plaintext: &[u8], key: &[u8], aad: Option<&[u8]>) -> Result<EncryptedEnvelope> {
    let cipher = cipher_for(key)?;
    let nonce: [u8; XNONCE_LEN] = random_array()?;

    let payload = Payload {
        msg: plaintext,
        aad: aad.unwrap_or_default(),
    };
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), payload)
        .map_err(|_| CustodyError::InvalidParameters("plaintext too long to encrypt".into()))?;

    Ok(EncryptedEnvelope {
        version: ENVELOPE_VERSION,
        algorithm: AeadAlgorithm::XChaCha20Poly1305.tag().to_string(),
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    })
}

/// Opens an envelope; no plaintext is returned unless the tag verifies
///
/// # Errors
/// - [`CustodyError::UnsupportedAlgorithm`] for an unknown version or tag
/// - [`CustodyError::AuthenticationFailure`] on a wrong key, mismatched aad,
///   or a modified nonce or ciphertext
pub fn decrypt(
    envelope: &EncryptedEnvelope,
    key: &[u8],
    aad: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>> {
    match envelope.algorithm()? {
        AeadAlgorithm::XChaCha20Poly1305 => {
            let cipher = cipher_for(key)?;
            let nonce = envelope.nonce_bytes()?;
            if nonce.len() != XNONCE_LEN {
                return Err(CustodyError::AuthenticationFailure);
            }
            let ciphertext = envelope.ciphertext_bytes()?;

            let payload = Payload {
                msg: &ciphertext,
                aad: aad.unwrap_or_default(),
            };
            cipher
                .decrypt(XNonce::from_slice(&nonce), payload)
                .map(Zeroizing::new)
                .map_err(|_| CustodyError::AuthenticationFailure)
        }
    }
}
