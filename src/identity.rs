use std::fmt;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CustodyError, Result};
use crate::random::fill_random;

/// Length of the wallet master secret
pub const MASTER_SECRET_LEN: usize = 32;

/// Root secret of a wallet's signing keypair. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub(crate) struct MasterSecret([u8; MASTER_SECRET_LEN]);

impl MasterSecret {
    pub(crate) fn generate() -> Result<Self> {
        let mut secret = MasterSecret([0u8; MASTER_SECRET_LEN]);
        fill_random(&mut secret.0)?;
        Ok(secret)
    }

    /// Takes the bytes produced by share reconstruction
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != MASTER_SECRET_LEN {
            return Err(CustodyError::InvalidShares(format!(
                "reconstructed secret is {} bytes, expected {MASTER_SECRET_LEN}",
                bytes.len()
            )));
        }
        let mut secret = MasterSecret([0u8; MASTER_SECRET_LEN]);
        secret.0.copy_from_slice(bytes);
        Ok(secret)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; MASTER_SECRET_LEN] {
        &self.0
    }
}

/// Ed25519 signing keypair derived from the master secret
///
/// The master secret is used directly as the Ed25519 seed; the wallet address
/// is the base58 encoding of the public key.
pub struct WalletKeypair {
    signing_key: SigningKey,
}

impl WalletKeypair {
    pub(crate) fn from_master_secret(secret: &MasterSecret) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret.as_bytes()),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Public wallet address
    pub fn address(&self) -> String {
        address_from_public_key(&self.public_key_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    pub fn verify(&self, message: &[u8], signature: &[u8; 64]) -> bool {
        let signature = ed25519_dalek::Signature::from_bytes(signature);
        self.signing_key
            .verifying_key()
            .verify(message, &signature)
            .is_ok()
    }
}

impl fmt::Debug for WalletKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKeypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

pub fn address_from_public_key(public_key: &[u8; 32]) -> String {
    bs58::encode(public_key).into_string()
}

/// Keeps only hex digits of a scanned card identifier, lowercased
///
/// # Example
/// ```
/// use keycustody::normalize_card_id;
///
/// assert_eq!(normalize_card_id("04:A2:1F:9C").unwrap(), "04a21f9c");
/// ```
pub fn normalize_card_id(raw: &str) -> Result<String> {
    let normalized: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if normalized.is_empty() {
        return Err(CustodyError::InvalidParameters(
            "card identifier contains no hex digits".into(),
        ));
    }
    Ok(normalized)
}

/// Lookup key for a physical card: hex SHA-256 of the normalized identifier.
/// The raw identifier is never stored.
pub fn hash_card_id(raw: &str) -> Result<String> {
    let normalized = normalize_card_id(raw)?;
    Ok(hex::encode(Sha256::digest(normalized.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_is_deterministic() {
        let secret = MasterSecret::from_slice(&[5u8; MASTER_SECRET_LEN]).unwrap();
        let a = WalletKeypair::from_master_secret(&secret);
        let b = WalletKeypair::from_master_secret(&secret);
        assert_eq!(a.address(), b.address());
        assert_eq!(
            bs58::decode(a.address()).into_vec().unwrap(),
            a.public_key_bytes().to_vec()
        );
    }

    #[test]
    fn test_distinct_secrets_give_distinct_addresses() {
        let a = WalletKeypair::from_master_secret(&MasterSecret::generate().unwrap());
        let b = WalletKeypair::from_master_secret(&MasterSecret::generate().unwrap());
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = WalletKeypair::from_master_secret(&MasterSecret::generate().unwrap());
        let signature = keypair.sign(b"transfer 1 token");
        assert!(keypair.verify(b"transfer 1 token", &signature));
        assert!(!keypair.verify(b"transfer 2 tokens", &signature));
    }

    #[test]
    fn test_master_secret_length_checked() {
        assert!(matches!(
            MasterSecret::from_slice(&[0u8; 31]),
            Err(CustodyError::InvalidShares(_))
        ));
    }

    #[test]
    fn test_card_normalization() {
        assert_eq!(normalize_card_id("04:A2:1F:9C").unwrap(), "04a21f9c");
        assert_eq!(normalize_card_id(" 04 a2-1f 9C\n").unwrap(), "04a21f9c");
        assert_eq!(normalize_card_id("xyz-04a2").unwrap(), "04a2");
        assert!(normalize_card_id("zz:yy").is_err());
    }

    #[test]
    fn test_card_hash_ignores_formatting() {
        let a = hash_card_id("04:A2:1F:9C").unwrap();
        let b = hash_card_id("04a21f9c").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_card_id("04a21f9d").unwrap());
        assert!(!a.contains("04a21f9c"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let secret = MasterSecret::from_slice(&[9u8; 32]).unwrap();
        let keypair = WalletKeypair::from_master_secret(&secret);
        let printed = format!("{keypair:?}");
        assert!(printed.contains(&keypair.address()));
        assert!(!printed.contains("signing_key"));
    }
}
