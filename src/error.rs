use std::io;
use thiserror::Error;

/// Message shown to users for every credential-related failure.
///
/// Authentication failures and identity mismatches both map to this text so
/// that a caller cannot tell "wrong PIN" apart from "right PIN, bad data".
pub const WRONG_CREDENTIAL_MESSAGE: &str = "The supplied credentials could not unlock this wallet";

/// Error type for key custody operations
#[derive(Error, Debug)]
pub enum CustodyError {
    /// Bad threshold/share counts, wrong key length or other rejected input
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Division by the zero element of GF(256); only reachable by combining
    /// shares that carry the same x-coordinate
    #[error("Division by zero in GF(256)")]
    DivisionByZero,

    /// Too few shares, mismatched share lengths or malformed share metadata
    #[error("Invalid shares: {0}")]
    InvalidShares(String),

    /// Unrecognized KDF/AEAD tag or envelope version in persisted data
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// AEAD tag check failed
    #[error("Authentication failure")]
    AuthenticationFailure,

    /// Decryption succeeded but the reconstructed identity does not match
    #[error("Wrong credential")]
    WrongCredential,

    /// Imported recovery artifact does not match a known schema
    #[error("Invalid recovery file: {0}")]
    InvalidRecoveryFile(String),

    /// Wallet creation aborted; no artifact of the call may be persisted
    #[error("Wallet creation failed: {0}")]
    WalletCreationFailed(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Randomness source unavailable: {0}")]
    RandomnessUnavailable(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl CustodyError {
    /// Returns true for the failures that are reported to users as a single
    /// "wrong credential" condition.
    pub fn is_wrong_credential(&self) -> bool {
        matches!(
            self,
            CustodyError::AuthenticationFailure | CustodyError::WrongCredential
        )
    }

    /// User-facing description of the error.
    pub fn user_message(&self) -> String {
        if self.is_wrong_credential() {
            WRONG_CREDENTIAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<serde_json::Error> for CustodyError {
    fn from(err: serde_json::Error) -> Self {
        CustodyError::Serialization(err.to_string())
    }
}

impl From<base64::DecodeError> for CustodyError {
    fn from(err: base64::DecodeError) -> Self {
        CustodyError::Encoding(err.to_string())
    }
}

impl From<hex::FromHexError> for CustodyError {
    fn from(err: hex::FromHexError) -> Self {
        CustodyError::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CustodyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_errors_share_user_message() {
        let auth = CustodyError::AuthenticationFailure;
        let wrong = CustodyError::WrongCredential;
        assert!(auth.is_wrong_credential());
        assert!(wrong.is_wrong_credential());
        assert_eq!(auth.user_message(), wrong.user_message());
        assert_eq!(auth.user_message(), WRONG_CREDENTIAL_MESSAGE);
    }

    #[test]
    fn test_other_errors_keep_their_message() {
        let err = CustodyError::InvalidShares("need at least 2 shares, got 1".into());
        assert!(!err.is_wrong_credential());
        assert_eq!(err.user_message(), "Invalid shares: need at least 2 shares, got 1");
    }
}
