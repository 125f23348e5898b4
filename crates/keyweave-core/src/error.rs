//! Error types for keyweave core.

use thiserror::Error;

use crate::cipher::IntegrityError;

/// Core errors that can occur during cryptographic and ledger operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A sealed blob did not open under the given key and associated data.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// An algorithm tag that this build does not implement.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("invalid key derivation parameters: {0}")]
    InvalidKdfParams(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

impl CoreError {
    /// Whether this error means "this key does not open this blob".
    ///
    /// Callers walking candidate keys skip these and keep going.
    pub fn is_integrity(&self) -> bool {
        matches!(self, CoreError::Integrity(_))
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
