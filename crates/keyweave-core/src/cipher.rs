//! Authenticated symmetric encryption.
//!
//! Every blob produced here has the layout `nonce(12) || ciphertext || tag(16)`
//! and is bound to caller-supplied associated data. Opening a blob under the
//! wrong key, the wrong associated data, or after any bit flip fails closed
//! with [`IntegrityError`].

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CoreError, Result};

/// Length of a symmetric key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the per-blob nonce prefix.
pub const NONCE_LEN: usize = 12;

/// Length of the Poly1305 authentication tag suffix.
pub const TAG_LEN: usize = 16;

const MIN_BLOB_LEN: usize = NONCE_LEN + TAG_LEN;

/// A blob did not authenticate under the key and associated data supplied.
///
/// Carries no detail on purpose: "wrong key", "wrong AAD", "truncated" and
/// "tampered" are indistinguishable to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("integrity check failed")]
pub struct IntegrityError;

/// A 256-bit key for ChaCha20-Poly1305.
///
/// Zeroized on drop. `Debug` never prints key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CoreError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Derive a key from input key material under a domain-separation context.
    pub fn derive(context: &str, material: &[u8]) -> Self {
        Self(blake3::derive_key(context, material))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }

    /// Encrypt `plaintext` bound to `aad`.
    ///
    /// A fresh random nonce is drawn for every call.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let sealed = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), Payload { msg: plaintext, aad })
            .map_err(|e| CoreError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`SymmetricKey::encrypt`] with the same `aad`.
    pub fn decrypt(&self, blob: &[u8], aad: &[u8]) -> std::result::Result<Vec<u8>, IntegrityError> {
        if blob.len() < MIN_BLOB_LEN {
            return Err(IntegrityError);
        }

        let (nonce, sealed) = blob.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad })
            .map_err(|_| IntegrityError)
    }

    /// Wrap another key under this one.
    pub fn wrap_key(&self, key: &SymmetricKey, aad: &[u8]) -> Result<Vec<u8>> {
        self.encrypt(key.as_bytes(), aad)
    }

    /// Unwrap a key sealed by [`SymmetricKey::wrap_key`].
    ///
    /// A blob that opens but does not hold exactly one key is treated as an
    /// integrity failure as well.
    pub fn unwrap_key(
        &self,
        blob: &[u8],
        aad: &[u8],
    ) -> std::result::Result<SymmetricKey, IntegrityError> {
        let plaintext = Zeroizing::new(self.decrypt(blob, aad)?);
        let arr: [u8; KEY_LEN] = plaintext.as_slice().try_into().map_err(|_| IntegrityError)?;
        Ok(SymmetricKey(arr))
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = SymmetricKey::generate();
        let plaintext = b"hello, world!";

        let blob = key.encrypt(plaintext, b"aad").unwrap();
        assert_eq!(blob.len(), NONCE_LEN + plaintext.len() + TAG_LEN);

        let decrypted = key.decrypt(&blob, b"aad").unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let key1 = SymmetricKey::generate();
        let key2 = SymmetricKey::generate();

        let blob = key1.encrypt(b"secret", b"").unwrap();
        assert_eq!(key2.decrypt(&blob, b""), Err(IntegrityError));
    }

    #[test]
    fn test_decrypt_wrong_aad_fails() {
        let key = SymmetricKey::generate();
        let blob = key.encrypt(b"secret", b"role-a").unwrap();
        assert_eq!(key.decrypt(&blob, b"role-b"), Err(IntegrityError));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let key = SymmetricKey::generate();
        let blob = key.encrypt(b"", b"").unwrap();
        assert_eq!(blob.len(), MIN_BLOB_LEN);

        assert_eq!(key.decrypt(&blob[..MIN_BLOB_LEN - 1], b""), Err(IntegrityError));
        assert_eq!(key.decrypt(&[], b""), Err(IntegrityError));
    }

    #[test]
    fn test_nonce_is_fresh_per_call() {
        let key = SymmetricKey::generate();
        let a = key.encrypt(b"same", b"").unwrap();
        let b = key.encrypt(b"same", b"").unwrap();
        assert_ne!(&a[..NONCE_LEN], &b[..NONCE_LEN]);
    }

    #[test]
    fn test_wrap_unwrap_key() {
        let kek = SymmetricKey::generate();
        let key = SymmetricKey::generate();

        let wrapped = kek.wrap_key(&key, b"child").unwrap();
        let unwrapped = kek.unwrap_key(&wrapped, b"child").unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_unwrap_rejects_wrong_length_plaintext() {
        let kek = SymmetricKey::generate();
        let blob = kek.encrypt(b"not a key", b"").unwrap();
        assert!(kek.unwrap_key(&blob, b"").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SymmetricKey::from_bytes([0x42; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "SymmetricKey(..)");
    }

    proptest! {
        #[test]
        fn prop_roundtrip(
            key in any::<[u8; 32]>(),
            plaintext in prop::collection::vec(any::<u8>(), 0..256),
            aad in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            let key = SymmetricKey::from_bytes(key);
            let blob = key.encrypt(&plaintext, &aad).unwrap();
            prop_assert_eq!(key.decrypt(&blob, &aad).unwrap(), plaintext);
        }

        #[test]
        fn prop_bit_flip_fails(
            key in any::<[u8; 32]>(),
            plaintext in prop::collection::vec(any::<u8>(), 0..128),
            flip in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let key = SymmetricKey::from_bytes(key);
            let mut blob = key.encrypt(&plaintext, b"aad").unwrap();
            let i = flip.index(blob.len());
            blob[i] ^= 1 << bit;
            prop_assert_eq!(key.decrypt(&blob, b"aad"), Err(IntegrityError));
        }

        #[test]
        fn prop_other_key_fails(
            a in any::<[u8; 32]>(),
            b in any::<[u8; 32]>(),
            plaintext in prop::collection::vec(any::<u8>(), 0..128),
        ) {
            prop_assume!(a != b);
            let blob = SymmetricKey::from_bytes(a).encrypt(&plaintext, b"").unwrap();
            prop_assert!(SymmetricKey::from_bytes(b).decrypt(&blob, b"").is_err());
        }
    }
}
