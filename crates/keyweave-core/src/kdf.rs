//! Root key derivation.
//!
//! A principal's root key is never stored. It is re-derived at every login
//! from the secret the client presents and the principal's stored salt, so the
//! derivation is a pure function of `(secret, salt, params)`.
//!
//! Argon2id stretches the secret; the stretched output is then condensed into
//! a 256-bit [`SymmetricKey`] with Blake3 `derive_key`.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::cipher::SymmetricKey;
use crate::error::{CoreError, Result};

/// Blake3 context for condensing the stretched secret into a root key.
const ROOT_KEY_CONTEXT: &str = "keyweave 2024 root key";

/// Minimum Argon2 memory cost, in KiB.
pub const MIN_MEMORY_KIB: u32 = 19_456;
/// Minimum Argon2 iteration count.
pub const MIN_ITERATIONS: u32 = 2;
/// Minimum Argon2 lanes.
pub const MIN_PARALLELISM: u32 = 1;
/// Minimum stretched output length, in bytes.
pub const MIN_OUTPUT_LEN: usize = 32;
/// Minimum salt length, in bytes.
pub const MIN_SALT_LEN: usize = 16;

/// Argon2id cost parameters.
///
/// The defaults are the enforced minimums.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: MIN_MEMORY_KIB,
            iterations: MIN_ITERATIONS,
            parallelism: MIN_PARALLELISM,
            output_len: MIN_OUTPUT_LEN,
        }
    }
}

impl KdfParams {
    /// Reject parameters below the safe minimums.
    pub fn validate(&self) -> Result<()> {
        if self.memory_kib < MIN_MEMORY_KIB {
            return Err(CoreError::InvalidKdfParams(format!(
                "memory_kib {} below minimum {}",
                self.memory_kib, MIN_MEMORY_KIB
            )));
        }
        if self.iterations < MIN_ITERATIONS {
            return Err(CoreError::InvalidKdfParams(format!(
                "iterations {} below minimum {}",
                self.iterations, MIN_ITERATIONS
            )));
        }
        if self.parallelism < MIN_PARALLELISM {
            return Err(CoreError::InvalidKdfParams("parallelism must be at least 1".into()));
        }
        if self.output_len < MIN_OUTPUT_LEN {
            return Err(CoreError::InvalidKdfParams(format!(
                "output_len {} below minimum {}",
                self.output_len, MIN_OUTPUT_LEN
            )));
        }
        Ok(())
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        self.validate()?;
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.output_len),
        )
        .map_err(|e| CoreError::InvalidKdfParams(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Generate a fresh random salt of [`MIN_SALT_LEN`] bytes.
pub fn generate_salt() -> Vec<u8> {
    let mut salt = vec![0u8; MIN_SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive a principal's root key from its secret and salt.
pub fn derive_root_key(secret: &[u8], salt: &[u8], params: &KdfParams) -> Result<SymmetricKey> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CoreError::InvalidKdfParams(format!(
            "salt length {} below minimum {}",
            salt.len(),
            MIN_SALT_LEN
        )));
    }

    let argon2 = params.argon2()?;
    let mut stretched = Zeroizing::new(vec![0u8; params.output_len]);
    argon2
        .hash_password_into(secret, salt, &mut stretched)
        .map_err(|e| CoreError::KeyDerivation(e.to_string()))?;

    Ok(SymmetricKey::derive(ROOT_KEY_CONTEXT, &stretched))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [0x11u8; MIN_SALT_LEN];
        let params = KdfParams::default();

        let k1 = derive_root_key(b"correct horse", &salt, &params).unwrap();
        let k2 = derive_root_key(b"correct horse", &salt, &params).unwrap();
        let k3 = derive_root_key(b"wrong horse", &salt, &params).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes(), k3.as_bytes());
    }

    #[test]
    fn test_salt_changes_key() {
        let params = KdfParams::default();
        let k1 = derive_root_key(b"secret", &[1u8; 16], &params).unwrap();
        let k2 = derive_root_key(b"secret", &[2u8; 16], &params).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_short_salt_rejected() {
        let err = derive_root_key(b"secret", &[0u8; 8], &KdfParams::default()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidKdfParams(_)));
    }

    #[test]
    fn test_weak_params_rejected() {
        let weak = KdfParams { iterations: 1, ..KdfParams::default() };
        assert!(weak.validate().is_err());

        let small = KdfParams { memory_kib: 4096, ..KdfParams::default() };
        assert!(derive_root_key(b"secret", &[0u8; 16], &small).is_err());

        let short = KdfParams { output_len: 16, ..KdfParams::default() };
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_generated_salt_length() {
        let a = generate_salt();
        let b = generate_salt();
        assert_eq!(a.len(), MIN_SALT_LEN);
        assert_ne!(a, b);
    }
}
