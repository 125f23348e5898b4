//! Asymmetric primitives for keyweave.
//!
//! Wraps Ed25519 signing, X25519 key agreement and Blake3 hashing with strong
//! types. Every role owns one key pair of each kind; the algorithm tags stored
//! next to the public halves are parsed through [`SignatureAlgorithm`] and
//! [`EncryptionAlgorithm`].

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::cipher::SymmetricKey;
use crate::error::CoreError;

/// Fixed-width byte newtype with hex helpers and a short `Debug` form.
macro_rules! byte_array {
    ($name:ident, $len:expr, $tag:literal) => {
        impl $name {
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes: [u8; $len] = hex::decode(s)?
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(bytes))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({}..)"), &self.to_hex()[..16])
            }
        }
    };
}

/// Blake3 digest: entry hashes, chain links and label hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

byte_array!(Blake3Hash, 32, "Blake3");

impl Blake3Hash {
    /// Link target of the first entry in every chain.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Keyed hash, so equal inputs under different keys do not collide.
    pub fn keyed(key: &SymmetricKey, data: &[u8]) -> Self {
        Self(*blake3::keyed_hash(key.as_bytes(), data).as_bytes())
    }
}

/// Signature algorithms a role key may be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    Ed25519,
}

impl SignatureAlgorithm {
    /// The tag stored alongside public keys and signatures.
    pub fn as_str(self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => "Ed25519",
        }
    }

    /// Parse a stored tag. Unknown tags are a configuration error.
    pub fn parse(tag: &str) -> Result<Self, CoreError> {
        match tag {
            "Ed25519" => Ok(SignatureAlgorithm::Ed25519),
            other => Err(CoreError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Key agreement algorithms a role encryption key may be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionAlgorithm {
    X25519,
}

impl EncryptionAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionAlgorithm::X25519 => "X25519",
        }
    }

    pub fn parse(tag: &str) -> Result<Self, CoreError> {
        match tag {
            "X25519" => Ok(EncryptionAlgorithm::X25519),
            other => Err(CoreError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Public half of a role's signing key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

byte_array!(Ed25519PublicKey, 32, "Ed25519Pub");

impl Ed25519PublicKey {
    /// Check `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        key.verify(message, &Signature::from_bytes(&signature.0))
            .map_err(|_| CoreError::InvalidSignature)
    }
}

/// Detached Ed25519 signature over an entry hash.
///
/// Serialized as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

byte_array!(Ed25519Signature, 64, "Ed25519Sig");

impl Ed25519Signature {
    /// Length-checked conversion from a stored blob.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CoreError::InvalidKeyLength {
            expected: 64,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A role's signing key pair.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Deterministic key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing_key.sign(message).to_bytes())
    }

    /// The secret seed. This is what gets sealed into a role's private blob.
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Keypair").field(&self.public_key()).finish()
    }
}

/// Public half of a role's key-agreement key. Sealed shares are addressed to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

byte_array!(X25519PublicKey, 32, "X25519Pub");

impl X25519PublicKey {
    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(pk.to_bytes())
    }
}

/// Long-lived key-agreement secret of a role.
#[derive(Clone)]
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_bytes(seed)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> X25519PublicKey {
        PublicKey::from(&self.0).into()
    }

    pub fn diffie_hellman(&self, peer: &X25519PublicKey) -> SharedKey {
        SharedKey(self.0.diffie_hellman(&peer.to_dalek()).to_bytes())
    }
}

impl fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("X25519StaticSecret").field(&self.public_key()).finish()
    }
}

/// Raw output of an X25519 exchange. Only ever used to derive a wrapping key.
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Derive a wrapping key bound to `context`.
    pub fn derive_wrapping_key(&self, context: &[u8]) -> SymmetricKey {
        let mut hasher = blake3::Hasher::new_derive_key("keyweave 2024 share wrapping key");
        hasher.update(&self.0);
        hasher.update(context);
        SymmetricKey::from_bytes(*hasher.finalize().as_bytes())
    }
}

impl Drop for SharedKey {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.0);
    }
}

/// Single-use sender side of a sealed share.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret).into();
        Self { secret, public }
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Consumes the secret.
    pub fn diffie_hellman(self, peer: &X25519PublicKey) -> SharedKey {
        SharedKey(self.secret.diffie_hellman(&peer.to_dalek()).to_bytes())
    }
}
