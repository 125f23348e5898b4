//! Roles, their key triples, and root-key entries.
//!
//! ## Overview
//!
//! A [`Role`] is a node of the access graph. It owns three symmetric keys
//! ([`RoleKeys`]): Read, Write and Owner. None of them is ever stored in the
//! clear. A role's private signing seed and X25519 secret are CBOR-encoded and
//! sealed under its Owner key with the role id as associated data.
//!
//! A principal's own role keys are persisted as [`KeyEntry`] records, each
//! wrapped under the principal's root key.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use keyweave_core::{
    EncryptionAlgorithm, Ed25519PublicKey, IntegrityError, Keypair, RoleId, SignatureAlgorithm,
    SignerKey, SigningContext, SymmetricKey, X25519PublicKey, X25519StaticSecret,
};

use crate::error::{GraphError, Result};

/// Which of a role's three keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    Read,
    Write,
    Owner,
}

impl KeyKind {
    pub const ALL: [KeyKind; 3] = [KeyKind::Read, KeyKind::Write, KeyKind::Owner];

    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Read => "read",
            KeyKind::Write => "write",
            KeyKind::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(KeyKind::Read),
            "write" => Some(KeyKind::Write),
            "owner" => Some(KeyKind::Owner),
            _ => None,
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role's recovered keys. Each slot is filled only if recoverable.
#[derive(Debug, Clone, Default)]
pub struct RoleKeys {
    pub read: Option<SymmetricKey>,
    pub write: Option<SymmetricKey>,
    pub owner: Option<SymmetricKey>,
}

impl RoleKeys {
    /// A fresh random triple.
    pub fn generate() -> Self {
        Self {
            read: Some(SymmetricKey::generate()),
            write: Some(SymmetricKey::generate()),
            owner: Some(SymmetricKey::generate()),
        }
    }

    pub fn get(&self, kind: KeyKind) -> Option<&SymmetricKey> {
        match kind {
            KeyKind::Read => self.read.as_ref(),
            KeyKind::Write => self.write.as_ref(),
            KeyKind::Owner => self.owner.as_ref(),
        }
    }

    /// Get a key or report which one is missing.
    pub fn require(&self, role: RoleId, kind: KeyKind) -> Result<&SymmetricKey> {
        self.get(kind).ok_or(GraphError::MissingKey { role, kind })
    }

    pub fn has(&self, kind: KeyKind) -> bool {
        self.get(kind).is_some()
    }

    /// Fill `kind` unless it is already held. Returns whether it was filled.
    pub fn set_if_absent(&mut self, kind: KeyKind, key: SymmetricKey) -> bool {
        let slot = match kind {
            KeyKind::Read => &mut self.read,
            KeyKind::Write => &mut self.write,
            KeyKind::Owner => &mut self.owner,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(key);
        true
    }

    pub fn is_empty(&self) -> bool {
        KeyKind::ALL.iter().all(|k| !self.has(*k))
    }

    pub fn is_complete(&self) -> bool {
        KeyKind::ALL.iter().all(|k| self.has(*k))
    }
}

/// A role's private asymmetric material.
#[derive(Debug, Clone)]
pub struct RoleSecrets {
    pub signing: Keypair,
    pub encryption: X25519StaticSecret,
}

impl RoleSecrets {
    pub fn generate() -> Self {
        Self {
            signing: Keypair::generate(),
            encryption: X25519StaticSecret::generate(),
        }
    }

    fn seal(&self, owner_key: &SymmetricKey, role_id: RoleId) -> Result<Bytes> {
        let material = PrivateMaterial {
            signing_seed: self.signing.seed(),
            encryption_secret: self.encryption.to_bytes(),
        };
        let mut buf = Zeroizing::new(Vec::new());
        ciborium::into_writer(&material, &mut *buf)
            .map_err(|e| GraphError::SerializationError(e.to_string()))?;
        Ok(owner_key.encrypt(&buf, role_id.as_bytes())?.into())
    }

    fn open(blob: &[u8], owner_key: &SymmetricKey, role_id: RoleId) -> Result<Self> {
        let plaintext = Zeroizing::new(owner_key.decrypt(blob, role_id.as_bytes())?);
        let material: PrivateMaterial = ciborium::from_reader(plaintext.as_slice())
            .map_err(|e| GraphError::SerializationError(e.to_string()))?;
        Ok(Self {
            signing: Keypair::from_seed(&material.signing_seed),
            encryption: X25519StaticSecret::from_bytes(material.encryption_secret),
        })
    }
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct PrivateMaterial {
    signing_seed: [u8; 32],
    encryption_secret: [u8; 32],
}

/// Fresh key material produced when a role is created or rotated.
#[derive(Debug, Clone)]
pub struct RoleMaterial {
    pub keys: RoleKeys,
    pub secrets: RoleSecrets,
}

/// A node of the access graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    /// Private signing and encryption material, sealed under the Owner key.
    pub private_blob: Bytes,
    pub signing_public: Ed25519PublicKey,
    pub signing_alg: String,
    pub encryption_public: X25519PublicKey,
    pub encryption_alg: String,
    /// Present for principals that log in with a secret.
    pub kdf_salt: Option<Vec<u8>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Role {
    /// Create a role with a fresh key triple and fresh private material.
    pub fn create(name: impl Into<String>, now: i64) -> Result<(Self, RoleMaterial)> {
        let id = RoleId::generate();
        let material = RoleMaterial {
            keys: RoleKeys::generate(),
            secrets: RoleSecrets::generate(),
        };
        let owner = material.keys.require(id, KeyKind::Owner)?;

        let role = Self {
            id,
            name: name.into(),
            private_blob: material.secrets.seal(owner, id)?,
            signing_public: material.secrets.signing.public_key(),
            signing_alg: SignatureAlgorithm::Ed25519.as_str().to_string(),
            encryption_public: material.secrets.encryption.public_key(),
            encryption_alg: EncryptionAlgorithm::X25519.as_str().to_string(),
            kdf_salt: None,
            created_at: now,
            updated_at: now,
        };
        Ok((role, material))
    }

    /// Replace the key triple and private material.
    ///
    /// Edges and grants wrapped under the old keys stop opening; the caller
    /// re-mints whatever should survive.
    pub fn rotate(&mut self, now: i64) -> Result<RoleMaterial> {
        let material = RoleMaterial {
            keys: RoleKeys::generate(),
            secrets: RoleSecrets::generate(),
        };
        let owner = material.keys.require(self.id, KeyKind::Owner)?;

        self.private_blob = material.secrets.seal(owner, self.id)?;
        self.signing_public = material.secrets.signing.public_key();
        self.encryption_public = material.secrets.encryption.public_key();
        self.updated_at = now;
        Ok(material)
    }

    /// Open the role's private material with its Owner key.
    pub fn open_secrets(&self, keys: &RoleKeys) -> Result<RoleSecrets> {
        SignatureAlgorithm::parse(&self.signing_alg)?;
        EncryptionAlgorithm::parse(&self.encryption_alg)?;

        let owner = keys.require(self.id, KeyKind::Owner)?;
        let secrets = RoleSecrets::open(&self.private_blob, owner, self.id)?;

        if secrets.signing.public_key() != self.signing_public
            || secrets.encryption.public_key() != self.encryption_public
        {
            return Err(GraphError::KeyMismatch(self.id));
        }
        Ok(secrets)
    }

    /// A signing context for ledger entries authored by this role.
    pub fn signing_context(&self, keys: &RoleKeys) -> Result<SigningContext> {
        let algorithm = SignatureAlgorithm::parse(&self.signing_alg)?;
        let secrets = self.open_secrets(keys)?;
        Ok(SigningContext {
            role_id: self.id,
            keypair: secrets.signing,
            algorithm,
        })
    }

    /// The public half used to verify this role's signatures.
    pub fn signer_key(&self) -> SignerKey {
        SignerKey {
            public_key: self.signing_public,
            algorithm: self.signing_alg.clone(),
        }
    }
}

/// One role key wrapped under a principal's root key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    /// The principal whose root key wraps this entry.
    pub principal_id: RoleId,
    /// The role the wrapped key belongs to.
    pub role_id: RoleId,
    pub kind: KeyKind,
    pub wrapped_key: Bytes,
    /// Key-chain sequence number of the entry that authorized this key.
    pub authorized_by_seq: Option<u64>,
    pub created_at: i64,
}

impl KeyEntry {
    fn aad(role_id: RoleId, kind: KeyKind) -> Vec<u8> {
        let mut aad = role_id.as_bytes().to_vec();
        aad.extend_from_slice(kind.as_str().as_bytes());
        aad
    }

    /// Wrap `key` under `root_key`.
    pub fn wrap(
        principal_id: RoleId,
        role_id: RoleId,
        kind: KeyKind,
        key: &SymmetricKey,
        root_key: &SymmetricKey,
        authorized_by_seq: Option<u64>,
        now: i64,
    ) -> Result<Self> {
        let wrapped_key = root_key.wrap_key(key, &Self::aad(role_id, kind))?;
        Ok(Self {
            principal_id,
            role_id,
            kind,
            wrapped_key: wrapped_key.into(),
            authorized_by_seq,
            created_at: now,
        })
    }

    /// Wrap every key of a triple under `root_key`.
    pub fn wrap_all(
        principal_id: RoleId,
        role_id: RoleId,
        keys: &RoleKeys,
        root_key: &SymmetricKey,
        authorized_by_seq: Option<u64>,
        now: i64,
    ) -> Result<Vec<Self>> {
        KeyKind::ALL
            .iter()
            .filter_map(|kind| keys.get(*kind).map(|key| (*kind, key)))
            .map(|(kind, key)| {
                Self::wrap(principal_id, role_id, kind, key, root_key, authorized_by_seq, now)
            })
            .collect()
    }

    pub fn unwrap(&self, root_key: &SymmetricKey) -> std::result::Result<SymmetricKey, IntegrityError> {
        root_key.unwrap_key(&self.wrapped_key, &Self::aad(self.role_id, self.kind))
    }
}

/// Unwrap every entry `root_key` opens into per-role key triples.
///
/// Entries that do not open are skipped.
pub fn unlock_root_keys(entries: &[KeyEntry], root_key: &SymmetricKey) -> HashMap<RoleId, RoleKeys> {
    let mut roots: HashMap<RoleId, RoleKeys> = HashMap::new();
    for entry in entries {
        match entry.unwrap(root_key) {
            Ok(key) => {
                roots.entry(entry.role_id).or_default().set_if_absent(entry.kind, key);
            }
            Err(IntegrityError) => {
                tracing::trace!(role = %entry.role_id, kind = %entry.kind, "key entry did not open");
            }
        }
    }
    roots
}
