//! Role edges: a child's keys wrapped under a parent's keys.
//!
//! An edge `parent -> child` always carries the child's Read key wrapped under
//! the parent's Read key. Write edges add the Write copy, Owner edges add the
//! Owner copy. Each copy is sealed under the parent's key of the same kind
//! with the child id as associated data.
//!
//! The relationship label is stored twice: sealed under the parent's Read key,
//! and as a keyed Blake3 hash of its canonical capability name under the same
//! key. The hash lets a holder of the Read key find edges of a given
//! capability without opening every label.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use keyweave_core::{Blake3Hash, IntegrityError, RoleId, SymmetricKey};

use crate::error::{GraphError, Result};
use crate::relation::{Capability, RelationAliases};
use crate::role::{KeyKind, RoleKeys};

/// A directed, typed edge of the role graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEdge {
    pub parent: RoleId,
    pub child: RoleId,
    pub read_copy: Bytes,
    pub write_copy: Option<Bytes>,
    pub owner_copy: Option<Bytes>,
    /// The relationship label as given, sealed under the parent's Read key.
    pub label_blob: Bytes,
    /// Keyed hash of the canonical capability name.
    pub label_hash: Blake3Hash,
    pub created_at: i64,
}

impl RoleEdge {
    /// Mint an edge from `parent` to `child` labelled `label`.
    ///
    /// Requires the parent's Owner key, the parent's keys for every copy the
    /// capability carries, and the child's keys up to that capability.
    pub fn mint(
        parent: RoleId,
        parent_keys: &RoleKeys,
        child: RoleId,
        child_keys: &RoleKeys,
        label: &str,
        relations: &RelationAliases,
        now: i64,
    ) -> Result<Self> {
        if parent == child {
            return Err(GraphError::SelfEdge(parent));
        }
        let capability = relations
            .normalize(label)
            .ok_or_else(|| GraphError::UnknownRelation(label.to_string()))?;

        parent_keys.require(parent, KeyKind::Owner)?;
        let aad = child.as_bytes();

        let mut copies: [Option<Bytes>; 3] = [None, None, None];
        for (slot, kind) in KeyKind::ALL.iter().enumerate() {
            if !capability.key_kinds().contains(kind) {
                continue;
            }
            let wrapping = parent_keys.require(parent, *kind)?;
            let key = child_keys.require(child, *kind)?;
            copies[slot] = Some(wrapping.wrap_key(key, aad)?.into());
        }
        let [read_copy, write_copy, owner_copy] = copies;
        let read_copy = read_copy.ok_or(GraphError::MissingKey {
            role: child,
            kind: KeyKind::Read,
        })?;

        let parent_read = parent_keys.require(parent, KeyKind::Read)?;
        let label_blob: Bytes = parent_read.encrypt(label.as_bytes(), aad)?.into();

        Ok(Self {
            parent,
            child,
            read_copy,
            write_copy,
            owner_copy,
            label_blob,
            label_hash: label_hash(parent_read, capability),
            created_at: now,
        })
    }

    /// The wrapped copy of the child's `kind` key, if this edge carries one.
    pub fn copy(&self, kind: KeyKind) -> Option<&Bytes> {
        match kind {
            KeyKind::Read => Some(&self.read_copy),
            KeyKind::Write => self.write_copy.as_ref(),
            KeyKind::Owner => self.owner_copy.as_ref(),
        }
    }

    /// Unwrap the child's `kind` key with the parent's key of the same kind.
    pub fn open_copy(
        &self,
        kind: KeyKind,
        parent_key: &SymmetricKey,
    ) -> std::result::Result<Option<SymmetricKey>, IntegrityError> {
        match self.copy(kind) {
            Some(blob) => parent_key.unwrap_key(blob, self.child.as_bytes()).map(Some),
            None => Ok(None),
        }
    }

    /// Open the relationship label.
    pub fn open_label(&self, parent_read: &SymmetricKey) -> std::result::Result<String, IntegrityError> {
        let plaintext = parent_read.decrypt(&self.label_blob, self.child.as_bytes())?;
        String::from_utf8(plaintext).map_err(|_| IntegrityError)
    }

    /// Resolve the capability this edge confers.
    ///
    /// A label that no longer normalizes, or whose hash does not match, only
    /// confers Read.
    pub fn capability(
        &self,
        parent_read: &SymmetricKey,
        relations: &RelationAliases,
    ) -> std::result::Result<Capability, IntegrityError> {
        let label = self.open_label(parent_read)?;
        let Some(capability) = relations.normalize(&label) else {
            tracing::debug!(parent = %self.parent, child = %self.child, "edge label does not normalize");
            return Ok(Capability::Read);
        };
        if label_hash(parent_read, capability) != self.label_hash {
            tracing::debug!(parent = %self.parent, child = %self.child, "edge label hash mismatch");
            return Ok(Capability::Read);
        }
        Ok(capability)
    }
}

/// Keyed hash of a capability's canonical name under a parent's Read key.
pub fn label_hash(parent_read: &SymmetricKey, capability: Capability) -> Blake3Hash {
    Blake3Hash::keyed(parent_read, capability.as_str().as_bytes())
}
