//! Data key grants and resolution.
//!
//! Every protected data item has one random data key. A [`DataKeyGrant`]
//! wraps that key under one grantee role's Read key, with the grantee id as
//! associated data. Grants are soft-revoked by timestamp and never deleted.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use keyweave_core::{DataItemId, GrantId, IntegrityError, RoleId, SymmetricKey};

use crate::error::Result;
use crate::keyring::KeyRing;
use crate::role::KeyKind;

/// What a grant allows the grantee to do with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Permission::Read),
            "write" => Some(Permission::Write),
            _ => None,
        }
    }

    /// Whether this permission is enough for `required`.
    pub fn satisfies(self, required: Permission) -> bool {
        self >= required
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A data key wrapped for one grantee role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataKeyGrant {
    pub id: GrantId,
    pub item_id: DataItemId,
    pub grantee: RoleId,
    pub permission: Permission,
    pub wrapped_key: Bytes,
    pub granted_by: Option<RoleId>,
    pub created_at: i64,
    /// Unix milliseconds from which the grant stops resolving.
    pub revoked_at: Option<i64>,
}

impl DataKeyGrant {
    /// Wrap `data_key` under the grantee's Read key.
    pub fn wrap(
        item_id: DataItemId,
        grantee: RoleId,
        grantee_read: &SymmetricKey,
        permission: Permission,
        data_key: &SymmetricKey,
        granted_by: Option<RoleId>,
        now: i64,
    ) -> Result<Self> {
        let wrapped_key = grantee_read.wrap_key(data_key, grantee.as_bytes())?;
        Ok(Self {
            id: GrantId::generate(),
            item_id,
            grantee,
            permission,
            wrapped_key: wrapped_key.into(),
            granted_by,
            created_at: now,
            revoked_at: None,
        })
    }

    /// A grant revoked at a future instant stays active until then.
    pub fn is_active_at(&self, now: i64) -> bool {
        self.revoked_at.map_or(true, |revoked_at| revoked_at > now)
    }

    pub fn unwrap(&self, grantee_read: &SymmetricKey) -> std::result::Result<SymmetricKey, IntegrityError> {
        grantee_read.unwrap_key(&self.wrapped_key, self.grantee.as_bytes())
    }

    /// The same grant, wrapped under the grantee's replacement Read key.
    pub fn rewrap(&self, old_read: &SymmetricKey, new_read: &SymmetricKey) -> Result<Self> {
        let data_key = self.unwrap(old_read)?;
        let wrapped_key = new_read.wrap_key(&data_key, self.grantee.as_bytes())?;
        Ok(Self {
            wrapped_key: wrapped_key.into(),
            ..self.clone()
        })
    }
}

/// Find the data key for `item_id` through any active grant the ring opens.
pub fn resolve_data_key(
    item_id: DataItemId,
    grants: &[DataKeyGrant],
    ring: &KeyRing,
    now: i64,
) -> Option<SymmetricKey> {
    resolve_with(item_id, grants, ring, now, Permission::Read)
}

/// Like [`resolve_data_key`], only considering grants at or above `required`.
pub fn resolve_with(
    item_id: DataItemId,
    grants: &[DataKeyGrant],
    ring: &KeyRing,
    now: i64,
    required: Permission,
) -> Option<SymmetricKey> {
    find_grant(item_id, grants, ring, now, required).map(|(_, key)| key)
}

/// The first grant the ring opens for `item_id`, with the data key it holds.
pub fn find_grant<'a>(
    item_id: DataItemId,
    grants: &'a [DataKeyGrant],
    ring: &KeyRing,
    now: i64,
    required: Permission,
) -> Option<(&'a DataKeyGrant, SymmetricKey)> {
    grants
        .iter()
        .filter(|grant| grant.item_id == item_id)
        .filter(|grant| grant.permission.satisfies(required))
        .filter(|grant| grant.is_active_at(now))
        .find_map(|grant| {
            let read = ring.key(&grant.grantee, KeyKind::Read)?;
            match grant.unwrap(read) {
                Ok(key) => Some((grant, key)),
                Err(IntegrityError) => {
                    tracing::trace!(grant = %grant.id, "grant did not open");
                    None
                }
            }
        })
}

/// Seal a protected field value under an item's data key.
pub fn seal_field(data_key: &SymmetricKey, item_id: DataItemId, plaintext: &[u8]) -> Result<Vec<u8>> {
    Ok(data_key.encrypt(plaintext, item_id.as_bytes())?)
}

/// Open a field sealed with [`seal_field`].
pub fn open_field(
    data_key: &SymmetricKey,
    item_id: DataItemId,
    blob: &[u8],
) -> std::result::Result<Vec<u8>, IntegrityError> {
    data_key.decrypt(blob, item_id.as_bytes())
}
