//! Data keys sealed to a role's X25519 public key.
//!
//! A granter who cannot reach the grantee's Read key seals the data key to the
//! grantee's public encryption key instead. The grantee opens the share with
//! its X25519 secret and turns it into a regular [`DataKeyGrant`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use keyweave_core::{
    DataItemId, EphemeralKeyPair, IntegrityError, RoleId, ShareId, SymmetricKey, X25519PublicKey,
    X25519StaticSecret,
};

use crate::error::Result;
use crate::grant::{DataKeyGrant, Permission};

/// A data key awaiting acceptance by its grantee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedShare {
    pub id: ShareId,
    pub item_id: DataItemId,
    pub grantee: RoleId,
    pub permission: Permission,
    /// Sender's side of the ECDH.
    pub ephemeral_public: X25519PublicKey,
    pub sealed_key: Bytes,
    pub granted_by: Option<RoleId>,
    pub created_at: i64,
    pub accepted_at: Option<i64>,
}

impl SealedShare {
    fn context(id: ShareId, item_id: DataItemId, grantee: RoleId) -> Vec<u8> {
        let mut context = Vec::with_capacity(48);
        context.extend_from_slice(id.as_bytes());
        context.extend_from_slice(item_id.as_bytes());
        context.extend_from_slice(grantee.as_bytes());
        context
    }

    /// Seal `data_key` for `grantee`.
    pub fn create(
        item_id: DataItemId,
        grantee: RoleId,
        grantee_public: &X25519PublicKey,
        permission: Permission,
        data_key: &SymmetricKey,
        granted_by: Option<RoleId>,
        now: i64,
    ) -> Result<Self> {
        let id = ShareId::generate();

        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let wrap_key = ephemeral
            .diffie_hellman(grantee_public)
            .derive_wrapping_key(&Self::context(id, item_id, grantee));

        let sealed_key = wrap_key.wrap_key(data_key, grantee.as_bytes())?;

        Ok(Self {
            id,
            item_id,
            grantee,
            permission,
            ephemeral_public,
            sealed_key: sealed_key.into(),
            granted_by,
            created_at: now,
            accepted_at: None,
        })
    }

    /// Open the share with the grantee's X25519 secret.
    pub fn open(&self, grantee_secret: &X25519StaticSecret) -> std::result::Result<SymmetricKey, IntegrityError> {
        let wrap_key = grantee_secret
            .diffie_hellman(&self.ephemeral_public)
            .derive_wrapping_key(&Self::context(self.id, self.item_id, self.grantee));
        wrap_key.unwrap_key(&self.sealed_key, self.grantee.as_bytes())
    }

    /// Open the share and rewrap it as a grant under the grantee's Read key.
    pub fn accept(
        &self,
        grantee_secret: &X25519StaticSecret,
        grantee_read: &SymmetricKey,
        now: i64,
    ) -> Result<DataKeyGrant> {
        let data_key = self.open(grantee_secret)?;
        DataKeyGrant::wrap(
            self.item_id,
            self.grantee,
            grantee_read,
            self.permission,
            &data_key,
            self.granted_by,
            now,
        )
    }
}
