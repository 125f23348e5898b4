//! The Engine: one entry point over keys, graph, grants and ledger.
//!
//! The engine never holds a key ring of its own. Every operation that needs
//! key material takes the caller's ring, so authorization is whatever that
//! ring can decrypt. Missing keys surface as [`EngineError::Forbidden`] with
//! no further detail.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use keyweave_core::{
    verify_chain, Chain, CoreError, DataItemId, EncryptionAlgorithm, GrantId, LedgerEntry, RoleId,
    SessionId, ShareId, SignerKey, SigningContext, SymmetricKey, VerificationSummary,
};
use keyweave_graph::{
    find_grant, unlock_root_keys, Capability, DataKeyGrant, KeyEntry, KeyKind, KeyRing,
    KeyRingBuilder, Permission, RelationAliases, Role, RoleEdge, RoleGraph, RoleKeys, SealedShare,
};
use keyweave_store::{RoleRotation, Store};

use crate::cache::{CachedSession, KeyRingCache, MemoryKeyRingCache, RootKeys};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events;
use crate::ledger::Ledger;
use crate::now_millis;

/// How a data key reached its grantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Wrapped under the grantee's Read key.
    Granted(GrantId),
    /// Sealed to the grantee's public key until it accepts.
    Sealed(ShareId),
}

/// The main Engine struct.
pub struct Engine<S: Store, C: KeyRingCache = MemoryKeyRingCache> {
    store: Arc<S>,
    cache: C,
    config: EngineConfig,
    ledger: Ledger<S>,
}

impl<S: Store> Engine<S, MemoryKeyRingCache> {
    /// Create an engine with an in-process ring cache sized from `config`.
    pub fn with_memory_cache(store: S, config: EngineConfig) -> Result<Self> {
        let cache = MemoryKeyRingCache::new(config.cache.ttl());
        Self::new(store, cache, config)
    }
}

impl<S: Store, C: KeyRingCache> Engine<S, C> {
    /// Create a new engine. Fails if `config` does not validate.
    pub fn new(store: S, cache: C, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(store);
        Ok(Self {
            ledger: Ledger::new(store.clone()),
            store,
            cache,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn relations(&self) -> &RelationAliases {
        &self.config.relations
    }

    async fn require_role(&self, id: &RoleId) -> Result<Role> {
        self.store
            .get_role(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("role {}", id)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principals and Sessions
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a principal whose own keys unlock with `secret`.
    ///
    /// The key-chain entry is appended first so the key entries can cite its
    /// seq; the role and its entries are then written as one batch.
    pub async fn register_principal(&self, name: &str, secret: &[u8]) -> Result<Role> {
        let now = now_millis();
        let (mut role, material) = Role::create(name, now)?;
        let salt = keyweave_core::generate_salt();
        let root_key = keyweave_core::derive_root_key(secret, &salt, &self.config.kdf)?;
        role.kdf_salt = Some(salt);

        let ctx = SigningContext::ed25519(role.id, material.secrets.signing.clone());
        let entry = self
            .ledger
            .append(
                Chain::Key,
                events::PRINCIPAL_REGISTERED,
                &role.id.to_string(),
                &json!({ "role_id": role.id, "name": role.name }),
                now,
                Some(&ctx),
            )
            .await?;

        let entries =
            KeyEntry::wrap_all(role.id, role.id, &material.keys, &root_key, Some(entry.seq), now)?;
        self.store.insert_principal(&role, &entries).await?;

        tracing::info!(principal = %role.id, "registered principal");
        Ok(role)
    }

    /// Stretch `secret` into `principal`'s root key.
    pub async fn derive_root_key(&self, secret: &[u8], principal: RoleId) -> Result<SymmetricKey> {
        let role = self.store.get_role(&principal).await?.ok_or(EngineError::Forbidden)?;
        let salt = role.kdf_salt.as_deref().ok_or(EngineError::Forbidden)?;
        Ok(keyweave_core::derive_root_key(secret, salt, &self.config.kdf)?)
    }

    /// Unwrap the role keys stored under `principal`'s root key.
    pub async fn unlock(&self, principal: RoleId, root_key: &SymmetricKey) -> Result<RootKeys> {
        let entries = self.store.key_entries_for(&principal).await?;
        let roots = unlock_root_keys(&entries, root_key);
        if roots.is_empty() {
            tracing::warn!(principal = %principal, "unlock failed");
            return Err(EngineError::Forbidden);
        }
        Ok(roots)
    }

    /// Expand root keys into a ring over the current graph.
    pub async fn build_key_ring(&self, root_keys: RootKeys) -> Result<KeyRing> {
        let graph = RoleGraph::from_edges(self.store.list_edges().await?);
        Ok(KeyRingBuilder::new(self.relations()).build(&graph, root_keys))
    }

    /// Log `principal` in and cache its ring under `session`.
    pub async fn open_session(
        &self,
        session: SessionId,
        principal: RoleId,
        secret: &[u8],
    ) -> Result<Arc<KeyRing>> {
        let roots = match self.login(principal, secret).await {
            Ok(roots) => roots,
            Err(EngineError::Forbidden) => {
                self.append(
                    Chain::Auth,
                    events::SESSION_REJECTED,
                    &principal.to_string(),
                    &json!({ "principal": principal }),
                    None,
                )
                .await?;
                return Err(EngineError::Forbidden);
            }
            Err(e) => return Err(e),
        };

        let generation = self.cache.generation();
        let ring = Arc::new(self.build_key_ring(roots.clone()).await?);
        self.cache.insert(
            session,
            CachedSession {
                principal,
                roots: Arc::new(roots),
                ring: Some(ring.clone()),
                generation,
            },
        );

        self.record(
            Chain::Auth,
            events::SESSION_OPENED,
            &ring,
            principal,
            json!({ "principal": principal }),
        )
        .await?;
        tracing::info!(principal = %principal, roles = ring.len(), "opened session");
        Ok(ring)
    }

    async fn login(&self, principal: RoleId, secret: &[u8]) -> Result<RootKeys> {
        let root_key = self.derive_root_key(secret, principal).await?;
        self.unlock(principal, &root_key).await
    }

    /// The ring of a live session, rebuilt if it was invalidated.
    pub async fn session_ring(&self, session: &SessionId) -> Result<Arc<KeyRing>> {
        let entry = self.cache.get(session).ok_or(EngineError::Forbidden)?;
        if let Some(ring) = &entry.ring {
            return Ok(ring.clone());
        }

        let generation = self.cache.generation();
        let ring = Arc::new(self.build_key_ring(entry.roots.as_ref().clone()).await?);
        tracing::debug!(principal = %entry.principal, roles = ring.len(), "rebuilt session ring");
        self.cache.insert(
            session.clone(),
            CachedSession {
                ring: Some(ring.clone()),
                generation,
                ..entry
            },
        );
        Ok(ring)
    }

    /// End a session. Returns whether it was live.
    pub async fn close_session(&self, session: &SessionId) -> Result<bool> {
        let Some(entry) = self.cache.get(session) else {
            self.cache.remove(session);
            return Ok(false);
        };
        self.cache.remove(session);

        self.append(
            Chain::Auth,
            events::SESSION_CLOSED,
            &entry.principal.to_string(),
            &json!({ "principal": entry.principal }),
            None,
        )
        .await?;
        tracing::info!(principal = %entry.principal, "closed session");
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Graph Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a role under `parent`, linked by `relation`.
    pub async fn create_role(
        &self,
        ring: &KeyRing,
        parent: RoleId,
        name: &str,
        relation: &str,
    ) -> Result<Role> {
        let parent_keys = ring
            .get(&parent)
            .filter(|keys| keys.has(KeyKind::Owner))
            .ok_or(EngineError::Forbidden)?;
        self.require_role(&parent).await?;

        let now = now_millis();
        let (role, material) = Role::create(name, now)?;
        let edge = RoleEdge::mint(
            parent,
            parent_keys,
            role.id,
            &material.keys,
            relation,
            self.relations(),
            now,
        )
        .map_err(EngineError::from_graph)?;

        self.store.insert_role_with_edge(&role, &edge).await?;
        self.cache.invalidate_role(&parent);

        self.record(
            Chain::Key,
            events::ROLE_CREATED,
            ring,
            parent,
            json!({
                "role_id": role.id,
                "name": role.name,
                "parent": parent,
                "capability": self.capability_name(relation),
            }),
        )
        .await?;
        Ok(role)
    }

    /// Link two existing roles.
    ///
    /// The ring must hold the parent's Owner key and the child's keys up to
    /// the capability of `relation`.
    pub async fn create_edge(
        &self,
        ring: &KeyRing,
        parent: RoleId,
        child: RoleId,
        relation: &str,
    ) -> Result<RoleEdge> {
        let parent_keys = ring.get(&parent).ok_or(EngineError::Forbidden)?;
        let child_keys = ring.get(&child).ok_or(EngineError::Forbidden)?;
        self.require_role(&parent).await?;
        self.require_role(&child).await?;

        let edge = RoleEdge::mint(
            parent,
            parent_keys,
            child,
            child_keys,
            relation,
            self.relations(),
            now_millis(),
        )
        .map_err(EngineError::from_graph)?;
        self.store.insert_edge(&edge).await?;
        self.cache.invalidate_role(&parent);
        self.cache.invalidate_role(&child);

        self.record(
            Chain::Key,
            events::ROLE_EDGE_CREATED,
            ring,
            parent,
            json!({
                "parent": parent,
                "child": child,
                "capability": self.capability_name(relation),
            }),
        )
        .await?;
        Ok(edge)
    }

    /// Delete the edge between two roles. Requires the parent's Owner key.
    ///
    /// Keys already recovered through the edge stay valid until the child's
    /// keys are rotated.
    pub async fn remove_edge(&self, ring: &KeyRing, parent: RoleId, child: RoleId) -> Result<()> {
        if !ring.has(&parent, KeyKind::Owner) {
            return Err(EngineError::Forbidden);
        }
        if !self.store.remove_edge(&parent, &child).await? {
            return Err(EngineError::NotFound(format!("edge {} -> {}", parent, child)));
        }
        self.cache.invalidate_role(&parent);
        self.cache.invalidate_role(&child);

        self.record(
            Chain::Key,
            events::ROLE_EDGE_REMOVED,
            ring,
            parent,
            json!({ "parent": parent, "child": child }),
        )
        .await?;
        Ok(())
    }

    /// Replace a role's keys and re-mint everything wrapped under them.
    ///
    /// The ring must hold the role's full triple and, for every incoming
    /// edge, the parent keys needed to mint it again. Nothing is written
    /// unless all of that holds. Principals cannot be rotated here: their
    /// key entries are wrapped under a root key the engine never sees.
    pub async fn rotate_role_keys(&self, ring: &KeyRing, role_id: RoleId) -> Result<()> {
        let old_keys = ring
            .get(&role_id)
            .filter(|keys| keys.is_complete())
            .ok_or(EngineError::Forbidden)?;
        let mut role = self.require_role(&role_id).await?;
        if role.kdf_salt.is_some() {
            return Err(EngineError::InvalidOperation(format!(
                "role {} is a principal",
                role_id
            )));
        }
        let old_secrets = role.open_secrets(old_keys).map_err(EngineError::from_graph)?;
        let old_read = old_keys.require(role_id, KeyKind::Read)?;
        let relations = self.relations();

        let mut parents: Vec<(RoleId, &RoleKeys, String)> = Vec::new();
        for edge in self.store.edges_to(&role_id).await? {
            let parent_keys = ring.get(&edge.parent).ok_or(EngineError::Forbidden)?;
            let parent_read = parent_keys
                .require(edge.parent, KeyKind::Read)
                .map_err(EngineError::from_graph)?;
            let label = edge.open_label(parent_read).map_err(|_| EngineError::Forbidden)?;
            let capability = edge
                .capability(parent_read, relations)
                .map_err(|_| EngineError::Forbidden)?;
            let needs_owner = std::iter::once(&KeyKind::Owner);
            if !capability.key_kinds().iter().chain(needs_owner).all(|k| parent_keys.has(*k)) {
                return Err(EngineError::Forbidden);
            }
            parents.push((edge.parent, parent_keys, effective_label(label, capability, relations)));
        }

        let mut children: Vec<(RoleId, RoleKeys, String)> = Vec::new();
        for edge in self.store.edges_from(&role_id).await? {
            let label = edge.open_label(old_read).map_err(CoreError::from)?;
            let capability = edge.capability(old_read, relations).map_err(CoreError::from)?;
            let mut child_keys = RoleKeys::default();
            for kind in capability.key_kinds() {
                let wrapping = old_keys.require(role_id, *kind)?;
                if let Some(key) = edge.open_copy(*kind, wrapping).map_err(CoreError::from)? {
                    child_keys.set_if_absent(*kind, key);
                }
            }
            children.push((edge.child, child_keys, effective_label(label, capability, relations)));
        }

        let grants = self.store.grants_for_grantee(&role_id).await?;
        let shares = self.store.pending_shares_for(&role_id).await?;

        let now = now_millis();
        let material = role.rotate(now)?;
        let new_keys = &material.keys;
        let new_read = new_keys.require(role_id, KeyKind::Read)?;

        let mut minted = Vec::with_capacity(parents.len() + children.len());
        for (parent, parent_keys, label) in &parents {
            minted.push(RoleEdge::mint(*parent, parent_keys, role_id, new_keys, label, relations, now)?);
        }
        for (child, child_keys, label) in &children {
            minted.push(RoleEdge::mint(role_id, new_keys, *child, child_keys, label, relations, now)?);
        }

        let mut rewrapped = Vec::new();
        for grant in grants.iter().filter(|g| g.is_active_at(now)) {
            match grant.rewrap(old_read, new_read) {
                Ok(grant) => rewrapped.push(grant),
                Err(e) => tracing::warn!(grant = %grant.id, error = %e, "grant dropped on rotation"),
            }
        }

        let mut accepted = Vec::new();
        for share in &shares {
            match share.accept(&old_secrets.encryption, new_read, now) {
                Ok(grant) => accepted.push((share.id, grant)),
                Err(e) => tracing::warn!(share = %share.id, error = %e, "share dropped on rotation"),
            }
        }

        let rotation = RoleRotation {
            role,
            edges: minted,
            grants: rewrapped,
            accepted,
            at: now,
        };
        self.store.apply_rotation(&rotation).await?;
        self.cache.invalidate_role(&role_id);

        let ctx = SigningContext::ed25519(role_id, material.secrets.signing.clone());
        self.ledger
            .append(
                Chain::Key,
                events::ROLE_KEYS_ROTATED,
                &role_id.to_string(),
                &json!({
                    "role_id": role_id,
                    "edges": rotation.edges.len(),
                    "grants": rotation.grants.len() + rotation.accepted.len(),
                }),
                now,
                Some(&ctx),
            )
            .await?;

        tracing::info!(role = %role_id, edges = rotation.edges.len(), "rotated role keys");
        Ok(())
    }

    fn capability_name(&self, relation: &str) -> Option<&'static str> {
        self.relations().normalize(relation).map(Capability::as_str)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Data Keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a data item owned by `owner`, which receives a Write grant.
    pub async fn create_data_item(&self, ring: &KeyRing, owner: RoleId) -> Result<DataItemId> {
        let keys = ring
            .get(&owner)
            .filter(|keys| keys.has(KeyKind::Write))
            .ok_or(EngineError::Forbidden)?;
        let read = keys.require(owner, KeyKind::Read).map_err(EngineError::from_graph)?;

        let now = now_millis();
        let item = DataItemId::generate();
        let data_key = SymmetricKey::generate();
        let grant =
            DataKeyGrant::wrap(item, owner, read, Permission::Write, &data_key, Some(owner), now)?;
        self.store.insert_grant(&grant).await?;

        self.record(
            Chain::Key,
            events::ROLE_FIELD_KEY_CREATED,
            ring,
            owner,
            json!({ "item_id": item, "role_id": owner, "grant_id": grant.id }),
        )
        .await?;
        Ok(item)
    }

    /// Give `grantee` the item's data key at `permission`.
    ///
    /// The ring must resolve the key at that permission. If the ring also
    /// holds the grantee's Read key the grant is immediate, otherwise the key
    /// is sealed to the grantee's public key.
    pub async fn grant_data_key(
        &self,
        ring: &KeyRing,
        item: DataItemId,
        grantee: RoleId,
        permission: Permission,
    ) -> Result<GrantOutcome> {
        let now = now_millis();
        let grants = self.store.grants_for_item(&item).await?;
        let (source, data_key) =
            find_grant(item, &grants, ring, now, permission).ok_or(EngineError::Forbidden)?;
        let granter = source.grantee;

        let existing = grants.iter().find(|g| {
            g.grantee == grantee && g.permission == permission && g.is_active_at(now)
        });
        if let Some(existing) = existing {
            return Ok(GrantOutcome::Granted(existing.id));
        }

        let outcome = match ring.key(&grantee, KeyKind::Read) {
            Some(grantee_read) => {
                let grant = DataKeyGrant::wrap(
                    item,
                    grantee,
                    grantee_read,
                    permission,
                    &data_key,
                    Some(granter),
                    now,
                )?;
                self.store.insert_grant(&grant).await?;
                GrantOutcome::Granted(grant.id)
            }
            None => {
                let role = self.require_role(&grantee).await?;
                EncryptionAlgorithm::parse(&role.encryption_alg)?;
                let share = SealedShare::create(
                    item,
                    grantee,
                    &role.encryption_public,
                    permission,
                    &data_key,
                    Some(granter),
                    now,
                )?;
                self.store.insert_share(&share).await?;
                GrantOutcome::Sealed(share.id)
            }
        };

        let (grant_id, share_id) = match outcome {
            GrantOutcome::Granted(id) => (Some(id), None),
            GrantOutcome::Sealed(id) => (None, Some(id)),
        };
        self.cache.invalidate_role(&grantee);
        self.record(
            Chain::Key,
            events::DATA_KEY_GRANTED,
            ring,
            granter,
            json!({
                "item_id": item,
                "grantee": grantee,
                "permission": permission.as_str(),
                "grant_id": grant_id,
                "share_id": share_id,
            }),
        )
        .await?;
        Ok(outcome)
    }

    /// Turn every pending share for `role` into a grant.
    pub async fn accept_shares(&self, ring: &KeyRing, role: RoleId) -> Result<Vec<GrantId>> {
        let keys = ring.get(&role).ok_or(EngineError::Forbidden)?;
        let record = self.require_role(&role).await?;
        let secrets = record.open_secrets(keys).map_err(EngineError::from_graph)?;
        let read = keys.require(role, KeyKind::Read).map_err(EngineError::from_graph)?;

        let now = now_millis();
        let mut accepted = Vec::new();
        for share in self.store.pending_shares_for(&role).await? {
            let grant = match share.accept(&secrets.encryption, read, now) {
                Ok(grant) => grant,
                Err(e) => {
                    tracing::debug!(share = %share.id, error = %e, "share did not open");
                    continue;
                }
            };
            if !self.store.mark_share_accepted(&share.id, now).await? {
                continue;
            }
            self.store.insert_grant(&grant).await?;

            self.record(
                Chain::Key,
                events::SHARE_ACCEPTED,
                ring,
                role,
                json!({ "share_id": share.id, "grant_id": grant.id, "item_id": share.item_id }),
            )
            .await?;
            accepted.push(grant.id);
        }
        Ok(accepted)
    }

    /// Revoke one grant of `item`. Returns whether it was still active.
    ///
    /// Allowed to Write holders of the item and to the grantee itself.
    pub async fn revoke_grant(
        &self,
        ring: &KeyRing,
        item: DataItemId,
        grant_id: GrantId,
    ) -> Result<bool> {
        let now = now_millis();
        let grants = self.store.grants_for_item(&item).await?;
        let target = grants
            .iter()
            .find(|g| g.id == grant_id)
            .ok_or_else(|| EngineError::NotFound(format!("grant {}", grant_id)))?;

        let revoker = find_grant(item, &grants, ring, now, Permission::Write)
            .map(|(grant, _)| grant.grantee)
            .or_else(|| ring.has(&target.grantee, KeyKind::Read).then_some(target.grantee))
            .ok_or(EngineError::Forbidden)?;

        if !self.store.revoke_grant(&grant_id, now).await? {
            return Ok(false);
        }
        self.cache.invalidate_role(&target.grantee);

        self.record(
            Chain::Key,
            events::GRANT_REVOKED,
            ring,
            revoker,
            json!({ "item_id": item, "grant_id": grant_id, "grantee": target.grantee }),
        )
        .await?;
        Ok(true)
    }

    /// The item's data key, through any active grant the ring opens.
    pub async fn resolve_data_key(&self, item: DataItemId, ring: &KeyRing) -> Result<SymmetricKey> {
        self.resolve_data_key_with(item, ring, Permission::Read).await
    }

    /// Like [`Engine::resolve_data_key`], at or above `required`.
    pub async fn resolve_data_key_with(
        &self,
        item: DataItemId,
        ring: &KeyRing,
        required: Permission,
    ) -> Result<SymmetricKey> {
        let grants = self.store.grants_for_item(&item).await?;
        keyweave_graph::resolve_with(item, &grants, ring, now_millis(), required)
            .ok_or(EngineError::Forbidden)
    }

    /// Seal a protected field value. Requires Write on the item.
    pub async fn seal_field(&self, ring: &KeyRing, item: DataItemId, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.resolve_data_key_with(item, ring, Permission::Write).await?;
        Ok(keyweave_graph::seal_field(&key, item, plaintext)?)
    }

    /// Open a protected field value. Requires Read on the item.
    pub async fn open_field(&self, ring: &KeyRing, item: DataItemId, blob: &[u8]) -> Result<Vec<u8>> {
        let key = self.resolve_data_key(item, ring).await?;
        Ok(keyweave_graph::open_field(&key, item, blob).map_err(CoreError::from)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Signing context for `role`, from the keys the ring holds for it.
    pub async fn signing_context(&self, ring: &KeyRing, role: RoleId) -> Result<SigningContext> {
        let keys = ring.get(&role).ok_or(EngineError::Forbidden)?;
        let record = self.require_role(&role).await?;
        record.signing_context(keys).map_err(EngineError::from_graph)
    }

    async fn sign_as(&self, ring: &KeyRing, role: RoleId) -> Option<SigningContext> {
        match self.signing_context(ring, role).await {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::warn!(role = %role, error = %e, "signing unavailable, appending unsigned");
                None
            }
        }
    }

    /// Append an entry, signed as `signer.1` when its keys are in `signer.0`.
    ///
    /// Signing is best-effort: an entry whose signing context cannot be
    /// derived is appended unsigned.
    pub async fn append(
        &self,
        chain: Chain,
        event_type: &str,
        actor: &str,
        payload: &Value,
        signer: Option<(&KeyRing, RoleId)>,
    ) -> Result<LedgerEntry> {
        let signing = match signer {
            Some((ring, role)) => self.sign_as(ring, role).await,
            None => None,
        };
        self.ledger
            .append(chain, event_type, actor, payload, now_millis(), signing.as_ref())
            .await
    }

    async fn record(
        &self,
        chain: Chain,
        event_type: &str,
        ring: &KeyRing,
        role: RoleId,
        payload: Value,
    ) -> Result<LedgerEntry> {
        self.append(chain, event_type, &role.to_string(), &payload, Some((ring, role)))
            .await
    }

    /// Record an application event on the business chain, signed by `role`.
    pub async fn record_business_event(
        &self,
        ring: &KeyRing,
        role: RoleId,
        event_type: &str,
        payload: Value,
    ) -> Result<LedgerEntry> {
        if !ring.contains_role(&role) {
            return Err(EngineError::Forbidden);
        }
        self.record(Chain::Business, event_type, ring, role, payload).await
    }

    /// Current signing keys of every role.
    pub async fn signer_directory(&self) -> Result<HashMap<RoleId, SignerKey>> {
        Ok(self
            .store
            .list_roles()
            .await?
            .iter()
            .map(|role| (role.id, role.signer_key()))
            .collect())
    }

    /// Verify one stored chain.
    pub async fn verify(&self, chain: Chain) -> Result<VerificationSummary> {
        let signers = self.signer_directory().await?;
        let summary = self
            .ledger
            .verify(chain, &self.config.signatures, &signers)
            .await?;
        log_summary(&summary);
        Ok(summary)
    }

    /// Verify every chain.
    pub async fn verify_all(&self) -> Result<Vec<VerificationSummary>> {
        let signers = self.signer_directory().await?;
        let mut summaries = Vec::with_capacity(Chain::ALL.len());
        for chain in Chain::ALL {
            let summary = self
                .ledger
                .verify(chain, &self.config.signatures, &signers)
                .await?;
            log_summary(&summary);
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Verify entries supplied by the caller against current signer keys.
    pub async fn verify_entries(
        &self,
        chain: Chain,
        entries: &[LedgerEntry],
    ) -> Result<VerificationSummary> {
        let signers = self.signer_directory().await?;
        let summary = verify_chain(chain, entries, &self.config.signatures, &signers)?;
        log_summary(&summary);
        Ok(summary)
    }
}

fn log_summary(summary: &VerificationSummary) {
    if !summary.is_clean() {
        tracing::warn!(
            chain = %summary.chain,
            hash_mismatches = summary.hash_mismatches,
            previous_hash_mismatches = summary.previous_hash_mismatches,
            signatures_invalid = summary.signatures_invalid,
            signatures_missing = summary.signatures_missing,
            chain_mismatches = summary.chain_mismatches,
            "ledger verification findings"
        );
    }
}

/// The label to re-mint an edge with: as given if it still resolves to the
/// edge's capability, otherwise the capability's canonical name.
fn effective_label(label: String, capability: Capability, relations: &RelationAliases) -> String {
    if relations.normalize(&label) == Some(capability) {
        label
    } else {
        capability.as_str().to_string()
    }
}
