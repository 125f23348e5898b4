//! Volatile [`Store`] kept in process memory.
//!
//! Mirrors the SQLite backend's ordering and uniqueness rules, so tests can
//! swap one for the other.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use keyweave_core::{Chain, DataItemId, GrantId, LedgerEntry, RoleId, ShareId};
use keyweave_graph::{DataKeyGrant, KeyEntry, Role, RoleEdge, SealedShare};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, RoleRotation, Store};

/// Maps and vectors behind one `RwLock`; dropped with the store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default, Clone)]
struct MemoryStoreInner {
    roles: BTreeMap<RoleId, Role>,

    /// Edges indexed by (parent, child).
    edges: BTreeMap<(RoleId, RoleId), RoleEdge>,

    key_entries: Vec<KeyEntry>,

    /// Grants in insertion order.
    grants: Vec<DataKeyGrant>,

    shares: Vec<SealedShare>,

    /// Ledger entries per chain, indexed by seq.
    ledger: HashMap<Chain, BTreeMap<u64, LedgerEntry>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` on a copy of the state and keep the copy only if `f` succeeds.
    fn transact<T>(&self, f: impl FnOnce(&mut MemoryStoreInner) -> Result<T>) -> Result<T> {
        let mut inner = self.write()?;
        let mut next = inner.clone();
        let out = f(&mut next)?;
        *inner = next;
        Ok(out)
    }
}

impl MemoryStoreInner {
    fn insert_role(&mut self, role: &Role) -> Result<()> {
        if self.roles.contains_key(&role.id) {
            return Err(StoreError::Conflict(format!("role {} exists", role.id)));
        }
        self.roles.insert(role.id, role.clone());
        Ok(())
    }

    fn update_role(&mut self, role: &Role) -> Result<()> {
        match self.roles.get_mut(&role.id) {
            Some(existing) => {
                *existing = role.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("role {}", role.id))),
        }
    }

    fn insert_edge(&mut self, edge: &RoleEdge) -> Result<()> {
        let key = (edge.parent, edge.child);
        if self.edges.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "edge {} -> {} exists",
                edge.parent, edge.child
            )));
        }
        self.edges.insert(key, edge.clone());
        Ok(())
    }

    fn insert_key_entries(&mut self, entries: &[KeyEntry]) -> Result<()> {
        for entry in entries {
            let exists = self.key_entries.iter().any(|e| {
                e.principal_id == entry.principal_id
                    && e.role_id == entry.role_id
                    && e.kind == entry.kind
            });
            if exists {
                return Err(StoreError::Conflict(format!(
                    "{} key entry for role {} under principal {} exists",
                    entry.kind, entry.role_id, entry.principal_id
                )));
            }
            self.key_entries.push(entry.clone());
        }
        Ok(())
    }

    fn insert_grant(&mut self, grant: &DataKeyGrant) -> Result<()> {
        if self.grants.iter().any(|g| g.id == grant.id) {
            return Err(StoreError::Conflict(format!("grant {} exists", grant.id)));
        }
        self.grants.push(grant.clone());
        Ok(())
    }

    fn update_grant(&mut self, grant: &DataKeyGrant) -> Result<()> {
        match self.grants.iter_mut().find(|g| g.id == grant.id) {
            Some(existing) => {
                *existing = grant.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("grant {}", grant.id))),
        }
    }

    fn mark_share_accepted(&mut self, id: &ShareId, at: i64) -> bool {
        match self.shares.iter_mut().find(|s| s.id == *id) {
            Some(share) if share.accepted_at.is_none() => {
                share.accepted_at = Some(at);
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_role(&self, role: &Role) -> Result<()> {
        self.write()?.insert_role(role)
    }

    async fn update_role(&self, role: &Role) -> Result<()> {
        self.write()?.update_role(role)
    }

    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>> {
        Ok(self.read()?.roles.get(id).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.read()?.roles.values().cloned().collect())
    }

    async fn insert_edge(&self, edge: &RoleEdge) -> Result<()> {
        self.write()?.insert_edge(edge)
    }

    async fn remove_edge(&self, parent: &RoleId, child: &RoleId) -> Result<bool> {
        Ok(self.write()?.edges.remove(&(*parent, *child)).is_some())
    }

    async fn get_edge(&self, parent: &RoleId, child: &RoleId) -> Result<Option<RoleEdge>> {
        Ok(self.read()?.edges.get(&(*parent, *child)).cloned())
    }

    async fn edges_from(&self, parent: &RoleId) -> Result<Vec<RoleEdge>> {
        Ok(self
            .read()?
            .edges
            .values()
            .filter(|e| e.parent == *parent)
            .cloned()
            .collect())
    }

    async fn edges_to(&self, child: &RoleId) -> Result<Vec<RoleEdge>> {
        Ok(self
            .read()?
            .edges
            .values()
            .filter(|e| e.child == *child)
            .cloned()
            .collect())
    }

    async fn list_edges(&self) -> Result<Vec<RoleEdge>> {
        Ok(self.read()?.edges.values().cloned().collect())
    }

    async fn insert_key_entries(&self, entries: &[KeyEntry]) -> Result<()> {
        self.transact(|inner| inner.insert_key_entries(entries))
    }

    async fn key_entries_for(&self, principal: &RoleId) -> Result<Vec<KeyEntry>> {
        Ok(self
            .read()?
            .key_entries
            .iter()
            .filter(|e| e.principal_id == *principal)
            .cloned()
            .collect())
    }

    async fn insert_grant(&self, grant: &DataKeyGrant) -> Result<()> {
        self.write()?.insert_grant(grant)
    }

    async fn update_grant(&self, grant: &DataKeyGrant) -> Result<()> {
        self.write()?.update_grant(grant)
    }

    async fn get_grant(&self, id: &GrantId) -> Result<Option<DataKeyGrant>> {
        Ok(self.read()?.grants.iter().find(|g| g.id == *id).cloned())
    }

    async fn grants_for_item(&self, item: &DataItemId) -> Result<Vec<DataKeyGrant>> {
        Ok(self
            .read()?
            .grants
            .iter()
            .filter(|g| g.item_id == *item)
            .cloned()
            .collect())
    }

    async fn grants_for_grantee(&self, grantee: &RoleId) -> Result<Vec<DataKeyGrant>> {
        Ok(self
            .read()?
            .grants
            .iter()
            .filter(|g| g.grantee == *grantee)
            .cloned()
            .collect())
    }

    async fn revoke_grant(&self, id: &GrantId, at: i64) -> Result<bool> {
        let mut inner = self.write()?;
        match inner.grants.iter_mut().find(|g| g.id == *id) {
            Some(grant) if grant.revoked_at.is_none() => {
                grant.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_share(&self, share: &SealedShare) -> Result<()> {
        let mut inner = self.write()?;
        if inner.shares.iter().any(|s| s.id == share.id) {
            return Err(StoreError::Conflict(format!("share {} exists", share.id)));
        }
        inner.shares.push(share.clone());
        Ok(())
    }

    async fn pending_shares_for(&self, grantee: &RoleId) -> Result<Vec<SealedShare>> {
        Ok(self
            .read()?
            .shares
            .iter()
            .filter(|s| s.grantee == *grantee && s.accepted_at.is_none())
            .cloned()
            .collect())
    }

    async fn mark_share_accepted(&self, id: &ShareId, at: i64) -> Result<bool> {
        Ok(self.write()?.mark_share_accepted(id, at))
    }

    async fn insert_principal(&self, role: &Role, entries: &[KeyEntry]) -> Result<()> {
        self.transact(|inner| {
            inner.insert_role(role)?;
            inner.insert_key_entries(entries)
        })
    }

    async fn insert_role_with_edge(&self, role: &Role, edge: &RoleEdge) -> Result<()> {
        self.transact(|inner| {
            inner.insert_role(role)?;
            inner.insert_edge(edge)
        })
    }

    async fn apply_rotation(&self, rotation: &RoleRotation) -> Result<()> {
        self.transact(|inner| {
            inner.update_role(&rotation.role)?;
            for edge in &rotation.edges {
                inner.edges.remove(&(edge.parent, edge.child));
                inner.insert_edge(edge)?;
            }
            for grant in &rotation.grants {
                inner.update_grant(grant)?;
            }
            for (share, grant) in &rotation.accepted {
                if inner.mark_share_accepted(share, rotation.at) {
                    inner.insert_grant(grant)?;
                }
            }
            Ok(())
        })
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let chain = inner.ledger.entry(entry.chain).or_default();

        if let Some(existing) = chain.get(&entry.seq) {
            if existing == entry {
                return Ok(InsertResult::AlreadyExists);
            }
            return Ok(InsertResult::Conflict {
                existing: existing.hash,
            });
        }

        chain.insert(entry.seq, entry.clone());
        Ok(InsertResult::Inserted)
    }

    async fn ledger_tail(&self, chain: Chain) -> Result<Option<LedgerEntry>> {
        Ok(self
            .read()?
            .ledger
            .get(&chain)
            .and_then(|entries| entries.values().next_back())
            .cloned())
    }

    async fn ledger_entries(&self, chain: Chain) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .read()?
            .ledger
            .get(&chain)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }
}
