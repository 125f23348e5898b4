//! Store trait: the abstract interface for keyweave persistence.
//!
//! This trait keeps the engine storage-agnostic. Implementations include
//! SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;

use keyweave_core::{Blake3Hash, Chain, DataItemId, GrantId, LedgerEntry, RoleId, ShareId};
use keyweave_graph::{DataKeyGrant, KeyEntry, Role, RoleEdge, SealedShare};

use crate::error::Result;

/// Result of appending a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Entry was inserted.
    Inserted,
    /// The identical entry already exists (idempotent, not an error).
    AlreadyExists,
    /// A different entry already holds this `(chain, seq)`.
    Conflict {
        /// Hash of the entry already stored there.
        existing: Blake3Hash,
    },
}

/// Every record a key rotation rewrites, applied all-or-nothing by
/// [`Store::apply_rotation`].
#[derive(Debug, Clone)]
pub struct RoleRotation {
    /// The role with its new public keys and sealed secrets.
    pub role: Role,
    /// Replacements for the edges into and out of the role.
    pub edges: Vec<RoleEdge>,
    /// Active grants rewrapped under the new Read key.
    pub grants: Vec<DataKeyGrant>,
    /// Pending shares accepted during the rotation, with their grants.
    pub accepted: Vec<(ShareId, DataKeyGrant)>,
    pub at: i64,
}

/// The Store trait: async interface for keyweave persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Soft state only**: roles are updated, never deleted; grants are revoked,
///   never deleted. Edges are the only records that can be removed.
/// - **One edge per pair**: inserting a second edge for the same
///   `(parent, child)` fails with `StoreError::Conflict`.
/// - **Ledger positions are unique**: a second entry at the same
///   `(chain, seq)` is reported as `InsertResult::Conflict`.
/// - **Batches are atomic**: the batch methods write every record or none.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Role Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new role. Fails with `Conflict` if the id exists.
    async fn insert_role(&self, role: &Role) -> Result<()>;

    /// Replace an existing role. Fails with `NotFound` if it does not exist.
    async fn update_role(&self, role: &Role) -> Result<()>;

    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>>;

    /// All roles, ordered by id.
    async fn list_roles(&self) -> Result<Vec<Role>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Edge Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an edge. Fails with `Conflict` if the pair already has one.
    async fn insert_edge(&self, edge: &RoleEdge) -> Result<()>;

    /// Remove the edge between a pair. Returns whether one existed.
    async fn remove_edge(&self, parent: &RoleId, child: &RoleId) -> Result<bool>;

    async fn get_edge(&self, parent: &RoleId, child: &RoleId) -> Result<Option<RoleEdge>>;

    /// Outgoing edges of `parent`.
    async fn edges_from(&self, parent: &RoleId) -> Result<Vec<RoleEdge>>;

    /// Incoming edges of `child`.
    async fn edges_to(&self, child: &RoleId) -> Result<Vec<RoleEdge>>;

    /// Every edge, as a traversal snapshot.
    async fn list_edges(&self) -> Result<Vec<RoleEdge>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Key Entry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert root-key entries. Fails with `Conflict` if any
    /// `(principal, role, kind)` already exists; nothing is written then.
    async fn insert_key_entries(&self, entries: &[KeyEntry]) -> Result<()>;

    /// Entries wrapped under `principal`'s root key.
    async fn key_entries_for(&self, principal: &RoleId) -> Result<Vec<KeyEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grant Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_grant(&self, grant: &DataKeyGrant) -> Result<()>;

    /// Replace an existing grant. Fails with `NotFound` if it does not exist.
    async fn update_grant(&self, grant: &DataKeyGrant) -> Result<()>;

    async fn get_grant(&self, id: &GrantId) -> Result<Option<DataKeyGrant>>;

    /// All grants for an item, revoked ones included, ordered by creation.
    async fn grants_for_item(&self, item: &DataItemId) -> Result<Vec<DataKeyGrant>>;

    /// All grants held by a grantee role.
    async fn grants_for_grantee(&self, grantee: &RoleId) -> Result<Vec<DataKeyGrant>>;

    /// Set `revoked_at` on a grant that has none. Returns whether it changed.
    async fn revoke_grant(&self, id: &GrantId, at: i64) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sealed Share Operations
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_share(&self, share: &SealedShare) -> Result<()>;

    /// Shares for `grantee` not yet accepted.
    async fn pending_shares_for(&self, grantee: &RoleId) -> Result<Vec<SealedShare>>;

    /// Mark a share accepted. Returns whether it was pending.
    async fn mark_share_accepted(&self, id: &ShareId, at: i64) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Batch Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a principal together with its root-key entries.
    async fn insert_principal(&self, role: &Role, entries: &[KeyEntry]) -> Result<()>;

    /// Insert a role and the edge that links it under its parent.
    async fn insert_role_with_edge(&self, role: &Role, edge: &RoleEdge) -> Result<()>;

    /// Replace a rotated role, its edges and its grants.
    ///
    /// Each edge replaces the one stored for its pair. Grants must exist.
    /// An accepted share whose row is no longer pending is skipped along
    /// with its grant.
    async fn apply_rotation(&self, rotation: &RoleRotation) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a ledger entry at its `(chain, seq)`.
    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<InsertResult>;

    /// The entry with the highest `seq` in `chain`.
    async fn ledger_tail(&self, chain: Chain) -> Result<Option<LedgerEntry>>;

    /// Every entry of `chain`, ordered by `seq`.
    async fn ledger_entries(&self, chain: Chain) -> Result<Vec<LedgerEntry>>;
}
