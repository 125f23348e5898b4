//! Durable [`Store`] backed by a single SQLite file.
//!
//! Blocking rusqlite calls are moved onto tokio's blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use keyweave_core::{
    Blake3Hash, Chain, DataItemId, Ed25519PublicKey, Ed25519Signature, GrantId, LedgerEntry,
    RoleId, ShareId, X25519PublicKey,
};
use keyweave_graph::{DataKeyGrant, KeyEntry, KeyKind, Permission, Role, RoleEdge, SealedShare};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, RoleRotation, Store};

/// Persists roles, key material, grants and the three ledgers.
///
/// One connection behind a mutex; every call goes through [`SqliteStore::run`].
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and upgrade its schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A throwaway database that lives only as long as the store.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row conversion
// ─────────────────────────────────────────────────────────────────────────────

fn invalid(row: &Row<'_>, col: &str, ty: Type) -> rusqlite::Error {
    let idx = row.as_ref().column_index(col).unwrap_or(0);
    rusqlite::Error::InvalidColumnType(idx, col.to_string(), ty)
}

fn blob_array<const N: usize>(row: &Row<'_>, col: &str) -> rusqlite::Result<[u8; N]> {
    let bytes: Vec<u8> = row.get(col)?;
    bytes.try_into().map_err(|_| invalid(row, col, Type::Blob))
}

fn opt_blob_array<const N: usize>(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<[u8; N]>> {
    let bytes: Option<Vec<u8>> = row.get(col)?;
    bytes
        .map(|b| b.try_into().map_err(|_| invalid(row, col, Type::Blob)))
        .transpose()
}

fn role_id(row: &Row<'_>, col: &str) -> rusqlite::Result<RoleId> {
    Ok(RoleId::from_bytes(blob_array(row, col)?))
}

fn opt_role_id(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<RoleId>> {
    Ok(opt_blob_array(row, col)?.map(RoleId::from_bytes))
}

fn blob(row: &Row<'_>, col: &str) -> rusqlite::Result<Bytes> {
    Ok(Bytes::from(row.get::<_, Vec<u8>>(col)?))
}

fn opt_blob(row: &Row<'_>, col: &str) -> rusqlite::Result<Option<Bytes>> {
    Ok(row.get::<_, Option<Vec<u8>>>(col)?.map(Bytes::from))
}

fn seq(row: &Row<'_>, col: &str) -> rusqlite::Result<u64> {
    let value: i64 = row.get(col)?;
    u64::try_from(value).map_err(|_| invalid(row, col, Type::Integer))
}

fn permission(row: &Row<'_>) -> rusqlite::Result<Permission> {
    let text: String = row.get("permission")?;
    Permission::parse(&text).ok_or_else(|| invalid(row, "permission", Type::Text))
}

fn row_to_role(row: &Row<'_>) -> rusqlite::Result<Role> {
    Ok(Role {
        id: role_id(row, "id")?,
        name: row.get("name")?,
        private_blob: blob(row, "private_blob")?,
        signing_public: Ed25519PublicKey(blob_array(row, "signing_public")?),
        signing_alg: row.get("signing_alg")?,
        encryption_public: X25519PublicKey(blob_array(row, "encryption_public")?),
        encryption_alg: row.get("encryption_alg")?,
        kdf_salt: row.get("kdf_salt")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_edge(row: &Row<'_>) -> rusqlite::Result<RoleEdge> {
    Ok(RoleEdge {
        parent: role_id(row, "parent")?,
        child: role_id(row, "child")?,
        read_copy: blob(row, "read_copy")?,
        write_copy: opt_blob(row, "write_copy")?,
        owner_copy: opt_blob(row, "owner_copy")?,
        label_blob: blob(row, "label_blob")?,
        label_hash: Blake3Hash(blob_array(row, "label_hash")?),
        created_at: row.get("created_at")?,
    })
}

fn row_to_key_entry(row: &Row<'_>) -> rusqlite::Result<KeyEntry> {
    let kind: String = row.get("kind")?;
    let authorized_by_seq: Option<i64> = row.get("authorized_by_seq")?;
    Ok(KeyEntry {
        principal_id: role_id(row, "principal_id")?,
        role_id: role_id(row, "role_id")?,
        kind: KeyKind::parse(&kind).ok_or_else(|| invalid(row, "kind", Type::Text))?,
        wrapped_key: blob(row, "wrapped_key")?,
        authorized_by_seq: authorized_by_seq
            .map(|s| u64::try_from(s).map_err(|_| invalid(row, "authorized_by_seq", Type::Integer)))
            .transpose()?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_grant(row: &Row<'_>) -> rusqlite::Result<DataKeyGrant> {
    Ok(DataKeyGrant {
        id: GrantId::from_bytes(blob_array(row, "id")?),
        item_id: DataItemId::from_bytes(blob_array(row, "item_id")?),
        grantee: role_id(row, "grantee")?,
        permission: permission(row)?,
        wrapped_key: blob(row, "wrapped_key")?,
        granted_by: opt_role_id(row, "granted_by")?,
        created_at: row.get("created_at")?,
        revoked_at: row.get("revoked_at")?,
    })
}

fn row_to_share(row: &Row<'_>) -> rusqlite::Result<SealedShare> {
    Ok(SealedShare {
        id: ShareId::from_bytes(blob_array(row, "id")?),
        item_id: DataItemId::from_bytes(blob_array(row, "item_id")?),
        grantee: role_id(row, "grantee")?,
        permission: permission(row)?,
        ephemeral_public: X25519PublicKey(blob_array(row, "ephemeral_public")?),
        sealed_key: blob(row, "sealed_key")?,
        granted_by: opt_role_id(row, "granted_by")?,
        created_at: row.get("created_at")?,
        accepted_at: row.get("accepted_at")?,
    })
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let chain: String = row.get("chain")?;
    Ok(LedgerEntry {
        chain: chain.parse::<Chain>().map_err(|_| invalid(row, "chain", Type::Text))?,
        seq: seq(row, "seq")?,
        timestamp: row.get("timestamp")?,
        event_type: row.get("event_type")?,
        actor: row.get("actor")?,
        payload_json: row.get("payload_json")?,
        previous_hash: Blake3Hash(blob_array(row, "previous_hash")?),
        hash: Blake3Hash(blob_array(row, "hash")?),
        signer_role_id: opt_role_id(row, "signer_role_id")?,
        signature: opt_blob_array(row, "signature")?.map(Ed25519Signature),
        signature_alg: row.get("signature_alg")?,
    })
}

const ROLE_COLUMNS: &str = "id, name, private_blob, signing_public, signing_alg, \
    encryption_public, encryption_alg, kdf_salt, created_at, updated_at";

const EDGE_COLUMNS: &str =
    "parent, child, read_copy, write_copy, owner_copy, label_blob, label_hash, created_at";

const KEY_ENTRY_COLUMNS: &str =
    "principal_id, role_id, kind, wrapped_key, authorized_by_seq, created_at";

const GRANT_COLUMNS: &str =
    "id, item_id, grantee, permission, wrapped_key, granted_by, created_at, revoked_at";

const SHARE_COLUMNS: &str = "id, item_id, grantee, permission, ephemeral_public, sealed_key, \
    granted_by, created_at, accepted_at";

const LEDGER_COLUMNS: &str = "chain, seq, timestamp, event_type, actor, payload_json, \
    previous_hash, hash, signer_role_id, signature, signature_alg";

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, map)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn write_grant(conn: &Connection, sql: &str, grant: &DataKeyGrant) -> Result<usize> {
    Ok(conn.execute(
        sql,
        params![
            grant.id.as_bytes().as_slice(),
            grant.item_id.as_bytes().as_slice(),
            grant.grantee.as_bytes().as_slice(),
            grant.permission.as_str(),
            grant.wrapped_key.as_ref(),
            grant.granted_by.as_ref().map(|id| id.as_bytes().as_slice()),
            grant.created_at,
            grant.revoked_at,
        ],
    )?)
}

fn write_role(conn: &Connection, sql: &str, role: &Role) -> Result<usize> {
    Ok(conn.execute(
        sql,
        params![
            role.id.as_bytes().as_slice(),
            role.name,
            role.private_blob.as_ref(),
            role.signing_public.0.as_slice(),
            role.signing_alg,
            role.encryption_public.0.as_slice(),
            role.encryption_alg,
            role.kdf_salt,
            role.created_at,
            role.updated_at,
        ],
    )?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Writes
// ─────────────────────────────────────────────────────────────────────────────

fn insert_role_row(conn: &Connection, role: &Role) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM roles WHERE id = ?1",
            params![role.id.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(StoreError::Conflict(format!("role {} exists", role.id)));
    }

    write_role(
        conn,
        "INSERT INTO roles (id, name, private_blob, signing_public, signing_alg,
            encryption_public, encryption_alg, kdf_salt, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        role,
    )?;
    Ok(())
}

fn update_role_row(conn: &Connection, role: &Role) -> Result<()> {
    let changed = write_role(
        conn,
        "UPDATE roles SET name = ?2, private_blob = ?3, signing_public = ?4,
            signing_alg = ?5, encryption_public = ?6, encryption_alg = ?7,
            kdf_salt = ?8, created_at = ?9, updated_at = ?10
         WHERE id = ?1",
        role,
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("role {}", role.id)));
    }
    Ok(())
}

fn insert_edge_row(conn: &Connection, edge: &RoleEdge) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM role_edges WHERE parent = ?1 AND child = ?2",
            params![edge.parent.as_bytes().as_slice(), edge.child.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(StoreError::Conflict(format!(
            "edge {} -> {} exists",
            edge.parent, edge.child
        )));
    }

    conn.execute(
        "INSERT INTO role_edges (parent, child, read_copy, write_copy, owner_copy,
            label_blob, label_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            edge.parent.as_bytes().as_slice(),
            edge.child.as_bytes().as_slice(),
            edge.read_copy.as_ref(),
            edge.write_copy.as_ref().map(|b| b.as_ref()),
            edge.owner_copy.as_ref().map(|b| b.as_ref()),
            edge.label_blob.as_ref(),
            edge.label_hash.0.as_slice(),
            edge.created_at,
        ],
    )?;
    Ok(())
}

fn insert_grant_row(conn: &Connection, grant: &DataKeyGrant) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM data_key_grants WHERE id = ?1",
            params![grant.id.as_bytes().as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_some() {
        return Err(StoreError::Conflict(format!("grant {} exists", grant.id)));
    }

    write_grant(
        conn,
        "INSERT INTO data_key_grants (id, item_id, grantee, permission, wrapped_key,
            granted_by, created_at, revoked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        grant,
    )?;
    Ok(())
}

fn update_grant_row(conn: &Connection, grant: &DataKeyGrant) -> Result<()> {
    let changed = write_grant(
        conn,
        "UPDATE data_key_grants SET item_id = ?2, grantee = ?3, permission = ?4,
            wrapped_key = ?5, granted_by = ?6, created_at = ?7, revoked_at = ?8
         WHERE id = ?1",
        grant,
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("grant {}", grant.id)));
    }
    Ok(())
}

fn mark_share_accepted_row(conn: &Connection, id: &ShareId, at: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE sealed_shares SET accepted_at = ?2
         WHERE id = ?1 AND accepted_at IS NULL",
        params![id.as_bytes().as_slice(), at],
    )?;
    Ok(changed > 0)
}

fn insert_key_entry_rows(conn: &Connection, entries: &[KeyEntry]) -> Result<()> {
    for entry in entries {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM key_entries
                 WHERE principal_id = ?1 AND role_id = ?2 AND kind = ?3",
                params![
                    entry.principal_id.as_bytes().as_slice(),
                    entry.role_id.as_bytes().as_slice(),
                    entry.kind.as_str(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Conflict(format!(
                "{} key entry for role {} under principal {} exists",
                entry.kind, entry.role_id, entry.principal_id
            )));
        }

        conn.execute(
            "INSERT INTO key_entries (principal_id, role_id, kind, wrapped_key,
                authorized_by_seq, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.principal_id.as_bytes().as_slice(),
                entry.role_id.as_bytes().as_slice(),
                entry.kind.as_str(),
                entry.wrapped_key.as_ref(),
                entry.authorized_by_seq.map(|s| s as i64),
                entry.created_at,
            ],
        )?;
    }
    Ok(())
}

fn apply_rotation_rows(conn: &Connection, rotation: &RoleRotation) -> Result<()> {
    update_role_row(conn, &rotation.role)?;
    for edge in &rotation.edges {
        conn.execute(
            "DELETE FROM role_edges WHERE parent = ?1 AND child = ?2",
            params![edge.parent.as_bytes().as_slice(), edge.child.as_bytes().as_slice()],
        )?;
        insert_edge_row(conn, edge)?;
    }
    for grant in &rotation.grants {
        update_grant_row(conn, grant)?;
    }
    for (share, grant) in &rotation.accepted {
        if mark_share_accepted_row(conn, share, rotation.at)? {
            insert_grant_row(conn, grant)?;
        }
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_role(&self, role: &Role) -> Result<()> {
        let role = role.clone();
        self.run(move |conn| insert_role_row(conn, &role)).await
    }

    async fn update_role(&self, role: &Role) -> Result<()> {
        let role = role.clone();
        self.run(move |conn| update_role_row(conn, &role)).await
    }

    async fn get_role(&self, id: &RoleId) -> Result<Option<Role>> {
        let id = *id;
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM roles WHERE id = ?1", ROLE_COLUMNS),
                    params![id.as_bytes().as_slice()],
                    row_to_role,
                )
                .optional()?)
        })
        .await
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {} FROM roles ORDER BY id", ROLE_COLUMNS),
                [],
                row_to_role,
            )
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Edges
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_edge(&self, edge: &RoleEdge) -> Result<()> {
        let edge = edge.clone();
        self.run(move |conn| insert_edge_row(conn, &edge)).await
    }

    async fn remove_edge(&self, parent: &RoleId, child: &RoleId) -> Result<bool> {
        let (parent, child) = (*parent, *child);
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM role_edges WHERE parent = ?1 AND child = ?2",
                params![parent.as_bytes().as_slice(), child.as_bytes().as_slice()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn get_edge(&self, parent: &RoleId, child: &RoleId) -> Result<Option<RoleEdge>> {
        let (parent, child) = (*parent, *child);
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM role_edges WHERE parent = ?1 AND child = ?2",
                        EDGE_COLUMNS
                    ),
                    params![parent.as_bytes().as_slice(), child.as_bytes().as_slice()],
                    row_to_edge,
                )
                .optional()?)
        })
        .await
    }

    async fn edges_from(&self, parent: &RoleId) -> Result<Vec<RoleEdge>> {
        let parent = *parent;
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM role_edges WHERE parent = ?1 ORDER BY child",
                    EDGE_COLUMNS
                ),
                params![parent.as_bytes().as_slice()],
                row_to_edge,
            )
        })
        .await
    }

    async fn edges_to(&self, child: &RoleId) -> Result<Vec<RoleEdge>> {
        let child = *child;
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM role_edges WHERE child = ?1 ORDER BY parent",
                    EDGE_COLUMNS
                ),
                params![child.as_bytes().as_slice()],
                row_to_edge,
            )
        })
        .await
    }

    async fn list_edges(&self) -> Result<Vec<RoleEdge>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {} FROM role_edges ORDER BY parent, child", EDGE_COLUMNS),
                [],
                row_to_edge,
            )
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key entries
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_key_entries(&self, entries: &[KeyEntry]) -> Result<()> {
        let entries = entries.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            insert_key_entry_rows(&tx, &entries)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn key_entries_for(&self, principal: &RoleId) -> Result<Vec<KeyEntry>> {
        let principal = *principal;
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM key_entries WHERE principal_id = ?1 ORDER BY rowid",
                    KEY_ENTRY_COLUMNS
                ),
                params![principal.as_bytes().as_slice()],
                row_to_key_entry,
            )
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grants
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_grant(&self, grant: &DataKeyGrant) -> Result<()> {
        let grant = grant.clone();
        self.run(move |conn| insert_grant_row(conn, &grant)).await
    }

    async fn update_grant(&self, grant: &DataKeyGrant) -> Result<()> {
        let grant = grant.clone();
        self.run(move |conn| update_grant_row(conn, &grant)).await
    }

    async fn get_grant(&self, id: &GrantId) -> Result<Option<DataKeyGrant>> {
        let id = *id;
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM data_key_grants WHERE id = ?1", GRANT_COLUMNS),
                    params![id.as_bytes().as_slice()],
                    row_to_grant,
                )
                .optional()?)
        })
        .await
    }

    async fn grants_for_item(&self, item: &DataItemId) -> Result<Vec<DataKeyGrant>> {
        let item = *item;
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM data_key_grants WHERE item_id = ?1 ORDER BY rowid",
                    GRANT_COLUMNS
                ),
                params![item.as_bytes().as_slice()],
                row_to_grant,
            )
        })
        .await
    }

    async fn grants_for_grantee(&self, grantee: &RoleId) -> Result<Vec<DataKeyGrant>> {
        let grantee = *grantee;
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM data_key_grants WHERE grantee = ?1 ORDER BY rowid",
                    GRANT_COLUMNS
                ),
                params![grantee.as_bytes().as_slice()],
                row_to_grant,
            )
        })
        .await
    }

    async fn revoke_grant(&self, id: &GrantId, at: i64) -> Result<bool> {
        let id = *id;
        self.run(move |conn| {
            let changed = conn.execute(
                "UPDATE data_key_grants SET revoked_at = ?2
                 WHERE id = ?1 AND revoked_at IS NULL",
                params![id.as_bytes().as_slice(), at],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sealed shares
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_share(&self, share: &SealedShare) -> Result<()> {
        let share = share.clone();
        self.run(move |conn| {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM sealed_shares WHERE id = ?1",
                    params![share.id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StoreError::Conflict(format!("share {} exists", share.id)));
            }

            conn.execute(
                "INSERT INTO sealed_shares (id, item_id, grantee, permission, ephemeral_public,
                    sealed_key, granted_by, created_at, accepted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    share.id.as_bytes().as_slice(),
                    share.item_id.as_bytes().as_slice(),
                    share.grantee.as_bytes().as_slice(),
                    share.permission.as_str(),
                    share.ephemeral_public.0.as_slice(),
                    share.sealed_key.as_ref(),
                    share.granted_by.as_ref().map(|id| id.as_bytes().as_slice()),
                    share.created_at,
                    share.accepted_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn pending_shares_for(&self, grantee: &RoleId) -> Result<Vec<SealedShare>> {
        let grantee = *grantee;
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM sealed_shares
                     WHERE grantee = ?1 AND accepted_at IS NULL ORDER BY rowid",
                    SHARE_COLUMNS
                ),
                params![grantee.as_bytes().as_slice()],
                row_to_share,
            )
        })
        .await
    }

    async fn mark_share_accepted(&self, id: &ShareId, at: i64) -> Result<bool> {
        let id = *id;
        self.run(move |conn| mark_share_accepted_row(conn, &id, at)).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batches
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_principal(&self, role: &Role, entries: &[KeyEntry]) -> Result<()> {
        let role = role.clone();
        let entries = entries.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            insert_role_row(&tx, &role)?;
            insert_key_entry_rows(&tx, &entries)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn insert_role_with_edge(&self, role: &Role, edge: &RoleEdge) -> Result<()> {
        let role = role.clone();
        let edge = edge.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            insert_role_row(&tx, &role)?;
            insert_edge_row(&tx, &edge)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn apply_rotation(&self, rotation: &RoleRotation) -> Result<()> {
        let rotation = rotation.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            apply_rotation_rows(&tx, &rotation)?;
            tx.commit()?;
            tracing::debug!(
                role = %rotation.role.id,
                edges = rotation.edges.len(),
                grants = rotation.grants.len(),
                "applied role rotation"
            );
            Ok(())
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<InsertResult> {
        let entry = entry.clone();
        self.run(move |conn| {
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM ledger_entries WHERE chain = ?1 AND seq = ?2",
                        LEDGER_COLUMNS
                    ),
                    params![entry.chain.as_str(), entry.seq as i64],
                    row_to_entry,
                )
                .optional()?;

            if let Some(existing) = existing {
                if existing == entry {
                    return Ok(InsertResult::AlreadyExists);
                }
                return Ok(InsertResult::Conflict {
                    existing: existing.hash,
                });
            }

            conn.execute(
                "INSERT INTO ledger_entries (chain, seq, timestamp, event_type, actor,
                    payload_json, previous_hash, hash, signer_role_id, signature, signature_alg)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.chain.as_str(),
                    entry.seq as i64,
                    entry.timestamp,
                    entry.event_type,
                    entry.actor,
                    entry.payload_json,
                    entry.previous_hash.0.as_slice(),
                    entry.hash.0.as_slice(),
                    entry.signer_role_id.as_ref().map(|id| id.as_bytes().as_slice()),
                    entry.signature.as_ref().map(|sig| sig.0.as_slice()),
                    entry.signature_alg,
                ],
            )?;
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn ledger_tail(&self, chain: Chain) -> Result<Option<LedgerEntry>> {
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM ledger_entries WHERE chain = ?1 ORDER BY seq DESC LIMIT 1",
                        LEDGER_COLUMNS
                    ),
                    params![chain.as_str()],
                    row_to_entry,
                )
                .optional()?)
        })
        .await
    }

    async fn ledger_entries(&self, chain: Chain) -> Result<Vec<LedgerEntry>> {
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM ledger_entries WHERE chain = ?1 ORDER BY seq",
                    LEDGER_COLUMNS
                ),
                params![chain.as_str()],
                row_to_entry,
            )
        })
        .await
    }
}
