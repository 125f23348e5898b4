//! Versioned schema upgrades for the SQLite backend.
//!
//! `schema_migrations` records every applied version; each step is one SQL
//! batch run inside the upgrade transaction.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Bring the schema up to [`CURRENT_VERSION`]. Safe to run on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, crate::now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Run the batch for one schema version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Version 1: roles, key material, grants, shares and ledger tables.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Graph nodes. Never deleted; updated only on key rotation.
        CREATE TABLE roles (
            id BLOB PRIMARY KEY,              -- 16 bytes, UUIDv7
            name TEXT NOT NULL,
            private_blob BLOB NOT NULL,       -- sealed under the role's Owner key
            signing_public BLOB NOT NULL,     -- 32 bytes
            signing_alg TEXT NOT NULL,
            encryption_public BLOB NOT NULL,  -- 32 bytes
            encryption_alg TEXT NOT NULL,
            kdf_salt BLOB,                    -- principals only
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Wrapped key copies, at most one edge per pair.
        CREATE TABLE role_edges (
            parent BLOB NOT NULL,
            child BLOB NOT NULL,
            read_copy BLOB NOT NULL,
            write_copy BLOB,
            owner_copy BLOB,
            label_blob BLOB NOT NULL,
            label_hash BLOB NOT NULL,         -- 32 bytes, keyed Blake3
            created_at INTEGER NOT NULL,
            PRIMARY KEY (parent, child)
        );

        -- Role keys wrapped under a principal's root key.
        CREATE TABLE key_entries (
            principal_id BLOB NOT NULL,
            role_id BLOB NOT NULL,
            kind TEXT NOT NULL,
            wrapped_key BLOB NOT NULL,
            authorized_by_seq INTEGER,        -- key chain seq
            created_at INTEGER NOT NULL,
            PRIMARY KEY (principal_id, role_id, kind)
        );

        -- Data keys wrapped per grantee. Revoked, never deleted.
        CREATE TABLE data_key_grants (
            id BLOB PRIMARY KEY,
            item_id BLOB NOT NULL,
            grantee BLOB NOT NULL,
            permission TEXT NOT NULL,
            wrapped_key BLOB NOT NULL,
            granted_by BLOB,
            created_at INTEGER NOT NULL,
            revoked_at INTEGER
        );

        -- Data keys sealed to a grantee's X25519 key, awaiting acceptance.
        CREATE TABLE sealed_shares (
            id BLOB PRIMARY KEY,
            item_id BLOB NOT NULL,
            grantee BLOB NOT NULL,
            permission TEXT NOT NULL,
            ephemeral_public BLOB NOT NULL,
            sealed_key BLOB NOT NULL,
            granted_by BLOB,
            created_at INTEGER NOT NULL,
            accepted_at INTEGER
        );

        -- Hash-chained ledger, one sequence per chain.
        CREATE TABLE ledger_entries (
            chain TEXT NOT NULL,
            seq INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            event_type TEXT NOT NULL,
            actor TEXT NOT NULL,
            payload_json TEXT NOT NULL,
            previous_hash BLOB NOT NULL,
            hash BLOB NOT NULL,
            signer_role_id BLOB,
            signature BLOB,
            signature_alg TEXT,
            PRIMARY KEY (chain, seq)
        );

        CREATE INDEX idx_role_edges_child ON role_edges(child);
        CREATE INDEX idx_grants_item ON data_key_grants(item_id);
        CREATE INDEX idx_grants_grantee ON data_key_grants(grantee);
        CREATE INDEX idx_shares_grantee ON sealed_shares(grantee);
        "#,
    )?;

    Ok(())
}
