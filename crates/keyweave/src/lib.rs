//! # keyweave
//!
//! Role-graph key management with a hash-chained, signed ledger.
//!
//! ## Overview
//!
//! Access is decided by what a caller can decrypt:
//!
//! - **Principals** unlock their own role keys with a secret stretched by Argon2id
//! - **Edges** carry wrapped copies of a child role's keys under its parent's
//! - **Key rings** are everything reachable from a principal's roots
//! - **Grants** wrap an item's data key under a grantee's Read key
//! - **Ledger** records every key-management event on signed, hash-linked chains
//!
//! ## Key Concepts
//!
//! - **Capability**: Read, Write or Owner. An edge only carries key copies up
//!   to its capability.
//! - **Sealed share**: a data key sealed to a role's X25519 public key, for
//!   grantees the granter cannot reach.
//! - **Forbidden**: the single error for every "your keys do not reach that".
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyweave::{Engine, EngineConfig, Permission, SessionId};
//! use keyweave::store::SqliteStore;
//!
//! async fn example() -> keyweave::Result<()> {
//!     let store = SqliteStore::open("keyweave.db")?;
//!     let engine = Engine::with_memory_cache(store, EngineConfig::default())?;
//!
//!     let alice = engine.register_principal("alice", b"secret").await?;
//!     let ring = engine
//!         .open_session(SessionId::new("s1"), alice.id, b"secret")
//!         .await?;
//!
//!     let team = engine.create_role(&ring, alice.id, "team", "AdminOf").await?;
//!     let ring = engine.session_ring(&SessionId::new("s1")).await?;
//!
//!     let item = engine.create_data_item(&ring, alice.id).await?;
//!     engine.grant_data_key(&ring, item, team.id, Permission::Read).await?;
//!     let sealed = engine.seal_field(&ring, item, b"555-0100").await?;
//!     assert_eq!(engine.open_field(&ring, item, &sealed).await?, b"555-0100");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `keyweave::core` - Primitives, ciphers and the ledger format
//! - `keyweave::graph` - Roles, edges, key rings and grants
//! - `keyweave::store` - Storage abstraction, SQLite and in-memory stores

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ledger;

pub use keyweave_core as core;
pub use keyweave_graph as graph;
pub use keyweave_store as store;

pub use cache::{CachedSession, KeyRingCache, MemoryKeyRingCache, RootKeys};
pub use config::{CacheConfig, EngineConfig};
pub use engine::{Engine, GrantOutcome};
pub use error::{EngineError, Result};
pub use ledger::Ledger;

pub use keyweave_core::{
    Chain, DataItemId, GrantId, LedgerEntry, RoleId, SessionId, ShareId, SymmetricKey,
    VerificationSummary,
};
pub use keyweave_graph::{KeyKind, KeyRing, Permission, Role};

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
