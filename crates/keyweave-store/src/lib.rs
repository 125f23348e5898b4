//! # keyweave Store
//!
//! Persistence for roles, edges, key entries, grants, sealed shares and the
//! ledger.
//!
//! ## Overview
//!
//! The engine talks to storage only through the [`Store`] trait. The primary
//! implementation is [`SqliteStore`]; [`MemoryStore`] has the same semantics
//! and backs most tests.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyweave_core::Chain;
//! use keyweave_store::{SqliteStore, Store};
//!
//! async fn example() -> keyweave_store::Result<()> {
//!     let store = SqliteStore::open("keyweave.db")?;
//!     let tail = store.ledger_tail(Chain::Key).await?;
//!     println!("key chain head: {:?}", tail.map(|e| e.seq));
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Soft state**: roles are rotated in place, grants are revoked by
//!   timestamp. Only edges are deleted.
//! - **Idempotent appends**: the same ledger entry twice is `AlreadyExists`,
//!   a different entry at a taken position is `Conflict`.
//! - **No key material in the clear**: every stored key is a wrapped blob.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod conformance;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, RoleRotation, Store};

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
