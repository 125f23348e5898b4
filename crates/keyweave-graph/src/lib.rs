//! # keyweave Graph
//!
//! Authorization as cryptographic reachability.
//!
//! ## Overview
//!
//! Roles are nodes, edges wrap a child's keys under its parent's keys. A
//! principal's rights are the set of keys it can decrypt by walking edges from
//! its root keys. There is no access-control table to consult: removing an
//! edge or rotating a role's keys is what revokes access.
//!
//! ## Key Concepts
//!
//! - **Role**: a node with a Read/Write/Owner key triple and sealed private material
//! - **RoleEdge**: a parent's wrapped copies of a child's keys, up to a capability
//! - **KeyRing**: every key reachable from a set of root keys
//! - **DataKeyGrant**: an item's data key wrapped for one grantee role
//! - **SealedShare**: a data key sealed to a role's X25519 public key
//!
//! ## Failure Model
//!
//! A blob that does not open is never fatal here. Traversal skips the edge
//! copy, resolution tries the next grant. Callers decide what an empty result
//! means.

pub mod edge;
pub mod error;
pub mod grant;
pub mod keyring;
pub mod keyshare;
pub mod relation;
pub mod role;

pub use edge::{label_hash, RoleEdge};
pub use error::{GraphError, Result};
pub use grant::{
    find_grant, open_field, resolve_data_key, resolve_with, seal_field, DataKeyGrant, Permission,
};
pub use keyring::{KeyRing, KeyRingBuilder, RoleGraph};
pub use keyshare::SealedShare;
pub use relation::{Capability, RelationAliases};
pub use role::{unlock_root_keys, KeyEntry, KeyKind, Role, RoleKeys, RoleMaterial, RoleSecrets};
