//! Error types for the role graph.

use thiserror::Error;

use keyweave_core::{IntegrityError, RoleId};

use crate::role::KeyKind;

/// Errors that can occur while minting or opening graph material.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A key needed for the operation is not held.
    #[error("missing {kind} key for role {role}")]
    MissingKey { role: RoleId, kind: KeyKind },

    /// A sealed blob did not open.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// A relationship label that does not resolve to a capability.
    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    /// Edges from a role to itself are not allowed.
    #[error("role {0} cannot be its own parent")]
    SelfEdge(RoleId),

    /// Opened private material does not match the role's public keys.
    #[error("private key material does not match public keys of role {0}")]
    KeyMismatch(RoleId),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] keyweave_core::CoreError),
}

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
