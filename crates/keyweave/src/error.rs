//! Error types for the engine.

use keyweave_core::{Blake3Hash, Chain, CoreError};
use keyweave_graph::GraphError;
use keyweave_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The caller's keys do not reach what the operation needs.
    ///
    /// Deliberately carries no detail.
    #[error("forbidden")]
    Forbidden,

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rejected configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation that does not apply to its target.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Another entry already holds the position this append computed.
    #[error("ledger conflict on {chain} chain at seq {seq}: existing entry {existing:?}")]
    LedgerConflict {
        chain: Chain,
        seq: u64,
        existing: Blake3Hash,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Graph error.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl EngineError {
    /// Fold "these keys do not reach that" into [`EngineError::Forbidden`].
    pub(crate) fn from_graph(err: GraphError) -> Self {
        match err {
            GraphError::MissingKey { .. } | GraphError::Integrity(_) => EngineError::Forbidden,
            other => EngineError::Graph(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
