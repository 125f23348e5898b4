//! Ledger event types written by the engine.

/// Key chain: a principal and its root-key entries were created.
pub const PRINCIPAL_REGISTERED: &str = "PrincipalRegistered";
/// Key chain: a role was created under a parent.
pub const ROLE_CREATED: &str = "RoleCreated";
pub const ROLE_EDGE_CREATED: &str = "RoleEdgeCreated";
pub const ROLE_EDGE_REMOVED: &str = "RoleEdgeRemoved";
/// Key chain: a role's key triple and private material were replaced.
pub const ROLE_KEYS_ROTATED: &str = "RoleKeysRotated";
/// Key chain: a data item and its data key were created.
pub const ROLE_FIELD_KEY_CREATED: &str = "RoleFieldKeyCreated";
pub const DATA_KEY_GRANTED: &str = "DataKeyGranted";
pub const SHARE_ACCEPTED: &str = "ShareAccepted";
pub const GRANT_REVOKED: &str = "GrantRevoked";

/// Auth chain.
pub const SESSION_OPENED: &str = "SessionOpened";
pub const SESSION_CLOSED: &str = "SessionClosed";
pub const SESSION_REJECTED: &str = "SessionRejected";
