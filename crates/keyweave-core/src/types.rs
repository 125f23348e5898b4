//! Strong type definitions for keyweave.
//!
//! All identifiers are newtypes to prevent misuse at compile time. Entity
//! identifiers are UUIDv7, so they sort by creation time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new time-ordered identifier.
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from_bytes(bytes))
            }

            /// Get the raw bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Parse from the hyphenated string form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a role: a principal or container node in the access graph.
    RoleId
);

uuid_id!(
    /// Identifier of a protected data item (one data key per item).
    DataItemId
);

uuid_id!(
    /// Identifier of a data key grant.
    GrantId
);

uuid_id!(
    /// Identifier of a sealed share awaiting acceptance.
    ShareId
);

/// Opaque identifier of an authenticated session, issued by the caller.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_id_string_roundtrip() {
        let id = RoleId::generate();
        let recovered = RoleId::parse(&id.to_string()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_session_id_display() {
        let session = SessionId::new("sess-1");
        assert_eq!(session.to_string(), "sess-1");
        assert_eq!(session.as_str(), "sess-1");
    }

    #[test]
    fn test_role_id_debug() {
        let id = RoleId::from_bytes([0xab; 16]);
        let debug = format!("{:?}", id);
        assert!(debug.starts_with("RoleId("));
    }
}
