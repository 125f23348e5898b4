//! Engine configuration.
//!
//! Every section has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! [kdf]
//! memory_kib = 65536
//! iterations = 3
//!
//! [relations]
//! AdminOf = "Owner"
//! MemberOf = "Read"
//!
//! [signatures]
//! required_chains = ["key", "business"]
//! exempt_event_types = []
//!
//! [cache]
//! ttl_secs = 900
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use keyweave_core::{KdfParams, SignaturePolicy};
use keyweave_graph::RelationAliases;

use crate::error::{EngineError, Result};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Argon2id cost parameters for root key derivation.
    pub kdf: KdfParams,
    /// Relationship label aliases.
    pub relations: RelationAliases,
    /// Which ledger entries must carry a signature.
    pub signatures: SignaturePolicy,
    pub cache: CacheConfig,
}

/// Session key-ring cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached session ring.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 900 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| EngineError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            EngineError::Configuration(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the engine cannot run safely with.
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.kdf.validate() {
            tracing::warn!(error = %e, "rejected kdf configuration");
            return Err(e.into());
        }
        if self.cache.ttl_secs == 0 {
            tracing::warn!("rejected cache configuration");
            return Err(EngineError::Configuration(
                "cache.ttl_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyweave_core::{Chain, CoreError};
    use keyweave_graph::Capability;

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cache.ttl(), Duration::from_secs(900));
    }

    #[test]
    fn test_full_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            [kdf]
            memory_kib = 65536
            iterations = 3

            [relations]
            LeadOf = "Owner"
            ViewerOf = "read"

            [signatures]
            required_chains = ["key"]
            exempt_event_types = ["PrincipalRegistered"]

            [cache]
            ttl_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.kdf.memory_kib, 65536);
        assert_eq!(config.kdf.iterations, 3);
        assert_eq!(config.kdf.parallelism, 1);
        assert_eq!(config.relations.normalize("leadof"), Some(Capability::Owner));
        assert_eq!(config.relations.normalize("ViewerOf"), Some(Capability::Read));
        assert_eq!(config.relations.normalize("AdminOf"), None);
        assert!(config.signatures.requires_signature(Chain::Key, "RoleCreated"));
        assert!(!config.signatures.requires_signature(Chain::Key, "PrincipalRegistered"));
        assert!(!config.signatures.requires_signature(Chain::Business, "Anything"));
        assert_eq!(config.cache.ttl_secs, 60);
    }

    #[test]
    fn test_weak_kdf_rejected() {
        let err = EngineConfig::from_toml_str("[kdf]\niterations = 1\n").unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::InvalidKdfParams(_))));
    }

    #[test]
    fn test_unknown_capability_rejected() {
        let err = EngineConfig::from_toml_str("[relations]\nFriendOf = \"Admin\"\n").unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = EngineConfig::from_toml_str("[cache]\nttl_secs = 0\n").unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyweave.toml");
        std::fs::write(&path, "[cache]\nttl_secs = 5\n").unwrap();

        assert_eq!(EngineConfig::from_file(&path).unwrap().cache.ttl_secs, 5);
        assert!(matches!(
            EngineConfig::from_file(dir.path().join("missing.toml")),
            Err(EngineError::Configuration(_))
        ));
    }
}
