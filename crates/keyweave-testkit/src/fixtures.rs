//! Test fixtures and helpers.
//!
//! [`GraphFixture`] builds role graphs in memory with every role's material
//! at hand. [`EngineFixture`] wraps an [`Engine`] and knows the secret of
//! every principal it registered.

use std::collections::HashMap;
use std::path::Path;

use keyweave::{Engine, EngineConfig};
use keyweave_core::{Chain, LedgerEntry, LedgerEntryBuilder, RoleId, SignerKey, SigningContext};
use keyweave_graph::{
    KeyRing, KeyRingBuilder, RelationAliases, Role, RoleEdge, RoleGraph, RoleKeys, RoleMaterial,
};
use keyweave_store::{MemoryStore, SqliteStore, Store};

/// Secret every [`EngineFixture`] principal is registered with.
pub const SECRET: &[u8] = b"correct horse battery staple";

/// Roles and edges built without a store.
pub struct GraphFixture {
    pub relations: RelationAliases,
    roles: HashMap<RoleId, (Role, RoleMaterial)>,
    edges: Vec<RoleEdge>,
    clock: i64,
}

impl GraphFixture {
    pub fn new() -> Self {
        Self::with_relations(RelationAliases::default())
    }

    pub fn with_relations(relations: RelationAliases) -> Self {
        Self {
            relations,
            roles: HashMap::new(),
            edges: Vec::new(),
            clock: 1_736_870_400_000,
        }
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    /// Create a role and keep its material.
    pub fn role(&mut self, name: &str) -> keyweave_graph::Result<RoleId> {
        let now = self.tick();
        let (role, material) = Role::create(name, now)?;
        let id = role.id;
        self.roles.insert(id, (role, material));
        Ok(id)
    }

    /// Mint an edge with both roles' full key triples.
    pub fn link(
        &mut self,
        parent: RoleId,
        child: RoleId,
        relation: &str,
    ) -> keyweave_graph::Result<&RoleEdge> {
        let now = self.tick();
        let edge = RoleEdge::mint(
            parent,
            self.keys(&parent),
            child,
            self.keys(&child),
            relation,
            &self.relations,
            now,
        )?;
        self.edges.push(edge);
        Ok(&self.edges[self.edges.len() - 1])
    }

    pub fn role_record(&self, id: &RoleId) -> Option<&Role> {
        self.roles.get(id).map(|(role, _)| role)
    }

    /// Full key triple of `id`, or an empty set for an unknown role.
    pub fn keys(&self, id: &RoleId) -> &RoleKeys {
        static EMPTY: RoleKeys = RoleKeys {
            read: None,
            write: None,
            owner: None,
        };
        self.roles.get(id).map_or(&EMPTY, |(_, material)| &material.keys)
    }

    pub fn material(&self, id: &RoleId) -> Option<&RoleMaterial> {
        self.roles.get(id).map(|(_, material)| material)
    }

    pub fn edges(&self) -> &[RoleEdge] {
        &self.edges
    }

    pub fn graph(&self) -> RoleGraph {
        RoleGraph::from_edges(self.edges.iter().cloned())
    }

    /// The ring reachable from the full triples of `roots`.
    pub fn ring_from(&self, roots: &[RoleId]) -> KeyRing {
        let root_keys = roots
            .iter()
            .map(|id| (*id, self.keys(id).clone()))
            .collect();
        KeyRingBuilder::new(&self.relations).build(&self.graph(), root_keys)
    }

    pub fn signing_context(&self, id: &RoleId) -> Option<SigningContext> {
        self.material(id)
            .map(|material| SigningContext::ed25519(*id, material.secrets.signing.clone()))
    }

    pub fn signer_directory(&self) -> HashMap<RoleId, SignerKey> {
        self.roles
            .iter()
            .map(|(id, (role, _))| (*id, role.signer_key()))
            .collect()
    }
}

impl Default for GraphFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a linked chain of entries, `(event_type, signer)` per entry.
pub fn build_chain(
    chain: Chain,
    events: &[(&str, Option<&SigningContext>)],
) -> keyweave_core::Result<Vec<LedgerEntry>> {
    let mut entries: Vec<LedgerEntry> = Vec::with_capacity(events.len());
    for (i, (event_type, signing)) in events.iter().enumerate() {
        let previous = entries
            .last()
            .map_or(keyweave_core::Blake3Hash::ZERO, |e| e.hash);
        let entry = LedgerEntryBuilder::new(chain, i as u64 + 1, previous)
            .timestamp(1_736_870_400_000 + i as i64)
            .event_type(*event_type)
            .actor("system")
            .payload_json(format!("{{\"n\":{}}}", i))
            .build(*signing)?;
        entries.push(entry);
    }
    Ok(entries)
}

/// An engine plus the principals registered through it.
pub struct EngineFixture<S: Store = MemoryStore> {
    pub engine: Engine<S>,
}

impl EngineFixture<MemoryStore> {
    /// Engine over an in-memory store with default configuration.
    pub fn memory() -> keyweave::Result<Self> {
        Self::with_store(MemoryStore::new(), EngineConfig::default())
    }
}

impl EngineFixture<SqliteStore> {
    /// Engine over a SQLite file at `path`.
    pub fn sqlite(path: impl AsRef<Path>) -> keyweave::Result<Self> {
        Self::with_store(SqliteStore::open(path)?, EngineConfig::default())
    }
}

impl<S: Store> EngineFixture<S> {
    pub fn with_store(store: S, config: EngineConfig) -> keyweave::Result<Self> {
        Ok(Self {
            engine: Engine::with_memory_cache(store, config)?,
        })
    }

    /// Register a principal under [`SECRET`] and return its ring.
    pub async fn principal(&self, name: &str) -> keyweave::Result<(RoleId, KeyRing)> {
        let role = self.engine.register_principal(name, SECRET).await?;
        let ring = self.ring(role.id).await?;
        Ok((role.id, ring))
    }

    /// A fresh ring for `principal` over the current graph.
    pub async fn ring(&self, principal: RoleId) -> keyweave::Result<KeyRing> {
        let root = self.engine.derive_root_key(SECRET, principal).await?;
        let roots = self.engine.unlock(principal, &root).await?;
        self.engine.build_key_ring(roots).await
    }
}
