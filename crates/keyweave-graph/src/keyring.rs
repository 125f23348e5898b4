//! Key ring construction by breadth-first traversal of the role graph.
//!
//! ## Overview
//!
//! A principal's rights are exactly the keys it can decrypt by walking edges
//! from its root keys. [`KeyRingBuilder::build`] performs that walk:
//!
//! 1. Seed the ring and the frontier with every root role.
//! 2. Pop a role. For each outgoing edge, open the label with the role's Read
//!    key and resolve the capability, then try the Read copy, the Write copy
//!    (Write and Owner edges) and the Owner copy (Owner edges). A label that
//!    does not open counts as Read, so the Read copy is always tried.
//! 3. A recovered key is recorded only if the child's slot is empty. The child
//!    is enqueued whenever at least one new key was recorded. Copies that do
//!    not open are skipped.
//! 4. Stop when the frontier is empty.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use keyweave_core::{RoleId, SymmetricKey};

use crate::edge::{label_hash, RoleEdge};
use crate::relation::{Capability, RelationAliases};
use crate::role::{KeyKind, RoleKeys};

/// Every key reachable from a set of roots. Never persisted.
#[derive(Clone, Default)]
pub struct KeyRing {
    keys: HashMap<RoleId, RoleKeys>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys held for `role`.
    pub fn get(&self, role: &RoleId) -> Option<&RoleKeys> {
        self.keys.get(role)
    }

    /// A single key, if held.
    pub fn key(&self, role: &RoleId, kind: KeyKind) -> Option<&SymmetricKey> {
        self.keys.get(role).and_then(|keys| keys.get(kind))
    }

    pub fn has(&self, role: &RoleId, kind: KeyKind) -> bool {
        self.key(role, kind).is_some()
    }

    pub fn contains_role(&self, role: &RoleId) -> bool {
        self.keys.get(role).is_some_and(|keys| !keys.is_empty())
    }

    /// Record `key` unless the slot is already filled. First success wins.
    pub fn insert_if_absent(&mut self, role: RoleId, kind: KeyKind, key: SymmetricKey) -> bool {
        self.keys.entry(role).or_default().set_if_absent(kind, key)
    }

    /// Roles with at least one key.
    pub fn roles(&self) -> impl Iterator<Item = &RoleId> {
        self.keys.iter().filter(|(_, keys)| !keys.is_empty()).map(|(id, _)| id)
    }

    /// Number of roles with at least one key.
    pub fn len(&self) -> usize {
        self.roles().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of keys held.
    pub fn key_count(&self) -> usize {
        self.keys
            .values()
            .map(|keys| KeyKind::ALL.iter().filter(|k| keys.has(**k)).count())
            .sum()
    }
}

impl fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRing")
            .field("roles", &self.len())
            .field("keys", &self.key_count())
            .finish()
    }
}

/// A snapshot of edges, indexed by parent.
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    by_parent: HashMap<RoleId, Vec<RoleEdge>>,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_edges(edges: impl IntoIterator<Item = RoleEdge>) -> Self {
        let mut graph = Self::new();
        for edge in edges {
            graph.insert(edge);
        }
        graph
    }

    /// Add an edge, replacing any edge between the same pair.
    pub fn insert(&mut self, edge: RoleEdge) {
        let edges = self.by_parent.entry(edge.parent).or_default();
        edges.retain(|e| e.child != edge.child);
        edges.push(edge);
    }

    pub fn edges_from(&self, parent: &RoleId) -> &[RoleEdge] {
        self.by_parent.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges from `parent` whose label hash matches `capability`.
    ///
    /// Labels are not decrypted.
    pub fn find_children(
        &self,
        parent: &RoleId,
        parent_read: &SymmetricKey,
        capability: Capability,
    ) -> Vec<&RoleEdge> {
        let wanted = label_hash(parent_read, capability);
        self.edges_from(parent)
            .iter()
            .filter(|edge| edge.label_hash == wanted)
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.by_parent.values().map(Vec::len).sum()
    }
}

/// Builds key rings by walking a [`RoleGraph`].
#[derive(Debug, Clone)]
pub struct KeyRingBuilder<'a> {
    relations: &'a RelationAliases,
}

impl<'a> KeyRingBuilder<'a> {
    pub fn new(relations: &'a RelationAliases) -> Self {
        Self { relations }
    }

    /// Expand `root_keys` into every key reachable through `graph`.
    pub fn build(&self, graph: &RoleGraph, root_keys: HashMap<RoleId, RoleKeys>) -> KeyRing {
        let mut ring = KeyRing::new();
        let mut frontier = VecDeque::new();

        for (role, keys) in root_keys {
            for kind in KeyKind::ALL {
                if let Some(key) = keys.get(kind) {
                    ring.insert_if_absent(role, kind, key.clone());
                }
            }
            frontier.push_back(role);
        }

        let mut visits = 0usize;
        let mut skipped = 0usize;

        while let Some(role) = frontier.pop_front() {
            visits += 1;
            let Some(held) = ring.get(&role).cloned() else {
                continue;
            };
            let Some(parent_read) = held.read.as_ref() else {
                continue;
            };

            for edge in graph.edges_from(&role) {
                let capability = match edge.capability(parent_read, self.relations) {
                    Ok(capability) => capability,
                    Err(_) => {
                        skipped += 1;
                        Capability::Read
                    }
                };

                let mut recorded = false;
                for kind in capability.key_kinds() {
                    if ring.has(&edge.child, *kind) {
                        continue;
                    }
                    let Some(parent_key) = held.get(*kind) else {
                        continue;
                    };
                    match edge.open_copy(*kind, parent_key) {
                        Ok(Some(key)) => {
                            recorded |= ring.insert_if_absent(edge.child, *kind, key);
                        }
                        Ok(None) => {}
                        Err(_) => skipped += 1,
                    }
                }

                if recorded {
                    frontier.push_back(edge.child);
                }
            }
        }

        tracing::debug!(
            roles = ring.len(),
            keys = ring.key_count(),
            visits,
            skipped,
            "built key ring"
        );
        ring
    }
}
