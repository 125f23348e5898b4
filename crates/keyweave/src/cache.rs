//! Per-session key-ring cache.
//!
//! Building a ring walks the whole graph, so a session keeps its ring between
//! requests. The session's root keys are kept beside the ring: when an edge or
//! grant touching a role changes, rings containing that role are dropped and
//! rebuilt from the roots on next use.
//!
//! Every invalidation advances a cache-wide generation. A ring is built from
//! a store snapshot taken after reading the generation, and is only kept on
//! insert if no invalidation happened in between; otherwise the session is
//! stored without a ring and rebuilt on next use.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use keyweave_core::{RoleId, SessionId};
use keyweave_graph::{KeyRing, RoleKeys};

/// Root role keys unlocked by a principal's root key.
pub type RootKeys = HashMap<RoleId, RoleKeys>;

/// What a cache holds for one session.
#[derive(Debug, Clone)]
pub struct CachedSession {
    pub principal: RoleId,
    pub roots: Arc<RootKeys>,
    /// `None` after invalidation.
    pub ring: Option<Arc<KeyRing>>,
    /// Cache generation read before `ring` was built.
    pub generation: u64,
}

/// Storage for session key rings.
pub trait KeyRingCache: Send + Sync {
    /// The live entry for `session`, if any.
    fn get(&self, session: &SessionId) -> Option<CachedSession>;

    /// Current invalidation generation. Read it before snapshotting the graph.
    fn generation(&self) -> u64;

    /// Insert or replace the entry for `session`.
    ///
    /// If the cache was invalidated since `entry.generation`, the ring is
    /// discarded and the session is stored without one. Returns whether the
    /// ring was kept.
    fn insert(&self, session: SessionId, entry: CachedSession) -> bool;

    /// Drop the ring of every session whose ring contains `role` and advance
    /// the generation. Returns how many rings were dropped.
    fn invalidate_role(&self, role: &RoleId) -> usize;

    /// Forget `session`. Returns whether it was present.
    fn remove(&self, session: &SessionId) -> bool;
}

struct Slot {
    entry: CachedSession,
    expires_at: Instant,
}

/// In-process cache with a fixed time-to-live per session.
///
/// Replacing an entry keeps the original expiry, so rebuilding a ring does
/// not extend a session.
pub struct MemoryKeyRingCache {
    ttl: Duration,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<SessionId, Slot>,
    generation: u64,
}

impl MemoryKeyRingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of sessions held, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired session.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = inner.slots.len();
        inner.slots.retain(|_, slot| slot.expires_at > now);
        before - inner.slots.len()
    }
}

impl KeyRingCache for MemoryKeyRingCache {
    fn get(&self, session: &SessionId) -> Option<CachedSession> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .slots
            .get(session)
            .filter(|slot| slot.expires_at > Instant::now())
            .map(|slot| slot.entry.clone())
    }

    fn generation(&self) -> u64 {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).generation
    }

    fn insert(&self, session: SessionId, mut entry: CachedSession) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let expires_at = match inner.slots.get(&session) {
            Some(slot) if slot.entry.principal == entry.principal && slot.expires_at > now => {
                slot.expires_at
            }
            _ => now + self.ttl,
        };

        let stale = entry.generation != inner.generation;
        if stale && entry.ring.take().is_some() {
            tracing::debug!(principal = %entry.principal, "discarded ring built before invalidation");
        }
        entry.generation = inner.generation;
        let kept = entry.ring.is_some();
        inner.slots.insert(session, Slot { entry, expires_at });
        kept
    }

    fn invalidate_role(&self, role: &RoleId) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.generation += 1;
        let mut dropped = 0;
        for slot in inner.slots.values_mut() {
            let contains = slot
                .entry
                .ring
                .as_ref()
                .is_some_and(|ring| ring.contains_role(role));
            if contains {
                slot.entry.ring = None;
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(role = %role, dropped, "invalidated cached key rings");
        }
        dropped
    }

    fn remove(&self, session: &SessionId) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .remove(session)
            .is_some()
    }
}
