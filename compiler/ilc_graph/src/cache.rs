//! Memoizing node cache.
//!
//! `get_or_add(key, create)` runs `create` for the first request of `key`
//! and hands every later request the stored value.
//!
//! # Locking
//!
//! A key's slot is claimed under the `DashMap` shard lock, but `create` runs
//! with no lock held, so constructors may freely look up other keys in this
//! or any other cache. Concurrent requests for a key that is still being
//! built park on that key's condition variable; requests for other keys
//! never wait on it.
//!
//! Reentrant construction of the same key is a cycle. On one thread it is
//! caught directly (the slot's owner is the caller); across threads a
//! [`ConstructionTracker`] shared by every cache of a factory keeps a
//! wait-for map and refuses a wait that would close a loop. An edge lives
//! only as long as the construction it waits on: once that construction
//! finishes, the edge is ignored even if its waiter has not yet woken.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxBuildHasher, FxHashMap};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cycle detected while constructing {cache} entry `{key}`")]
    Cycle { cache: &'static str, key: String },
    #[error("construction of {cache} entry `{key}` failed on another worker")]
    ConstructionFailed { cache: &'static str, key: String },
}

/// A waiter blocked on a construction owned by another thread.
#[derive(Debug)]
struct WaitEdge {
    owner: ThreadId,
    settled: Arc<AtomicBool>,
}

impl WaitEdge {
    fn is_live(&self) -> bool {
        !self.settled.load(Ordering::Acquire)
    }
}

/// Wait-for bookkeeping shared by a family of caches.
#[derive(Debug, Default)]
pub struct ConstructionTracker {
    waits_for: Mutex<FxHashMap<ThreadId, WaitEdge>>,
}

impl ConstructionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `waiter` blocks on a construction of `owner` until
    /// `settled` is set. Returns `false`, recording nothing, if `owner`
    /// already (transitively) waits on `waiter`.
    ///
    /// Edges whose construction has settled are skipped: their waiter is
    /// about to wake and blocks nobody.
    fn begin_wait(&self, waiter: ThreadId, owner: ThreadId, settled: Arc<AtomicBool>) -> bool {
        let mut waits_for = self.waits_for.lock();
        let mut current = owner;
        loop {
            if current == waiter {
                return false;
            }
            match waits_for.get(&current) {
                Some(edge) if edge.is_live() => current = edge.owner,
                _ => break,
            }
        }
        waits_for.insert(waiter, WaitEdge { owner, settled });
        true
    }

    fn end_wait(&self, waiter: ThreadId) {
        self.waits_for.lock().remove(&waiter);
    }
}

enum PendingState<V> {
    Running,
    Finished(V),
    Failed,
}

/// A construction in progress.
struct Pending<V> {
    owner: ThreadId,
    /// Set before waiters are woken; wait edges read it.
    settled: Arc<AtomicBool>,
    state: Mutex<PendingState<V>>,
    done: Condvar,
}

impl<V: Clone> Pending<V> {
    fn new(owner: ThreadId) -> Self {
        Self {
            owner,
            settled: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(PendingState::Running),
            done: Condvar::new(),
        }
    }

    fn finish(&self, value: Option<V>) {
        let mut state = self.state.lock();
        *state = match value {
            Some(v) => PendingState::Finished(v),
            None => PendingState::Failed,
        };
        self.settled.store(true, Ordering::Release);
        drop(state);
        self.done.notify_all();
    }

    fn wait(&self) -> Option<V> {
        let mut state = self.state.lock();
        while matches!(*state, PendingState::Running) {
            self.done.wait(&mut state);
        }
        match &*state {
            PendingState::Finished(v) => Some(v.clone()),
            PendingState::Running | PendingState::Failed => None,
        }
    }
}

enum Slot<V> {
    Building(Arc<Pending<V>>),
    Ready(V),
}

pub struct NodeCache<K, V> {
    name: &'static str,
    slots: DashMap<K, Slot<V>, FxBuildHasher>,
    tracker: Arc<ConstructionTracker>,
}

impl<K, V> NodeCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// A cache with its own cycle tracker.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self::with_tracker(name, Arc::new(ConstructionTracker::new()))
    }

    /// A cache whose cross-thread cycle detection is shared with every other
    /// cache holding `tracker`.
    #[must_use]
    pub fn with_tracker(name: &'static str, tracker: Arc<ConstructionTracker>) -> Self {
        Self {
            name,
            slots: DashMap::default(),
            tracker,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Return the value for `key`, running `create` if this is the first
    /// request.
    ///
    /// A failed construction is not cached: its slot is released and any
    /// concurrent waiters receive [`CacheError::ConstructionFailed`].
    pub fn get_or_add<E, F>(&self, key: K, create: F) -> Result<V, E>
    where
        E: From<CacheError>,
        F: FnOnce(&K) -> Result<V, E>,
    {
        if let Some(slot) = self.slots.get(&key) {
            if let Slot::Ready(value) = &*slot {
                return Ok(value.clone());
            }
        }

        let me = thread::current().id();
        let pending = match self.slots.entry(key.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(value) => return Ok(value.clone()),
                Slot::Building(pending) if pending.owner == me => {
                    return Err(self.cycle(&key).into());
                }
                Slot::Building(pending) => {
                    let pending = Arc::clone(pending);
                    drop(entry);
                    return self.wait_for(&pending, me, &key).map_err(E::from);
                }
            },
            Entry::Vacant(entry) => {
                let pending = Arc::new(Pending::new(me));
                entry.insert(Slot::Building(Arc::clone(&pending)));
                pending
            }
        };

        tracing::trace!(cache = self.name, key = ?key, "constructing");
        let result = create(&key);
        match &result {
            Ok(value) => {
                self.slots.insert(key, Slot::Ready(value.clone()));
                pending.finish(Some(value.clone()));
            }
            Err(_) => {
                self.slots.remove(&key);
                pending.finish(None);
            }
        }
        result
    }

    /// The finished value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        match &*self.slots.get(key)? {
            Slot::Ready(value) => Some(value.clone()),
            Slot::Building(_) => None,
        }
    }

    /// Number of finished entries.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wait_for(&self, pending: &Pending<V>, me: ThreadId, key: &K) -> Result<V, CacheError> {
        if !self
            .tracker
            .begin_wait(me, pending.owner, Arc::clone(&pending.settled))
        {
            return Err(self.cycle(key));
        }
        let value = pending.wait();
        self.tracker.end_wait(me);
        value.ok_or_else(|| CacheError::ConstructionFailed {
            cache: self.name,
            key: format!("{key:?}"),
        })
    }

    fn cycle(&self, key: &K) -> CacheError {
        CacheError::Cycle {
            cache: self.name,
            key: format!("{key:?}"),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
