//! Single-flight, TTL-bounded cache.
//!
//! Concurrent readers of the same key share one population: the first reader
//! to miss becomes the leader and runs the populate function, later readers
//! subscribe to the leader's result over a `watch` channel.
//!
//! # Per-key state
//!
//! ```text
//! Absent ──miss──▶ Populating ──ok──▶ Populated
//!   ▲                  │                  │
//!   └──err/drop/inval──┘◀──ttl/invalidate─┘
//! ```
//!
//! Each population cycle carries a generation number. A leader stores its
//! result only if the slot is still in its own generation, so invalidating a
//! key while it is being populated discards the in-flight result. The leader
//! still answers its own followers.
//!
//! # Locking
//!
//! Slots live in a [`DashMap`]; each slot has its own `Mutex` held only for
//! state transitions, never across an `.await`. Lock order is always map
//! shard then slot. A slot is only retired while being removed from the map,
//! so a caller holding a retired slot simply looks the key up again.
//!
//! # Capacity
//!
//! Before a new key is added to a full table, absent and expired slots are
//! dropped, then the oldest populated ones. Populations in flight are never
//! evicted, so the table only exceeds `max_entries` while more keys than that
//! are being populated at once.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::CacheConfig;

/// The caller's deadline elapsed while waiting for a population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

/// Observable state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationState {
    Absent,
    Populating,
    Populated,
}

/// What a leader publishes to its followers. `None` until it finishes.
type Outcome<V, E> = Option<Result<V, E>>;

enum SlotState<V, E> {
    Absent,
    Populating {
        generation: u64,
        rx: watch::Receiver<Outcome<V, E>>,
    },
    Populated {
        value: V,
        stored_at: Instant,
    },
    /// Removed from the map. Never leaves this state.
    Retired,
}

struct Slot<V, E> {
    state: Mutex<SlotState<V, E>>,
}

impl<V, E> Slot<V, E> {
    const fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Absent),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<V, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retire the slot if it holds nothing worth keeping.
    fn try_retire(&self, ttl: Duration) -> bool {
        let mut state = self.lock();
        let stale = match &*state {
            SlotState::Absent => true,
            SlotState::Populated { stored_at, .. } => stored_at.elapsed() >= ttl,
            SlotState::Populating { .. } | SlotState::Retired => false,
        };
        if stale {
            *state = SlotState::Retired;
        }
        stale
    }

    fn stored_at(&self) -> Option<Instant> {
        match &*self.lock() {
            SlotState::Populated { stored_at, .. } => Some(*stored_at),
            _ => None,
        }
    }
}

enum Role<V, E> {
    Hit(V),
    Lead {
        slot: Arc<Slot<V, E>>,
        generation: u64,
        tx: watch::Sender<Outcome<V, E>>,
    },
    Follow(watch::Receiver<Outcome<V, E>>),
}

/// Resets the slot if the leader's future is dropped before it completes.
struct LeaderGuard<'a, V, E> {
    slot: &'a Slot<V, E>,
    generation: u64,
}

impl<V, E> Drop for LeaderGuard<'_, V, E> {
    fn drop(&mut self) {
        let mut state = self.slot.lock();
        if matches!(&*state, SlotState::Populating { generation, .. } if *generation == self.generation)
        {
            *state = SlotState::Absent;
        }
    }
}

/// Keyed cache that runs at most one population per key at a time.
pub struct SingleFlightCache<K, V, E> {
    slots: DashMap<K, Arc<Slot<V, E>>>,
    ttl: Duration,
    max_entries: usize,
    next_generation: AtomicU64,
}

impl<K, V, E> std::fmt::Debug for SingleFlightCache<K, V, E>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlightCache")
            .field("entries", &self.slots.len())
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

impl<K, V, E> SingleFlightCache<K, V, E>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone + From<DeadlineExceeded>,
{
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            slots: DashMap::new(),
            ttl: config.ttl,
            max_entries: config.max_entries.max(1),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, populating it if needed.
    ///
    /// Concurrent callers for the same key share a single `populate` call.
    /// The leader's deadline bounds `populate`; each follower's own deadline
    /// bounds its wait. If the leader's future is dropped mid-flight its
    /// followers elect a new leader among themselves.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the population this call joined, or
    /// `E::from(DeadlineExceeded)` once `deadline` passes.
    pub async fn get_or_populate<F, Fut>(
        &self,
        key: &K,
        deadline: Instant,
        populate: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let (slot, generation, tx) = loop {
            match self.join(key) {
                Role::Hit(value) => {
                    trace!("Cache hit");
                    return Ok(value);
                }
                Role::Lead {
                    slot,
                    generation,
                    tx,
                } => break (slot, generation, tx),
                Role::Follow(rx) => {
                    if let Some(result) = Self::follow(rx, deadline).await {
                        return result;
                    }
                    debug!("Population leader went away, re-electing");
                }
            }
        };

        let guard = LeaderGuard {
            slot: &slot,
            generation,
        };

        let result = tokio::time::timeout_at(deadline, populate())
            .await
            .unwrap_or_else(|_| Err(E::from(DeadlineExceeded)));

        self.complete(key, &slot, generation, &result);
        drop(guard);
        tx.send_replace(Some(result.clone()));
        result
    }

    /// Drop whatever is cached or being populated for `key`.
    ///
    /// Reads that start after this returns never see the old value, and an
    /// in-flight population for the key will not be stored.
    pub fn invalidate(&self, key: &K) {
        let Some(slot) = self.existing(key) else {
            return;
        };
        {
            let mut state = slot.lock();
            if !matches!(&*state, SlotState::Retired) {
                *state = SlotState::Absent;
            }
        }
        self.remove_if_stale(key, &slot);
    }

    /// Current state of `key`.
    pub fn state(&self, key: &K) -> PopulationState {
        let Some(slot) = self.existing(key) else {
            return PopulationState::Absent;
        };
        let state = slot.lock();
        match &*state {
            SlotState::Populating { .. } => PopulationState::Populating,
            SlotState::Populated { stored_at, .. } if stored_at.elapsed() < self.ttl => {
                PopulationState::Populated
            }
            _ => PopulationState::Absent,
        }
    }

    /// Number of slots currently tracked, including expired ones not yet
    /// pruned.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Decide this caller's role for `key`, claiming leadership on a miss.
    fn join(&self, key: &K) -> Role<V, E> {
        loop {
            let slot = self.slot(key);
            let mut state = slot.lock();

            match &*state {
                SlotState::Retired => continue,
                SlotState::Populated { value, stored_at } if stored_at.elapsed() < self.ttl => {
                    return Role::Hit(value.clone());
                }
                SlotState::Populating { rx, .. } => return Role::Follow(rx.clone()),
                SlotState::Absent | SlotState::Populated { .. } => {}
            }

            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = watch::channel(None);
            *state = SlotState::Populating { generation, rx };
            drop(state);

            return Role::Lead {
                slot,
                generation,
                tx,
            };
        }
    }

    /// Wait for the leader's result. `None` means the leader was dropped
    /// without publishing one.
    async fn follow(
        mut rx: watch::Receiver<Outcome<V, E>>,
        deadline: Instant,
    ) -> Option<Result<V, E>> {
        let wait = async {
            loop {
                let published = (*rx.borrow_and_update()).clone();
                if published.is_some() {
                    return published;
                }
                if rx.changed().await.is_err() {
                    let last = (*rx.borrow()).clone();
                    return last;
                }
            }
        };

        match tokio::time::timeout_at(deadline, wait).await {
            Ok(outcome) => outcome,
            Err(_) => Some(Err(E::from(DeadlineExceeded))),
        }
    }

    /// Store the leader's result if its generation is still current.
    fn complete(&self, key: &K, slot: &Arc<Slot<V, E>>, generation: u64, result: &Result<V, E>) {
        let failed = {
            let mut state = slot.lock();
            if !matches!(&*state, SlotState::Populating { generation: g, .. } if *g == generation) {
                debug!("Population superseded by invalidation, result not stored");
                return;
            }
            match result {
                Ok(value) => {
                    *state = SlotState::Populated {
                        value: value.clone(),
                        stored_at: Instant::now(),
                    };
                    false
                }
                Err(_) => {
                    *state = SlotState::Absent;
                    true
                }
            }
        };

        if failed {
            self.remove_if_stale(key, slot);
        }
    }

    fn existing(&self, key: &K) -> Option<Arc<Slot<V, E>>> {
        self.slots.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn slot(&self, key: &K) -> Arc<Slot<V, E>> {
        if let Some(slot) = self.existing(key) {
            return slot;
        }
        if self.slots.len() >= self.max_entries {
            self.prune();
        }
        let entry = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Slot::new()));
        Arc::clone(entry.value())
    }

    fn remove_if_stale(&self, key: &K, slot: &Arc<Slot<V, E>>) {
        self.slots
            .remove_if(key, |_, current| Arc::ptr_eq(current, slot) && current.try_retire(self.ttl));
    }

    /// Make room for one more slot.
    fn prune(&self) {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.try_retire(self.ttl));

        let excess = (self.slots.len() + 1).saturating_sub(self.max_entries);
        if excess > 0 {
            self.evict_oldest(excess);
        }
        debug!(before, after = self.slots.len(), "Pruned cache slots");
    }

    /// Drop up to `count` populated slots, oldest first.
    fn evict_oldest(&self, count: usize) {
        let mut populated: Vec<(Instant, K)> = self
            .slots
            .iter()
            .filter_map(|entry| entry.value().stored_at().map(|at| (at, entry.key().clone())))
            .collect();
        populated.sort_by_key(|(stored_at, _)| *stored_at);

        for (_, key) in populated.into_iter().take(count) {
            self.slots
                .remove_if(&key, |_, slot| slot.try_retire(Duration::ZERO));
        }
    }
}
