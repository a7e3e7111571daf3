//! Bounded, time-revalidated cache with per-key build serialization.
//!
//! The outer LRU map is only locked long enough to find or create a
//! key's slot. Building, revalidating and rebuilding an entry happen under
//! that slot's own lock, so two threads asking for the same stale key do
//! not both rebuild it while different keys never wait on each other.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use super::clock::Clock;

/// Outcome of checking a cached entry against its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
    /// Source unchanged, keep the entry.
    Unchanged,
    /// Source changed, rebuild the entry.
    Changed,
}

/// Catalog cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub hits: u64,
    pub misses: u64,
    pub rebuilds: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CatalogStats {
    /// Fraction of lookups served without building an entry.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Cached<V> {
    value: Arc<V>,
    checked_at: DateTime<Utc>,
}

type Slot<V> = Arc<Mutex<Option<Cached<V>>>>;

/// Cache of `Arc<V>` keyed by `K`, revalidated every `check_interval`.
pub struct MetadataCache<K, V> {
    slots: Mutex<LruCache<K, Slot<V>>>,
    check_interval: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    rebuilds: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq + Clone, V> MetadataCache<K, V> {
    pub fn new(capacity: NonZeroUsize, check_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(LruCache::new(capacity)),
            check_interval,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the entry for `key`, building or refreshing it as needed.
    ///
    /// - no entry: `build`
    /// - entry checked less than `check_interval` ago: returned as is
    /// - otherwise `revalidate` decides: `Unchanged` refreshes the check
    ///   time, `Changed` rebuilds, an error evicts the entry and is returned
    pub fn get_or_build<E>(
        &self,
        key: &K,
        revalidate: impl FnOnce(&V) -> Result<Revalidation, E>,
        build: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        let slot = self.slot(key);
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        let Some(cached) = guard.as_mut() else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return match build() {
                Ok(value) => {
                    let value = Arc::new(value);
                    *guard = Some(Cached {
                        value: Arc::clone(&value),
                        checked_at: now,
                    });
                    Ok(value)
                }
                Err(e) => {
                    self.remove_slot(key, &slot);
                    Err(e)
                }
            };
        };

        if now - cached.checked_at < self.check_interval {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(&cached.value));
        }

        let rebuilt = match revalidate(cached.value.as_ref()) {
            Ok(Revalidation::Unchanged) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                cached.checked_at = now;
                return Ok(Arc::clone(&cached.value));
            }
            Ok(Revalidation::Changed) => build(),
            Err(e) => Err(e),
        };

        match rebuilt {
            Ok(value) => {
                self.rebuilds.fetch_add(1, Ordering::Relaxed);
                let value = Arc::new(value);
                *cached = Cached {
                    value: Arc::clone(&value),
                    checked_at: now,
                };
                Ok(value)
            }
            Err(e) => {
                *guard = None;
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.remove_slot(key, &slot);
                Err(e)
            }
        }
    }

    /// When `key` was last built or revalidated.
    pub fn checked_at(&self, key: &K) -> Option<DateTime<Utc>> {
        let slot = self.lock_slots().peek(key).cloned()?;
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().map(|cached| cached.checked_at)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock_slots().clear();
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.lock_slots().len(),
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, LruCache<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find or create the slot for `key`.
    fn slot(&self, key: &K) -> Slot<V> {
        let mut slots = self.lock_slots();
        if let Some(slot) = slots.get(key) {
            return Arc::clone(slot);
        }

        let slot: Slot<V> = Arc::new(Mutex::new(None));
        if slots.push(key.clone(), Arc::clone(&slot)).is_some() {
            // capacity reached, the least recently used key went away
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        slot
    }

    /// Remove `key` if it still maps to `slot`.
    fn remove_slot(&self, key: &K, slot: &Slot<V>) {
        let mut slots = self.lock_slots();
        if slots.peek(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.pop(key);
        }
    }
}
