//! In-memory weather cache backed by `DashMap` for concurrent access.

use std::fmt;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use openweather_api::WeatherSnapshot;

use crate::clock::Clock;

/// Freshness window for a cached snapshot, in seconds.
pub const TTL_SECS: i64 = 600;

/// Upper bound on entries after an eviction pass.
pub const MAX_SIZE: usize = 10;

/// A cached snapshot and the time it was captured.
///
/// Entries are never mutated; refreshing a city replaces its entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    snapshot: WeatherSnapshot,
    captured_at: i64,
}

impl CacheEntry {
    pub fn new(snapshot: WeatherSnapshot, captured_at: i64) -> Self {
        Self {
            snapshot,
            captured_at,
        }
    }

    pub fn snapshot(&self) -> &WeatherSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> WeatherSnapshot {
        self.snapshot
    }

    /// Capture time, epoch seconds.
    pub fn captured_at(&self) -> i64 {
        self.captured_at
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now - self.captured_at >= TTL_SECS
    }
}

/// Thread-safe map from city to its latest snapshot.
///
/// Keys are trimmed but otherwise case-preserving. `get`, `put` and
/// `replace` are each atomic; `evict` is serialized against other
/// evictions, but nothing makes a sequence of calls atomic.
pub struct WeatherCache {
    store: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    evict_lock: Mutex<()>,
}

impl WeatherCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: DashMap::new(),
            clock,
            evict_lock: Mutex::new(()),
        }
    }

    /// Returns the entry for `city`, expired or not. Does not remove anything.
    pub fn get(&self, city: &str) -> Option<CacheEntry> {
        self.store.get(city.trim()).map(|entry| entry.value().clone())
    }

    /// Inserts or replaces the entry for `city`.
    pub fn put(&self, city: &str, snapshot: WeatherSnapshot, captured_at: i64) {
        self.store
            .insert(city.trim().to_string(), CacheEntry::new(snapshot, captured_at));
    }

    /// Replaces the entry for `city` only if one exists. Returns whether it did.
    pub fn replace(&self, city: &str, snapshot: WeatherSnapshot, captured_at: i64) -> bool {
        match self.store.get_mut(city.trim()) {
            Some(mut entry) => {
                *entry = CacheEntry::new(snapshot, captured_at);
                true
            }
            None => false,
        }
    }

    /// Drops every expired entry, then, if the cache is still over
    /// [`MAX_SIZE`], drops the single oldest entry. Returns how many entries
    /// were removed.
    ///
    /// At most one entry is removed for size per call, so callers must run
    /// this after every insert to keep the bound.
    pub fn evict(&self) -> usize {
        let _guard = self.evict_lock.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();

        let mut removed = 0;
        self.store.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            tracing::debug!("Evicted {} expired cache entries", removed);
        }

        if self.store.len() > MAX_SIZE {
            let oldest = self
                .store
                .iter()
                .min_by_key(|entry| entry.value().captured_at)
                .map(|entry| entry.key().clone());
            if let Some(city) = oldest {
                if self.store.remove(&city).is_some() {
                    tracing::debug!("Evicted oldest cache entry for {}", city);
                    removed += 1;
                }
            }
        }

        removed
    }

    /// Point-in-time copy of the cached city keys.
    pub fn keys(&self) -> Vec<String> {
        self.store.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Removes all entries from the cache.
    pub fn clear(&self) {
        self.store.clear();
    }
}

impl fmt::Debug for WeatherCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherCache")
            .field("len", &self.store.len())
            .finish()
    }
}
