//! Shared response cache

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::entry::CachedResponse;
use super::store::LruStore;
use crate::error::CoreError;

/// Cache counters and occupancy
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses + self.expired;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Outcome of a cache lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Fresh entry
    Hit(Arc<CachedResponse>),
    /// No entry under this key
    Miss,
    /// Entry was past its expiry and has been dropped
    Expired,
}

/// Thread-safe LRU cache of origin responses keyed by cache key.
///
/// Every access goes through a single mutex covering both the key map and
/// the recency list, since even a read reorders the list.
pub struct ResponseCache {
    store: Mutex<LruStore<String, Arc<CachedResponse>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evictions: AtomicU64,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` responses
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        let store = LruStore::new(capacity)?;
        info!("Initializing response cache (capacity: {} entries)", capacity);

        Ok(Self {
            store: Mutex::new(store),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Look up a key, dropping the entry if it has expired by `now`.
    ///
    /// The read, the expiry check and the removal happen under one lock.
    pub fn lookup(&self, key: &str, now: DateTime<Utc>) -> Lookup {
        let outcome = {
            let mut store = self.store.lock();
            match store.get(key).cloned() {
                None => Lookup::Miss,
                Some(cached) if cached.is_expired(now) => {
                    store.remove(key);
                    Lookup::Expired
                }
                Some(cached) => Lookup::Hit(cached),
            }
        };

        match &outcome {
            Lookup::Hit(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            Lookup::Miss => self.misses.fetch_add(1, Ordering::Relaxed),
            Lookup::Expired => {
                debug!("Dropped expired cache entry {}", key);
                self.expired.fetch_add(1, Ordering::Relaxed)
            }
        };

        outcome
    }

    /// Store a response, evicting the least recently used entry when full
    pub fn store(&self, key: String, response: CachedResponse) {
        let evicted = self.store.lock().put(key, Arc::new(response));

        if let Some((evicted_key, _)) = evicted {
            debug!("Evicted least recently used entry {}", evicted_key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Read an entry without affecting recency or counters
    pub fn peek(&self, key: &str) -> Option<Arc<CachedResponse>> {
        self.store.lock().peek(key).cloned()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.store.lock().remove(key).is_some()
    }

    /// Drop every entry, returning how many were removed
    pub fn clear(&self) -> usize {
        let cleared = self.store.lock().clear();
        info!("Cleared {} cache entries", cleared);
        cleared
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.store.lock().capacity()
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, capacity) = {
            let store = self.store.lock();
            (store.len(), store.capacity())
        };

        CacheStats {
            entries,
            capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
