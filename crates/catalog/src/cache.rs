//! TTL'd read-through cache
//!
//! Process-scoped cache for catalog documents. Entries stay fresh for a
//! fixed TTL and are invalidated on mutation. The lock is only ever held
//! to copy the small cached view in or out, never across KV I/O.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A mutex-guarded map of cached values with per-entry expiry
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<FxHashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache whose entries stay fresh for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Copy out the cached value for `key` if it is still fresh
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock();
        entries.get(key).and_then(|(inserted, value)| {
            if inserted.elapsed() < self.ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    /// Insert or refresh an entry
    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().insert(key, (Instant::now(), value));
    }

    /// Drop one entry
    pub fn invalidate(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
