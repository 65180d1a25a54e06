//! Bounded lookup memo shared by a backend across resolution runs.
//!
//! Backends use this for name → versions lookups so that the same package
//! is fetched from a registry or package database once per process. Entries
//! never expire by age; when the memo is full, admission and eviction are
//! frequency-aware, so names hit at every graph level stay resident.

use std::future::Future;

use mini_moka::sync::Cache;

/// A cloneable handle to a bounded, thread-safe key/value memo.
#[derive(Clone)]
pub struct LookupMemo<V: Clone + Send + Sync + 'static> {
    entries: Cache<String, V>,
    capacity: u64,
}

impl<V: Clone + Send + Sync + 'static> LookupMemo<V> {
    /// Create a memo holding at most `capacity` entries (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1) as u64;
        Self {
            entries: Cache::new(capacity),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(&key.to_owned())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
    }

    /// Return the memoized value for `key`, computing it with `fetch` on a miss.
    ///
    /// Nothing is locked while `fetch` runs. Two concurrent misses on the
    /// same key may both fetch; the results are equal for a given external
    /// state, so the second insert is harmless. Errors are not memoized.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Approximate number of entries; pending evictions may not be applied yet.
    pub fn len(&self) -> usize {
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}
