//! Fixed-capacity, access-ordered map
//!
//! A thin wrapper over [`lru::LruCache`] that reports replaced values from
//! `put`, counts evictions and iterates oldest-accessed first. It does no
//! locking of its own; owners serialise access.

use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;
use tracing::debug;

pub struct LruCache<K: Hash + Eq, V> {
    inner: lru::LruCache<K, V>,
    evictions: u64,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: lru::LruCache::new(capacity),
            evictions: 0,
        }
    }

    /// Like [`new`](Self::new), clamping a zero capacity to 1.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
    }

    /// Look up `key` and mark it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get_mut(key)
    }

    /// Look up `key` without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.peek(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains(key)
    }

    /// Insert or replace, marking the key most recently used.
    ///
    /// Returns the value previously stored under `key`. When a new key
    /// pushes the map over capacity, exactly one least recently used entry
    /// is evicted.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let replacing = self.inner.contains(&key);
        let displaced = self.inner.push(key, value);

        if replacing {
            return displaced.map(|(_, v)| v);
        }
        if displaced.is_some() {
            self.evictions += 1;
            debug!(capacity = self.inner.cap().get(), "Evicted least recently used entry");
        }
        None
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.pop(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    /// Total entries evicted for capacity since creation
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Entries from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter().rev()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }
}
