//! Shared cache types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type
pub type CacheKey = String;

/// Counters for cache behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,

    /// Lookups that found nothing (or found a stale entry)
    pub misses: u64,

    /// Entries written, including replacements
    pub stores: u64,

    /// Entries removed to make room
    pub evictions: u64,

    /// Backend errors stored as cached responses
    pub cached_errors: u64,

    /// Entries re-fetched by a background refresher
    pub refreshes: u64,

    /// Number of entries currently in cache
    pub entries: usize,
}

impl CacheStats {
    /// Cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Cache miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, entries: {}, evictions: {}, cached_errors: {}, refreshes: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.entries,
            self.evictions,
            self.cached_errors,
            self.refreshes
        )
    }
}
