//! Configuration for the response caches

use crate::config::{env_duration_secs, env_parse, load_dotenv};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default node cache capacity
pub const DEFAULT_NODE_MAX_ENTRIES: usize = 2000;

/// Default node cache staleness interval
pub const DEFAULT_NODE_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

/// Default catalog cache capacity
pub const DEFAULT_CATALOG_MAX_ENTRIES: usize = 50;

/// Default catalog refresher period
pub const DEFAULT_CATALOG_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Default share of the catalog cache evicted when it fills
pub const DEFAULT_REDUCTION_FACTOR: f64 = 0.2;

/// Configuration for the [`NodeCache`](crate::cache::NodeCache)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCacheConfig {
    /// Maximum number of cached responses
    pub max_entries: usize,

    /// Age after which an entry is re-fetched on the next read
    pub refresh_interval: Duration,
}

impl Default for NodeCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_NODE_MAX_ENTRIES,
            refresh_interval: DEFAULT_NODE_REFRESH_INTERVAL,
        }
    }
}

impl NodeCacheConfig {
    pub fn builder() -> NodeCacheConfigBuilder {
        NodeCacheConfigBuilder::default()
    }

    /// Load from `BES_NODE_CACHE_MAX_ENTRIES` and
    /// `BES_NODE_CACHE_REFRESH_INTERVAL` (seconds).
    pub fn from_env() -> Self {
        load_dotenv();
        let defaults = Self::default();
        Self {
            max_entries: env_parse("BES_NODE_CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries),
            refresh_interval: env_duration_secs("BES_NODE_CACHE_REFRESH_INTERVAL")
                .unwrap_or(defaults.refresh_interval),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".to_string());
        }
        if self.refresh_interval.is_zero() {
            return Err("refresh_interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NodeCacheConfigBuilder {
    max_entries: Option<usize>,
    refresh_interval: Option<Duration>,
}

impl NodeCacheConfigBuilder {
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn build(self) -> NodeCacheConfig {
        let defaults = NodeCacheConfig::default();

        NodeCacheConfig {
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            refresh_interval: self.refresh_interval.unwrap_or(defaults.refresh_interval),
        }
    }
}

/// Configuration for the [`CatalogCache`](crate::cache::CatalogCache)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCacheConfig {
    /// Maximum number of cached responses
    pub max_entries: usize,

    /// Period of the background refresher
    pub update_interval: Duration,

    /// Share of `max_entries` evicted in one batch when the cache is full,
    /// in (0, 1]
    pub reduction_factor: f64,
}

impl Default for CatalogCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CATALOG_MAX_ENTRIES,
            update_interval: DEFAULT_CATALOG_UPDATE_INTERVAL,
            reduction_factor: DEFAULT_REDUCTION_FACTOR,
        }
    }
}

impl CatalogCacheConfig {
    pub fn builder() -> CatalogCacheConfigBuilder {
        CatalogCacheConfigBuilder::default()
    }

    /// Load from `BES_CATALOG_CACHE_MAX_ENTRIES`,
    /// `BES_CATALOG_CACHE_UPDATE_INTERVAL` (seconds) and
    /// `BES_CATALOG_CACHE_REDUCTION_FACTOR`.
    pub fn from_env() -> Self {
        load_dotenv();
        let defaults = Self::default();
        Self {
            max_entries: env_parse("BES_CATALOG_CACHE_MAX_ENTRIES")
                .unwrap_or(defaults.max_entries),
            update_interval: env_duration_secs("BES_CATALOG_CACHE_UPDATE_INTERVAL")
                .unwrap_or(defaults.update_interval),
            reduction_factor: env_parse("BES_CATALOG_CACHE_REDUCTION_FACTOR")
                .unwrap_or(defaults.reduction_factor),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".to_string());
        }
        if self.update_interval.is_zero() {
            return Err("update_interval must be greater than 0".to_string());
        }
        if !(self.reduction_factor > 0.0 && self.reduction_factor <= 1.0) {
            return Err("reduction_factor must be in (0.0, 1.0]".to_string());
        }
        Ok(())
    }

    /// Entries dropped per eviction batch: `floor(max * factor)`, at least 1.
    pub fn eviction_batch(&self) -> usize {
        ((self.max_entries as f64 * self.reduction_factor).floor() as usize).max(1)
    }
}

#[derive(Debug, Default)]
pub struct CatalogCacheConfigBuilder {
    max_entries: Option<usize>,
    update_interval: Option<Duration>,
    reduction_factor: Option<f64>,
}

impl CatalogCacheConfigBuilder {
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = Some(interval);
        self
    }

    pub fn reduction_factor(mut self, factor: f64) -> Self {
        self.reduction_factor = Some(factor);
        self
    }

    pub fn build(self) -> CatalogCacheConfig {
        let defaults = CatalogCacheConfig::default();

        CatalogCacheConfig {
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            update_interval: self.update_interval.unwrap_or(defaults.update_interval),
            reduction_factor: self.reduction_factor.unwrap_or(defaults.reduction_factor),
        }
    }
}
