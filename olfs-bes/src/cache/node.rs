//! Node cache: LRU responses with lazy staleness
//!
//! Freshness is checked on read. An entry older than the refresh interval is
//! re-fetched by whichever caller reads it next; nothing runs in the
//! background. BES error responses are cached like documents so a key that
//! keeps failing does not send every caller to the backend.
//!
//! One mutex guards the whole cache, and it stays held while `fetch` runs.
//! A slow backend call therefore delays every other caller until it returns.

use crate::cache::config::NodeCacheConfig;
use crate::cache::entry::{CacheEntry, CachedResponse, EntryInfo};
use crate::cache::lru::LruCache;
use crate::cache::types::{CacheKey, CacheStats};
use crate::document::Document;
use crate::error::{BesError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

const NAME: &str = "NodeCache";

struct NodeState {
    config: NodeCacheConfig,
    entries: LruCache<CacheKey, CacheEntry>,
    stats: CacheStats,
}

/// Response cache for node (show-node style) requests.
///
/// Created disabled; [`init`](Self::init) enables it exactly once. While
/// disabled, [`get`](Self::get) calls `fetch` every time.
pub struct NodeCache {
    state: Mutex<Option<NodeState>>,
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Enable the cache.
    ///
    /// Non-positive values are logged and replaced by the defaults
    /// (2000 entries, 600 seconds). Fails if the cache is already enabled.
    pub async fn init(&self, max_entries: i64, refresh_interval_secs: i64) -> Result<()> {
        let mut config = NodeCacheConfig::default();

        if max_entries > 0 {
            config.max_entries = max_entries as usize;
        } else {
            error!(
                error = %BesError::BadConfiguration(format!("max_entries = {}", max_entries)),
                default = config.max_entries,
                "Node cache size must be positive, using default"
            );
        }

        if refresh_interval_secs > 0 {
            config.refresh_interval = Duration::from_secs(refresh_interval_secs as u64);
        } else {
            error!(
                error = %BesError::BadConfiguration(format!(
                    "refresh_interval = {}",
                    refresh_interval_secs
                )),
                default_secs = config.refresh_interval.as_secs(),
                "Node cache refresh interval must be positive, using default"
            );
        }

        self.init_with_config(config).await
    }

    /// Enable the cache with an explicit configuration.
    pub async fn init_with_config(&self, config: NodeCacheConfig) -> Result<()> {
        config.validate().map_err(BesError::BadConfiguration)?;

        let mut state = self.state.lock().await;
        if state.is_some() {
            error!("{} has already been initialized", NAME);
            return Err(BesError::AlreadyInitialized(NAME));
        }

        info!(
            max_entries = config.max_entries,
            refresh_interval_secs = config.refresh_interval.as_secs(),
            "Node cache enabled"
        );
        *state = Some(NodeState {
            entries: LruCache::with_capacity(config.max_entries),
            config,
            stats: CacheStats::default(),
        });
        Ok(())
    }

    /// Return the cached response for `key`, fetching it when missing or
    /// stale.
    ///
    /// A fetch that fails with [`BesError::Backend`] is cached and returned
    /// as that error until it goes stale. Any other fetch error is returned
    /// and nothing is stored.
    pub async fn get<F, Fut>(&self, key: &str, fetch: F) -> Result<Document>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Document>>,
    {
        self.get_with_request(key, None, fetch).await
    }

    /// Like [`get`](Self::get), keeping a snapshot of the request that
    /// produced the response.
    pub async fn get_with_request<F, Fut>(
        &self,
        key: &str,
        request: Option<&Document>,
        fetch: F,
    ) -> Result<Document>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Document>>,
    {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            drop(guard);
            debug!(key = key, "Node cache disabled, fetching directly");
            return fetch().await;
        };

        let now = Instant::now();
        let interval = state.config.refresh_interval;

        let mut stale = false;
        let cached = match state.entries.get_mut(key) {
            Some(entry) if !entry.is_stale(now, interval) => {
                entry.touch(now);
                Some(entry.payload().clone())
            }
            Some(_) => {
                stale = true;
                None
            }
            None => None,
        };

        // a stale entry is dropped before the re-fetch, so a failed fetch
        // leaves nothing behind
        if stale {
            debug!(key = key, "Dropping stale node cache entry");
            state.entries.remove(key);
        }

        if let Some(payload) = cached {
            state.stats.hits += 1;
            debug!(key = key, error = payload.is_error(), "Node cache hit");
            return payload.into_result();
        }

        state.stats.misses += 1;
        debug!(key = key, "Node cache miss, fetching");

        let payload: CachedResponse = match fetch().await {
            Ok(doc) => doc.into(),
            Err(BesError::Backend(e)) => {
                info!(key = key, error = %e, "Caching BES error response");
                state.stats.cached_errors += 1;
                e.into()
            }
            Err(e) => {
                error!(key = key, error = %e, "Fetch failed, nothing cached");
                return Err(e);
            }
        };

        let entry = CacheEntry::new_at(key, request, payload.clone(), Instant::now());
        state.entries.put(key.to_string(), entry);
        state.stats.stores += 1;
        state.stats.evictions = state.entries.evictions();

        payload.into_result()
    }

    /// Drop all entries and return to the disabled state.
    pub async fn destroy(&self) {
        let mut state = self.state.lock().await;
        if let Some(old) = state.take() {
            info!(entries = old.entries.len(), "Node cache destroyed");
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.is_some()
    }

    pub async fn config(&self) -> Option<NodeCacheConfig> {
        self.state.lock().await.as_ref().map(|s| s.config.clone())
    }

    pub async fn len(&self) -> usize {
        self.state
            .lock()
            .await
            .as_ref()
            .map_or(0, |s| s.entries.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        match self.state.lock().await.as_ref() {
            Some(state) => CacheStats {
                entries: state.entries.len(),
                ..state.stats.clone()
            },
            None => CacheStats::default(),
        }
    }

    /// Entries from least to most recently used.
    pub async fn snapshot(&self) -> Vec<EntryInfo> {
        match self.state.lock().await.as_ref() {
            Some(state) => state.entries.iter().map(|(_, e)| e.info()).collect(),
            None => Vec::new(),
        }
    }
}
