//! Catalog cache: most-recently-accessed responses, refreshed in the background
//!
//! Entries live in a key map and in an ordered set keyed by
//! `(last_accessed_at, serial)`. Both structures change together under one
//! lock. When the cache is full, an insert first evicts a batch of the
//! oldest entries (`floor(max_entries * reduction_factor)`, at least one).
//!
//! Freshness is pushed rather than pulled. A background refresher re-issues
//! every cached request each `update_interval` and swaps the responses in
//! place. A BES error response is cached like any other. Any other failure
//! halts the refresher and leaves the cached entries as they were.

use crate::backend::BesBackend;
use crate::cache::config::CatalogCacheConfig;
use crate::cache::entry::{CacheEntry, CachedResponse, EntryInfo, RecencyKey};
use crate::cache::types::{CacheKey, CacheStats};
use crate::document::Document;
use crate::error::{BesError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const NAME: &str = "CatalogCache";

struct CatalogState {
    config: CatalogCacheConfig,
    by_key: HashMap<CacheKey, CacheEntry>,
    by_recency: BTreeMap<RecencyKey, CacheKey>,
    stats: CacheStats,
}

impl CatalogState {
    fn new(config: CatalogCacheConfig) -> Self {
        Self {
            by_key: HashMap::with_capacity(config.max_entries),
            by_recency: BTreeMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    fn insert(&mut self, entry: CacheEntry) {
        let key = entry.key().to_string();
        self.by_recency.insert(entry.recency_key(), key.clone());
        self.by_key.insert(key, entry);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.by_key.remove(key)?;
        self.by_recency.remove(&entry.recency_key());
        Some(entry)
    }

    fn touch(&mut self, key: &str, now: Instant) -> Option<CachedResponse> {
        let entry = self.by_key.get_mut(key)?;
        self.by_recency.remove(&entry.recency_key());
        entry.touch(now);
        self.by_recency.insert(entry.recency_key(), key.to_string());
        Some(entry.payload().clone())
    }

    fn evict_oldest(&mut self, count: usize) -> usize {
        let mut evicted = 0;
        while evicted < count {
            let Some((_, key)) = self.by_recency.pop_first() else {
                break;
            };
            self.by_key.remove(&key);
            evicted += 1;
        }
        evicted
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        assert_eq!(self.by_key.len(), self.by_recency.len());
        for (recency, key) in &self.by_recency {
            let entry = self.by_key.get(key).expect("ordered key missing from map");
            assert_eq!(&entry.recency_key(), recency);
        }
    }
}

enum RefreshOutcome {
    Completed(usize),
    Cancelled,
    Disabled,
}

struct Refresher {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Response cache for catalog listings.
///
/// Created disabled; [`init`](Self::init) enables it exactly once. While
/// disabled, [`get`](Self::get) always misses and [`put`](Self::put) does
/// nothing.
pub struct CatalogCache {
    state: Mutex<Option<CatalogState>>,
    refresher: Mutex<Option<Refresher>>,
    halted: AtomicBool,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            refresher: Mutex::new(None),
            halted: AtomicBool::new(false),
        }
    }

    /// Enable the cache with the default reduction factor.
    ///
    /// Non-positive values are logged and replaced by the defaults
    /// (50 entries, 10 seconds). Fails if the cache is already enabled.
    pub async fn init(&self, max_entries: i64, update_interval_secs: i64) -> Result<()> {
        let mut config = CatalogCacheConfig::default();

        if max_entries > 0 {
            config.max_entries = max_entries as usize;
        } else {
            error!(
                error = %BesError::BadConfiguration(format!("max_entries = {}", max_entries)),
                default = config.max_entries,
                "Catalog cache size must be positive, using default"
            );
        }

        if update_interval_secs > 0 {
            config.update_interval = Duration::from_secs(update_interval_secs as u64);
        } else {
            error!(
                error = %BesError::BadConfiguration(format!(
                    "update_interval = {}",
                    update_interval_secs
                )),
                default_secs = config.update_interval.as_secs(),
                "Catalog cache update interval must be positive, using default"
            );
        }

        self.init_with_config(config).await
    }

    pub async fn init_with_config(&self, config: CatalogCacheConfig) -> Result<()> {
        config.validate().map_err(BesError::BadConfiguration)?;

        let mut state = self.state.lock().await;
        if state.is_some() {
            error!("{} has already been initialized", NAME);
            return Err(BesError::AlreadyInitialized(NAME));
        }

        info!(
            max_entries = config.max_entries,
            update_interval_secs = config.update_interval.as_secs(),
            reduction_factor = config.reduction_factor,
            "Catalog cache enabled"
        );
        *state = Some(CatalogState::new(config));
        Ok(())
    }

    /// Look up `key`, moving it to the most recent end of the order.
    ///
    /// A cached BES error comes back as [`CachedResponse::Error`], distinct
    /// from a miss.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut()?;

        match state.touch(key, Instant::now()) {
            Some(payload) => {
                state.stats.hits += 1;
                debug!(key = key, error = payload.is_error(), "Catalog cache hit");
                Some(payload)
            }
            None => {
                state.stats.misses += 1;
                debug!(key = key, "Catalog cache miss");
                None
            }
        }
    }

    /// Store the response to `request` under `key`.
    ///
    /// Only a new key can trigger the batch purge: adding one to a full cache
    /// first evicts the oldest batch. Replacing an existing key never evicts,
    /// even when the cache is full, because the entry count does not grow.
    /// This differs from purging before every put, which would drop a
    /// whole eviction batch to overwrite one entry.
    pub async fn put(&self, key: &str, request: &Document, response: impl Into<CachedResponse>) {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            debug!(key = key, "Catalog cache disabled, not storing");
            return;
        };

        let payload = response.into();
        if payload.is_error() {
            info!(key = key, "Caching BES error response");
            state.stats.cached_errors += 1;
        }

        if state.remove(key).is_some() {
            debug!(key = key, "Replacing catalog cache entry");
        } else if state.by_key.len() >= state.config.max_entries {
            let batch = state.config.eviction_batch();
            let evicted = state.evict_oldest(batch);
            state.stats.evictions += evicted as u64;
            info!(
                evicted = evicted,
                remaining = state.by_key.len(),
                "Catalog cache full, evicted oldest entries"
            );
        }

        state.insert(CacheEntry::new_at(key, Some(request), payload, Instant::now()));
        state.stats.stores += 1;
    }

    /// Start the background refresher.
    ///
    /// The cache must be enabled. Calling this while a refresher is running
    /// does nothing.
    pub async fn start_refresher(self: &Arc<Self>, backend: Arc<dyn BesBackend>) -> Result<()> {
        let interval = self.update_interval().await.ok_or_else(|| {
            BesError::BadConfiguration(format!(
                "{} must be initialized before starting the refresher",
                NAME
            ))
        })?;

        let mut slot = self.refresher.lock().await;
        if slot.as_ref().is_some_and(|r| !r.task.is_finished()) {
            warn!("Catalog cache refresher is already running");
            return Ok(());
        }

        self.halted.store(false, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_refresher(
            Arc::downgrade(self),
            backend,
            cancel.clone(),
        ));

        info!(interval_secs = interval.as_secs(), "Catalog cache refresher started");
        *slot = Some(Refresher { cancel, task });
        Ok(())
    }

    /// Cancel the refresher and wait for it to finish.
    pub async fn stop(&self) {
        let Some(refresher) = self.refresher.lock().await.take() else {
            return;
        };

        refresher.cancel.cancel();
        if let Err(e) = refresher.task.await {
            error!(error = %e, "Catalog cache refresher ended abnormally");
        }
    }

    /// True while a refresher task is alive.
    pub async fn is_refreshing(&self) -> bool {
        self.refresher
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// True if the last refresher stopped because a refresh failed.
    pub fn refresher_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Stop the refresher, drop all entries and return to the disabled state.
    pub async fn destroy(&self) {
        self.stop().await;
        let mut state = self.state.lock().await;
        if let Some(old) = state.take() {
            info!(entries = old.by_key.len(), "Catalog cache destroyed");
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.lock().await.is_some()
    }

    pub async fn config(&self) -> Option<CatalogCacheConfig> {
        self.state.lock().await.as_ref().map(|s| s.config.clone())
    }

    async fn update_interval(&self) -> Option<Duration> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|s| s.config.update_interval)
    }

    pub async fn len(&self) -> usize {
        self.state
            .lock()
            .await
            .as_ref()
            .map_or(0, |s| s.by_key.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        match self.state.lock().await.as_ref() {
            Some(state) => CacheStats {
                entries: state.by_key.len(),
                ..state.stats.clone()
            },
            None => CacheStats::default(),
        }
    }

    /// Entries from least to most recently accessed.
    pub async fn snapshot(&self) -> Vec<EntryInfo> {
        match self.state.lock().await.as_ref() {
            Some(state) => state
                .by_recency
                .values()
                .filter_map(|key| state.by_key.get(key))
                .map(CacheEntry::info)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Re-fetch every entry once, holding the lock for the whole pass.
    async fn refresh_all(
        &self,
        backend: &dyn BesBackend,
        cancel: &CancellationToken,
    ) -> Result<RefreshOutcome> {
        let mut guard = self.state.lock().await;
        let Some(state) = guard.as_mut() else {
            return Ok(RefreshOutcome::Disabled);
        };

        let keys: Vec<CacheKey> = state.by_recency.values().cloned().collect();
        let mut refreshed = 0;

        for key in keys {
            if cancel.is_cancelled() {
                return Ok(RefreshOutcome::Cancelled);
            }

            let Some(request) = state.by_key.get(&key).and_then(|e| e.request().cloned()) else {
                continue;
            };

            let fetched = tokio::select! {
                _ = cancel.cancelled() => return Ok(RefreshOutcome::Cancelled),
                fetched = backend.transaction(&request) => fetched,
            };

            let payload: CachedResponse = match fetched {
                Ok(doc) => doc.into(),
                Err(BesError::Backend(e)) => {
                    info!(key = %key, error = %e, "Refresh returned a BES error, caching it");
                    state.stats.cached_errors += 1;
                    e.into()
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to refresh catalog cache entry");
                    return Err(e);
                }
            };

            if let Some(entry) = state.by_key.get_mut(&key) {
                entry.replace_payload(payload, Instant::now());
                state.stats.refreshes += 1;
                refreshed += 1;
            }
        }

        Ok(RefreshOutcome::Completed(refreshed))
    }
}

async fn run_refresher(
    cache: Weak<CatalogCache>,
    backend: Arc<dyn BesBackend>,
    cancel: CancellationToken,
) {
    loop {
        let Some(strong) = cache.upgrade() else {
            debug!("Catalog cache dropped, refresher exiting");
            break;
        };

        let started = Instant::now();
        match strong.refresh_all(backend.as_ref(), &cancel).await {
            Ok(RefreshOutcome::Completed(count)) => {
                debug!(
                    entries = count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Catalog cache refresh cycle complete"
                );
            }
            Ok(RefreshOutcome::Cancelled) => break,
            Ok(RefreshOutcome::Disabled) => {
                info!("Catalog cache disabled, refresher exiting");
                break;
            }
            Err(e) => {
                error!(error = %e, "Halting catalog cache refresher");
                strong.halted.store(true, Ordering::SeqCst);
                break;
            }
        }

        let Some(interval) = strong.update_interval().await else {
            break;
        };
        drop(strong);

        let pause = interval.saturating_sub(started.elapsed());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }

    info!("Catalog cache refresher stopped");
}
