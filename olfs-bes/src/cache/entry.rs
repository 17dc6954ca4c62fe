//! Cache entries shared by the node and catalog caches

use crate::cache::types::CacheKey;
use crate::document::Document;
use crate::error::{BackendError, BesError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(0);

fn next_serial() -> u64 {
    NEXT_SERIAL.fetch_add(1, Ordering::Relaxed)
}

/// What a cache holds for a key: a response, or the error the BES returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedResponse {
    Document(Document),
    Error(BackendError),
}

impl CachedResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, CachedResponse::Error(_))
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            CachedResponse::Document(doc) => Some(doc),
            CachedResponse::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&BackendError> {
        match self {
            CachedResponse::Document(_) => None,
            CachedResponse::Error(e) => Some(e),
        }
    }

    /// A cached failure becomes [`BesError::Backend`].
    pub fn into_result(self) -> Result<Document> {
        match self {
            CachedResponse::Document(doc) => Ok(doc),
            CachedResponse::Error(e) => Err(BesError::Backend(e)),
        }
    }
}

impl From<Document> for CachedResponse {
    fn from(doc: Document) -> Self {
        CachedResponse::Document(doc)
    }
}

impl From<BackendError> for CachedResponse {
    fn from(e: BackendError) -> Self {
        CachedResponse::Error(e)
    }
}

/// Position of an entry in recency order.
///
/// Ordered by access time, then by creation serial, so two entries touched
/// at the same instant still compare unequal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecencyKey {
    pub last_accessed_at: Instant,
    pub serial: u64,
}

/// A cached backend response with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: CacheKey,
    request: Option<Document>,
    payload: CachedResponse,
    created_at: Instant,
    last_accessed_at: Instant,
    created_wall: DateTime<Utc>,
    accessed_wall: DateTime<Utc>,
    serial: u64,
    access_count: u64,
    version: u64,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    ///
    /// The request is stored as a cache snapshot, without connection scoped
    /// contexts such as the BES timeout.
    pub fn new(
        key: impl Into<CacheKey>,
        request: Option<&Document>,
        payload: impl Into<CachedResponse>,
    ) -> Self {
        Self::new_at(key, request, payload, Instant::now())
    }

    pub fn new_at(
        key: impl Into<CacheKey>,
        request: Option<&Document>,
        payload: impl Into<CachedResponse>,
        now: Instant,
    ) -> Self {
        let wall = Utc::now();
        Self {
            key: key.into(),
            request: request.map(Document::cache_snapshot),
            payload: payload.into(),
            created_at: now,
            last_accessed_at: now,
            created_wall: wall,
            accessed_wall: wall,
            serial: next_serial(),
            access_count: 0,
            version: 1,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored request snapshot, used to re-issue the request
    pub fn request(&self) -> Option<&Document> {
        self.request.as_ref()
    }

    pub fn payload(&self) -> &CachedResponse {
        &self.payload
    }

    pub fn is_error(&self) -> bool {
        self.payload.is_error()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    /// Incremented every time the payload is replaced
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn recency_key(&self) -> RecencyKey {
        RecencyKey {
            last_accessed_at: self.last_accessed_at,
            serial: self.serial,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Older than `interval`. An entry exactly `interval` old is still fresh.
    pub fn is_stale(&self, now: Instant, interval: Duration) -> bool {
        self.age(now) > interval
    }

    /// Record a read.
    pub fn touch(&mut self, now: Instant) {
        self.last_accessed_at = now;
        self.accessed_wall = Utc::now();
        self.access_count += 1;
    }

    /// Swap in a freshly fetched payload and restart the entry's age.
    pub fn replace_payload(&mut self, payload: impl Into<CachedResponse>, now: Instant) {
        self.payload = payload.into();
        self.created_at = now;
        self.created_wall = Utc::now();
        self.version += 1;
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            key: self.key.clone(),
            is_error: self.is_error(),
            created_at: self.created_wall,
            last_accessed_at: self.accessed_wall,
            serial: self.serial,
            access_count: self.access_count,
            version: self.version,
        }
    }
}

/// Read-only view of an entry for diagnostics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntryInfo {
    pub key: CacheKey,
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub serial: u64,
    pub access_count: u64,
    pub version: u64,
}
