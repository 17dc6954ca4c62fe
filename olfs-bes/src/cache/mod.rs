//! # Response caching
//!
//! Two in-memory caches for BES responses, both guarded by a single lock per
//! cache and both storing BES error responses as first-class values:
//!
//! - [`NodeCache`]: capacity-bounded LRU with lazy staleness. A read that
//!   finds an entry older than the refresh interval re-fetches it through a
//!   caller-supplied closure.
//! - [`CatalogCache`]: most-recently-accessed set with batch eviction and a
//!   background refresher that keeps every entry current.
//!
//! Callers receive clones; nothing handed out aliases cache state.
//!
//! ## Example
//!
//! ```no_run
//! use olfs_bes::cache::NodeCache;
//! use olfs_bes::document::{Document, Element};
//!
//! # async fn example() -> olfs_bes::Result<()> {
//! let cache = NodeCache::new();
//! cache.init(2000, 600).await?;
//!
//! let response = cache
//!     .get("show-node:/data", || async {
//!         // normally a round trip to the BES
//!         Ok(Document::from(Element::new("response")))
//!     })
//!     .await?;
//! println!("{}", response);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod entry;
pub mod lru;
pub mod node;
pub mod types;

pub use catalog::CatalogCache;
pub use config::{
    CatalogCacheConfig, CatalogCacheConfigBuilder, NodeCacheConfig, NodeCacheConfigBuilder,
};
pub use entry::{CacheEntry, CachedResponse, EntryInfo, RecencyKey};
pub use self::lru::LruCache;
pub use node::NodeCache;
pub use types::{CacheKey, CacheStats};
