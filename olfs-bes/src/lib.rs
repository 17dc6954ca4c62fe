//! # OLFS BES middle tier (olfs-bes)
//!
//! Client side of the PPT protocol used to talk to a BES, and the in-memory
//! caches that sit in front of it.
//!
//! ## Features
//!
//! - Chunked message framing with in-band error and exit signalling
//! - Connect-time handshake and graceful exit
//! - Half-duplex transport client, one request in flight per connection
//! - Node cache: LRU with lazy, read-time staleness
//! - Catalog cache: batch eviction plus a cancellable background refresher
//! - BES error responses cached alongside documents
//!
//! ## Talking to a BES
//!
//! ```no_run
//! use olfs_bes::ppt::Client;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = Client::connect("localhost", 10022).await?;
//!
//!     let mut data = Vec::new();
//!     let mut errors = Vec::new();
//!     let ok = client
//!         .execute_commands("show version", &mut data, &mut errors)
//!         .await?;
//!
//!     if ok {
//!         println!("{}", String::from_utf8_lossy(&data));
//!     } else {
//!         eprintln!("BES error: {}", String::from_utf8_lossy(&errors));
//!     }
//!
//!     client.close(true).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Keeping catalog responses fresh
//!
//! ```no_run
//! use olfs_bes::backend::{PptBackend, TextResponseParser};
//! use olfs_bes::cache::CatalogCache;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = Arc::new(PptBackend::new(
//!         "localhost",
//!         10022,
//!         Arc::new(TextResponseParser),
//!     ));
//!
//!     let catalog = Arc::new(CatalogCache::new());
//!     catalog.init(50, 10).await?;
//!     catalog.start_refresher(backend).await?;
//!
//!     // ... serve requests, calling catalog.get / catalog.put ...
//!
//!     catalog.destroy().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod ppt;

// Re-export main types for convenience
pub use backend::{BesBackend, DocumentParser, PptBackend, TextResponseParser};
pub use cache::{
    CacheEntry, CacheKey, CacheStats, CachedResponse, CatalogCache, CatalogCacheConfig,
    EntryInfo, LruCache, NodeCache, NodeCacheConfig,
};
pub use document::{Document, Element, Node};
pub use error::{BackendError, BesError, Result};
pub use ppt::{Client, TransportConfig};
