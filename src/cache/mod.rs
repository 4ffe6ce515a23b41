//! # Response Cache
//!
//! Content-addressed cache for the results of expensive outbound operations
//! (model queries, code reviews, documentation runs).
//!
//! ## Features
//!
//! - **Deterministic Keys**: SHA-256 over the operation kind, primary input and parameters
//! - **TTL-Based Expiration**: Lazy expiry on read, per-operation defaults from [`TtlTable`]
//! - **LRU Eviction**: Removes the least recently used fraction once `max_size` is exceeded
//! - **Persistence**: One checksummed record per key, reloaded on startup
//! - **Best Effort**: Misses, corrupt records and disk failures never surface as errors
//!
//! ## Example
//!
//! ```rust
//! use seedgpt_core::cache::{CacheConfig, CacheRequest, OperationKind, ResponseCache};
//! use std::time::Duration;
//!
//! # fn example() -> seedgpt_core::error::Result<()> {
//! let config = CacheConfig::builder()
//!     .in_memory()
//!     .max_size(500)
//!     .default_ttl(Duration::from_secs(3600))
//!     .build();
//!
//! let cache = ResponseCache::open(config)?;
//!
//! let request = CacheRequest::new(OperationKind::Query, "Summarize the README")
//!     .param("system", "You are terse.");
//! cache.set(&request, b"A cache and a retry loop.".to_vec(), None);
//!
//! if let Some(value) = cache.get(&request) {
//!     println!("Cache hit: {} bytes", value.len());
//! }
//! println!("{}", cache.stats());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entry;
pub mod invalidation;
pub mod persistence;
pub mod store;
pub mod ttl;
pub mod types;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::CacheEntry;
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use persistence::DiskStore;
pub use store::{spawn_cleanup, ResponseCache};
pub use ttl::{builtin_ttl, TtlTable, TTL_LONG, TTL_MEDIUM, TTL_SHORT, TTL_WEEK};
pub use types::{CacheKey, CacheRequest, CacheStats, CacheValue, OperationKind};
