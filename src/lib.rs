//! # SeedGPT Core (seedgpt-core)
//!
//! Response caching and resilient outbound calls for SeedGPT agents.
//!
//! ## Features
//!
//! - Content-addressed response cache with TTL expiry and batched LRU eviction
//! - Per-key persistence with checksummed records that survive restarts
//! - Per-operation TTL table (queries, reviews, docs, fixes, batches)
//! - Retry executor with exponential backoff, additive jitter and error classification
//! - Cancellation and deadlines for long backoff sleeps
//! - Blocking and tokio-based async entry points
//!
//! ## Response Cache
//!
//! ```no_run
//! use seedgpt_core::{CacheConfig, CacheRequest, OperationKind, ResponseCache};
//!
//! fn main() -> anyhow::Result<()> {
//!     let cache = ResponseCache::open(CacheConfig::from_env()?)?;
//!
//!     let request = CacheRequest::new(OperationKind::GenerateDocs, "src/lib.rs");
//!     if cache.get(&request).is_none() {
//!         // Stored for 7 days, the docs default
//!         cache.set(&request, b"# API".to_vec(), None);
//!     }
//!
//!     println!("Hit rate: {}", cache.stats().hit_rate_display());
//!     Ok(())
//! }
//! ```
//!
//! ## Retry Executor
//!
//! ```no_run
//! use seedgpt_core::{CallError, RetryConfig, RetryExecutor};
//!
//! fn main() -> anyhow::Result<()> {
//!     let executor = RetryExecutor::new(RetryConfig::anthropic()).with_label("anthropic");
//!
//!     let answer = executor.execute(|| -> Result<String, CallError> {
//!         // Call the provider here
//!         Ok("42".to_string())
//!     })?;
//!     println!("{}", answer);
//!     Ok(())
//! }
//! ```
//!
//! ## Cache + Retry
//!
//! ```no_run
//! use seedgpt_core::{
//!     CacheConfig, CacheRequest, CachedCaller, CallError, CallOptions, OperationKind,
//!     ResponseCache, RetryConfig, RetryExecutor,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = Arc::new(ResponseCache::open(CacheConfig::default())?);
//!     let caller = CachedCaller::new(cache, RetryExecutor::new(RetryConfig::anthropic()));
//!
//!     let request = CacheRequest::new(OperationKind::CodeReview, "diff --git a/src b/src")
//!         .param("model", "sonnet");
//!     let review: String = caller
//!         .call_async(&request, &CallOptions::default(), || async {
//!             Ok::<_, CallError>("LGTM".to_string())
//!         })
//!         .await?;
//!     println!("{}", review);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod integration;
pub mod retry;

// Re-export main types for convenience
pub use cache::{
    spawn_cleanup, CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheRequest,
    CacheStats, CacheValue, InvalidationEvent, InvalidationReason, OperationKind, ResponseCache,
    TtlTable,
};
pub use error::{CacheError, Result, RetryConfigError, RetryError};
pub use integration::{CachedCaller, CallOptions};
pub use retry::{
    CallError, CancelToken, Classify, ConnectionFailure, ErrorClass, RetryAttempt, RetryConfig,
    RetryExecutor,
};
