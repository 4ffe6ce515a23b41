//! Cache-then-retry composition for outbound operations
//!
//! [`CachedCaller`] looks a request up in the [`ResponseCache`], and on a miss
//! runs the operation through the [`RetryExecutor`] and stores the JSON-encoded
//! result under the operation's TTL. Neither component knows about the other;
//! this module is the only place they meet.

use crate::cache::{CacheRequest, OperationKind, ResponseCache};
use crate::error::RetryError;
use crate::retry::{Classify, RetryExecutor};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use crate::cache::ttl::{builtin_ttl, TtlTable};

/// Per-call cache behavior
#[derive(Debug, Clone, PartialEq)]
pub struct CallOptions {
    /// TTL for the stored result; `None` uses the TTL table
    pub ttl: Option<Duration>,

    /// Skip the lookup but still store the fresh result
    pub force_refresh: bool,

    /// Bypass the cache entirely
    pub use_cache: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            force_refresh: false,
            use_cache: true,
        }
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Runs operations behind a shared response cache and a retry policy
#[derive(Clone)]
pub struct CachedCaller {
    cache: Arc<ResponseCache>,
    retry: RetryExecutor,
}

impl CachedCaller {
    pub fn new(cache: Arc<ResponseCache>, retry: RetryExecutor) -> Self {
        Self { cache, retry }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// TTL a result of `kind` is stored with when the call gives none
    pub fn ttl_for(&self, kind: &OperationKind) -> Option<Duration> {
        self.cache
            .ttl_table()
            .resolve(kind, self.cache.config().default_ttl)
    }

    /// Return the cached result for `request`, or run `operation` with retries and cache it
    pub fn call<T, E, F>(
        &self,
        request: &CacheRequest,
        options: &CallOptions,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Result<T, E>,
        E: Classify + std::error::Error + 'static,
    {
        if let Some(cached) = self.lookup(request, options) {
            return Ok(cached);
        }

        let value = self.retry.execute(operation)?;
        self.store(request, options, &value);
        Ok(value)
    }

    /// Async form of [`call`](Self::call)
    pub async fn call_async<T, E, F, Fut>(
        &self,
        request: &CacheRequest,
        options: &CallOptions,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::error::Error + 'static,
    {
        if let Some(cached) = self.lookup(request, options) {
            return Ok(cached);
        }

        let value = self.retry.execute_async(operation).await?;
        self.store(request, options, &value);
        Ok(value)
    }

    fn lookup<T: DeserializeOwned>(&self, request: &CacheRequest, options: &CallOptions) -> Option<T> {
        if !options.use_cache || options.force_refresh {
            return None;
        }

        let bytes = self.cache.get(request)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!("Using cached {} result", request.kind());
                Some(value)
            }
            Err(e) => {
                // Payload shape changed since it was written
                warn!("Discarding undecodable cached {} result: {}", request.kind(), e);
                self.cache.invalidate(request);
                None
            }
        }
    }

    fn store<T: Serialize>(&self, request: &CacheRequest, options: &CallOptions, value: &T) {
        if !options.use_cache {
            return;
        }

        match serde_json::to_vec(value) {
            Ok(bytes) => self.cache.set(request, bytes, options.ttl),
            Err(e) => warn!("Not caching {} result, encoding failed: {}", request.kind(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{CallError, RetryConfig};
    use serde::Deserialize;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Review {
        verdict: String,
        comments: Vec<String>,
    }

    fn caller() -> CachedCaller {
        let cache = Arc::new(ResponseCache::in_memory(100).unwrap());
        let retry = RetryExecutor::new(
            RetryConfig::default()
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5)),
        );
        CachedCaller::new(cache, retry)
    }

    fn review() -> Review {
        Review {
            verdict: "approve".to_string(),
            comments: vec!["nit: rename".to_string()],
        }
    }

    #[test]
    fn test_second_call_served_from_cache() {
        let caller = caller();
        let request = CacheRequest::new(OperationKind::CodeReview, "diff --git a b");
        let calls = Cell::new(0);

        for _ in 0..2 {
            let result: Result<Review, RetryError<CallError>> =
                caller.call(&request, &CallOptions::default(), || {
                    calls.set(calls.get() + 1);
                    Ok(review())
                });
            assert_eq!(result.unwrap(), review());
        }

        assert_eq!(calls.get(), 1);
        assert_eq!(caller.cache().stats().hits, 1);
    }

    #[test]
    fn test_force_refresh_reruns_and_stores() {
        let caller = caller();
        let request = CacheRequest::new(OperationKind::Query, "status?");
        let calls = Cell::new(0);

        let run = |options: CallOptions| -> u32 {
            caller
                .call(&request, &options, || -> Result<u32, CallError> {
                    calls.set(calls.get() + 1);
                    Ok(calls.get())
                })
                .unwrap()
        };

        assert_eq!(run(CallOptions::new()), 1);
        assert_eq!(run(CallOptions::new().force_refresh()), 2);
        assert_eq!(run(CallOptions::new()), 2);
    }

    #[test]
    fn test_no_cache_bypasses_store() {
        let caller = caller();
        let request = CacheRequest::new(OperationKind::Query, "uncached");

        let result: Result<String, RetryError<CallError>> =
            caller.call(&request, &CallOptions::new().no_cache(), || Ok("fresh".to_string()));

        assert_eq!(result.unwrap(), "fresh");
        assert!(caller.cache().is_empty());
        assert_eq!(caller.cache().stats().total_requests, 0);
    }

    #[test]
    fn test_undecodable_payload_is_a_miss() {
        let caller = caller();
        let request = CacheRequest::new(OperationKind::CodeReview, "old format");
        caller.cache().set(&request, b"not json".to_vec(), None);

        let result: Result<Review, RetryError<CallError>> =
            caller.call(&request, &CallOptions::default(), || Ok(review()));

        assert_eq!(result.unwrap(), review());
        assert_eq!(caller.cache().stats().invalidations, 1);
        let stored = caller.cache().get(&request).unwrap();
        assert_eq!(serde_json::from_slice::<Review>(&stored).unwrap(), review());
    }

    #[test]
    fn test_failure_is_not_cached() {
        let caller = caller();
        let request = CacheRequest::new(OperationKind::FixCode, "broken.rs");

        let result: Result<String, _> = caller.call(&request, &CallOptions::default(), || {
            Err(CallError::http(400, "Bad Request"))
        });

        assert!(matches!(result, Err(RetryError::NonRetryable { .. })));
        assert!(caller.cache().is_empty());
    }

    #[test]
    fn test_ttl_for_kinds() {
        let caller = caller();
        assert_eq!(
            caller.ttl_for(&OperationKind::GenerateDocs),
            Some(Duration::from_secs(604_800))
        );
        assert_eq!(
            caller.ttl_for(&OperationKind::Custom("triage".to_string())),
            Some(Duration::from_secs(3600))
        );
    }

    #[tokio::test]
    async fn test_call_async_caches() {
        let caller = caller();
        let request = CacheRequest::new(OperationKind::BatchProcess, "batch-7");

        let first: Result<Vec<u32>, RetryError<CallError>> = caller
            .call_async(&request, &CallOptions::default(), || async { Ok(vec![1, 2, 3]) })
            .await;
        assert_eq!(first.unwrap(), vec![1, 2, 3]);

        let second: Result<Vec<u32>, RetryError<CallError>> = caller
            .call_async(&request, &CallOptions::default(), || async {
                Err(CallError::http(500, "should not run"))
            })
            .await;
        assert_eq!(second.unwrap(), vec![1, 2, 3]);
    }
}
