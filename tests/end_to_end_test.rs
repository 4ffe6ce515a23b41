//! Cache miss, retried call, stored result, cache hit

use seedgpt_core::cache::{CacheConfig, CacheRequest, OperationKind, ResponseCache, TTL_LONG};
use seedgpt_core::integration::{CachedCaller, CallOptions};
use seedgpt_core::retry::{CallError, RetryConfig, RetryExecutor};
use seedgpt_core::RetryError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ReviewResult {
    summary: String,
    issues: u32,
}

fn retry() -> RetryExecutor {
    RetryExecutor::new(
        RetryConfig::default()
            .with_max_retries(5)
            .with_base_delay(Duration::from_millis(5))
            .with_max_delay(Duration::from_millis(50)),
    )
    .with_label("review")
}

#[test]
fn test_miss_retry_store_hit() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(
        ResponseCache::open(CacheConfig::builder().directory(dir.path()).build()).unwrap(),
    );
    let caller = CachedCaller::new(Arc::clone(&cache), retry());

    let request = CacheRequest::new(OperationKind::CodeReview, "fn add(a: i32, b: i32) -> i32 { a + b }")
        .param("system", "Review for correctness");
    assert!(cache.get(&request).is_none());

    let calls = AtomicU32::new(0);
    let operation = || -> Result<ReviewResult, CallError> {
        match calls.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => Err(CallError::http(503, "Service Unavailable")),
            _ => Ok(ReviewResult {
                summary: "Looks correct".to_string(),
                issues: 0,
            }),
        }
    };

    let first = caller.call(&request, &CallOptions::default(), operation).unwrap();
    assert_eq!(first.summary, "Looks correct");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Stored under the code review default TTL
    assert_eq!(caller.ttl_for(&OperationKind::CodeReview), Some(TTL_LONG));
    assert!(cache.contains_key(&request.key()));

    let second: Result<ReviewResult, RetryError<CallError>> =
        caller.call(&request, &CallOptions::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CallError::http(500, "must not be called"))
        });
    assert_eq!(second.unwrap(), first);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);

    // A fresh process reading the same directory also hits
    drop(caller);
    drop(cache);
    let reopened = ResponseCache::open(CacheConfig::builder().directory(dir.path()).build()).unwrap();
    let stored = reopened.get(&request).unwrap();
    assert_eq!(serde_json::from_slice::<ReviewResult>(&stored).unwrap(), first);
}

#[test]
fn test_exhausted_call_leaves_cache_empty() {
    let cache = Arc::new(ResponseCache::in_memory(10).unwrap());
    let caller = CachedCaller::new(Arc::clone(&cache), retry());
    let request = CacheRequest::new(OperationKind::Query, "status");

    let result: Result<String, _> = caller.call(&request, &CallOptions::default(), || {
        Err(CallError::http(502, "Bad Gateway"))
    });

    let err = result.unwrap_err();
    assert!(err.is_exhausted());
    assert_eq!(err.attempts(), 6);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_async_flow_with_explicit_ttl() {
    let cache = Arc::new(ResponseCache::in_memory(10).unwrap());
    let caller = CachedCaller::new(Arc::clone(&cache), retry());
    let request = CacheRequest::new(OperationKind::FixCode, "let x = ;");
    let calls = Arc::new(AtomicU32::new(0));

    let options = CallOptions::new().ttl(Duration::from_millis(40));
    for _ in 0..2 {
        let counter = Arc::clone(&calls);
        let fixed: String = caller
            .call_async(&request, &options, move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(CallError::message("529 overloaded"))
                    } else {
                        Ok("let x = 0;".to_string())
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(fixed, "let x = 0;");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(cache.get(&request).is_none());
}
