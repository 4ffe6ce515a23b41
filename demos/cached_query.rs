//! Cached Query Demo
//!
//! Runs a flaky "model query" through the cache and retry executor twice and
//! prints cache statistics.
//!
//! Usage:
//!   cargo run --example cached_query -- "What is a borrow checker?"
//!
//! Environment variables (a `.env` file is honored):
//!   RUST_LOG                         - log filter (default: seedgpt_core=info)
//!   SEEDGPT_CACHE_DIR                - cache directory, or "memory" (default: user cache dir)
//!   SEEDGPT_CACHE_MAX_SIZE           - maximum entries (default: 1000)
//!   SEEDGPT_CACHE_DEFAULT_TTL_SECS   - TTL for custom operation kinds (default: 3600)
//!   ANTHROPIC_MAX_RETRIES            - retry overrides for the provider preset
//!   ANTHROPIC_BASE_DELAY_SECS

use seedgpt_core::{
    CacheConfig, CacheRequest, CachedCaller, CallError, CallOptions, OperationKind,
    ResponseCache, RetryConfig, RetryExecutor,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("seedgpt_core=info")),
        )
        .init();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What is a borrow checker?".to_string());

    info!("=== Cached Query Demo ===");

    let cache = Arc::new(ResponseCache::open(CacheConfig::from_env()?)?);
    let cleanup = seedgpt_core::spawn_cleanup(Arc::clone(&cache));

    // Short delays so the demo finishes quickly
    let retry_config = RetryConfig::anthropic()
        .with_base_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .with_env_overrides("ANTHROPIC")?;
    let executor = RetryExecutor::new(retry_config)
        .with_label("anthropic")
        .on_retry(|attempt| {
            info!(
                "Retry #{} in {:?} ({})",
                attempt.attempt_number, attempt.delay_before_attempt, attempt.classification
            )
        });
    let caller = CachedCaller::new(Arc::clone(&cache), executor);

    let request = CacheRequest::new(OperationKind::Query, prompt.as_str())
        .param("system", "Answer in one paragraph.");
    let calls = Arc::new(AtomicU32::new(0));

    for round in 1..=2 {
        let counter = Arc::clone(&calls);
        let question = prompt.clone();
        let answer: String = caller
            .call_async(&request, &CallOptions::default(), move || {
                let counter = Arc::clone(&counter);
                let question = question.clone();
                async move {
                    // The first attempt fails the way an overloaded provider does
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(CallError::provider("anthropic", "overloaded_error", "Overloaded"));
                    }
                    Ok(format!("(simulated answer to {:?})", question))
                }
            })
            .await?;

        info!("Round {}: {}", round, answer);
    }

    info!("Operation invoked {} times", calls.load(Ordering::SeqCst));
    info!("{}", cache.stats());
    if let Some(dir) = cache.directory() {
        info!("Records stored in {}", dir.display());
    }

    cleanup.abort();
    Ok(())
}
