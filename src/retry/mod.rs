//! # Retry Executor
//!
//! Retries failed outbound calls with exponential backoff and jitter.
//!
//! Failures are sorted into three classes by [`Classify`]: retryable (connection
//! errors, 5xx, provider overload), rate-limited (429, quota and secondary rate
//! limit messages) and non-retryable (everything else, returned at once).
//!
//! For retry `n` (0-based) the executor sleeps
//! `min(base_delay * exponential_base^n, max_delay)` plus up to
//! `jitter_factor` of that again. Rate-limited failures use the same formula
//! unless `rate_limit_base_delay` is set, and honor a provider `retry_after` hint.
//!
//! ## Example
//!
//! ```rust
//! use seedgpt_core::retry::{CallError, RetryConfig, RetryExecutor};
//! use std::time::Duration;
//!
//! let executor = RetryExecutor::new(
//!     RetryConfig::github().with_base_delay(Duration::from_millis(10)),
//! )
//! .with_label("github");
//!
//! let mut calls = 0;
//! let result = executor.execute(|| {
//!     calls += 1;
//!     if calls < 2 {
//!         Err(CallError::http(502, "Bad Gateway"))
//!     } else {
//!         Ok("issue list")
//!     }
//! });
//!
//! assert_eq!(result.unwrap(), "issue list");
//! ```

pub mod backoff;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod executor;

pub use backoff::{calculate_delay, calculate_delay_with_sample, unjittered_delay};
pub use cancel::CancelToken;
pub use classify::{classify_message, CallError, Classify, ConnectionFailure, ErrorClass};
pub use config::RetryConfig;
pub use executor::{RetryAttempt, RetryExecutor};
