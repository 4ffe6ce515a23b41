//! Retry loop: run, classify, back off, repeat

use crate::error::{RetryConfigError, RetryError};
use crate::retry::backoff::calculate_delay;
use crate::retry::cancel::CancelToken;
use crate::retry::classify::{Classify, ErrorClass};
use crate::retry::config::RetryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Record of one scheduled retry, handed to the `on_retry` hook before sleeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based number of the attempt about to run
    pub attempt_number: u32,

    /// Backoff slept before this attempt
    pub delay_before_attempt: Duration,

    /// Classification of the failure that triggered the retry
    pub classification: ErrorClass,

    /// Display text of that failure
    pub error: String,
}

type RetryHook = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

/// Runs fallible operations with exponential backoff
///
/// Holds no state between `execute` calls, so one executor can be shared by
/// any number of callers.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    label: String,
    cancel: Option<CancelToken>,
    on_retry: Option<RetryHook>,
}

impl RetryExecutor {
    /// Executor for `config` as given; out-of-range factors are neutralized by the backoff math
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            label: "operation".to_string(),
            cancel: None,
            on_retry: None,
        }
    }

    /// Executor for `config`, rejecting it if [`RetryConfig::validate`] fails
    pub fn try_new(config: RetryConfig) -> Result<Self, RetryConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Name used in log lines, e.g. the API being called
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Abort pending and future backoff sleeps when `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Register a callback invoked before each backoff sleep
    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryAttempt) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails non-retryably, or runs out of retries
    ///
    /// Blocks the calling thread during backoff sleeps.
    pub fn execute<T, E, F>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + std::error::Error + 'static,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            if self.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last_error: None,
                });
            }

            attempt += 1;
            let error = match operation() {
                Ok(value) => return Ok(self.succeeded(value, attempt)),
                Err(e) => e,
            };

            let (delay, error) = self.plan_retry(attempt, error, started)?;
            let cancelled = match &self.cancel {
                Some(token) => token.sleep(delay),
                None => {
                    std::thread::sleep(delay);
                    false
                }
            };
            if cancelled {
                return Err(self.cancelled(attempt, error));
            }
        }
    }

    /// Async form of [`execute`](Self::execute); sleeps with `tokio::time::sleep`
    pub async fn execute_async<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::error::Error + 'static,
    {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            if self.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last_error: None,
                });
            }

            attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(self.succeeded(value, attempt)),
                Err(e) => e,
            };

            let (delay, error) = self.plan_retry(attempt, error, started)?;
            let cancelled = match &self.cancel {
                Some(token) => token.sleep_async(delay).await,
                None => {
                    tokio::time::sleep(delay).await;
                    false
                }
            };
            if cancelled {
                return Err(self.cancelled(attempt, error));
            }
        }
    }

    /// Decide whether attempt `attempt` (1-based) gets a successor, and after what delay
    fn plan_retry<E>(
        &self,
        attempt: u32,
        error: E,
        started: Instant,
    ) -> Result<(Duration, E), RetryError<E>>
    where
        E: Classify + std::error::Error + 'static,
    {
        let class = error.classify();
        if class == ErrorClass::NonRetryable {
            debug!(
                "{} failed with non-retryable error on attempt {}: {}",
                self.label, attempt, error
            );
            return Err(RetryError::NonRetryable {
                attempts: attempt,
                source: error,
            });
        }

        let retries_done = attempt - 1;
        if retries_done >= self.config.max_retries {
            error!(
                "All {} retry attempts exhausted for {}. Last error: {}",
                self.config.max_retries, self.label, error
            );
            return Err(RetryError::Exhausted {
                attempts: attempt,
                retries: retries_done,
                last_error: error,
            });
        }

        if self.is_cancelled() {
            return Err(self.cancelled(attempt, error));
        }

        let delay = calculate_delay(&self.config, retries_done, class, error.retry_after());
        if let Some(deadline) = self.config.deadline {
            if started.elapsed().saturating_add(delay) > deadline {
                warn!(
                    "{} deadline of {:?} reached after {} attempts. Last error: {}",
                    self.label, deadline, attempt, error
                );
                return Err(RetryError::DeadlineExceeded {
                    attempts: attempt,
                    deadline,
                    last_error: Some(error),
                });
            }
        }

        warn!(
            "{} failed (attempt {}/{}, {}): {}. Retrying in {:.2}s...",
            self.label,
            attempt,
            self.config.max_attempts(),
            class,
            error,
            delay.as_secs_f64()
        );

        if let Some(hook) = &self.on_retry {
            hook(&RetryAttempt {
                attempt_number: attempt + 1,
                delay_before_attempt: delay,
                classification: class,
                error: error.to_string(),
            });
        }

        Ok((delay, error))
    }

    fn succeeded<T>(&self, value: T, attempt: u32) -> T {
        if attempt > 1 {
            info!("{} succeeded on attempt {}", self.label, attempt);
        }
        value
    }

    fn cancelled<E>(&self, attempt: u32, error: E) -> RetryError<E>
    where
        E: std::error::Error + 'static,
    {
        info!("{} retries cancelled after {} attempts", self.label, attempt);
        RetryError::Cancelled {
            attempts: attempt,
            last_error: Some(error),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("label", &self.label)
            .field("cancel", &self.cancel)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}
