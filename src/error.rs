//! Error types for cache persistence and retried calls
//!
//! Cache operations degrade to "proceed as if uncached" instead of failing, so
//! [`CacheError`] only surfaces from constructors and from the persistence layer's
//! internal plumbing. [`RetryError`] is what a caller of the retry executor sees
//! when an operation ultimately fails.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the cache persistence layer and configuration validation
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure while reading or writing a cache record
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record decoded but failed integrity checks
    #[error("Corrupted cache record {key}: {reason}")]
    Corrupted { key: String, reason: String },

    /// String that is not a 64-character hex digest used as a cache key
    #[error("Invalid cache key {0:?}")]
    InvalidKey(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Result type alias for cache construction and persistence
pub type Result<T> = std::result::Result<T, CacheError>;

/// Rejected retry configuration, from `validate()` or an unparsable environment value
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid retry configuration: {0}")]
pub struct RetryConfigError(pub String);

/// Final outcome of a failed [`RetryExecutor`](crate::retry::RetryExecutor) run
///
/// Every variant records how many attempts were made, so a caller can tell
/// "failed after retries" apart from "failed immediately".
#[derive(Error, Debug)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The operation failed with an error classified as non-retryable
    #[error("Non-retryable error on attempt {attempts}: {source}")]
    NonRetryable { attempts: u32, source: E },

    /// Every attempt failed with a retryable error
    #[error("Failed after {attempts} attempts ({retries} retries): {last_error}")]
    Exhausted {
        attempts: u32,
        retries: u32,
        #[source]
        last_error: E,
    },

    /// The cancel token fired before the next attempt
    #[error("Retry cancelled after {attempts} attempts")]
    Cancelled { attempts: u32, last_error: Option<E> },

    /// The next backoff sleep would have crossed the configured deadline
    #[error("Retry deadline of {deadline:?} exceeded after {attempts} attempts")]
    DeadlineExceeded {
        attempts: u32,
        deadline: Duration,
        last_error: Option<E>,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::NonRetryable { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Cancelled { attempts, .. }
            | RetryError::DeadlineExceeded { attempts, .. } => *attempts,
        }
    }

    /// The last error returned by the operation, if any attempt ran
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::Cancelled { last_error, .. }
            | RetryError::DeadlineExceeded { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Consume the wrapper and return the last underlying error
    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Exhausted { last_error, .. } => Some(last_error),
            RetryError::Cancelled { last_error, .. }
            | RetryError::DeadlineExceeded { last_error, .. } => last_error,
        }
    }

    /// True when retries were attempted and all of them failed
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// True when the run was stopped by cancellation or deadline rather than by the operation
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            RetryError::Cancelled { .. } | RetryError::DeadlineExceeded { .. }
        )
    }
}
