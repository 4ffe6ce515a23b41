//! Error classification: which failures are worth another attempt

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// How the executor should treat a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Transient failure, retry with normal backoff
    Retryable,

    /// Propagate immediately
    NonRetryable,

    /// Provider asked us to slow down; retry with the rate-limit base delay
    RateLimited,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::NonRetryable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Retryable => write!(f, "retryable"),
            ErrorClass::NonRetryable => write!(f, "non-retryable"),
            ErrorClass::RateLimited => write!(f, "rate-limited"),
        }
    }
}

/// Errors the retry executor knows how to classify
pub trait Classify {
    fn classify(&self) -> ErrorClass;

    /// Provider-supplied minimum wait before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Transport-level failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionFailure {
    Reset,
    Refused,
    Timeout,
    ConnectTimeout,
    ReadTimeout,
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionFailure::Reset => write!(f, "connection reset"),
            ConnectionFailure::Refused => write!(f, "connection refused"),
            ConnectionFailure::Timeout => write!(f, "timed out"),
            ConnectionFailure::ConnectTimeout => write!(f, "connect timeout"),
            ConnectionFailure::ReadTimeout => write!(f, "read timeout"),
        }
    }
}

/// Failure of one outbound call, as reported by the call layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CallError {
    /// Network or connection failure
    #[error("Connection error: {0}")]
    Connection(ConnectionFailure),

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Typed error body returned by a provider API (e.g. `overloaded_error`)
    #[error("{service} error ({kind}): {message}")]
    Provider {
        service: String,
        kind: String,
        message: String,
    },

    /// Explicit rate limit signal
    #[error("Rate limit exceeded for {service}")]
    RateLimited {
        service: String,
        retry_after: Option<Duration>,
    },

    /// CLI tool exited with a failure
    #[error("CLI exited with code {exit_code}: {message}")]
    Cli { exit_code: i32, message: String },

    /// Anything else; classified by message content
    #[error("{0}")]
    Message(String),
}

impl CallError {
    pub fn connection(kind: ConnectionFailure) -> Self {
        CallError::Connection(kind)
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        CallError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn provider(
        service: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CallError::Provider {
            service: service.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(service: impl Into<String>, retry_after: Option<Duration>) -> Self {
        CallError::RateLimited {
            service: service.into(),
            retry_after,
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        CallError::Message(text.into())
    }

    /// Interpret the outcome of a CLI invocation
    ///
    /// Returns `None` on success. A non-zero exit whose stderr holds only
    /// warnings while stdout carries output also counts as success.
    pub fn from_cli_output(exit_code: i32, stdout: &str, stderr: &str) -> Option<Self> {
        if exit_code == 0 {
            return None;
        }

        let stdout = stdout.trim();
        let stderr = stderr.trim();
        if !stdout.is_empty() && is_warning_only(stderr) {
            warn!("CLI exited with code {} but only reported warnings: {}", exit_code, stderr);
            return None;
        }

        let message = if !stderr.is_empty() {
            stderr.to_string()
        } else if !stdout.is_empty() {
            stdout.chars().take(200).collect()
        } else {
            "no error message provided".to_string()
        };
        Some(CallError::Cli { exit_code, message })
    }
}

impl Classify for CallError {
    fn classify(&self) -> ErrorClass {
        match self {
            CallError::Connection(_) => ErrorClass::Retryable,
            CallError::Http { status: 429, .. } => ErrorClass::RateLimited,
            CallError::Http {
                status: 500 | 502 | 503 | 504,
                ..
            } => ErrorClass::Retryable,
            // Source-control APIs report secondary rate limits as 403
            CallError::Http {
                status: 403,
                message,
            } => classify_message(message),
            CallError::Http { .. } => ErrorClass::NonRetryable,
            CallError::Provider { kind, message, .. } => match kind.as_str() {
                "overloaded_error" | "api_error" => ErrorClass::Retryable,
                "rate_limit_error" => ErrorClass::RateLimited,
                _ => classify_message(message),
            },
            CallError::RateLimited { .. } => ErrorClass::RateLimited,
            CallError::Cli { message, .. } | CallError::Message(message) => {
                classify_message(message)
            }
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CallError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl Classify for io::Error {
    fn classify(&self) -> ErrorClass {
        match self.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => ErrorClass::Retryable,
            _ => classify_message(&self.to_string()),
        }
    }
}

const RATE_LIMIT_PATTERNS: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many requests",
    "quota exceeded",
    "secondary rate limit",
    "abuse detection",
    "rate_limit_error",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "internal server error",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    "overloaded",
    "api_error",
    "connection reset",
    "connection refused",
    "connection aborted",
    "timed out",
    "timeout",
];

/// Classify free-form error text
pub fn classify_message(message: &str) -> ErrorClass {
    let text = message.to_lowercase();

    if RATE_LIMIT_PATTERNS.iter().any(|p| text.contains(p)) || contains_status(&text, 429) {
        return ErrorClass::RateLimited;
    }

    if TRANSIENT_PATTERNS.iter().any(|p| text.contains(p))
        || [500, 502, 503, 504]
            .iter()
            .any(|status| contains_status(&text, *status))
    {
        return ErrorClass::Retryable;
    }

    ErrorClass::NonRetryable
}

/// True if `status` appears as a standalone number, so "1500 tokens" is not a 500
fn contains_status(text: &str, status: u16) -> bool {
    let status = status.to_string();
    text.split(|c: char| !c.is_ascii_digit())
        .any(|token| token == status)
}

fn is_warning_only(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    (lower.contains("warn:") || lower.contains("warning:")) && !lower.contains("error:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_retryable() {
        for kind in [
            ConnectionFailure::Reset,
            ConnectionFailure::Refused,
            ConnectionFailure::Timeout,
            ConnectionFailure::ConnectTimeout,
            ConnectionFailure::ReadTimeout,
        ] {
            assert_eq!(CallError::connection(kind).classify(), ErrorClass::Retryable);
        }
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(CallError::http(429, "slow down").classify(), ErrorClass::RateLimited);
        for status in [500, 502, 503, 504] {
            assert_eq!(CallError::http(status, "").classify(), ErrorClass::Retryable);
        }
        for status in [400, 401, 404, 422] {
            assert_eq!(CallError::http(status, "").classify(), ErrorClass::NonRetryable);
        }
    }

    #[test]
    fn test_forbidden_secondary_rate_limit() {
        let limited = CallError::http(403, "You have exceeded a secondary rate limit");
        assert_eq!(limited.classify(), ErrorClass::RateLimited);

        let denied = CallError::http(403, "Resource not accessible by integration");
        assert_eq!(denied.classify(), ErrorClass::NonRetryable);
    }

    #[test]
    fn test_provider_error_kinds() {
        assert_eq!(
            CallError::provider("anthropic", "overloaded_error", "Overloaded").classify(),
            ErrorClass::Retryable
        );
        assert_eq!(
            CallError::provider("anthropic", "rate_limit_error", "").classify(),
            ErrorClass::RateLimited
        );
        assert_eq!(
            CallError::provider("anthropic", "authentication_error", "invalid x-api-key")
                .classify(),
            ErrorClass::NonRetryable
        );
        assert_eq!(
            CallError::provider("anthropic", "invalid_request_error", "Your credit balance is too low")
                .classify(),
            ErrorClass::NonRetryable
        );
    }

    #[test]
    fn test_rate_limited_carries_hint() {
        let error = CallError::rate_limited("github", Some(Duration::from_secs(30)));
        assert_eq!(error.classify(), ErrorClass::RateLimited);
        assert_eq!(error.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(CallError::http(429, "").retry_after(), None);
    }

    #[test]
    fn test_classify_message() {
        assert_eq!(classify_message("Rate limit exceeded"), ErrorClass::RateLimited);
        assert_eq!(classify_message("monthly QUOTA EXCEEDED"), ErrorClass::RateLimited);
        assert_eq!(classify_message("got status 503"), ErrorClass::Retryable);
        assert_eq!(classify_message("Service Unavailable"), ErrorClass::Retryable);
        assert_eq!(classify_message("request timeout"), ErrorClass::Retryable);
        assert_eq!(classify_message("prompt is 1500 tokens too long"), ErrorClass::NonRetryable);
        assert_eq!(classify_message("Not Found"), ErrorClass::NonRetryable);
    }

    #[test]
    fn test_io_error_classification() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");
        assert_eq!(reset.classify(), ErrorClass::Retryable);

        let missing = io::Error::new(io::ErrorKind::NotFound, "no such file");
        assert_eq!(missing.classify(), ErrorClass::NonRetryable);
    }

    #[test]
    fn test_cli_output() {
        assert!(CallError::from_cli_output(0, "ok", "").is_none());
        assert!(CallError::from_cli_output(1, "{\"result\":\"ok\"}", "WARN: CPU lacks AVX support").is_none());

        let failure = CallError::from_cli_output(1, "", "Error: overloaded").unwrap();
        assert_eq!(failure.classify(), ErrorClass::Retryable);

        let mixed = CallError::from_cli_output(2, "partial", "warning: x\nerror: boom").unwrap();
        assert!(matches!(mixed, CallError::Cli { exit_code: 2, .. }));
        assert_eq!(mixed.classify(), ErrorClass::NonRetryable);

        let silent = CallError::from_cli_output(3, "", "").unwrap();
        assert_eq!(silent.to_string(), "CLI exited with code 3: no error message provided");
    }

    #[test]
    fn test_error_class_display() {
        assert_eq!(ErrorClass::RateLimited.to_string(), "rate-limited");
        assert!(ErrorClass::RateLimited.is_retryable());
        assert!(!ErrorClass::NonRetryable.is_retryable());
    }
}
