//! Retry configuration and per-API presets

use crate::error::RetryConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff parameters for one class of outbound calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt (total attempts = `max_retries + 1`)
    pub max_retries: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Ceiling for the computed delay, before jitter
    pub max_delay: Duration,

    /// Growth factor per retry
    pub exponential_base: f64,

    /// Extra random fraction added on top of each delay (0.1 = up to +10%)
    pub jitter_factor: f64,

    /// Minimum base delay for rate-limited failures; `None` uses `base_delay` as for any retry
    pub rate_limit_base_delay: Option<Duration>,

    /// Total time budget across all attempts and sleeps
    pub deadline: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter_factor: 0.1,
            rate_limit_base_delay: None,
            deadline: None,
        }
    }
}

impl RetryConfig {
    /// Preset for the model provider API
    pub fn anthropic() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
            ..Self::default()
        }
    }

    /// Preset for the source-control API
    pub fn github() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Default configuration overridden by `{prefix}_*` environment variables
    ///
    /// Recognized: `_MAX_RETRIES`, `_BASE_DELAY_SECS`, `_MAX_DELAY_SECS`,
    /// `_EXPONENTIAL_BASE`, `_JITTER_FACTOR`.
    pub fn from_env(prefix: &str) -> Result<Self, RetryConfigError> {
        Self::default().with_env_overrides(prefix)
    }

    /// Apply `{prefix}_*` environment overrides on top of this configuration
    pub fn with_env_overrides(mut self, prefix: &str) -> Result<Self, RetryConfigError> {
        if let Some(value) = env_value(prefix, "MAX_RETRIES") {
            self.max_retries = parse_env(prefix, "MAX_RETRIES", &value)?;
        }
        if let Some(value) = env_value(prefix, "BASE_DELAY_SECS") {
            self.base_delay = parse_secs(prefix, "BASE_DELAY_SECS", &value)?;
        }
        if let Some(value) = env_value(prefix, "MAX_DELAY_SECS") {
            self.max_delay = parse_secs(prefix, "MAX_DELAY_SECS", &value)?;
        }
        if let Some(value) = env_value(prefix, "EXPONENTIAL_BASE") {
            self.exponential_base = parse_env(prefix, "EXPONENTIAL_BASE", &value)?;
        }
        if let Some(value) = env_value(prefix, "JITTER_FACTOR") {
            self.jitter_factor = parse_env(prefix, "JITTER_FACTOR", &value)?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Start rate-limited retries from at least `delay`
    pub fn with_rate_limit_base_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_base_delay = Some(delay);
        self
    }

    /// Give up once the next sleep would cross `deadline` since the first attempt
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Upper bound of any realized delay: `max_delay * (1 + jitter_factor)`, saturating
    pub fn max_jittered_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_delay.as_secs_f64() * (1.0 + self.effective_jitter()))
            .unwrap_or(Duration::MAX)
    }

    /// Jitter factor as used by the backoff math; negative or non-finite values mean none
    pub(crate) fn effective_jitter(&self) -> f64 {
        if self.jitter_factor.is_finite() && self.jitter_factor > 0.0 {
            self.jitter_factor
        } else {
            0.0
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if !self.exponential_base.is_finite() || self.exponential_base < 1.0 {
            return Err(RetryConfigError(format!(
                "exponential_base must be >= 1.0, got {}",
                self.exponential_base
            )));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(RetryConfigError(format!(
                "jitter_factor must be in [0.0, 1.0], got {}",
                self.jitter_factor
            )));
        }

        if self.base_delay > self.max_delay {
            return Err(RetryConfigError(format!(
                "base_delay ({:?}) exceeds max_delay ({:?})",
                self.base_delay, self.max_delay
            )));
        }

        if self.deadline == Some(Duration::ZERO) {
            return Err(RetryConfigError(
                "deadline must be positive when set".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_value(prefix: &str, suffix: &str) -> Option<String> {
    std::env::var(format!("{}_{}", prefix, suffix))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(
    prefix: &str,
    suffix: &str,
    value: &str,
) -> Result<T, RetryConfigError> {
    value.parse().map_err(|_| {
        RetryConfigError(format!("{}_{} has invalid value {:?}", prefix, suffix, value))
    })
}

fn parse_secs(prefix: &str, suffix: &str, value: &str) -> Result<Duration, RetryConfigError> {
    let secs: f64 = parse_env(prefix, suffix, value)?;
    Duration::try_from_secs_f64(secs).map_err(|_| {
        RetryConfigError(format!(
            "{}_{} must be a non-negative number of seconds, got {:?}",
            prefix, suffix, value
        ))
    })
}
