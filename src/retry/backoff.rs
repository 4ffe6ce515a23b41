//! Exponential backoff with additive jitter

use crate::retry::classify::ErrorClass;
use crate::retry::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Delay before retry `retry_index` (0-based), before jitter
///
/// `min(base_delay * exponential_base^n, max_delay)`. When
/// `rate_limit_base_delay` is set, rate-limited failures start from
/// `max(base_delay, rate_limit_base_delay)` instead.
pub fn unjittered_delay(config: &RetryConfig, retry_index: u32, class: ErrorClass) -> Duration {
    let base = match (class, config.rate_limit_base_delay) {
        (ErrorClass::RateLimited, Some(floor)) => config.base_delay.max(floor),
        _ => config.base_delay,
    };

    let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
    let secs = base.as_secs_f64() * config.exponential_base.powi(exponent);
    if secs.is_nan() || secs >= config.max_delay.as_secs_f64() {
        return config.max_delay;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// Realized delay before retry `retry_index`, with random jitter
pub fn calculate_delay(
    config: &RetryConfig,
    retry_index: u32,
    class: ErrorClass,
    retry_after: Option<Duration>,
) -> Duration {
    let sample = rand::thread_rng().gen::<f64>();
    calculate_delay_with_sample(config, retry_index, class, retry_after, sample)
}

/// Same as [`calculate_delay`] with the jitter sample (in `[0, 1)`) supplied by the caller
///
/// Jitter only ever adds: `delay + delay * jitter_factor * sample`. A `retry_after`
/// hint raises the result to at least that value. The result never exceeds
/// `max_delay * (1 + jitter_factor)`.
pub fn calculate_delay_with_sample(
    config: &RetryConfig,
    retry_index: u32,
    class: ErrorClass,
    retry_after: Option<Duration>,
    sample: f64,
) -> Duration {
    let delay = unjittered_delay(config, retry_index, class);
    let sample = if sample.is_nan() { 0.0 } else { sample.clamp(0.0, 1.0) };
    let jitter = Duration::try_from_secs_f64(delay.as_secs_f64() * (config.effective_jitter() * sample))
        .unwrap_or(Duration::MAX);

    let mut total = delay.saturating_add(jitter);
    if let Some(hint) = retry_after {
        total = total.max(hint);
    }
    total.min(config.max_jittered_delay())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig::default()
    }

    #[test]
    fn test_exponential_growth() {
        let config = config();
        let expected = [1, 2, 4, 8, 16, 32];
        for (n, secs) in expected.iter().enumerate() {
            assert_eq!(
                unjittered_delay(&config, n as u32, ErrorClass::Retryable),
                Duration::from_secs(*secs)
            );
        }
    }

    #[test]
    fn test_clamped_to_max_delay() {
        let config = config();
        assert_eq!(
            unjittered_delay(&config, 6, ErrorClass::Retryable),
            Duration::from_secs(60)
        );
        assert_eq!(
            unjittered_delay(&config, u32::MAX, ErrorClass::Retryable),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_jitter_is_additive_and_bounded() {
        let config = config();
        for n in 0..10 {
            let floor = unjittered_delay(&config, n, ErrorClass::Retryable);
            for _ in 0..50 {
                let delay = calculate_delay(&config, n, ErrorClass::Retryable, None);
                assert!(delay >= floor);
                assert!(delay <= floor.mul_f64(1.1));
                assert!(delay <= config.max_jittered_delay());
            }
        }
    }

    #[test]
    fn test_sample_extremes() {
        let config = config();
        assert_eq!(
            calculate_delay_with_sample(&config, 1, ErrorClass::Retryable, None, 0.0),
            Duration::from_secs(2)
        );
        assert_eq!(
            calculate_delay_with_sample(&config, 1, ErrorClass::Retryable, None, 1.0),
            Duration::from_millis(2200)
        );
    }

    #[test]
    fn test_rate_limited_follows_default_formula() {
        let config = config();
        for n in 0..4 {
            assert_eq!(
                unjittered_delay(&config, n, ErrorClass::RateLimited),
                unjittered_delay(&config, n, ErrorClass::Retryable)
            );
        }
        assert_eq!(
            calculate_delay_with_sample(&config, 0, ErrorClass::RateLimited, None, 1.0),
            Duration::from_millis(1100)
        );
    }

    #[test]
    fn test_rate_limit_base_when_configured() {
        let config = config().with_rate_limit_base_delay(Duration::from_secs(5));
        assert_eq!(
            unjittered_delay(&config, 0, ErrorClass::RateLimited),
            Duration::from_secs(5)
        );
        assert_eq!(
            unjittered_delay(&config, 1, ErrorClass::RateLimited),
            Duration::from_secs(10)
        );
        assert_eq!(
            unjittered_delay(&config, 0, ErrorClass::Retryable),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_unbounded_max_delay_does_not_overflow() {
        let config = config().with_max_delay(Duration::MAX);
        assert_eq!(
            calculate_delay_with_sample(&config, 0, ErrorClass::Retryable, None, 1.0),
            Duration::from_millis(1100)
        );
        assert_eq!(
            calculate_delay_with_sample(&config, u32::MAX, ErrorClass::Retryable, None, 1.0),
            Duration::MAX
        );
    }

    #[test]
    fn test_bad_factors_do_not_panic() {
        let negative_jitter = config().with_jitter_factor(-2.0);
        assert_eq!(
            calculate_delay_with_sample(&negative_jitter, 0, ErrorClass::Retryable, None, 0.9),
            Duration::from_secs(1)
        );

        let nan_jitter = config().with_jitter_factor(f64::NAN);
        assert_eq!(
            calculate_delay(&nan_jitter, 2, ErrorClass::Retryable, None),
            Duration::from_secs(4)
        );

        let negative_growth = config().with_exponential_base(-2.0);
        assert_eq!(
            unjittered_delay(&negative_growth, 1, ErrorClass::Retryable),
            Duration::ZERO
        );
    }

    #[test]
    fn test_retry_after_hint() {
        let config = config();
        let hinted = calculate_delay_with_sample(
            &config,
            0,
            ErrorClass::RateLimited,
            Some(Duration::from_secs(30)),
            0.0,
        );
        assert_eq!(hinted, Duration::from_secs(30));

        let capped = calculate_delay_with_sample(
            &config,
            0,
            ErrorClass::RateLimited,
            Some(Duration::from_secs(600)),
            0.0,
        );
        assert_eq!(capped, Duration::from_secs(66));
    }
}
