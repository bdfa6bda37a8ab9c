//! Retry logic with exponential backoff and jitter

use crate::config::Config;
use crate::error::Result;
use std::time::Duration;
use tokio::time::sleep;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter: 0.25,
        }
    }
}

impl From<&Config> for RetryConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.retry_delay_ms,
            ..Default::default()
        }
    }
}

/// Execute an async storage operation, retrying transient failures.
///
/// Permanent errors are returned immediately; transient ones are retried
/// up to `max_retries` times before the last error is returned.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let delay = calculate_delay(config, attempt);
                attempt += 1;
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Store request failed, retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

/// Calculate delay with exponential backoff and jitter
fn calculate_delay(config: &RetryConfig, attempt: u32) -> Duration {
    // Exponential backoff: base * 2^attempt
    let exponential = config.base_delay_ms.saturating_mul(1u64 << attempt.min(32));
    let capped = std::cmp::min(exponential, config.max_delay_ms);

    let jitter_range = (capped as f64 * config.jitter) as u64;
    let jitter = if jitter_range > 0 {
        rand_jitter(jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped.saturating_add(jitter))
}

/// Cheap jitter from the clock's nanoseconds
fn rand_jitter(max: u64) -> u64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    nanos % max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter: 0.0, // No jitter for testing
            ..Default::default()
        };

        assert_eq!(calculate_delay(&config, 0), Duration::from_millis(1000));
        assert_eq!(calculate_delay(&config, 1), Duration::from_millis(2000));
        assert_eq!(calculate_delay(&config, 2), Duration::from_millis(4000));
        assert_eq!(calculate_delay(&config, 5), Duration::from_millis(30000)); // Capped
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 10,
            ..Default::default()
        };

        let result = with_retry(&config, || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Azure {
                    message: "connection reset by peer".to_string(),
                })
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 10,
            ..Default::default()
        };

        let result: Result<()> = with_retry(&config, || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::io(
                "reading range",
                std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"),
            ))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let result: Result<()> = with_retry(&RetryConfig::default(), || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::MissingRange { offset: 0 })
        })
        .await;

        assert!(matches!(result, Err(Error::MissingRange { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
