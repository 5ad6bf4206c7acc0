//! Retry policy shared by the request queue and the legacy batch processor

use crate::config::RetryConfig;
use crate::utils::errors::McpError;
use std::time::Duration;

/// Stateless retry policy injected into both dispatch paths
pub trait ErrorHandlingStrategy: Send + Sync {
    /// Whether `error` on attempt number `attempt` (1-based) may be retried
    fn should_retry(&self, error: &McpError, attempt: u32) -> bool;

    /// Delay before retry number `attempt` (1-based)
    fn retry_delay(&self, attempt: u32) -> Duration;

    /// Default retry budget for requests that do not set one
    fn max_retries(&self) -> u32;

    /// Default per-attempt timeout for requests that do not set one
    fn timeout(&self) -> Duration;
}

/// Exponential backoff: `base * 2^attempt`, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoffStrategy {
    pub max_retries: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ExponentialBackoffStrategy {
    pub fn new(retry: &RetryConfig, timeout: Duration) -> Self {
        Self {
            max_retries: retry.max_retries,
            timeout,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
        }
    }
}

impl Default for ExponentialBackoffStrategy {
    fn default() -> Self {
        Self::new(&RetryConfig::default(), Duration::from_secs(30))
    }
}

impl ErrorHandlingStrategy for ExponentialBackoffStrategy {
    fn should_retry(&self, error: &McpError, _attempt: u32) -> bool {
        error.is_retryable()
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::error_codes;

    fn strategy() -> ExponentialBackoffStrategy {
        ExponentialBackoffStrategy {
            max_retries: 3,
            timeout: Duration::from_secs(1),
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn test_delay_doubles_until_capped() {
        let s = strategy();
        assert_eq!(s.retry_delay(1), Duration::from_millis(200));
        assert_eq!(s.retry_delay(2), Duration::from_millis(400));
        assert_eq!(s.retry_delay(3), Duration::from_millis(800));
        assert_eq!(s.retry_delay(4), Duration::from_millis(1000));
        assert_eq!(s.retry_delay(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_is_non_decreasing() {
        let s = strategy();
        let delays: Vec<Duration> = (0..64).map(|n| s.retry_delay(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= s.max_delay));
    }

    #[test]
    fn test_should_retry_follows_error_class() {
        let s = strategy();
        assert!(s.should_retry(&McpError::Timeout(1000), 1));
        assert!(s.should_retry(&McpError::protocol(error_codes::INTERNAL_ERROR, "x"), 1));
        assert!(!s.should_retry(&McpError::protocol(error_codes::INVALID_PARAMS, "x"), 1));
        assert!(!s.should_retry(&McpError::ToolNotFound("echo".into()), 1));
    }

    #[test]
    fn test_from_retry_config() {
        let s = ExponentialBackoffStrategy::new(&RetryConfig::default(), Duration::from_secs(5));
        assert_eq!(s.max_retries(), 3);
        assert_eq!(s.timeout(), Duration::from_secs(5));
        assert_eq!(s.base_delay, Duration::from_secs(1));
    }
}
