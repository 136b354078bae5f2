//! Coordinator configuration.

use crate::types::TransactionMode;
use std::time::Duration;

/// Configuration for a transaction coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Time budget for one unit of work (`None` = unbounded).
    ///
    /// Exceeding it is handled like cancellation.
    pub timeout: Option<Duration>,

    /// Mode used by `run` when the caller does not pick one.
    pub default_mode: TransactionMode,

    /// Whether to log every executed operation at debug level.
    pub log_operations: bool,

    /// Retry policy for transaction functions.
    pub retry: RetryConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            default_mode: TransactionMode::Explicit,
            log_operations: false,
            retry: RetryConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds every unit of work by `timeout`.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Removes the time bound.
    #[must_use]
    pub const fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Sets the default mode.
    #[must_use]
    pub const fn default_mode(mut self, mode: TransactionMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Sets whether operations are logged.
    #[must_use]
    pub const fn log_operations(mut self, value: bool) -> Self {
        self.log_operations = value;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, value: bool) -> Self {
        self.add_jitter = value;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64()).max(0.0);

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand::random::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_config_builder() {
        let config = CoordinatorConfig::new()
            .timeout(Duration::from_secs(5))
            .default_mode(TransactionMode::Declarative)
            .log_operations(true)
            .retry(RetryConfig::no_retry());

        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.default_mode, TransactionMode::Declarative);
        assert!(config.log_operations);
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.no_timeout().timeout, None);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(RetryConfig::new(0).max_attempts, 1);
    }

    #[test]
    fn retry_config_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_config_max_delay_and_jitter() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(4);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_millis(6250));
    }

    #[test]
    fn retry_config_negative_multiplier_clamps_to_zero() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(-2.0)
            .with_jitter(true);

        assert_eq!(config.delay_for_attempt(2), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(4), Duration::ZERO);
        assert!(config.delay_for_attempt(3) <= Duration::from_millis(500));
    }
}
