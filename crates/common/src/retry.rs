//! Retry utilities.
//!
//! This module provides utilities for retrying operations with exponential backoff.
//! `max_attempts` is the total attempt budget: the operation runs at most that
//! many times, and the attempt number (1-based) is handed to each invocation.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first (values below 1 behave as 1)
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 for doubling)
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    /// Set the maximum delay between retries.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// A single attempt, never retried.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Exponential backoff starting at 100ms.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    fn budget(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Exponential backoff calculator.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
    current_attempt: u32,
}

impl ExponentialBackoff {
    /// Create a calculator positioned at the first attempt.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            current_attempt: 1,
        }
    }

    /// 1-based number of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Delay to wait before the current attempt.
    pub fn delay(&self) -> Duration {
        if self.current_attempt <= 1 {
            return Duration::ZERO;
        }

        let delay_ms = self.config.initial_delay.as_millis() as f64
            * self
                .config
                .backoff_multiplier
                .powi((self.current_attempt - 2) as i32);

        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.config.max_delay)
    }

    /// Move to the next attempt.
    pub fn next_attempt(&mut self) {
        self.current_attempt += 1;
    }

    /// Whether the current attempt is within the budget.
    pub fn has_attempts_remaining(&self) -> bool {
        self.current_attempt <= self.config.budget()
    }

    /// Reset the backoff state.
    pub fn reset(&mut self) {
        self.current_attempt = 1;
    }
}

/// Retry an async operation with exponential backoff.
///
/// # Examples
///
/// ```no_run
/// use llm_leaderboard_common::retry::{retry_with_backoff, RetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = RetryConfig::exponential(3);
///
///     let result = retry_with_backoff(config, |_attempt| async {
///         Ok::<_, std::io::Error>(())
///     }).await;
/// }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(config: RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_predicate(config, operation, |_| true).await
}

/// Retry an async operation while `should_retry` accepts the error.
///
/// The last error is returned unchanged once the budget is exhausted or the
/// predicate rejects an error.
///
/// # Examples
///
/// ```no_run
/// use llm_leaderboard_common::retry::{retry_with_predicate, RetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = RetryConfig::exponential(3);
///
///     let result = retry_with_predicate(
///         config,
///         |_attempt| async {
///             Err::<(), _>(std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout"))
///         },
///         |err| err.kind() == std::io::ErrorKind::TimedOut
///     ).await;
/// }
/// ```
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    config: RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut backoff = ExponentialBackoff::new(config);

    loop {
        match operation(backoff.attempt()).await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !should_retry(&error) {
                    return Err(error);
                }

                backoff.next_attempt();

                if !backoff.has_attempts_remaining() {
                    return Err(error);
                }

                let delay = backoff.delay();
                tracing::warn!(
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "Retrying operation after retryable error"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig::exponential(3);
        let mut backoff = ExponentialBackoff::new(config);

        // First attempt has no delay
        assert_eq!(backoff.delay(), Duration::ZERO);
        assert!(backoff.has_attempts_remaining());

        backoff.next_attempt();
        assert_eq!(backoff.delay(), Duration::from_millis(100));
        assert!(backoff.has_attempts_remaining());

        backoff.next_attempt();
        assert_eq!(backoff.delay(), Duration::from_millis(200));
        assert!(backoff.has_attempts_remaining());

        // Budget of three spent
        backoff.next_attempt();
        assert!(!backoff.has_attempts_remaining());
    }

    #[test]
    fn test_exponential_backoff_max_delay() {
        let config = RetryConfig::exponential(10).with_max_delay(Duration::from_millis(500));
        let mut backoff = ExponentialBackoff::new(config);

        for _ in 0..10 {
            backoff.next_attempt();
        }

        assert!(backoff.delay() <= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_eventual_success_passes_attempt_number() {
        let config = RetryConfig::exponential(3);
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();

        let result = retry_with_backoff(config, |attempt| {
            let seen = seen_clone.clone();
            async move {
                seen.store(attempt, Ordering::SeqCst);
                if attempt < 3 {
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "error"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_is_total_attempts() {
        let config = RetryConfig::exponential(2);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(config, |_| {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(std::io::Error::new(std::io::ErrorKind::Other, "error"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_with_predicate_stops_on_permanent_error() {
        let config = RetryConfig::exponential(3);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_predicate(
            config,
            |_| {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "error",
                    ))
                }
            },
            |err| err.kind() == std::io::ErrorKind::TimedOut,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    proptest::proptest! {
        #[test]
        fn prop_backoff_is_monotonic_and_capped(
            initial_ms in 1u64..5_000,
            max_ms in 1u64..60_000,
            multiplier in 1.0f64..4.0,
            attempts in 1u32..20,
        ) {
            let config = RetryConfig::new(attempts, Duration::from_millis(initial_ms))
                .with_max_delay(Duration::from_millis(max_ms))
                .with_backoff_multiplier(multiplier);
            let mut backoff = ExponentialBackoff::new(config);
            let mut previous = Duration::ZERO;

            for _ in 0..attempts {
                let delay = backoff.delay();
                proptest::prop_assert!(delay >= previous);
                proptest::prop_assert!(delay <= Duration::from_millis(max_ms));
                previous = delay;
                backoff.next_attempt();
            }
        }
    }
}
