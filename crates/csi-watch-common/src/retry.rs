//! Retry utilities with capped exponential backoff and jitter.
//!
//! [`Backoff`] is the stepping state shared by [`retry_with_backoff`] and the
//! observer poll loops, which back off after failed list calls and reset once
//! a call succeeds.
//!
//! # Example
//!
//! ```ignore
//! use csi_watch_common::retry::{retry_with_backoff, RetryConfig};
//!
//! let pvs = retry_with_backoff(
//!     &RetryConfig::with_max_attempts(5),
//!     "list_persistent_volumes",
//!     || async { api.list(&Default::default()).await },
//! ).await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Create a config that retries forever
    pub fn infinite() -> Self {
        Self::default()
    }

    /// Whether `attempt` (1-based) is the last one allowed
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Exponential backoff state.
///
/// Each call to [`Backoff::next_delay`] returns the current delay with jitter
/// applied and grows the base delay, capped at `max_delay`.
#[derive(Clone, Debug)]
pub struct Backoff {
    config: RetryConfig,
    current: Duration,
    failures: u32,
}

impl Backoff {
    /// Start a fresh backoff sequence
    pub fn new(config: RetryConfig) -> Self {
        Self {
            current: config.initial_delay,
            config,
            failures: 0,
        }
    }

    /// Number of consecutive failures recorded since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.failures += 1;

        // 0.5x to 1.5x of the base delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(self.current.as_secs_f64() * jitter)
            .min(self.config.max_delay);

        self.current = Duration::from_secs_f64(
            (self.current.as_secs_f64() * self.config.backoff_multiplier)
                .min(self.config.max_delay.as_secs_f64()),
        );

        jittered
    }

    /// Clear the failure streak after a successful attempt
    pub fn reset(&mut self) {
        self.current = self.config.initial_delay;
        self.failures = 0;
    }
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Retries until success, or until `max_attempts` is exhausted in which case
/// the last error is returned.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = Backoff::new(config.clone());

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let attempt = backoff.failures() + 1;
                if config.exhausted(attempt) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                let delay = backoff.next_delay();
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
