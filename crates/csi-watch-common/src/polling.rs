//! Resource polling cadence and a generic wait helper

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::Error;

/// Default interval between observer polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default upper bound for a whole watch
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Poll cadence and deadline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between poll attempts
    pub interval: Duration,
    /// Maximum time to wait
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_WATCH_TIMEOUT,
        }
    }
}

impl PollConfig {
    /// Create a poll config with the given interval and timeout
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll until `poll_fn` yields a value or the timeout expires.
///
/// `poll_fn` returns `Ok(Some(T))` when ready, `Ok(None)` to keep waiting and
/// `Err(_)` for a transient failure, which is logged and retried.
pub async fn wait_for_resource<T, E, F, Fut>(
    description: &str,
    config: &PollConfig,
    mut poll_fn: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();

    loop {
        match poll_fn().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Poll error for {}, retrying", description);
            }
        }

        if start.elapsed() >= config.timeout {
            return Err(Error::timeout(description, config.timeout));
        }

        tokio::time::sleep(config.interval).await;
    }
}
