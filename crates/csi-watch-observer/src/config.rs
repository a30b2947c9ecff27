//! Observer configuration

use std::time::Duration;

use csi_watch_common::polling::DEFAULT_POLL_INTERVAL;
use csi_watch_common::retry::RetryConfig;

/// Thresholds that decide when a watch is complete
///
/// How many polls a steady run must hold, and how far attached and deleted
/// counts must drift apart before the population counts as diverged, depend
/// on the suite being run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionPolicy {
    /// Consecutive polls with every tracked entity ready before a steady run completes
    pub settle_polls: u32,
    /// Gap between attached and deleted counts that counts as divergence (0 disables)
    pub divergence_threshold: usize,
}

impl CompletionPolicy {
    /// Whether the attached and deleted counts have drifted apart
    pub fn diverged(&self, attached: usize, deleted: usize) -> bool {
        self.divergence_threshold > 0
            && deleted > 0
            && attached.abs_diff(deleted) >= self.divergence_threshold
    }
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            settle_polls: 1,
            divergence_threshold: 1,
        }
    }
}

/// Everything an observer needs besides the runner
///
/// The overall deadline is not part of this; the runner driving the observer
/// owns it.
#[derive(Clone, Debug, PartialEq)]
pub struct ObserverConfig {
    /// Interval between successful polls
    pub poll_interval: Duration,
    /// Backoff applied after failed polls
    pub backoff: RetryConfig,
    /// Completion thresholds
    pub policy: CompletionPolicy,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: RetryConfig::default(),
            policy: CompletionPolicy::default(),
        }
    }
}
