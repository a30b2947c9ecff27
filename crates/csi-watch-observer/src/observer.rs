//! Observer capability interface
//!
//! An observer polls one class of cluster objects on behalf of a [`Runner`]
//! and tells it, through the runner's countdown latch, when the watched
//! population reached a terminal condition.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::runner::Runner;

/// How a call to [`Observer::start_watching`] ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WatchOutcome {
    /// Every tracked entity stayed ready for the configured number of polls
    Settled {
        /// Entities observed attached
        attached: usize,
        /// Entities observed deleted
        deleted: usize,
    },
    /// Clean run: attached and deleted counts drifted apart, teardown in progress
    Diverged {
        /// Entities observed attached
        attached: usize,
        /// Entities observed deleted
        deleted: usize,
    },
    /// Clean run: every attached entity was observed deleted
    Drained {
        /// Entities observed attached and then deleted
        attached: usize,
    },
    /// Stopped through [`Observer::stop_watching`]
    Stopped,
    /// The cancellation token fired; the latch was not touched
    Cancelled,
    /// The runner carries no client for this resource type; the latch was not touched
    Disabled,
    /// This instance was started before; observers are single-use
    AlreadyStarted,
    /// The observer task panicked; the runner released its latch count
    Panicked {
        /// Join error reported by the runtime
        message: String,
    },
}

impl WatchOutcome {
    /// Whether this outcome counted down the runner's latch
    pub fn released_latch(&self) -> bool {
        matches!(
            self,
            WatchOutcome::Settled { .. }
                | WatchOutcome::Diverged { .. }
                | WatchOutcome::Drained { .. }
                | WatchOutcome::Stopped
        )
    }
}

/// A watcher over one resource type
#[async_trait]
pub trait Observer: Send + Sync {
    /// Poll until complete, stopped or cancelled.
    ///
    /// Counts the runner's latch down exactly once on completion or stop.
    /// Returns [`WatchOutcome::Disabled`] without blocking when the runner has
    /// no client for this observer.
    async fn start_watching(&self, cancel: CancellationToken, runner: Arc<Runner>)
        -> WatchOutcome;

    /// Ask a running (or future) watch to stop; never blocks
    fn stop_watching(&self);

    /// Stable identifier used for logging and result attribution
    fn name(&self) -> &'static str;

    /// Allocate the stop channel if it does not exist yet
    fn make_channel(&self);

    /// Whether `runner` carries what this observer needs to run
    fn is_enabled(&self, runner: &Runner) -> bool;
}
