//! Countdown latch shared by the observers of one run
//!
//! Backed by a `tokio::sync::watch` channel holding the outstanding count, so
//! a waiter that subscribes after the count reached zero still returns
//! immediately and no wakeup can be lost.

use tokio::sync::watch;
use tracing::warn;

/// Blocks waiters until every registered party has called [`CountdownLatch::done`]
#[derive(Debug)]
pub struct CountdownLatch {
    count: watch::Sender<usize>,
}

impl Default for CountdownLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl CountdownLatch {
    /// Latch with nothing outstanding
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Register `n` more parties
    pub fn add(&self, n: usize) {
        self.count.send_modify(|c| *c += n);
    }

    /// Mark one party finished.
    ///
    /// Returns false, leaving the count at zero, if nothing was outstanding.
    pub fn done(&self) -> bool {
        let mut decremented = false;
        self.count.send_if_modified(|c| {
            if *c == 0 {
                return false;
            }
            *c -= 1;
            decremented = true;
            true
        });
        if !decremented {
            warn!("countdown latch done() called with nothing outstanding");
        }
        decremented
    }

    /// Number of parties still outstanding
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Wait until the count reaches zero
    pub async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|c| *c == 0).await;
    }
}
