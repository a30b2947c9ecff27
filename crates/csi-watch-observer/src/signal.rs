//! Single-shot stop signal
//!
//! Delivery stores a permit when nobody is waiting, so the sender never blocks
//! and the value stays pending until a poller or test consumes it.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// At-most-once, buffered notification
#[derive(Debug, Default)]
pub struct CompletionSignal {
    notify: Notify,
    fired: AtomicBool,
}

impl CompletionSignal {
    /// Create an undelivered signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver the signal. Returns false if it was already delivered.
    pub fn notify(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.notify.notify_one();
        true
    }

    /// Whether the signal has been delivered (consumed or not)
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Wait for delivery, consuming the pending value
    pub async fn recv(&self) {
        self.notify.notified().await;
    }
}
