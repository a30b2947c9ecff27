//! Test runner state shared with observers
//!
//! A [`Runner`] owns the tracked entities, the countdown latch, the result
//! store and the client bundle for one test run. Observers receive it as
//! `Arc<Runner>` and only read from it, apart from counting the latch down.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use csi_watch_common::{Error, Result};

use crate::client::Clients;
use crate::latch::CountdownLatch;
use crate::observer::{Observer, WatchOutcome};
use crate::store::{EntityStore, ResultStore, TestCase, TrackedEntity};

/// How one observer finished within [`Runner::run_observers`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObserverReport {
    /// Observer name
    pub observer: &'static str,
    /// Outcome returned by the observer
    pub outcome: WatchOutcome,
}

/// State of one test run
pub struct Runner {
    /// Client handles; a missing handle disables the matching observer
    pub clients: Clients,
    /// Where events and outcomes are recorded
    pub database: Arc<dyn ResultStore>,
    /// Entities under test, keyed by persistent volume name
    pub entities: EntityStore,
    /// Whether this run tears volumes down
    pub should_clean: bool,
    /// Test case the run belongs to
    pub test_case: TestCase,
    latch: CountdownLatch,
}

impl Runner {
    /// Create a steady (non-clean) runner with no tracked entities
    pub fn new(clients: Clients, database: Arc<dyn ResultStore>, test_case: TestCase) -> Self {
        Self {
            clients,
            database,
            entities: EntityStore::new(),
            should_clean: false,
            test_case,
            latch: CountdownLatch::new(),
        }
    }

    /// Set whether this run tears volumes down
    pub fn with_clean(mut self, should_clean: bool) -> Self {
        self.should_clean = should_clean;
        self
    }

    /// Track an entity; must happen before observers start
    pub fn track(&self, name: impl Into<String>, entity: TrackedEntity) -> Result<()> {
        self.entities.insert(name, entity)
    }

    /// Latch counted down by observers
    pub fn latch(&self) -> &CountdownLatch {
        &self.latch
    }

    /// Start every observer as its own task and wait for the enabled ones.
    ///
    /// Enabled observers each add one latch count before they are spawned.
    /// Disabled observers still run (and return at once) but are not waited
    /// on. If the latch is not released within `timeout`, every observer is
    /// cancelled and [`Error::Timeout`] is returned. A panicking observer gives
    /// its latch count back and is reported as [`WatchOutcome::Panicked`].
    /// Every outcome is recorded in the result store, in observer order.
    pub async fn run_observers(
        self: &Arc<Self>,
        observers: Vec<Arc<dyn Observer>>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> Result<Vec<ObserverReport>> {
        let run = cancel.child_token();
        let mut handles = Vec::with_capacity(observers.len());

        for observer in observers {
            observer.make_channel();
            let name = observer.name();
            let enabled = observer.is_enabled(self);
            if enabled {
                self.latch.add(1);
            } else {
                info!(observer = name, "observer disabled, not waiting for it");
            }

            let runner = Arc::clone(self);
            let token = run.child_token();
            let span = info_span!(
                "observer",
                observer = name,
                test_case = %self.test_case.name,
                test_case_id = self.test_case.id
            );
            let watch = tokio::spawn(
                async move { observer.start_watching(token, runner).await }.instrument(span),
            );

            // Supervises the watch so a panic cannot hold the latch until the timeout
            let runner = Arc::clone(self);
            let handle = tokio::spawn(async move {
                let joined = watch.await;
                if joined.is_err() && enabled {
                    runner.latch().done();
                }
                joined
            });
            handles.push((name, handle));
        }

        let timed_out = tokio::select! {
            _ = self.latch.wait() => false,
            _ = run.cancelled() => false,
            _ = tokio::time::sleep(timeout) => true,
        };

        if timed_out {
            warn!(
                outstanding = self.latch.count(),
                timeout_secs = timeout.as_secs(),
                "observers did not complete in time, cancelling"
            );
        }
        // Anything still running (disabled, cancelled or timed out) gets cancelled
        run.cancel();

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) | Err(e) => {
                    error!(observer = name, error = %e, "observer task failed");
                    WatchOutcome::Panicked {
                        message: e.to_string(),
                    }
                }
            };
            if let Err(e) = self
                .database
                .save_outcome(self.test_case.id, name, &outcome)
            {
                warn!(observer = name, error = %e, "failed to save observer outcome");
            }
            reports.push(ObserverReport {
                observer: name,
                outcome,
            });
        }

        if timed_out {
            return Err(Error::timeout("observers to complete", timeout));
        }
        Ok(reports)
    }
}
