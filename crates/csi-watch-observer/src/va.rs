//! VolumeAttachment observer
//!
//! Polls VolumeAttachments, correlates them with the runner's tracked
//! persistent volumes, records attach/detach events and counts the runner's
//! latch down once the population reaches a terminal condition:
//!
//! - steady run: every tracked volume is ready for `settle_polls` polls; the
//!   outcome is `Diverged` rather than `Settled` if volumes were lost on the way
//! - clean run: attached and deleted counts diverge, or every attached volume
//!   has been deleted

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use k8s_openapi::api::storage::v1::VolumeAttachment;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use csi_watch_common::retry::Backoff;

use crate::client::{is_attached, is_deleting, pv_name, VaClient};
use crate::config::{CompletionPolicy, ObserverConfig};
use crate::observer::{Observer, WatchOutcome};
use crate::predicate::{default_predicate, ReadinessPredicate, SharedPredicate};
use crate::runner::Runner;
use crate::signal::CompletionSignal;
use crate::store::{EntityStore, Event, EventKind};

/// Name reported by [`VaListObserver`]
pub const VA_OBSERVER_NAME: &str = "VolumeAttachmentObserver";

/// Per-watch bookkeeping, owned by the poll loop
#[derive(Debug, Default)]
struct AttachmentTracker {
    /// Ready flag per tracked volume, rebuilt every poll
    state: HashMap<String, bool>,
    /// Volumes judged ready at least once
    attached: HashSet<String>,
    /// Volumes seen deleting or gone
    deleted: HashSet<String>,
    /// Volumes that had an attachment in the previous poll
    present: HashSet<String>,
    ready_streak: u32,
}

impl AttachmentTracker {
    /// Fold one list result into the tracker; returns new lifecycle events
    fn observe(
        &mut self,
        items: &[VolumeAttachment],
        entities: &EntityStore,
        predicate: &dyn ReadinessPredicate,
    ) -> Vec<(EventKind, String)> {
        let mut present = HashSet::new();
        let mut deleting = HashSet::new();
        self.state.clear();

        for va in items {
            let Some(pv) = pv_name(va) else { continue };
            if !entities.contains(pv) {
                continue;
            }
            let ready = is_attached(va) && !is_deleting(va);
            self.state
                .entry(pv.to_string())
                .and_modify(|r| *r |= ready)
                .or_insert(ready);
            if is_deleting(va) {
                deleting.insert(pv.to_string());
            }
            present.insert(pv.to_string());
        }

        let mut events = Vec::new();
        let mut keys: Vec<&String> = present.iter().collect();
        keys.sort();
        for pv in keys {
            if predicate.is_ready(&self.state, pv) && self.attached.insert(pv.clone()) {
                events.push((EventKind::VaAdded, pv.clone()));
            }
            if deleting.contains(pv) && self.deleted.insert(pv.clone()) {
                events.push((EventKind::VaDeleted, pv.clone()));
            }
        }

        let mut gone: Vec<&String> = self.present.difference(&present).collect();
        gone.sort();
        for pv in gone {
            if self.deleted.insert(pv.clone()) {
                events.push((EventKind::VaDeleted, pv.clone()));
            }
        }

        self.present = present;
        events
    }

    /// Decide whether the watch is complete after the latest poll
    fn evaluate(
        &mut self,
        entities: &EntityStore,
        predicate: &dyn ReadinessPredicate,
        should_clean: bool,
        policy: &CompletionPolicy,
    ) -> Option<WatchOutcome> {
        let attached = self.attached.len();
        let deleted = self.deleted.len();

        if should_clean {
            if policy.diverged(attached, deleted) {
                return Some(WatchOutcome::Diverged { attached, deleted });
            }
            if attached > 0 && self.attached.is_subset(&self.deleted) {
                return Some(WatchOutcome::Drained { attached });
            }
            return None;
        }

        let all_ready = entities
            .names()
            .iter()
            .all(|name| predicate.is_ready(&self.state, name));
        if all_ready {
            self.ready_streak += 1;
        } else {
            self.ready_streak = 0;
        }

        if self.ready_streak < policy.settle_polls.max(1) {
            return None;
        }
        // A ready population that lost volumes along the way is not steady
        if policy.diverged(attached, deleted) {
            Some(WatchOutcome::Diverged { attached, deleted })
        } else {
            Some(WatchOutcome::Settled { attached, deleted })
        }
    }
}

/// Watches VolumeAttachments for the persistent volumes a runner tracks
pub struct VaListObserver {
    config: ObserverConfig,
    predicate: SharedPredicate,
    finished: OnceLock<CompletionSignal>,
    started: AtomicBool,
    released: AtomicBool,
}

impl Default for VaListObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl VaListObserver {
    /// Observer with default config and the map-lookup predicate
    pub fn new() -> Self {
        Self {
            config: ObserverConfig::default(),
            predicate: default_predicate(),
            finished: OnceLock::new(),
            started: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    /// Replace the poll, backoff and completion settings
    pub fn with_config(mut self, config: ObserverConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the readiness decision
    pub fn with_predicate(mut self, predicate: impl ReadinessPredicate + 'static) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    /// The stop signal, allocated on first use
    pub fn signal(&self) -> &CompletionSignal {
        self.finished.get_or_init(CompletionSignal::new)
    }

    /// Count the runner's latch down, at most once per instance
    fn release(&self, runner: &Runner) {
        if !self.released.swap(true, Ordering::AcqRel) {
            runner.latch().done();
        }
    }

    fn record(&self, runner: &Runner, events: Vec<(EventKind, String)>) {
        if events.is_empty() {
            return;
        }

        let events: Vec<Event> = events
            .into_iter()
            .filter_map(|(kind, pv)| {
                let entity = runner.entities.get(&pv)?;
                debug!(pv = %pv, ?kind, "VolumeAttachment event");
                Some(Event::new(kind, runner.test_case.id, entity.id))
            })
            .collect();

        if let Err(e) = runner.database.save_events(&events) {
            warn!(error = %e, count = events.len(), "failed to save VolumeAttachment events");
        }
    }

    async fn watch(
        &self,
        client: &dyn VaClient,
        cancel: &CancellationToken,
        runner: &Runner,
    ) -> WatchOutcome {
        let signal = self.signal();
        let mut tracker = AttachmentTracker::default();
        let mut backoff = Backoff::new(self.config.backoff.clone());
        let mut polls = 0u64;

        loop {
            let listed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return WatchOutcome::Cancelled,
                _ = signal.recv() => return WatchOutcome::Stopped,
                res = client.list() => res,
            };

            let delay = match listed {
                Ok(items) => {
                    backoff.reset();
                    polls += 1;

                    let events =
                        tracker.observe(&items, &runner.entities, self.predicate.as_ref());
                    self.record(runner, events);

                    if let Some(outcome) = tracker.evaluate(
                        &runner.entities,
                        self.predicate.as_ref(),
                        runner.should_clean,
                        &self.config.policy,
                    ) {
                        info!(polls, ?outcome, "VolumeAttachment watch complete");
                        return outcome;
                    }

                    debug!(
                        polls,
                        attached = tracker.attached.len(),
                        deleted = tracker.deleted.len(),
                        "VolumeAttachments not settled yet"
                    );
                    self.config.poll_interval
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        error = %e,
                        failures = backoff.failures(),
                        delay_ms = delay.as_millis(),
                        "failed to list VolumeAttachments, retrying"
                    );
                    delay
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return WatchOutcome::Cancelled,
                _ = signal.recv() => return WatchOutcome::Stopped,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[async_trait]
impl Observer for VaListObserver {
    async fn start_watching(
        &self,
        cancel: CancellationToken,
        runner: Arc<Runner>,
    ) -> WatchOutcome {
        let Some(client) = runner.clients.va_client.clone() else {
            warn!(observer = VA_OBSERVER_NAME, "no VolumeAttachment client, observer disabled");
            return WatchOutcome::Disabled;
        };

        if self.started.swap(true, Ordering::AcqRel) {
            warn!(observer = VA_OBSERVER_NAME, "observer already started");
            return WatchOutcome::AlreadyStarted;
        }

        info!(
            observer = VA_OBSERVER_NAME,
            namespace = %client.namespace(),
            tracked = runner.entities.len(),
            clean = runner.should_clean,
            "started watching"
        );

        let outcome = self.watch(client.as_ref(), &cancel, &runner).await;
        if outcome.released_latch() {
            self.release(&runner);
        }
        outcome
    }

    fn stop_watching(&self) {
        if self.signal().notify() {
            debug!(observer = VA_OBSERVER_NAME, "stop requested");
        }
    }

    fn name(&self) -> &'static str {
        VA_OBSERVER_NAME
    }

    fn make_channel(&self) {
        self.signal();
    }

    fn is_enabled(&self, runner: &Runner) -> bool {
        runner.clients.va_client.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use parking_lot::Mutex;

    use csi_watch_common::retry::RetryConfig;
    use csi_watch_common::Error;

    use super::*;
    use crate::client::fixtures::va;
    use crate::client::{Clients, MockVaClient};
    use crate::store::{MemoryStore, MockResultStore, TestCase, TrackedEntity};

    type Cluster = Arc<Mutex<Vec<VolumeAttachment>>>;

    fn fast_config(policy: CompletionPolicy) -> ObserverConfig {
        ObserverConfig {
            poll_interval: Duration::from_millis(5),
            backoff: RetryConfig {
                max_attempts: 0,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
            policy,
        }
    }

    fn cluster(items: Vec<VolumeAttachment>) -> Cluster {
        Arc::new(Mutex::new(items))
    }

    fn client_for(cluster: &Cluster) -> MockVaClient {
        let cluster = cluster.clone();
        let mut client = MockVaClient::new();
        client
            .expect_list()
            .returning(move || Ok(cluster.lock().clone()));
        client
            .expect_namespace()
            .returning(|| "test-namespace".to_string());
        client
    }

    fn runner_with(client: Option<MockVaClient>, clean: bool) -> (Arc<Runner>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clients = match client {
            Some(c) => Clients::with_va_client(Arc::new(c)),
            None => Clients::default(),
        };
        let runner = Runner::new(clients, store.clone(), TestCase::new(1, "va-test"))
            .with_clean(clean);
        runner
            .track("test-pv", TrackedEntity::new(10))
            .expect("track test-pv");
        runner
            .track("test-pv-2", TrackedEntity::new(20))
            .expect("track test-pv-2");
        runner.latch().add(1);
        (Arc::new(runner), store)
    }

    async fn run(observer: &VaListObserver, runner: &Arc<Runner>) -> WatchOutcome {
        tokio::time::timeout(
            Duration::from_secs(5),
            observer.start_watching(CancellationToken::new(), runner.clone()),
        )
        .await
        .expect("watch should finish")
    }

    #[tokio::test]
    async fn test_absent_client_is_noop() {
        let (runner, _) = runner_with(None, false);
        let observer = VaListObserver::new();
        observer.make_channel();

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            observer.start_watching(CancellationToken::new(), runner.clone()),
        )
        .await
        .expect("disabled observer must not block");

        assert_eq!(outcome, WatchOutcome::Disabled);
        assert!(!observer.is_enabled(&runner));
        assert_eq!(runner.latch().count(), 1);
    }

    #[tokio::test]
    async fn test_steady_run_settles_when_all_attached() {
        let cluster = cluster(vec![
            va("test-volume-attachment", "test-pv", true, false),
            va("test-volume-attachment-2", "test-pv-2", true, false),
        ]);
        let (runner, store) = runner_with(Some(client_for(&cluster)), false);
        let observer =
            VaListObserver::new().with_config(fast_config(CompletionPolicy::default()));

        let outcome = run(&observer, &runner).await;

        assert_eq!(
            outcome,
            WatchOutcome::Settled {
                attached: 2,
                deleted: 0
            }
        );
        assert_eq!(runner.latch().count(), 0);
        let added = store.events_of(EventKind::VaAdded);
        let mut ids: Vec<i64> = added.iter().map(|e| e.entity_id).collect();
        ids.sort();
        assert_eq!(ids, vec![10, 20]);
        assert!(added.iter().all(|e| e.test_case_id == 1));
    }

    #[tokio::test]
    async fn test_settle_polls_requires_consecutive_ready_polls() {
        let cluster = cluster(vec![
            va("va-1", "test-pv", true, false),
            va("va-2", "test-pv-2", true, false),
        ]);
        let (runner, _) = runner_with(Some(client_for(&cluster)), false);

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let observer = VaListObserver::new()
            .with_config(fast_config(CompletionPolicy {
                settle_polls: 3,
                divergence_threshold: 1,
            }))
            .with_predicate(move |state: &HashMap<String, bool>, key: &str| {
                counted.fetch_add(1, Ordering::SeqCst);
                state.get(key).copied().unwrap_or(false)
            });

        let outcome = run(&observer, &runner).await;

        assert!(matches!(outcome, WatchOutcome::Settled { .. }));
        // 2 attach checks + 2 readiness checks per poll, 3 polls
        assert_eq!(calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn test_unready_poll_resets_settle_streak() {
        let lists = Arc::new(AtomicUsize::new(0));
        let counted = lists.clone();
        let mut client = MockVaClient::new();
        client.expect_list().returning(move || {
            // third poll sees test-pv-2 detached, every other poll is ready
            let dip = counted.fetch_add(1, Ordering::SeqCst) == 2;
            Ok(vec![
                va("va-1", "test-pv", true, false),
                va("va-2", "test-pv-2", !dip, false),
            ])
        });
        client
            .expect_namespace()
            .returning(|| "test-namespace".to_string());

        let (runner, _) = runner_with(Some(client), false);
        let observer = VaListObserver::new().with_config(fast_config(CompletionPolicy {
            settle_polls: 3,
            divergence_threshold: 1,
        }));

        let outcome = run(&observer, &runner).await;

        assert_eq!(
            outcome,
            WatchOutcome::Settled {
                attached: 2,
                deleted: 0
            }
        );
        // two ready, one dip, then three uninterrupted ready polls
        assert_eq!(lists.load(Ordering::SeqCst), 6);
        assert_eq!(runner.latch().count(), 0);
    }

    #[tokio::test]
    async fn test_steady_run_reports_divergence_instead_of_settling() {
        // test-pv keeps one ready attachment while another is being deleted
        let cluster = cluster(vec![
            va("va-a1", "test-pv", true, false),
            va("va-a2", "test-pv", true, true),
            va("va-b", "test-pv-2", true, false),
        ]);
        let (runner, store) = runner_with(Some(client_for(&cluster)), false);
        let observer =
            VaListObserver::new().with_config(fast_config(CompletionPolicy::default()));

        let outcome = run(&observer, &runner).await;

        assert_eq!(
            outcome,
            WatchOutcome::Diverged {
                attached: 2,
                deleted: 1
            }
        );
        assert_eq!(runner.latch().count(), 0);
        let deleted = store.events_of(EventKind::VaDeleted);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].entity_id, 10);
    }

    #[tokio::test]
    async fn test_unready_volume_blocks_settling() {
        // test-pv-2 never gets an attachment
        let cluster = cluster(vec![va("va-1", "test-pv", true, false)]);
        let (runner, _) = runner_with(Some(client_for(&cluster)), false);
        let observer = Arc::new(
            VaListObserver::new().with_config(fast_config(CompletionPolicy::default())),
        );

        let handle = {
            let observer = observer.clone();
            let runner = runner.clone();
            tokio::spawn(async move {
                observer
                    .start_watching(CancellationToken::new(), runner)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!handle.is_finished());
        assert_eq!(runner.latch().count(), 1);

        observer.stop_watching();
        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stop should end the watch")
            .expect("watch task should not panic");
        assert_eq!(outcome, WatchOutcome::Stopped);
        assert_eq!(runner.latch().count(), 0);
    }

    #[tokio::test]
    async fn test_clean_run_diverges_when_attached_volume_deleted() {
        let cluster = cluster(vec![
            va("test-volume-attachment", "test-pv", false, true),
            va("test-volume-attachment-2", "test-pv-2", true, false),
        ]);
        let (runner, store) = runner_with(Some(client_for(&cluster)), true);

        // Remove the attached record after a few polls, like a teardown would
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let teardown = cluster.clone();
        let observer = VaListObserver::new()
            .with_config(fast_config(CompletionPolicy::default()))
            .with_predicate(move |state: &HashMap<String, bool>, key: &str| {
                if counted.fetch_add(1, Ordering::SeqCst) + 1 == 6 {
                    teardown
                        .lock()
                        .retain(|v| pv_name(v) != Some("test-pv-2"));
                }
                state.get(key).copied().unwrap_or(false)
            });

        let outcome = run(&observer, &runner).await;

        assert_eq!(
            outcome,
            WatchOutcome::Diverged {
                attached: 1,
                deleted: 2
            }
        );
        assert_eq!(runner.latch().count(), 0);
        assert_eq!(store.events_of(EventKind::VaAdded).len(), 1);
        assert_eq!(store.events_of(EventKind::VaDeleted).len(), 2);
    }

    #[tokio::test]
    async fn test_clean_run_drains_when_all_removed_together() {
        let cluster = cluster(vec![
            va("test-volume-attachment", "test-pv", true, false),
            va("test-volume-attachment-2", "test-pv-2", true, false),
        ]);
        let (runner, _) = runner_with(Some(client_for(&cluster)), true);
        let observer =
            VaListObserver::new().with_config(fast_config(CompletionPolicy::default()));

        let handle = {
            let runner = runner.clone();
            tokio::spawn(async move { run(&observer, &runner).await })
        };

        // Clean run with both attached does not complete until teardown
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());

        cluster.lock().clear();
        let outcome = handle.await.expect("watch task should not panic");
        assert_eq!(outcome, WatchOutcome::Drained { attached: 2 });
        assert_eq!(runner.latch().count(), 0);
    }

    #[tokio::test]
    async fn test_divergence_can_be_disabled() {
        let cluster = cluster(vec![
            va("va-1", "test-pv", true, false),
            va("va-2", "test-pv-2", true, false),
        ]);
        let (runner, _) = runner_with(Some(client_for(&cluster)), true);
        let observer = Arc::new(VaListObserver::new().with_config(fast_config(
            CompletionPolicy {
                settle_polls: 1,
                divergence_threshold: 0,
            },
        )));

        let handle = {
            let observer = observer.clone();
            let runner = runner.clone();
            tokio::spawn(async move { run(&observer, &runner).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        cluster.lock().retain(|v| pv_name(v) != Some("test-pv"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished(), "one of two deleted must not complete");

        cluster.lock().clear();
        let outcome = handle.await.expect("watch task should not panic");
        assert_eq!(outcome, WatchOutcome::Drained { attached: 2 });
    }

    #[tokio::test]
    async fn test_forced_predicate_drives_completion() {
        // Nothing is actually attached
        let cluster = cluster(vec![va("va-1", "test-pv", false, true)]);
        let (runner, _) = runner_with(Some(client_for(&cluster)), false);
        let observer = VaListObserver::new()
            .with_config(fast_config(CompletionPolicy::default()))
            .with_predicate(|_: &HashMap<String, bool>, _: &str| true);

        let outcome = run(&observer, &runner).await;

        assert!(matches!(outcome, WatchOutcome::Settled { .. }));
        assert_eq!(runner.latch().count(), 0);
    }

    #[tokio::test]
    async fn test_list_failures_are_retried() {
        let cluster = cluster(vec![
            va("va-1", "test-pv", true, false),
            va("va-2", "test-pv-2", true, false),
        ]);
        let items = cluster.clone();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = attempts.clone();

        let mut client = MockVaClient::new();
        client.expect_list().returning(move || {
            if counted.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::internal("apiserver unavailable"))
            } else {
                Ok(items.lock().clone())
            }
        });
        client
            .expect_namespace()
            .returning(|| "test-namespace".to_string());

        let (runner, _) = runner_with(Some(client), false);
        let observer =
            VaListObserver::new().with_config(fast_config(CompletionPolicy::default()));

        let outcome = run(&observer, &runner).await;

        assert!(matches!(outcome, WatchOutcome::Settled { .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_store_failures_do_not_stop_the_watch() {
        let cluster = cluster(vec![
            va("va-1", "test-pv", true, false),
            va("va-2", "test-pv-2", true, false),
        ]);
        let mut store = MockResultStore::new();
        store
            .expect_save_events()
            .returning(|_| Err(Error::store("save_events", "disk full")));

        let runner = Runner::new(
            Clients::with_va_client(Arc::new(client_for(&cluster))),
            Arc::new(store),
            TestCase::new(1, "va-test"),
        );
        runner
            .track("test-pv", TrackedEntity::new(10))
            .expect("track");
        runner
            .track("test-pv-2", TrackedEntity::new(20))
            .expect("track");
        runner.latch().add(1);
        let runner = Arc::new(runner);

        let observer =
            VaListObserver::new().with_config(fast_config(CompletionPolicy::default()));
        let outcome = run(&observer, &runner).await;

        assert!(matches!(outcome, WatchOutcome::Settled { .. }));
        assert_eq!(runner.latch().count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_latch_alone() {
        let cluster = cluster(Vec::new());
        let (runner, _) = runner_with(Some(client_for(&cluster)), false);
        let observer =
            VaListObserver::new().with_config(fast_config(CompletionPolicy::default()));
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            let runner = runner.clone();
            tokio::spawn(async move { observer.start_watching(cancel, runner).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancel should end the watch promptly")
            .expect("watch task should not panic");
        assert_eq!(outcome, WatchOutcome::Cancelled);
        assert_eq!(runner.latch().count(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_releases_once() {
        let cluster = cluster(Vec::new());
        let (runner, _) = runner_with(Some(client_for(&cluster)), false);
        runner.latch().add(1);
        let observer = VaListObserver::new();
        observer.make_channel();
        observer.stop_watching();

        assert_eq!(run(&observer, &runner).await, WatchOutcome::Stopped);
        assert_eq!(runner.latch().count(), 1);

        // single-use: a second start neither watches nor counts down again
        assert_eq!(run(&observer, &runner).await, WatchOutcome::AlreadyStarted);
        assert_eq!(runner.latch().count(), 1);
    }

    #[tokio::test]
    async fn test_stop_watching_without_poller() {
        let observer = VaListObserver::new();
        observer.stop_watching();

        tokio::time::timeout(Duration::from_secs(1), observer.signal().recv())
            .await
            .expect("stop value should be observable");
    }

    #[tokio::test]
    async fn test_make_channel_keeps_pending_stop() {
        let observer = VaListObserver::new();
        observer.make_channel();
        observer.stop_watching();
        observer.make_channel();

        assert!(observer.signal().is_fired());
        tokio::time::timeout(Duration::from_secs(1), observer.signal().recv())
            .await
            .expect("pending stop must survive make_channel");
    }

    #[test]
    fn test_name_is_stable() {
        let a = VaListObserver::new();
        let b = VaListObserver::default();
        assert_eq!(a.name(), "VolumeAttachmentObserver");
        assert_eq!(a.name(), a.name());
        assert_eq!(a.name(), b.name());
    }

    #[test]
    fn test_tracker_skips_untracked_and_unnamed() {
        let entities = EntityStore::new();
        entities
            .insert("test-pv", TrackedEntity::new(1))
            .expect("insert");
        let mut inline = va("inline", "ignored", true, false);
        inline.spec.source.persistent_volume_name = None;

        let mut tracker = AttachmentTracker::default();
        let events = tracker.observe(
            &[va("other", "other-pv", true, false), inline],
            &entities,
            &crate::predicate::MapLookup,
        );

        assert!(events.is_empty());
        assert!(tracker.state.is_empty());
    }

    #[test]
    fn test_tracker_detects_disappearance() {
        let entities = EntityStore::new();
        entities
            .insert("test-pv", TrackedEntity::new(1))
            .expect("insert");
        let predicate = crate::predicate::MapLookup;
        let mut tracker = AttachmentTracker::default();

        let first = tracker.observe(&[va("va", "test-pv", true, false)], &entities, &predicate);
        assert_eq!(first, vec![(EventKind::VaAdded, "test-pv".to_string())]);

        let second = tracker.observe(&[], &entities, &predicate);
        assert_eq!(second, vec![(EventKind::VaDeleted, "test-pv".to_string())]);

        // already counted; no duplicate event
        assert!(tracker.observe(&[], &entities, &predicate).is_empty());
        assert!(tracker.state.is_empty());
    }
}
