//! Tracked entities, test cases and the result store observers report into

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use csi_watch_common::{Error, Result};

use crate::observer::WatchOutcome;

/// A subject of the test run, keyed by persistent volume name in [`EntityStore`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TrackedEntity {
    /// Result-store id of the entity
    pub id: i64,
    /// Claim that bound the volume, when known
    pub claim: Option<String>,
}

impl TrackedEntity {
    /// Entity with the given store id
    pub fn new(id: i64) -> Self {
        Self { id, claim: None }
    }

    /// Attach the name of the claim that owns the volume
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claim = Some(claim.into());
        self
    }
}

/// Concurrent map of tracked entities shared by every observer of a run.
///
/// Entries are inserted once, before observers start, and never replaced.
#[derive(Clone, Debug, Default)]
pub struct EntityStore {
    inner: Arc<DashMap<String, TrackedEntity>>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new entity; rejects a key that is already tracked
    pub fn insert(&self, name: impl Into<String>, entity: TrackedEntity) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        let name = name.into();
        match self.inner.entry(name) {
            Entry::Occupied(e) => Err(Error::validation_for(
                e.key().clone(),
                "entity is already tracked",
            )),
            Entry::Vacant(e) => {
                e.insert(entity);
                Ok(())
            }
        }
    }

    /// Look up an entity by name
    pub fn get(&self, name: &str) -> Option<TrackedEntity> {
        self.inner.get(name).map(|e| e.value().clone())
    }

    /// Whether `name` is tracked
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Names of all tracked entities
    pub fn names(&self) -> Vec<String> {
        self.inner.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of tracked entities
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Test case the run belongs to; used to correlate events and log lines
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// Store id of the test case
    pub id: i64,
    /// Human-readable name
    pub name: String,
}

impl TestCase {
    /// Create a test case
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Kind of attachment lifecycle event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Volume observed attached for the first time
    VaAdded,
    /// Attachment observed deleting or gone
    VaDeleted,
}

impl EventKind {
    fn slug(self) -> &'static str {
        match self {
            EventKind::VaAdded => "va-added",
            EventKind::VaDeleted => "va-deleted",
        }
    }
}

/// A recorded attachment lifecycle event
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    /// Unique event name
    pub name: String,
    /// Test case the event belongs to
    pub test_case_id: i64,
    /// Entity the event concerns
    pub entity_id: i64,
    /// What happened
    pub kind: EventKind,
    /// When the observer saw it
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// New event stamped with the current time and a unique name
    pub fn new(kind: EventKind, test_case_id: i64, entity_id: i64) -> Self {
        Self {
            name: format!("event-{}-{}", kind.slug(), uuid::Uuid::new_v4()),
            test_case_id,
            entity_id,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one observer, attributed by name
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObserverRecord {
    /// Test case the observer ran for
    pub test_case_id: i64,
    /// Observer name as returned by `Observer::name`
    pub observer: String,
    /// How the observer finished
    pub outcome: WatchOutcome,
}

/// Sink for test results
#[cfg_attr(test, automock)]
pub trait ResultStore: Send + Sync {
    /// Persist attachment events
    fn save_events(&self, events: &[Event]) -> Result<()>;

    /// Persist how an observer finished
    fn save_outcome(&self, test_case_id: i64, observer: &str, outcome: &WatchOutcome)
        -> Result<()>;
}

/// In-memory result store
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: Mutex<Vec<Event>>,
    outcomes: Mutex<Vec<ObserverRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Recorded events of one kind
    pub fn events_of(&self, kind: EventKind) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Snapshot of recorded observer outcomes
    pub fn outcomes(&self) -> Vec<ObserverRecord> {
        self.outcomes.lock().clone()
    }
}

impl ResultStore for MemoryStore {
    fn save_events(&self, events: &[Event]) -> Result<()> {
        self.events.lock().extend_from_slice(events);
        Ok(())
    }

    fn save_outcome(
        &self,
        test_case_id: i64,
        observer: &str,
        outcome: &WatchOutcome,
    ) -> Result<()> {
        self.outcomes.lock().push(ObserverRecord {
            test_case_id,
            observer: observer.to_string(),
            outcome: outcome.clone(),
        });
        Ok(())
    }
}
