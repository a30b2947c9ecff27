//! Resource-state observers for CSI certification runs
//!
//! An observer polls the cluster for one class of objects, correlates them
//! with the volumes a [`Runner`] tracks, and counts the runner's
//! [`CountdownLatch`] down once the watched population reaches a terminal
//! condition.
//!
//! # Modules
//!
//! - [`observer`] - the [`Observer`] capability and [`WatchOutcome`]
//! - [`va`] - VolumeAttachment observer
//! - [`runner`] - run state shared with observers and the observer driver
//! - [`client`] - cluster client capability
//! - [`store`] - tracked entities, events and the result store
//! - [`latch`] / [`signal`] - completion primitives
//! - [`predicate`] - injectable readiness decision

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod latch;
pub mod observer;
pub mod predicate;
pub mod runner;
pub mod signal;
pub mod store;
pub mod va;

pub use client::{Clients, KubeVaClient, VaClient};
pub use config::{CompletionPolicy, ObserverConfig};
pub use latch::CountdownLatch;
pub use observer::{Observer, WatchOutcome};
pub use predicate::{MapLookup, ReadinessPredicate};
pub use runner::{ObserverReport, Runner};
pub use signal::CompletionSignal;
pub use store::{EntityStore, Event, EventKind, MemoryStore, ResultStore, TestCase, TrackedEntity};
pub use va::{VaListObserver, VA_OBSERVER_NAME};

#[cfg(test)]
pub use client::MockVaClient;
#[cfg(test)]
pub use store::MockResultStore;
