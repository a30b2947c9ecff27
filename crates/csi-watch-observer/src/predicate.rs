//! Readiness decision injected into observers
//!
//! Observers never read their state map directly to decide readiness; they ask
//! a [`ReadinessPredicate`]. Closures implement the trait, so tests can force
//! outcomes without touching the poll loop.

use std::collections::HashMap;
use std::sync::Arc;

/// Decides whether `key` is ready given an observer's state map
pub trait ReadinessPredicate: Send + Sync {
    /// Whether the entry for `key` counts as ready
    fn is_ready(&self, state: &HashMap<String, bool>, key: &str) -> bool;
}

impl<F> ReadinessPredicate for F
where
    F: Fn(&HashMap<String, bool>, &str) -> bool + Send + Sync,
{
    fn is_ready(&self, state: &HashMap<String, bool>, key: &str) -> bool {
        self(state, key)
    }
}

/// Reads the flag stored for the key; a missing key is not ready
#[derive(Clone, Copy, Debug, Default)]
pub struct MapLookup;

impl ReadinessPredicate for MapLookup {
    fn is_ready(&self, state: &HashMap<String, bool>, key: &str) -> bool {
        state.get(key).copied().unwrap_or(false)
    }
}

/// Shared predicate handle
pub type SharedPredicate = Arc<dyn ReadinessPredicate>;

/// The predicate observers use unless one is injected
pub fn default_predicate() -> SharedPredicate {
    Arc::new(MapLookup)
}
