//! Singleton registry: cache of already constructed singleton units.
//!
//! Pure storage: it never builds anything. The factory decides when an
//! entry is written.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::key::UnitKey;
use crate::unit::Unit;

#[derive(Default)]
struct Entries {
    singletons: HashMap<UnitKey, Unit>,
    order: Vec<UnitKey>,
}

/// Maps unit keys to their singleton instances, in registration order.
#[derive(Default)]
pub struct SingletonRegistry {
    entries: RwLock<Entries>,
}

impl SingletonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_singleton(&self, key: &UnitKey) -> bool {
        self.entries.read().singletons.contains_key(key)
    }

    /// Returns the cached instance, or `None`. Never fails.
    pub fn get_singleton(&self, key: &UnitKey) -> Option<Unit> {
        self.entries.read().singletons.get(key).cloned()
    }

    /// Caches `unit` under `key`. Last write wins.
    pub fn register_singleton(&self, key: UnitKey, unit: Unit) {
        let mut entries = self.entries.write();
        if entries.singletons.insert(key, unit).is_none() {
            entries.order.push(key);
        }
        debug!(key = %key, "Registered singleton");
    }

    pub fn singleton_count(&self) -> usize {
        self.entries.read().singletons.len()
    }

    /// Snapshot of cached singletons in registration order.
    pub fn registered_singletons(&self) -> Vec<(UnitKey, Unit)> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|key| entries.singletons.get(key).map(|u| (*key, u.clone())))
            .collect()
    }

    /// Drops every cached instance.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        debug!(count = entries.order.len(), "Clearing singletons");
        entries.singletons.clear();
        entries.order.clear();
    }
}

impl std::fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("singletons", &self.entries.read().order)
            .finish()
    }
}
