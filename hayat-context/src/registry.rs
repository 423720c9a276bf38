//! Unit definition registry: every definition known to one context.
//!
//! Definitions are kept in registration order. Registering a key twice
//! replaces the earlier definition in place; it never merges.

use std::collections::HashMap;

use hayat_support::rendering::suggest_similar;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::definition::UnitDefinition;
use crate::error::{HayatError, NoSuchUnitDefinitionError, Result};
use crate::key::UnitKey;

const MAX_SUGGESTIONS: usize = 3;

#[derive(Debug, Default)]
struct Entries {
    definitions: HashMap<UnitKey, UnitDefinition>,
    order: Vec<UnitKey>,
}

/// Stores all unit definitions of a context.
///
/// Uses interior locking so registry post processors can edit it through
/// a shared reference. No lock is held across an `.await`: lookups hand
/// out clones.
#[derive(Debug, Default)]
pub struct UnitDefinitionRegistry {
    entries: RwLock<Entries>,
}

impl UnitDefinitionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition` under its key, replacing any prior one.
    pub fn register_unit_definition(&self, definition: UnitDefinition) {
        let key = definition.key();
        let mut entries = self.entries.write();

        let replaced = entries.definitions.insert(key, definition).is_some();
        if replaced {
            debug!(key = %key, "Replaced unit definition");
        } else {
            entries.order.push(key);
            debug!(key = %key, "Registered unit definition");
        }
    }

    /// Looks up the definition for `key`.
    ///
    /// # Errors
    /// [`HayatError::NoSuchUnitDefinition`] if nothing is registered under `key`.
    pub fn get_unit_definition(&self, key: &UnitKey) -> Result<UnitDefinition> {
        self.find(key).ok_or_else(|| {
            HayatError::NoSuchUnitDefinition(NoSuchUnitDefinitionError {
                requested: *key,
                required_by: None,
                suggestions: self.suggestions(key),
            })
        })
    }

    /// Looks up the definition for `key` without failing.
    pub fn find(&self, key: &UnitKey) -> Option<UnitDefinition> {
        let found = self.entries.read().definitions.get(key).cloned();
        trace!(key = %key, found = found.is_some(), "Definition lookup");
        found
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.entries.read().definitions.contains_key(key)
    }

    /// Removes and returns the definition for `key`.
    pub fn remove_unit_definition(&self, key: &UnitKey) -> Option<UnitDefinition> {
        let mut entries = self.entries.write();
        let removed = entries.definitions.remove(key);
        if removed.is_some() {
            entries.order.retain(|k| k != key);
            debug!(key = %key, "Removed unit definition");
        }
        removed
    }

    /// Snapshot of `(key, definition)` pairs in registration order.
    pub fn unit_definitions(&self) -> Vec<(UnitKey, UnitDefinition)> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|key| entries.definitions.get(key).map(|d| (*key, d.clone())))
            .collect()
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> Vec<UnitKey> {
        self.entries.read().order.clone()
    }

    /// Returns the number of registered definitions.
    pub fn len(&self) -> usize {
        self.entries.read().definitions.len()
    }

    /// Returns true if no definitions are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().definitions.is_empty()
    }

    /// Registered type names similar to `key`'s, for "did you mean?" hints.
    pub(crate) fn suggestions(&self, key: &UnitKey) -> Vec<String> {
        let entries = self.entries.read();
        let available: Vec<&str> = entries
            .order
            .iter()
            .filter(|k| *k != key)
            .map(|k| k.type_name())
            .collect();
        suggest_similar(key.type_name(), &available, MAX_SUGGESTIONS)
    }
}
