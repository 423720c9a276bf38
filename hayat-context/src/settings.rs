//! Context settings.
//!
//! Loadable from any serde format; every field has a default.

use serde::{Deserialize, Serialize};

/// In which order `stop()` destroys cached singletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructionOrder {
    /// Definition registration order. A dependency may be destroyed
    /// before the units that use it.
    #[default]
    Registration,
    /// Reverse definition registration order.
    ReverseRegistration,
    /// Dependents first, then their dependencies, following declared
    /// constructor and hook parameters.
    ReverseDependency,
}

/// Tunables for one context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Shown in logs and `Debug` output.
    pub name: Option<String>,
    pub destruction_order: DestructionOrder,
}

impl ContextSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    pub fn with_destruction_order(mut self, order: DestructionOrder) -> Self {
        self.destruction_order = order;
        self
    }
}
