//! Unit scopes.
//!
//! - [`Scope::Singleton`]: one instance per context for its whole lifetime
//! - [`Scope::Prototype`]: a new instance on every request
use std::fmt;

use serde::{Deserialize, Serialize};

/// Defines how many instances of a unit a context hands out.
///
/// # Examples
/// ```
/// use hayat_context::scope::Scope;
///
/// assert!(Scope::Singleton.is_singleton());
/// assert!(!Scope::Prototype.is_singleton());
/// assert_eq!(Scope::default(), Scope::Prototype);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scope {
    /// One instance shared by every consumer of the context.
    ///
    /// Created on first resolve (or eagerly by `start()`), cached in the
    /// singleton registry and destroyed by `stop()`.
    Singleton,

    /// New instance created on every resolve call.
    ///
    /// Never cached and never destroyed by the context; callers use
    /// `destroy_unit` explicitly if the unit declares destruction hooks.
    #[default]
    Prototype,
}

impl Scope {
    /// Returns `true` if instances of this scope are cached.
    #[inline]
    pub fn is_singleton(&self) -> bool {
        matches!(self, Scope::Singleton)
    }
}

impl From<bool> for Scope {
    fn from(is_singleton: bool) -> Self {
        if is_singleton { Scope::Singleton } else { Scope::Prototype }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => write!(f, "Singleton"),
            Scope::Prototype => write!(f, "Prototype"),
        }
    }
}
