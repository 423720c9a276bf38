//! Error types for Hayat context operations.
//!
//! Every failure surfaces to the caller of the operation that triggered
//! it. The context never retries and never rolls back: singletons built
//! before a failure stay cached.

use std::fmt;

use hayat_support::rendering::render_chain;

use crate::key::UnitKey;
use crate::lifecycle::LifecycleState;

/// Boxed error produced by user constructors, factories and hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for all Hayat operations.
#[derive(Debug, thiserror::Error)]
pub enum HayatError {
    /// No definition for the requested unit, locally or in any parent.
    #[error("{}", .0)]
    NoSuchUnitDefinition(NoSuchUnitDefinitionError),

    /// Operation not allowed in the context's current lifecycle state.
    #[error("{}", .0)]
    InvalidState(InvalidStateError),

    /// A hook parameter has no type to resolve.
    #[error("{}", .0)]
    UnitResolution(UnitResolutionError),

    /// A unit (transitively) depends on itself.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A constructor, factory, hook or post processor returned an error.
    #[error("Failed to construct {key}: {source}")]
    ConstructionFailed {
        key: UnitKey,
        #[source]
        source: BoxError,
    },

    /// A unit was found but is not of the requested type.
    #[error("Type mismatch for {key}: expected {expected}")]
    TypeMismatch { key: UnitKey, expected: &'static str },
}

impl HayatError {
    /// Wraps a user error raised while building or processing `key`.
    pub fn construction_failed(key: UnitKey, source: impl Into<BoxError>) -> Self {
        HayatError::ConstructionFailed { key, source: source.into() }
    }

    /// Returns `true` for [`HayatError::NoSuchUnitDefinition`].
    pub fn is_no_such_unit_definition(&self) -> bool {
        matches!(self, HayatError::NoSuchUnitDefinition(_))
    }

    /// Returns `true` for [`HayatError::InvalidState`].
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, HayatError::InvalidState(_))
    }
}

/// Error when a unit has no definition.
///
/// Includes hints about what went wrong.
#[derive(Debug)]
pub struct NoSuchUnitDefinitionError {
    /// The unit that was requested
    pub requested: UnitKey,
    /// The unit whose construction needed it (if any)
    pub required_by: Option<UnitKey>,
    /// Registered type names close to the requested one
    pub suggestions: Vec<String>,
}

impl fmt::Display for NoSuchUnitDefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No unit definition for {}", self.requested)?;

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Did you forget to scan {}?",
            self.requested.short_name()
        )
    }
}

/// Error when an operation is called in the wrong lifecycle state.
#[derive(Debug)]
pub struct InvalidStateError {
    /// The rejected operation (`"scan"`, `"get_unit"`, ...)
    pub operation: &'static str,
    /// State the context was in
    pub current: LifecycleState,
    /// State the operation requires
    pub expected: LifecycleState,
}

impl fmt::Display for InvalidStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot call {}() while the context is {} (requires {})",
            self.operation, self.current, self.expected,
        )
    }
}

/// Error when a hook parameter's type is not known.
#[derive(Debug)]
pub struct UnitResolutionError {
    /// The unit owning the hook
    pub unit: UnitKey,
    /// Hook being invoked (`"post_construct"`, `"init"`, ...)
    pub hook: String,
    /// Position of the parameter
    pub index: usize,
    /// Declared parameter name, if any
    pub parameter: Option<&'static str>,
}

impl fmt::Display for UnitResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cannot resolve parameter #{} of {}::{}: parameter type is not defined",
            self.index,
            self.unit.short_name(),
            self.hook,
        )?;
        if let Some(name) = self.parameter {
            write!(f, " (parameter `{name}`)")?;
        }
        Ok(())
    }
}

/// Error when a circular dependency is detected.
///
/// Shows the full chain so you can see where the cycle closes.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// Example: `[A, B, C, A]`
    pub chain: Vec<UnitKey>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.chain.iter().map(|k| k.short_name()).collect();
        write!(f, "Circular dependency detected:\n  {}", render_chain(&names))?;
        write!(
            f,
            "\n  Hint: Move the shared state into a separate unit, or resolve one side from a hook"
        )
    }
}

/// Convenient Result type for Hayat operations.
pub type Result<T> = std::result::Result<T, HayatError>;
