//! The context lifecycle state machine.
//!
//! ```text
//! Pending ─initialize()─> Initializing ─> Initialized
//!                                              │
//!                                           start()
//!                                              ▼
//! Stopped <─ Stopping <─stop()─ Started <─ Starting
//! ```
//!
//! Every state has exactly one successor. A failed phase leaves the
//! context in its transitional state; there is no rollback.

use std::fmt;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{HayatError, InvalidStateError, Result};

/// Where a context is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Accepting `scan` calls. Nothing has been instantiated.
    Pending,
    /// Instantiating and running post processors.
    Initializing,
    /// Post processing done, singletons not yet built.
    Initialized,
    /// Pre-instantiating singletons.
    Starting,
    /// Serving `get_unit`.
    Started,
    /// Destroying singletons.
    Stopping,
    /// Terminal.
    Stopped,
}

impl LifecycleState {
    /// The only state reachable from this one, if any.
    pub fn successor(&self) -> Option<LifecycleState> {
        use LifecycleState::*;

        match self {
            Pending => Some(Initializing),
            Initializing => Some(Initialized),
            Initialized => Some(Starting),
            Starting => Some(Started),
            Started => Some(Stopping),
            Stopping => Some(Stopped),
            Stopped => None,
        }
    }

    /// Returns `true` if `self → next` is a legal transition.
    #[inline]
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        self.successor() == Some(next)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Pending => "Pending",
            LifecycleState::Initializing => "Initializing",
            LifecycleState::Initialized => "Initialized",
            LifecycleState::Starting => "Starting",
            LifecycleState::Started => "Started",
            LifecycleState::Stopping => "Stopping",
            LifecycleState::Stopped => "Stopped",
        };
        f.write_str(name)
    }
}

/// Holds the current [`LifecycleState`] and enforces legal transitions.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { state: Mutex::new(LifecycleState::Pending) }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Fails with [`HayatError::InvalidState`] unless the current state is `expected`.
    pub fn require(&self, operation: &'static str, expected: LifecycleState) -> Result<()> {
        let current = self.state();
        if current == expected {
            Ok(())
        } else {
            Err(invalid_state(operation, current, expected))
        }
    }

    /// Moves to `next`, which must be the successor of the current state.
    ///
    /// Check and update happen under one lock, so two concurrent callers
    /// cannot both enter the same phase.
    pub fn advance(&self, operation: &'static str, next: LifecycleState) -> Result<()> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            let expected = previous_of(next);
            return Err(invalid_state(operation, *state, expected));
        }

        info!(from = %*state, to = %next, "Lifecycle transition");
        *state = next;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

fn previous_of(next: LifecycleState) -> LifecycleState {
    use LifecycleState::*;

    [Pending, Initializing, Initialized, Starting, Started, Stopping]
        .into_iter()
        .find(|s| s.successor() == Some(next))
        .unwrap_or(Pending)
}

fn invalid_state(
    operation: &'static str,
    current: LifecycleState,
    expected: LifecycleState,
) -> HayatError {
    HayatError::InvalidState(InvalidStateError { operation, current, expected })
}
