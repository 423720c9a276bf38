//! Core of the Hayat context: definitions, the unit factory, the
//! post-processor pipeline and the lifecycle state machine.

pub mod context;
pub mod definition;
pub mod error;
pub mod factory;
pub mod graph;
pub mod key;
pub mod lifecycle;
pub mod metadata;
pub mod postprocess;
pub mod reader;
pub mod registry;
pub mod scope;
pub mod settings;
pub mod singleton;
pub mod unit;

pub use context::{Context, ContextBuilder, ContextHandle, prelude};
pub use error::{HayatError, Result};
pub use key::{UnitKey, UnitRequest};
pub use lifecycle::LifecycleState;
pub use scope::Scope;
