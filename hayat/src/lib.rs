//! # Hayat: lifecycle-managed dependency injection for Rust
//!
//! Types describe themselves through [`Scannable`](prelude::Scannable);
//! a [`Context`] turns those descriptions into units, wires their
//! dependencies, runs their lifecycle hooks and destroys them on stop.
//!
//! ```text
//! scan ──> initialize ──> start ──> get_unit ... ──> stop
//! ```
//!
//! See `examples/lifecycle.rs` for a runnable walk-through.

pub use hayat_context::*;
pub use hayat_support::*;
