//! # Hayat Support
//!
//! Shared utilities for the Hayat context crates.
//!
//! This crate provides:
//! - Text rendering for diagnostics (resolution chains, type names)
//! - "Did you mean?" suggestions for unknown units

pub mod rendering;
