//! Shared utilities for xdeps.
//!
//! This crate provides cross-cutting concerns used by all other xdeps crates:
//! the error taxonomy, filesystem helpers, bounded process spawning, and
//! terminal status output.

pub mod errors;
pub mod fs;
pub mod process;
pub mod progress;
