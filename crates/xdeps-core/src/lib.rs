//! Core data types for xdeps.
//!
//! This crate defines the values the resolution engine moves around:
//! versions and version constraints, dependency requests, resolved packages,
//! on-disk source repositories, and the global configuration.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod config;
pub mod package;
pub mod repository;
pub mod version;

pub use package::{Dependency, InvalidEdge, Package, PackageId, PackageRef};
pub use repository::SourceRepository;
pub use version::{Constraint, Version};
