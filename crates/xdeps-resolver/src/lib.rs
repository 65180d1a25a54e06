//! Dependency resolution engine: the resolver capability contract, the
//! resolver registry, the per-run package cache, and the breadth-first
//! expansion that ties them together.

pub mod backend;
pub mod cache;
pub mod diagnostics;
pub mod graph;
pub mod memo;
pub mod registry;
pub mod resolver;
pub mod store;

pub use backend::{ensure_source, Availability, ResolveFuture, Resolver, Tier};
pub use cache::{PackageCache, ResolutionResult};
pub use registry::ResolverRegistry;
pub use resolver::{resolve, resolve_stored, Resolution, ResolveOptions, ResolveTarget};
pub use store::ResolutionStore;
