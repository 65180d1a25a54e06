//! Concrete resolvers: PyPI, npm, crates.io, and Debian/Ubuntu system packages.

pub mod cargo;
pub mod edges;
pub mod http;
pub mod native;
pub mod npm;
pub mod pip;
pub mod ubuntu;

use std::sync::Arc;

use xdeps_core::config::GlobalConfig;
use xdeps_resolver::{Resolver, ResolverRegistry};
use xdeps_util::errors::DependsError;

pub use cargo::CargoResolver;
pub use edges::DeclaredEdges;
pub use http::HttpRegistry;
pub use npm::NpmResolver;
pub use pip::PipResolver;
pub use ubuntu::UbuntuResolver;

/// The standard resolver set, configured from `config`.
///
/// All registry backends share one HTTP client.
pub fn builtin_registry(config: &GlobalConfig) -> Result<ResolverRegistry, DependsError> {
    let client = http::build_client()?;
    let capacity = config.cache.lookup_capacity;
    let registries = &config.registries;

    let resolvers: Vec<Arc<dyn Resolver>> = vec![
        Arc::new(PipResolver::new(HttpRegistry::new(client.clone(), &registries.pypi), capacity)),
        Arc::new(NpmResolver::new(HttpRegistry::new(client.clone(), &registries.npm), capacity)),
        Arc::new(CargoResolver::new(HttpRegistry::new(client, &registries.crates), capacity)),
        Arc::new(UbuntuResolver::new(capacity, config.resolve.timeout())),
    ];
    ResolverRegistry::new(resolvers)
}
