//! The fixed set of resolvers known to a process.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use xdeps_core::Dependency;
use xdeps_util::errors::DependsError;

use crate::backend::{Resolver, Tier};

/// An explicitly constructed, read-only set of resolvers.
///
/// Resolvers are kept in `(tier, name)` order, so ecosystem backends always
/// come before the fallback tier. Cloning is cheap and clones share the same
/// resolver instances (and therefore their lookup memos).
#[derive(Clone)]
pub struct ResolverRegistry {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    /// Build a registry. Duplicate names are an internal inconsistency.
    pub fn new(mut resolvers: Vec<Arc<dyn Resolver>>) -> Result<Self, DependsError> {
        let mut seen = HashSet::new();
        for resolver in &resolvers {
            if !seen.insert(resolver.name().to_string()) {
                return Err(DependsError::Fatal {
                    message: format!("resolver `{}` is registered twice", resolver.name()),
                });
            }
        }
        resolvers.sort_by(|a, b| (a.tier(), a.name()).cmp(&(b.tier(), b.name())));
        Ok(Self { resolvers })
    }

    /// All resolvers in consultation order.
    pub fn resolvers(&self) -> &[Arc<dyn Resolver>] {
        &self.resolvers
    }

    pub fn names(&self) -> Vec<&str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.iter().find(|r| r.name() == name)
    }

    pub fn by_name(&self, name: &str) -> Result<&Arc<dyn Resolver>, DependsError> {
        self.get(name).ok_or_else(|| DependsError::ResolverNotFound {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The first fallback-tier resolver, if any is registered.
    pub fn fallback(&self) -> Option<&Arc<dyn Resolver>> {
        self.resolvers.iter().find(|r| r.tier() == Tier::Fallback)
    }

    /// The resolver `dep` is dispatched to, availability aside.
    ///
    /// That is the resolver named by the dependency's source when it can take
    /// the target, otherwise the fallback.
    pub fn claimant(&self, dep: &Dependency) -> Option<&Arc<dyn Resolver>> {
        match self.get(dep.source()) {
            Some(resolver) if !dep.package().is_file() || resolver.resolves_files() => Some(resolver),
            _ => self.fallback(),
        }
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
