#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use xdeps_core::{Dependency, InvalidEdge, Package, SourceRepository};
use xdeps_resolver::{
    ensure_source, Availability, ResolveFuture, Resolver, ResolverRegistry, Tier,
};
use xdeps_util::errors::DependsError;

/// An in-memory resolver serving a fixed package set.
pub struct StaticResolver {
    name: String,
    tier: Tier,
    availability: Availability,
    packages: Vec<Package>,
    files: bool,
    failing: HashSet<String>,
    delay: Option<Duration>,
    extra_deps: Vec<Dependency>,
    source_root: Option<Package>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StaticResolver {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tier: Tier::Ecosystem,
            availability: Availability::available(),
            packages: Vec::new(),
            files: false,
            failing: HashSet::new(),
            delay: None,
            extra_deps: Vec::new(),
            source_root: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fallback(name: &str) -> Self {
        Self {
            tier: Tier::Fallback,
            files: true,
            ..Self::new(name)
        }
    }

    /// Add a package given as `SOURCE:NAME@VERSION` with its dependency specifiers.
    pub fn package(mut self, spec: &str, deps: &[&str]) -> Self {
        self.packages.push(package(spec, deps));
        self
    }

    /// Attach an unparsable requirement to the most recently added package.
    pub fn invalid_edge(mut self, name: &str, requirement: &str, message: &str) -> Self {
        let last = self.packages.pop().expect("invalid_edge needs a package");
        let edge = InvalidEdge::new(last.source(), name, requirement, message);
        self.packages.push(last.with_invalid_edges([edge]));
        self
    }

    pub fn unavailable(mut self, reason: &str) -> Self {
        self.availability = Availability::unavailable(reason);
        self
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add `deps` to every package from another source on augmentation.
    pub fn augmenting(mut self, deps: &[&str]) -> Self {
        self.extra_deps = deps.iter().map(|d| d.parse().unwrap()).collect();
        self
    }

    pub fn source_root(mut self, spec: &str, deps: &[&str]) -> Self {
        self.source_root = Some(package(spec, deps));
        self
    }

    /// Shared log of every `resolve` and `update_dependencies` call.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    fn log(&self, entry: String) {
        self.calls.lock().unwrap().push(entry);
    }
}

impl Resolver for StaticResolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> Tier {
        self.tier
    }

    fn is_available(&self) -> Availability {
        self.availability.clone()
    }

    fn resolves_files(&self) -> bool {
        self.files
    }

    fn resolve<'a>(&'a self, dep: &'a Dependency) -> ResolveFuture<'a, Vec<Package>> {
        Box::pin(async move {
            ensure_source(self, dep)?;
            self.log(format!("resolve {dep}"));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(&*dep.name()) {
                return Err(DependsError::query(dep, "registry returned 500"));
            }
            Ok(self
                .packages
                .iter()
                .filter(|p| dep.matches(p))
                .cloned()
                .collect())
        })
    }

    fn can_resolve_from_source(&self, _repo: &SourceRepository) -> bool {
        self.source_root.is_some()
    }

    fn resolve_from_source<'a>(
        &'a self,
        _repo: &'a SourceRepository,
    ) -> ResolveFuture<'a, Option<Package>> {
        Box::pin(async move { Ok(self.source_root.clone()) })
    }

    fn can_update_dependencies(&self, package: &Package) -> bool {
        !self.extra_deps.is_empty() && package.source() != self.name
    }

    fn update_dependencies<'a>(&'a self, package: &'a Package) -> ResolveFuture<'a, Package> {
        Box::pin(async move {
            self.log(format!("augment {package}"));
            Ok(package.clone().with_dependencies(self.extra_deps.clone()))
        })
    }
}

pub fn package(spec: &str, deps: &[&str]) -> Package {
    spec.parse::<Package>()
        .unwrap()
        .with_dependencies(deps.iter().map(|d| d.parse::<Dependency>().unwrap()))
}

pub fn dep(spec: &str) -> Dependency {
    spec.parse().unwrap()
}

pub fn registry(resolvers: Vec<StaticResolver>) -> ResolverRegistry {
    ResolverRegistry::new(
        resolvers
            .into_iter()
            .map(|r| Arc::new(r) as Arc<dyn Resolver>)
            .collect(),
    )
    .unwrap()
}

/// Count of logged calls per entry.
pub fn call_counts(calls: &Arc<Mutex<Vec<String>>>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for entry in calls.lock().unwrap().iter() {
        *counts.entry(entry.clone()).or_insert(0) += 1;
    }
    counts
}
