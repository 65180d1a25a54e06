//! Per-run package cache and visit tracking.
//!
//! [`PackageCache`] is the single source of truth for one resolution run. It
//! is owned by the engine and only ever mutated through `&mut self`, so no
//! two writers can race on it. Resolvers never see it.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;
use xdeps_core::{Dependency, Package, PackageId, Version};

use crate::diagnostics::SkippedBranch;

/// What changed when a package was offered to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    /// The package identity was not cached before.
    pub is_new: bool,
    /// Dependencies not previously recorded for this package.
    pub added: Vec<Dependency>,
}

/// All packages discovered during one resolution run.
///
/// Packages are keyed by `(source, name)` and then by version. Re-inserting a
/// known identity unions the dependency sets, so the cache only ever grows.
#[derive(Debug, Default, Clone)]
pub struct PackageCache {
    packages: BTreeMap<(String, String), BTreeMap<Version, Package>>,
    roots: BTreeSet<PackageId>,
    /// Requests that were re-addressed to another resolver before dispatch.
    aliases: BTreeMap<Dependency, Dependency>,
    len: usize,
}

impl PackageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `package`, or merge its dependencies into the cached instance.
    pub fn try_insert(&mut self, package: Package) -> Insertion {
        let versions = self
            .packages
            .entry((package.source().to_string(), package.name().to_string()))
            .or_default();
        match versions.get_mut(package.version()) {
            Some(existing) => Insertion {
                is_new: false,
                added: existing.merge_dependencies(package.dependencies()),
            },
            None => {
                let added = package.dependencies().iter().cloned().collect();
                versions.insert(package.version().clone(), package);
                self.len += 1;
                Insertion {
                    is_new: true,
                    added,
                }
            }
        }
    }

    /// Union `deps` into the cached package `id`.
    ///
    /// Returns the newly recorded dependencies, or `None` when `id` is not cached.
    pub fn merge_dependencies<'a>(
        &mut self,
        id: &PackageId,
        deps: impl IntoIterator<Item = &'a Dependency>,
    ) -> Option<Vec<Dependency>> {
        let package = self
            .packages
            .get_mut(&(id.source.clone(), id.name.clone()))?
            .get_mut(&id.version)?;
        Some(package.merge_dependencies(deps))
    }

    /// Every cached version of `source:name`, oldest first.
    pub fn lookup<'a>(&'a self, source: &str, name: &str) -> impl Iterator<Item = &'a Package> {
        self.packages
            .get(&(source.to_string(), name.to_string()))
            .into_iter()
            .flat_map(|versions| versions.values())
    }

    pub fn get(&self, id: &PackageId) -> Option<&Package> {
        self.packages
            .get(&(id.source.clone(), id.name.clone()))?
            .get(&id.version)
    }

    /// Cached packages satisfying `dep`, following any recorded alias.
    pub fn matching<'a>(&'a self, dep: &'a Dependency) -> impl Iterator<Item = &'a Package> {
        let target = self.aliases.get(dep).unwrap_or(dep);
        let name = target.name();
        self.lookup(target.source(), &name)
            .filter(move |pkg| target.constraint().matches(pkg.version()))
    }

    /// Whether at least one cached package satisfies `dep`.
    pub fn contains(&self, dep: &Dependency) -> bool {
        self.matching(dep).next().is_some()
    }

    /// Record that `original` was dispatched as `routed`.
    pub fn add_alias(&mut self, original: Dependency, routed: Dependency) {
        if original != routed {
            self.aliases.insert(original, routed);
        }
    }

    pub fn add_root(&mut self, id: PackageId) {
        self.roots.insert(id);
    }

    pub fn roots(&self) -> impl Iterator<Item = &PackageId> {
        self.roots.iter()
    }

    /// All cached packages in `(source, name, version)` order.
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values().flat_map(|versions| versions.values())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Snapshot the cache as a serializable graph.
    pub fn to_result(&self) -> ResolutionResult {
        let packages = self
            .iter()
            .map(|pkg| ResolvedPackage {
                id: pkg.id(),
                dependencies: pkg
                    .dependencies()
                    .iter()
                    .map(|dep| ResolvedEdge {
                        resolved: self.matching(dep).map(|p| p.version().clone()).collect(),
                        dependency: dep.clone(),
                    })
                    .collect(),
            })
            .collect();
        ResolutionResult {
            roots: self.roots.iter().cloned().collect(),
            packages,
            skipped: Vec::new(),
        }
    }
}

/// Serializable view of a finished resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionResult {
    pub roots: Vec<PackageId>,
    pub packages: Vec<ResolvedPackage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPackage {
    #[serde(flatten)]
    pub id: PackageId,
    pub dependencies: Vec<ResolvedEdge>,
}

/// One declared dependency and the cached versions that satisfy it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEdge {
    #[serde(flatten)]
    pub dependency: Dependency,
    pub resolved: Vec<Version>,
}

/// Tracks which dependencies have been dispatched during resolution
/// so cyclic graphs terminate.
#[derive(Debug, Default)]
pub struct VisitedSet {
    visited: HashSet<Dependency>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a dependency as visited. Returns `false` if already visited.
    pub fn visit(&mut self, dep: &Dependency) -> bool {
        self.visited.insert(dep.clone())
    }

    pub fn contains(&self, dep: &Dependency) -> bool {
        self.visited.contains(dep)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}
