//! JavaScript packages from the npm registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use xdeps_core::{Constraint, Dependency, InvalidEdge, Package, SourceRepository, Version};
use xdeps_resolver::memo::LookupMemo;
use xdeps_resolver::{ensure_source, Availability, ResolveFuture, Resolver};
use xdeps_util::errors::DependsError;

use crate::edges::DeclaredEdges;
use crate::http::HttpRegistry;

pub const NAME: &str = "npm";

/// The subset of a registry packument we read.
#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default)]
    versions: BTreeMap<String, Manifest>,
}

/// A `package.json`, or one entry of a packument's `versions`.
#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

pub struct NpmResolver {
    registry: HttpRegistry,
    packuments: LookupMemo<Arc<Vec<Package>>>,
}

impl NpmResolver {
    pub fn new(registry: HttpRegistry, memo_capacity: usize) -> Self {
        Self {
            registry,
            packuments: LookupMemo::new(memo_capacity),
        }
    }

    /// Every published version of `name` with its dependencies.
    async fn versions(&self, name: &str) -> Result<Arc<Vec<Package>>, DependsError> {
        self.packuments
            .get_or_try_insert_with(name, || async {
                let doc: Option<Packument> = self.registry.get_json(&encode_name(name)).await?;
                let mut packages = Vec::new();
                for (raw, manifest) in doc.map(|d| d.versions).unwrap_or_default() {
                    let version = match Version::parse(&raw) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::debug!("Skipping {name}@{raw}: {e}");
                            continue;
                        }
                    };
                    packages.push(dependencies(&manifest.dependencies).attach(Package::new(NAME, name, version)));
                }
                Ok(Arc::new(packages))
            })
            .await
    }
}

impl Resolver for NpmResolver {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "classifies the dependencies of JavaScript packages using the npm registry"
    }

    fn is_available(&self) -> Availability {
        Availability::available()
    }

    fn resolve<'a>(&'a self, dep: &'a Dependency) -> ResolveFuture<'a, Vec<Package>> {
        Box::pin(async move {
            ensure_source(self, dep)?;
            let versions = self
                .versions(&dep.name())
                .await
                .map_err(|e| DependsError::query(dep, e))?;
            Ok(versions
                .iter()
                .filter(|p| dep.constraint().matches(p.version()))
                .cloned()
                .collect())
        })
    }

    fn can_resolve_from_source(&self, repo: &SourceRepository) -> bool {
        repo.has_file("package.json")
    }

    fn resolve_from_source<'a>(
        &'a self,
        repo: &'a SourceRepository,
    ) -> ResolveFuture<'a, Option<Package>> {
        Box::pin(async move { read_source_package(repo) })
    }
}

/// Scoped names keep their `@` but the slash must be escaped in the URL path.
fn encode_name(name: &str) -> String {
    name.replace('/', "%2F")
}

/// Convert a `dependencies` map. Specifiers that are not version ranges
/// (git URLs, `file:` paths, aliases) become invalid edges.
fn dependencies(deps: &BTreeMap<String, String>) -> DeclaredEdges {
    let mut edges = DeclaredEdges::new();
    for (name, range) in deps {
        match Constraint::parse(range) {
            Ok(constraint) => edges.add(Dependency::named(NAME, name.as_str(), constraint)),
            Err(e) => edges.reject(InvalidEdge::new(NAME, name.as_str(), range.as_str(), e)),
        }
    }
    edges
}

/// Read the root package from `package.json`.
pub fn read_source_package(repo: &SourceRepository) -> Result<Option<Package>, DependsError> {
    let path = repo.path("package.json");
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let manifest: Manifest = serde_json::from_str(&content).map_err(|e| DependsError::Manifest {
        message: format!("Failed to parse {}: {e}", path.display()),
    })?;

    let name = manifest.name.unwrap_or_else(|| repo.name());
    let version = manifest
        .version
        .as_deref()
        .map(Version::coerce)
        .unwrap_or_else(|| Version::new(0, 0, 0));
    let edges = dependencies(&manifest.dependencies);
    Ok(Some(
        edges
            .attach(Package::new(NAME, name, version))
            .with_source_repo(repo.root()),
    ))
}
