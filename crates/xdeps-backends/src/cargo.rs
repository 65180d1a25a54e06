//! Rust crates from the crates.io API.

use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt};
use serde::Deserialize;
use xdeps_core::{Constraint, Dependency, InvalidEdge, Package, SourceRepository, Version};
use xdeps_resolver::memo::LookupMemo;
use xdeps_resolver::{ensure_source, Availability, ResolveFuture, Resolver};
use xdeps_util::errors::DependsError;

use crate::edges::DeclaredEdges;
use crate::http::HttpRegistry;

pub const NAME: &str = "cargo";

const VERSION_FETCHES: usize = 8;

#[derive(Debug, Deserialize)]
struct VersionsDoc {
    #[serde(default)]
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    num: String,
    #[serde(default)]
    yanked: bool,
}

#[derive(Debug, Deserialize)]
struct DependenciesDoc {
    #[serde(default)]
    dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Deserialize)]
struct DependencyEntry {
    crate_id: String,
    req: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    optional: bool,
}

pub struct CargoResolver {
    registry: HttpRegistry,
    versions: LookupMemo<Arc<Vec<(Version, String)>>>,
    dependencies: LookupMemo<Arc<DeclaredEdges>>,
}

impl CargoResolver {
    pub fn new(registry: HttpRegistry, memo_capacity: usize) -> Self {
        Self {
            registry,
            versions: LookupMemo::new(memo_capacity),
            dependencies: LookupMemo::new(memo_capacity),
        }
    }

    async fn versions(&self, name: &str) -> Result<Arc<Vec<(Version, String)>>, DependsError> {
        self.versions
            .get_or_try_insert_with(name, || async {
                let doc: Option<VersionsDoc> = self
                    .registry
                    .get_json(&format!("crates/{name}/versions"))
                    .await?;
                let mut versions = Vec::new();
                for entry in doc.map(|d| d.versions).unwrap_or_default() {
                    if entry.yanked {
                        continue;
                    }
                    match Version::parse(&entry.num) {
                        Ok(v) => versions.push((v, entry.num)),
                        Err(e) => tracing::debug!("Skipping {name}@{}: {e}", entry.num),
                    }
                }
                versions.sort();
                Ok(Arc::new(versions))
            })
            .await
    }

    async fn dependencies(&self, name: &str, num: &str) -> Result<Arc<DeclaredEdges>, DependsError> {
        let key = format!("{name}@{num}");
        self.dependencies
            .get_or_try_insert_with(&key, || async {
                let doc: Option<DependenciesDoc> = self
                    .registry
                    .get_json(&format!("crates/{name}/{num}/dependencies"))
                    .await?;
                let mut edges = DeclaredEdges::new();
                for entry in doc.map(|d| d.dependencies).unwrap_or_default() {
                    if entry.optional || entry.kind.as_deref().is_some_and(|k| k != "normal") {
                        continue;
                    }
                    match requirement(&entry.req) {
                        Ok(c) => edges.add(Dependency::named(NAME, entry.crate_id, c)),
                        Err(e) => edges.reject(InvalidEdge::new(NAME, entry.crate_id, entry.req, e)),
                    }
                }
                Ok(Arc::new(edges))
            })
            .await
    }
}

impl Resolver for CargoResolver {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "classifies the dependencies of Rust crates using crates.io"
    }

    fn is_available(&self) -> Availability {
        Availability::available()
    }

    fn resolve<'a>(&'a self, dep: &'a Dependency) -> ResolveFuture<'a, Vec<Package>> {
        Box::pin(async move {
            ensure_source(self, dep)?;
            let name = dep.name();
            let name: &str = &name;
            let versions = self
                .versions(name)
                .await
                .map_err(|e| DependsError::query(dep, e))?;
            let matching: Vec<&(Version, String)> = versions
                .iter()
                .filter(|(version, _)| dep.constraint().matches(version))
                .collect();

            let fetches: Vec<_> = matching
                .into_iter()
                .map(|(version, num)| async move {
                    let edges = self
                        .dependencies(name, num)
                        .await
                        .map_err(|e| DependsError::query(dep, e))?;
                    Ok::<_, DependsError>(edges.attach(Package::new(NAME, name, version.clone())))
                })
                .collect();
            futures_util::stream::iter(fetches)
                .buffered(VERSION_FETCHES)
                .try_collect()
                .await
        })
    }

    fn can_resolve_from_source(&self, repo: &SourceRepository) -> bool {
        repo.has_file("Cargo.toml")
    }

    fn resolve_from_source<'a>(
        &'a self,
        repo: &'a SourceRepository,
    ) -> ResolveFuture<'a, Option<Package>> {
        Box::pin(async move { read_source_package(repo) })
    }
}

/// Cargo requirement syntax: a bare version means `^version`.
pub fn requirement(req: &str) -> Result<Constraint, DependsError> {
    let converted = req
        .split(',')
        .map(str::trim)
        .map(|part| {
            if part.starts_with(|c: char| c.is_ascii_digit()) {
                format!("^{part}")
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    Constraint::parse(&converted)
}

/// Read the root crate from `Cargo.toml`.
///
/// Path and git dependencies without a `version` key are recorded as `*`.
pub fn read_source_package(repo: &SourceRepository) -> Result<Option<Package>, DependsError> {
    let path = repo.path("Cargo.toml");
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)?;
    let doc: toml::Value = toml::from_str(&content).map_err(|e| DependsError::Manifest {
        message: format!("Failed to parse {}: {e}", path.display()),
    })?;

    let package = doc.get("package");
    let name = package
        .and_then(|p| p.get("name"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| repo.name());
    let version = package
        .and_then(|p| p.get("version"))
        .and_then(|v| v.as_str())
        .map(Version::coerce)
        .unwrap_or_else(|| Version::new(0, 0, 0));

    let mut edges = DeclaredEdges::new();
    if let Some(table) = doc.get("dependencies").and_then(|v| v.as_table()) {
        for (dep_name, spec) in table {
            let (crate_name, req) = match spec {
                toml::Value::String(req) => (dep_name.as_str(), req.as_str()),
                toml::Value::Table(t) => (
                    t.get("package").and_then(|v| v.as_str()).unwrap_or(dep_name.as_str()),
                    t.get("version").and_then(|v| v.as_str()).unwrap_or("*"),
                ),
                _ => (dep_name.as_str(), "*"),
            };
            match requirement(req) {
                Ok(c) => edges.add(Dependency::named(NAME, crate_name, c)),
                Err(e) => edges.reject(InvalidEdge::new(NAME, crate_name, req, e)),
            }
        }
    }

    Ok(Some(
        edges
            .attach(Package::new(NAME, name, version))
            .with_source_repo(repo.root()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_requirements_are_caret() {
        let c = requirement("1.0").unwrap();
        assert_eq!(c.as_str(), "^1.0");
        assert!(c.matches(&Version::parse("1.9.3").unwrap()));
        assert!(!c.matches(&Version::parse("2.0.0").unwrap()));
    }

    #[test]
    fn explicit_operators_are_kept() {
        assert_eq!(requirement("=0.4.2").unwrap().as_str(), "=0.4.2");
        assert_eq!(requirement(">= 1.2, < 1.5").unwrap().as_str(), ">=1.2,<1.5");
        assert_eq!(requirement("~0.3").unwrap().as_str(), "~0.3");
        assert!(requirement("*").unwrap().is_any());
    }
}
