//! Python packages from the PyPI JSON API.
//!
//! Versions come from `GET {base}/{project}/json`; the requirements of each
//! matching release come from `GET {base}/{project}/{version}/json`. Source
//! trees are read from `requirements.txt` and `pyproject.toml` (PEP 621
//! `[project]` and Poetry tables).

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt};
use serde::Deserialize;
use xdeps_core::{Constraint, Dependency, InvalidEdge, Package, SourceRepository, Version};
use xdeps_resolver::memo::LookupMemo;
use xdeps_resolver::{ensure_source, Availability, ResolveFuture, Resolver};
use xdeps_util::errors::DependsError;

use crate::edges::DeclaredEdges;
use crate::http::HttpRegistry;

pub const NAME: &str = "pip";

/// Release documents fetched concurrently for one `resolve` call.
const RELEASE_FETCHES: usize = 8;

#[derive(Debug, Deserialize)]
struct ProjectDoc {
    #[serde(default)]
    releases: BTreeMap<String, Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDoc {
    info: ReleaseInfo,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
}

pub struct PipResolver {
    registry: HttpRegistry,
    /// project → (version, version as published)
    releases: LookupMemo<Arc<Vec<(Version, String)>>>,
    /// `project@version` → requirements
    requirements: LookupMemo<Arc<DeclaredEdges>>,
}

impl PipResolver {
    pub fn new(registry: HttpRegistry, memo_capacity: usize) -> Self {
        Self {
            registry,
            releases: LookupMemo::new(memo_capacity),
            requirements: LookupMemo::new(memo_capacity),
        }
    }

    async fn releases(&self, project: &str) -> Result<Arc<Vec<(Version, String)>>, DependsError> {
        self.releases
            .get_or_try_insert_with(project, || async {
                let doc: Option<ProjectDoc> =
                    self.registry.get_json(&format!("{project}/json")).await?;
                let mut versions = BTreeMap::new();
                for (raw, files) in doc.map(|d| d.releases).unwrap_or_default() {
                    // Releases without any uploaded distribution cannot be installed.
                    if files.is_empty() {
                        continue;
                    }
                    versions.entry(Version::coerce(&raw)).or_insert(raw);
                }
                Ok(Arc::new(versions.into_iter().collect()))
            })
            .await
    }

    async fn requirements(
        &self,
        project: &str,
        raw_version: &str,
    ) -> Result<Arc<DeclaredEdges>, DependsError> {
        let key = format!("{project}@{raw_version}");
        self.requirements
            .get_or_try_insert_with(&key, || async {
                let doc: Option<ReleaseDoc> = self
                    .registry
                    .get_json(&format!("{project}/{raw_version}/json"))
                    .await?;
                let lines = doc.and_then(|d| d.info.requires_dist).unwrap_or_default();
                let mut edges = DeclaredEdges::new();
                for line in &lines {
                    push_requirement(&mut edges, line);
                }
                Ok(Arc::new(edges))
            })
            .await
    }
}

impl Resolver for PipResolver {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "classifies the dependencies of Python packages using PyPI"
    }

    fn is_available(&self) -> Availability {
        Availability::available()
    }

    fn resolve<'a>(&'a self, dep: &'a Dependency) -> ResolveFuture<'a, Vec<Package>> {
        Box::pin(async move {
            ensure_source(self, dep)?;
            let name = dep.name();
            let project = normalize_name(&name);
            let project = project.as_str();
            let name: &str = &name;

            let releases = self
                .releases(project)
                .await
                .map_err(|e| DependsError::query(dep, e))?;
            let matching: Vec<&(Version, String)> = releases
                .iter()
                .filter(|(version, _)| dep.constraint().matches(version))
                .collect();
            tracing::debug!("{} of {} releases of {project} match {dep}", matching.len(), releases.len());

            let fetches: Vec<_> = matching
                .into_iter()
                .map(|(version, raw)| async move {
                    let edges = self
                        .requirements(project, raw)
                        .await
                        .map_err(|e| DependsError::query(dep, e))?;
                    Ok::<_, DependsError>(edges.attach(Package::new(NAME, name, version.clone())))
                })
                .collect();
            futures_util::stream::iter(fetches)
                .buffered(RELEASE_FETCHES)
                .try_collect()
                .await
        })
    }

    fn can_resolve_from_source(&self, repo: &SourceRepository) -> bool {
        repo.has_file("requirements.txt") || repo.has_file("pyproject.toml")
    }

    fn resolve_from_source<'a>(
        &'a self,
        repo: &'a SourceRepository,
    ) -> ResolveFuture<'a, Option<Package>> {
        Box::pin(async move { read_source_package(repo) })
    }
}

/// PEP 503 normalization: lowercase, runs of `-`, `_` and `.` become `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('-');
        }
        pending_sep = false;
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Parse one PEP 508 requirement (`requires_dist` entry or `requirements.txt` line).
///
/// Returns `Ok(None)` for lines that name no dependency: blanks, comments,
/// pip options, and requirements only active under an `extra` marker.
pub fn parse_requirement(line: &str) -> Result<Option<Dependency>, DependsError> {
    let err = |message: &str| DependsError::DependencyParse {
        input: line.to_string(),
        message: message.to_string(),
    };

    let line = match line.find(" #").or_else(|| line.starts_with('#').then_some(0)) {
        Some(idx) => &line[..idx],
        None => line,
    };
    let (req, marker) = match line.split_once(';') {
        Some((req, marker)) => (req, Some(marker)),
        None => (line, None),
    };
    if marker.is_some_and(|m| m.contains("extra")) {
        return Ok(None);
    }
    let req = req.trim();
    if req.is_empty() || req.starts_with('-') {
        return Ok(None);
    }

    let end = req
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(req.len());
    let name = &req[..end];
    if name.is_empty() {
        return Err(err("missing project name"));
    }

    let mut rest = req[end..].trim_start();
    if let Some(extras) = rest.strip_prefix('[') {
        let close = extras.find(']').ok_or_else(|| err("unclosed extras"))?;
        rest = extras[close + 1..].trim_start();
    }
    if rest.starts_with('@') {
        return Err(err("direct URL references are not supported"));
    }
    let spec = rest
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim();
    let constraint = Constraint::parse(spec)?;
    Ok(Some(Dependency::named(NAME, normalize_name(name), constraint)))
}

/// Read the root package of a Python source tree.
pub fn read_source_package(repo: &SourceRepository) -> Result<Option<Package>, DependsError> {
    let mut name = None;
    let mut version = None;
    let mut edges = DeclaredEdges::new();
    let mut found = false;

    let pyproject = repo.path("pyproject.toml");
    if pyproject.is_file() {
        found = true;
        let content = std::fs::read_to_string(&pyproject)?;
        let doc: toml::Value = toml::from_str(&content).map_err(|e| DependsError::Manifest {
            message: format!("Failed to parse {}: {e}", pyproject.display()),
        })?;

        if let Some(project) = doc.get("project") {
            name = name.or(project.get("name").and_then(|v| v.as_str()).map(String::from));
            version = version.or(project.get("version").and_then(|v| v.as_str()).map(String::from));
            for line in project
                .get("dependencies")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten()
                .filter_map(|v| v.as_str())
            {
                push_requirement(&mut edges, line);
            }
        }

        if let Some(poetry) = doc.get("tool").and_then(|t| t.get("poetry")) {
            name = name.or(poetry.get("name").and_then(|v| v.as_str()).map(String::from));
            version = version.or(poetry.get("version").and_then(|v| v.as_str()).map(String::from));
            if let Some(table) = poetry.get("dependencies").and_then(|v| v.as_table()) {
                for (dep_name, spec) in table {
                    if dep_name == "python" {
                        continue;
                    }
                    let raw = match spec {
                        toml::Value::String(s) => s.as_str(),
                        toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).unwrap_or("*"),
                        _ => "*",
                    };
                    match Constraint::parse(raw) {
                        Ok(c) => edges.add(Dependency::named(NAME, normalize_name(dep_name), c)),
                        Err(e) => edges.reject(InvalidEdge::new(NAME, normalize_name(dep_name), raw, e)),
                    }
                }
            }
        }
    }

    let requirements = repo.path("requirements.txt");
    if requirements.is_file() {
        found = true;
        for line in std::fs::read_to_string(&requirements)?.lines() {
            push_requirement(&mut edges, line);
        }
    }

    if !found {
        return Ok(None);
    }
    let version = version
        .map(|v| Version::coerce(&v))
        .unwrap_or_else(|| Version::new(0, 0, 0));
    Ok(Some(
        edges
            .attach(Package::new(NAME, name.unwrap_or_else(|| repo.name()), version))
            .with_source_repo(repo.root()),
    ))
}

fn push_requirement(edges: &mut DeclaredEdges, line: &str) {
    match parse_requirement(line) {
        Ok(Some(dep)) => edges.add(dep),
        Ok(None) => {}
        Err(e) => edges.reject(InvalidEdge::new(NAME, requirement_name(line), line.trim(), e)),
    }
}

/// Best-effort project name of a requirement line that failed to parse.
fn requirement_name(line: &str) -> String {
    let line = line.trim();
    let end = line
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(line.len());
    if end == 0 {
        line.to_string()
    } else {
        normalize_name(&line[..end])
    }
}
