//! Debian/Ubuntu system packages via `apt-cache` and `dpkg`.
//!
//! This is the fallback backend: dependencies addressed to ecosystems with no
//! registered resolver are looked up here by name, and file dependencies are
//! mapped to the packages that install them. It also augments packages from
//! other ecosystems with the system libraries their binaries link against.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use xdeps_core::{Constraint, Dependency, InvalidEdge, Package, PackageRef, Version};
use xdeps_resolver::memo::LookupMemo;
use xdeps_resolver::{ensure_source, Availability, ResolveFuture, Resolver, Tier};
use xdeps_util::errors::DependsError;
use xdeps_util::fs::find_program;
use xdeps_util::process::CommandBuilder;

use crate::edges::DeclaredEdges;
use crate::native;

pub const NAME: &str = "ubuntu";

/// Maps a file path to the names of the installed packages that ship it.
pub trait FileOwnerIndex: Send + Sync {
    fn owners<'a>(&'a self, path: &'a Path) -> ResolveFuture<'a, Vec<String>>;
}

/// [`FileOwnerIndex`] backed by `dpkg -S`.
#[derive(Debug, Clone)]
pub struct DpkgIndex {
    timeout: Duration,
}

impl DpkgIndex {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl FileOwnerIndex for DpkgIndex {
    fn owners<'a>(&'a self, path: &'a Path) -> ResolveFuture<'a, Vec<String>> {
        Box::pin(async move {
            let output = CommandBuilder::new("dpkg")
                .arg("-S")
                .arg(path.to_string_lossy())
                .timeout(self.timeout)
                .exec()
                .await?;
            // dpkg exits 1 when no package owns the path.
            if !output.status.success() {
                return Ok(Vec::new());
            }
            Ok(parse_dpkg_search(&String::from_utf8_lossy(&output.stdout), path))
        })
    }
}

pub struct UbuntuResolver {
    files: Arc<dyn FileOwnerIndex>,
    packages: LookupMemo<Arc<Vec<Package>>>,
    timeout: Duration,
}

impl UbuntuResolver {
    pub fn new(memo_capacity: usize, timeout: Duration) -> Self {
        Self::with_file_index(Arc::new(DpkgIndex::new(timeout)), memo_capacity, timeout)
    }

    pub fn with_file_index(files: Arc<dyn FileOwnerIndex>, memo_capacity: usize, timeout: Duration) -> Self {
        Self {
            files,
            packages: LookupMemo::new(memo_capacity),
            timeout,
        }
    }

    /// Every version of `name` known to apt.
    async fn packages(&self, name: &str) -> Result<Arc<Vec<Package>>, DependsError> {
        self.packages
            .get_or_try_insert_with(name, || async {
                let output = CommandBuilder::new("apt-cache")
                    .args(["show", name])
                    .timeout(self.timeout)
                    .exec()
                    .await?;
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !output.status.success() {
                    if stderr.contains("No packages found") || stderr.contains("Unable to locate") {
                        return Ok(Arc::new(Vec::new()));
                    }
                    return Err(DependsError::Command {
                        program: "apt-cache".to_string(),
                        message: format!("{} ({})", output.status, stderr.trim()),
                    });
                }
                Ok(Arc::new(parse_apt_show(name, &String::from_utf8_lossy(&output.stdout))))
            })
            .await
    }

    async fn file_owner(&self, path: &Path) -> Result<Vec<Package>, DependsError> {
        let owners = self.files.owners(path).await?;
        if owners.is_empty() {
            tracing::debug!("No package owns {}", path.display());
            return Ok(Vec::new());
        }
        let deps = owners
            .into_iter()
            .map(|owner| Dependency::named(NAME, owner, Constraint::any()));
        Ok(vec![Package::new(NAME, path.to_string_lossy(), Version::new(0, 0, 0))
            .with_dependencies(deps)])
    }
}

impl Resolver for UbuntuResolver {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "expands dependencies based upon Ubuntu package dependencies"
    }

    fn tier(&self) -> Tier {
        Tier::Fallback
    }

    fn is_available(&self) -> Availability {
        match (find_program("apt-cache"), find_program("dpkg")) {
            (Some(_), Some(_)) => Availability::available(),
            _ => Availability::unavailable(
                "`apt-cache` and `dpkg` are required; this resolver only works on Debian-based systems",
            ),
        }
    }

    fn resolve<'a>(&'a self, dep: &'a Dependency) -> ResolveFuture<'a, Vec<Package>> {
        Box::pin(async move {
            ensure_source(self, dep)?;
            match dep.package() {
                PackageRef::File(path) => self
                    .file_owner(path)
                    .await
                    .map_err(|e| DependsError::query(dep, e)),
                PackageRef::Named(name) => {
                    let versions = self
                        .packages(name)
                        .await
                        .map_err(|e| DependsError::query(dep, e))?;
                    Ok(versions
                        .iter()
                        .filter(|p| dep.constraint().matches(p.version()))
                        .cloned()
                        .collect())
                }
            }
        })
    }

    fn resolves_files(&self) -> bool {
        true
    }

    fn can_update_dependencies(&self, package: &Package) -> bool {
        package.source() != NAME && package.source_repo().is_some()
    }

    fn update_dependencies<'a>(&'a self, package: &'a Package) -> ResolveFuture<'a, Package> {
        Box::pin(async move {
            let Some(root) = package.source_repo() else {
                return Ok(package.clone());
            };
            let native = native::native_dependencies(NAME, root, self.timeout).await?;
            let mut updated = package.clone();
            updated.merge_dependencies(&native);
            Ok(updated)
        })
    }
}

/// Upstream part of a Debian version: epoch and revision removed.
///
/// `1:2.3.4-1ubuntu2` becomes `2.3.4`.
pub fn upstream_version(raw: &str) -> &str {
    let raw = raw.trim();
    let raw = match raw.split_once(':') {
        Some((epoch, rest)) if epoch.chars().all(|c| c.is_ascii_digit()) => rest,
        _ => raw,
    };
    match raw.rfind('-') {
        Some(idx) => &raw[..idx],
        None => raw,
    }
}

/// Parse a `Depends:` field value.
///
/// Alternatives (`a | b`) keep the first choice; architecture qualifiers and
/// restriction lists are dropped.
pub fn parse_depends(value: &str) -> DeclaredEdges {
    let mut edges = DeclaredEdges::new();
    for entry in value.split(',') {
        let Some(first) = entry.split('|').next().map(str::trim) else {
            continue;
        };
        if first.is_empty() {
            continue;
        }
        let end = first
            .find(|c: char| c.is_whitespace() || c == '(' || c == '[' || c == '<')
            .unwrap_or(first.len());
        let name = first[..end].split(':').next().unwrap_or_default();
        let constraint = match first[end..].split_once('(') {
            Some((_, inner)) => {
                let inner = inner.split(')').next().unwrap_or_default().trim();
                let op_end = inner
                    .find(|c: char| !matches!(c, '<' | '>' | '='))
                    .unwrap_or(inner.len());
                let (op, operand) = inner.split_at(op_end);
                Constraint::parse(&format!("{op}{}", upstream_version(operand)))
            }
            None => Ok(Constraint::any()),
        };
        match constraint {
            Ok(c) => edges.add(Dependency::named(NAME, name, c)),
            Err(e) => edges.reject(InvalidEdge::new(NAME, name, first, e)),
        }
    }
    edges
}

/// Parse `apt-cache show` output into one package per distinct upstream version.
///
/// Records for the same version (other architectures, other archives) are
/// merged; records naming a different package are ignored.
pub fn parse_apt_show(name: &str, output: &str) -> Vec<Package> {
    let mut by_version: BTreeMap<Version, DeclaredEdges> = BTreeMap::new();
    for record in output.split("\n\n").filter(|r| !r.trim().is_empty()) {
        let fields = control_fields(record);
        if fields.get("Package").is_some_and(|p| p != name) {
            continue;
        }
        let Some(raw) = fields.get("Version") else {
            continue;
        };
        let edges = by_version
            .entry(Version::coerce(upstream_version(raw)))
            .or_default();
        for field in ["Pre-Depends", "Depends"] {
            if let Some(value) = fields.get(field) {
                edges.extend(parse_depends(value));
            }
        }
    }
    by_version
        .into_iter()
        .map(|(version, edges)| edges.attach(Package::new(NAME, name, version)))
        .collect()
}

/// Fields of one control record, continuation lines folded into their field.
fn control_fields(record: &str) -> BTreeMap<&str, String> {
    let mut fields: BTreeMap<&str, String> = BTreeMap::new();
    let mut current: Option<&str> = None;
    for line in record.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(value) = current.and_then(|key| fields.get_mut(key)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) => {
                fields.insert(key, value.trim().to_string());
                current = Some(key);
            }
            None => current = None,
        }
    }
    fields
}

/// Parse `dpkg -S` output, keeping owners of exactly `path`.
///
/// Lines look like `libssl3:amd64, libssl3:i386: /usr/lib/libssl.so.3`.
pub fn parse_dpkg_search(output: &str, path: &Path) -> Vec<String> {
    let mut owners = BTreeSet::new();
    for line in output.lines() {
        if line.starts_with("diversion by") {
            continue;
        }
        let Some((packages, file)) = line.split_once(": ") else {
            continue;
        };
        if Path::new(file.trim()) != path {
            continue;
        }
        for package in packages.split(',') {
            let package = package.trim().split(':').next().unwrap_or_default();
            if !package.is_empty() {
                owners.insert(package.to_string());
            }
        }
    }
    owners.into_iter().collect()
}
