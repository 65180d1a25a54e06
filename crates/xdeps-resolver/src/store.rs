//! Opt-in on-disk store of resolver answers, reused across runs.
//!
//! Each entry maps a dispatched dependency (`source:name@constraint`) to the
//! packages its resolver returned. Entries are written as plain strings so
//! the file stays readable and survives changes to the in-memory types.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xdeps_core::{Dependency, InvalidEdge, Package};
use xdeps_util::errors::DependsError;
use xdeps_util::fs::ensure_parent_dir;

/// Bumped whenever the on-disk layout changes; other versions are discarded.
pub const STORE_FORMAT: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFile {
    format: u32,
    #[serde(default)]
    lookups: BTreeMap<String, Vec<StoredPackage>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPackage {
    /// `source:name@version`
    package: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    invalid: Vec<StoredEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEdge {
    name: String,
    requirement: String,
    message: String,
}

impl StoredPackage {
    fn new(package: &Package) -> Self {
        Self {
            package: package.to_string(),
            dependencies: package.dependencies().iter().map(|d| d.to_string()).collect(),
            invalid: package
                .invalid_edges()
                .iter()
                .map(|e| StoredEdge {
                    name: e.name.clone(),
                    requirement: e.requirement.clone(),
                    message: e.message.clone(),
                })
                .collect(),
        }
    }

    fn restore(&self) -> Result<Package, DependsError> {
        let package: Package = self.package.parse()?;
        let dependencies = self
            .dependencies
            .iter()
            .map(|d| d.parse::<Dependency>())
            .collect::<Result<Vec<_>, _>>()?;
        let invalid: Vec<InvalidEdge> = self
            .invalid
            .iter()
            .map(|e| InvalidEdge::new(package.source(), &e.name, &e.requirement, &e.message))
            .collect();
        Ok(package
            .with_dependencies(dependencies)
            .with_invalid_edges(invalid))
    }
}

/// Resolver answers keyed by the dependency that was dispatched.
///
/// A store without a path lives for one run only. With a path, [`save`]
/// writes it back so the next run can skip the lookups it already made.
///
/// [`save`]: ResolutionStore::save
#[derive(Debug, Default)]
pub struct ResolutionStore {
    path: Option<PathBuf>,
    lookups: BTreeMap<String, Vec<StoredPackage>>,
    dirty: bool,
}

impl ResolutionStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`. A missing file gives an empty store; an
    /// unreadable one, or one written in another format, is discarded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DependsError> {
        let path = path.into();
        let lookups = if path.is_file() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<StoreFile>(&content) {
                Ok(file) if file.format == STORE_FORMAT => file.lookups,
                Ok(file) => {
                    tracing::warn!(
                        "Discarding {} (format {}, expected {STORE_FORMAT})",
                        path.display(),
                        file.format
                    );
                    BTreeMap::new()
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable {}: {e}", path.display());
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        tracing::debug!("Opened {} with {} lookups", path.display(), lookups.len());
        Ok(Self {
            path: Some(path),
            lookups,
            dirty: false,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The packages previously returned for `dep`, if any.
    ///
    /// An entry that no longer parses is treated as a miss.
    pub fn get(&self, dep: &Dependency) -> Option<Vec<Package>> {
        let stored = self.lookups.get(&dep.to_string())?;
        match stored
            .iter()
            .map(StoredPackage::restore)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(packages) => Some(packages),
            Err(e) => {
                tracing::debug!("Ignoring stored answer for {dep}: {e}");
                None
            }
        }
    }

    /// Remember the answer for `dep`. An existing entry is kept.
    pub fn record(&mut self, dep: &Dependency, packages: &[Package]) {
        let key = dep.to_string();
        if self.lookups.contains_key(&key) {
            return;
        }
        self.lookups
            .insert(key, packages.iter().map(StoredPackage::new).collect());
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }

    pub fn clear(&mut self) {
        self.dirty |= !self.lookups.is_empty();
        self.lookups.clear();
    }

    /// Write the store back to its file if anything changed.
    ///
    /// The file is replaced through a sibling temporary file, so a run that
    /// dies mid-write leaves the previous contents intact.
    pub fn save(&mut self) -> Result<(), DependsError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let file = StoreFile {
            format: STORE_FORMAT,
            lookups: self.lookups.clone(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|e| DependsError::Generic {
            message: format!("Failed to serialize {}: {e}", path.display()),
        })?;
        ensure_parent_dir(path)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!("Saved {} lookups to {}", self.lookups.len(), path.display());
        self.dirty = false;
        Ok(())
    }
}
