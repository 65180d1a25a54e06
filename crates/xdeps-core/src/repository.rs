//! On-disk project trees handed to resolvers that seed roots from source.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use xdeps_util::errors::DependsError;

/// Directories never descended into when listing a tree.
const DEFAULT_IGNORES: &[&str] = &[
    "**/.git",
    "**/.hg",
    "**/.svn",
    "**/node_modules",
    "**/target",
    "**/__pycache__",
    "**/.venv",
    "**/venv",
    "**/.tox",
];

/// A project directory. Owned by the caller; resolvers only read it.
#[derive(Debug, Clone)]
pub struct SourceRepository {
    root: PathBuf,
    ignore: GlobSet,
}

impl SourceRepository {
    /// Open the directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DependsError> {
        Self::with_ignores(path, DEFAULT_IGNORES)
    }

    /// Open the directory at `path`, skipping directories matching `patterns`.
    pub fn with_ignores(path: impl AsRef<Path>, patterns: &[&str]) -> Result<Self, DependsError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(DependsError::Generic {
                message: format!("{} is not a directory", path.display()),
            });
        }
        let root = path.canonicalize()?;

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| DependsError::Generic {
                message: format!("Invalid ignore pattern `{pattern}`: {e}"),
            })?;
            builder.add(glob);
        }
        let ignore = builder.build().map_err(|e| DependsError::Generic {
            message: format!("Failed to build ignore set: {e}"),
        })?;

        Ok(Self { root, ignore })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name of the root, used to name packages without a manifest name.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string())
    }

    /// Absolute path of `relative` inside the tree.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    /// Whether the top level of the tree contains a file named `name`.
    pub fn has_file(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }

    /// Every regular file below the root, sorted, skipping ignored directories.
    ///
    /// Unreadable directories are skipped with a debug log rather than failing
    /// the whole listing.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!("Skipping unreadable directory {}: {e}", dir.display());
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() {
                    let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                    if !self.ignore.is_match(relative) {
                        pending.push(path);
                    }
                } else if file_type.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        files
    }
}
