//! Interpretation of the `PATH_OR_DEP` argument shared by `resolve` and `list`.

use std::fmt;
use std::path::Path;

use xdeps_core::{Dependency, SourceRepository};
use xdeps_resolver::{ResolveTarget, ResolverRegistry};
use xdeps_util::errors::DependsError;

/// What the user asked about: a source tree on disk, or a single dependency.
#[derive(Debug, Clone)]
pub enum TargetArg {
    Path(SourceRepository),
    Dependency(Dependency),
}

impl TargetArg {
    /// Classify `raw`.
    ///
    /// An existing path always wins. Otherwise `raw` must be a dependency
    /// specifier whose source names a registered resolver.
    pub fn parse(raw: &str, registry: &ResolverRegistry) -> miette::Result<Self> {
        let path = Path::new(raw);
        if path.exists() {
            return Ok(TargetArg::Path(SourceRepository::open(path)?));
        }

        let dep: Dependency = raw.parse().map_err(|e| DependsError::Generic {
            message: format!("`{raw}` is not an existing path or a dependency specifier: {e}"),
        })?;
        if !registry.contains(dep.source()) {
            return Err(DependsError::ResolverNotFound {
                name: dep.source().to_string(),
            }
            .into());
        }
        Ok(TargetArg::Dependency(dep))
    }
}

impl fmt::Display for TargetArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetArg::Path(repo) => write!(f, "{}", repo.root().display()),
            TargetArg::Dependency(dep) => write!(f, "{dep}"),
        }
    }
}

impl From<TargetArg> for ResolveTarget {
    fn from(target: TargetArg) -> Self {
        match target {
            TargetArg::Path(repo) => ResolveTarget::Repository(repo),
            TargetArg::Dependency(dep) => ResolveTarget::Dependencies(vec![dep]),
        }
    }
}
