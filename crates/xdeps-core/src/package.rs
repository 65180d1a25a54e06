//! Dependency requests and resolved packages: the nodes and edges of the graph.
//!
//! Both have a canonical text form, `source:name@constraint` for a
//! [`Dependency`] and `source:name@version` for a [`Package`], which is the
//! interchange format for the CLI and test fixtures.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Serialize, Serializer};
use xdeps_util::errors::DependsError;

use crate::version::{Constraint, Version};

/// What a dependency asks for: a package by name, or the package that owns a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackageRef {
    Named(String),
    /// An absolute filesystem path, typically a shared library a binary links against.
    File(PathBuf),
}

impl PackageRef {
    /// Classify a raw name. Absolute paths become [`PackageRef::File`].
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with('/') {
            PackageRef::File(PathBuf::from(raw))
        } else {
            PackageRef::Named(raw.to_string())
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        match self {
            PackageRef::Named(name) => Cow::Borrowed(name),
            PackageRef::File(path) => path.to_string_lossy(),
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            PackageRef::Named(_) => None,
            PackageRef::File(path) => Some(path),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, PackageRef::File(_))
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl Serialize for PackageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

/// Split `source:name@suffix` into its three parts.
///
/// A scoped npm name (`@scope/name`) starts with `@` itself, so the
/// separator is searched for after that leading character.
fn split_spec(input: &str) -> Result<(&str, &str, Option<&str>), DependsError> {
    let err = |message: &str| DependsError::DependencyParse {
        input: input.to_string(),
        message: message.to_string(),
    };

    let (source, rest) = input
        .split_once(':')
        .ok_or_else(|| err("missing `SOURCE:` prefix"))?;
    if source.is_empty()
        || !source
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(err("invalid source name"));
    }

    let scoped = rest.starts_with('@')
        && rest[1..].split('@').next().is_some_and(|n| n.contains('/'));
    let at = rest
        .char_indices()
        .skip(usize::from(scoped))
        .find(|&(_, c)| c == '@')
        .map(|(i, _)| i);
    let (name, suffix) = match at {
        Some(i) => (&rest[..i], Some(&rest[i + 1..])),
        None => (rest, None),
    };
    if name.is_empty() {
        return Err(err("missing package name"));
    }
    Ok((source, name, suffix))
}

/// A request for any package of one ecosystem matching a name and a constraint.
///
/// Identity is `(source, package, constraint)`. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Dependency {
    source: String,
    package: PackageRef,
    constraint: Constraint,
}

impl Dependency {
    pub fn new(source: impl Into<String>, package: PackageRef, constraint: Constraint) -> Self {
        Self {
            source: source.into(),
            package,
            constraint,
        }
    }

    /// A dependency on a named package.
    ///
    /// A name with a leading `/` is classified the way the text form would
    /// parse it, as a [`PackageRef::File`].
    pub fn named(source: impl Into<String>, name: impl Into<String>, constraint: Constraint) -> Self {
        Self::new(source, PackageRef::parse(&name.into()), constraint)
    }

    /// A dependency on whatever package owns `path`.
    pub fn file(source: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::new(source, PackageRef::File(path.into()), Constraint::any())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn package(&self) -> &PackageRef {
        &self.package
    }

    pub fn name(&self) -> Cow<'_, str> {
        self.package.name()
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// The same request addressed to another ecosystem.
    pub fn with_source(&self, source: impl Into<String>) -> Self {
        Self::new(source, self.package.clone(), self.constraint.clone())
    }

    /// Whether `package` satisfies this request.
    pub fn matches(&self, package: &Package) -> bool {
        self.source == package.source
            && self.package.name() == package.name.as_str()
            && self.constraint.matches(&package.version)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.source, self.package, self.constraint)
    }
}

impl FromStr for Dependency {
    type Err = DependsError;

    /// Parse `SOURCE:NAME[@CONSTRAINT]`; a missing constraint means `*`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, name, constraint) = split_spec(s.trim())?;
        let constraint = match constraint {
            Some(raw) => Constraint::parse(raw)?,
            None => Constraint::any(),
        };
        Ok(Self::new(source, PackageRef::parse(name), constraint))
    }
}

/// The identity triple of a resolved package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PackageId {
    pub source: String,
    pub name: String,
    pub version: Version,
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.source, self.name, self.version)
    }
}

/// A declared dependency whose requirement text could not be turned into a
/// [`Dependency`]. The edge is left out of the graph and reported instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InvalidEdge {
    pub source: String,
    pub name: String,
    /// The requirement as the ecosystem published it.
    pub requirement: String,
    pub message: String,
}

impl InvalidEdge {
    pub fn new(
        source: impl Into<String>,
        name: impl Into<String>,
        requirement: impl Into<String>,
        error: impl fmt::Display,
    ) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            requirement: requirement.into(),
            message: error.to_string(),
        }
    }

    /// The unconstrained request this edge would have produced.
    pub fn dependency(&self) -> Dependency {
        Dependency::named(self.source.as_str(), self.name.as_str(), Constraint::any())
    }
}

impl fmt::Display for InvalidEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} `{}`: {}", self.source, self.name, self.requirement, self.message)
    }
}

/// One concrete, versioned artifact and the dependencies it declares.
///
/// Identity is `(source, name, version)`; two packages with the same identity
/// are the same graph node even when their dependency sets differ.
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    source: String,
    name: String,
    version: Version,
    dependencies: BTreeSet<Dependency>,
    /// Project tree this package was read from, for packages seeded from source.
    #[serde(skip)]
    source_repo: Option<PathBuf>,
    /// Declared edges dropped because their requirement did not parse.
    #[serde(skip)]
    invalid_edges: BTreeSet<InvalidEdge>,
}

impl Package {
    pub fn new(source: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            version,
            dependencies: BTreeSet::new(),
            source_repo: None,
            invalid_edges: BTreeSet::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = Dependency>) -> Self {
        self.dependencies.extend(deps);
        self
    }

    pub fn with_source_repo(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_repo = Some(root.into());
        self
    }

    pub fn with_invalid_edges(mut self, edges: impl IntoIterator<Item = InvalidEdge>) -> Self {
        self.invalid_edges.extend(edges);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn dependencies(&self) -> &BTreeSet<Dependency> {
        &self.dependencies
    }

    pub fn source_repo(&self) -> Option<&Path> {
        self.source_repo.as_deref()
    }

    pub fn invalid_edges(&self) -> &BTreeSet<InvalidEdge> {
        &self.invalid_edges
    }

    pub fn id(&self) -> PackageId {
        PackageId {
            source: self.source.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Union `deps` into this package's dependency set.
    ///
    /// Returns the dependencies that were not present before, so callers can
    /// expand the graph by exactly the new edges.
    pub fn merge_dependencies<'a>(
        &mut self,
        deps: impl IntoIterator<Item = &'a Dependency>,
    ) -> Vec<Dependency> {
        let mut added = Vec::new();
        for dep in deps {
            if self.dependencies.insert(dep.clone()) {
                added.push(dep.clone());
            }
        }
        added
    }

    fn identity(&self) -> (&str, &str, &Version) {
        (&self.source, &self.name, &self.version)
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.source, self.name, self.version)
    }
}

impl FromStr for Package {
    type Err = DependsError;

    /// Parse `SOURCE:NAME@VERSION`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, name, version) = split_spec(s.trim())?;
        let version = version.ok_or_else(|| DependsError::DependencyParse {
            input: s.to_string(),
            message: "missing `@VERSION`".to_string(),
        })?;
        Ok(Self::new(source, name, Version::parse(version)?))
    }
}
