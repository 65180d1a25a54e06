//! Dependency edges as declared by registry metadata or a manifest.

use std::collections::BTreeSet;

use xdeps_core::{Dependency, InvalidEdge, Package};

/// The edges one package declares, split by whether their requirement parsed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeclaredEdges {
    pub dependencies: BTreeSet<Dependency>,
    pub invalid: BTreeSet<InvalidEdge>,
}

impl DeclaredEdges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dep: Dependency) {
        self.dependencies.insert(dep);
    }

    pub fn reject(&mut self, edge: InvalidEdge) {
        tracing::debug!("Dropping edge {edge}");
        self.invalid.insert(edge);
    }

    pub fn extend(&mut self, other: DeclaredEdges) {
        self.dependencies.extend(other.dependencies);
        self.invalid.extend(other.invalid);
    }

    /// `package` with these edges added to it.
    pub fn attach(&self, package: Package) -> Package {
        package
            .with_dependencies(self.dependencies.iter().cloned())
            .with_invalid_edges(self.invalid.iter().cloned())
    }
}
