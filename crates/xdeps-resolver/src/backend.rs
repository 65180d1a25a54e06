//! The capability contract every ecosystem backend implements.
//!
//! Defines the [`Resolver`] trait and its supporting types. The engine only
//! ever talks to backends through this trait, so adding an ecosystem means
//! implementing `Resolver` and registering it in a
//! [`ResolverRegistry`](crate::registry::ResolverRegistry).

use futures_util::future::BoxFuture;
use xdeps_core::{Dependency, Package, SourceRepository};
use xdeps_util::errors::DependsError;

/// Future returned by the asynchronous resolver hooks.
pub type ResolveFuture<'a, T> = BoxFuture<'a, Result<T, DependsError>>;

/// Ordering tier of a resolver. Lower tiers are consulted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// A language or project ecosystem (registries, manifests).
    Ecosystem,
    /// The OS-level package database, used only when nothing else claims a dependency.
    Fallback,
}

/// Result of a resolver's local precondition check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    reason: Option<String>,
}

impl Availability {
    pub fn available() -> Self {
        Self { reason: None }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.reason.is_none()
    }

    /// Why the resolver cannot run, if it cannot.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Turn an unmet precondition of resolver `name` into an error.
    pub fn check(&self, name: &str) -> Result<(), DependsError> {
        match self.reason {
            Some(ref reason) => Err(DependsError::ResolverUnavailable {
                name: name.to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Trait implemented by each ecosystem backend.
pub trait Resolver: Send + Sync {
    /// Unique ecosystem identifier, matched against [`Dependency::source`].
    fn name(&self) -> &str;

    /// One-line description shown by `xdeps list`.
    fn description(&self) -> &str {
        ""
    }

    fn tier(&self) -> Tier {
        Tier::Ecosystem
    }

    /// Check local preconditions (tools installed, OS matches).
    fn is_available(&self) -> Availability;

    /// Produce every known package version matching `dep`.
    ///
    /// Fails with [`DependsError::UnsupportedSource`] when `dep.source()` is
    /// not this resolver's name. Must give consistent results when called
    /// repeatedly for the same dependency.
    fn resolve<'a>(&'a self, dep: &'a Dependency) -> ResolveFuture<'a, Vec<Package>>;

    /// Whether [`PackageRef::File`](xdeps_core::PackageRef::File) targets can be
    /// resolved by this backend.
    fn resolves_files(&self) -> bool {
        false
    }

    /// Whether a root package can be read directly from `repo`.
    fn can_resolve_from_source(&self, _repo: &SourceRepository) -> bool {
        false
    }

    /// Read the root package of `repo`, or `None` when not applicable.
    fn resolve_from_source<'a>(
        &'a self,
        _repo: &'a SourceRepository,
    ) -> ResolveFuture<'a, Option<Package>> {
        Box::pin(async { Ok(None) })
    }

    /// Whether this resolver can add edges to a package found by another resolver.
    fn can_update_dependencies(&self, _package: &Package) -> bool {
        false
    }

    /// Return `package` with extra dependencies merged in.
    ///
    /// Must be idempotent: the merge is a set union, so augmenting an
    /// already-augmented package adds nothing.
    fn update_dependencies<'a>(&'a self, package: &'a Package) -> ResolveFuture<'a, Package> {
        Box::pin(async move { Ok(package.clone()) })
    }
}

/// Reject a dependency addressed to another ecosystem.
pub fn ensure_source<R: Resolver + ?Sized>(
    resolver: &R,
    dep: &Dependency,
) -> Result<(), DependsError> {
    if dep.source() == resolver.name() {
        Ok(())
    } else {
        Err(DependsError::UnsupportedSource {
            resolver: resolver.name().to_string(),
            dependency: dep.to_string(),
        })
    }
}
