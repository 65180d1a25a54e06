//! Operation: list resolvers and whether each can handle a target.

use std::fmt;

use serde::Serialize;
use xdeps_core::Dependency;
use xdeps_resolver::{Resolver, ResolverRegistry};

use crate::ops_target::TargetArg;

/// Width of the name column in `xdeps list` output.
const NAME_WIDTH: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum ResolverStatus {
    Enabled,
    NotAvailable(String),
    IncompatiblePath,
    IncompatibleSpecifier,
}

impl fmt::Display for ResolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolverStatus::Enabled => f.write_str("enabled"),
            ResolverStatus::NotAvailable(reason) => write!(f, "not available: {reason}"),
            ResolverStatus::IncompatiblePath => f.write_str("incompatible with this path"),
            ResolverStatus::IncompatibleSpecifier => {
                f.write_str("incompatible with this package specifier")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolverListing {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub status: ResolverStatus,
}

impl fmt::Display for ResolverListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<NAME_WIDTH$}{}", self.name, self.status)
    }
}

/// Status of every resolver in `registry`, in consultation order.
pub fn listings(registry: &ResolverRegistry, target: Option<&TargetArg>) -> Vec<ResolverListing> {
    registry
        .resolvers()
        .iter()
        .map(|resolver| ResolverListing {
            name: resolver.name().to_string(),
            description: resolver.description().to_string(),
            status: status(registry, resolver.as_ref(), target),
        })
        .collect()
}

fn status(registry: &ResolverRegistry, resolver: &dyn Resolver, target: Option<&TargetArg>) -> ResolverStatus {
    let availability = resolver.is_available();
    if let Some(reason) = availability.reason() {
        return ResolverStatus::NotAvailable(reason.to_string());
    }
    match target {
        None => ResolverStatus::Enabled,
        Some(TargetArg::Path(repo)) if resolver.can_resolve_from_source(repo) => ResolverStatus::Enabled,
        Some(TargetArg::Path(_)) => ResolverStatus::IncompatiblePath,
        Some(TargetArg::Dependency(dep)) if claims(registry, resolver, dep) => ResolverStatus::Enabled,
        Some(TargetArg::Dependency(_)) => ResolverStatus::IncompatibleSpecifier,
    }
}

fn claims(registry: &ResolverRegistry, resolver: &dyn Resolver, dep: &Dependency) -> bool {
    registry
        .claimant(dep)
        .is_some_and(|claimant| claimant.name() == resolver.name())
}

/// Print the resolver table for `target` (all resolvers when `None`).
pub fn list(target: Option<&str>, registry: &ResolverRegistry, verbose: bool) -> miette::Result<()> {
    let target = target
        .map(|raw| TargetArg::parse(raw, registry))
        .transpose()?;
    for listing in listings(registry, target.as_ref()) {
        if verbose && !listing.description.is_empty() {
            println!("{listing}\n{:NAME_WIDTH$}{}", "", listing.description);
        } else {
            println!("{listing}");
        }
    }
    Ok(())
}
