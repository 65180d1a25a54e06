mod common;

use std::sync::Arc;

use common::{dep, StaticResolver};
use xdeps_resolver::{Availability, Resolver, ResolverRegistry, Tier};
use xdeps_util::errors::DependsError;

fn arc(r: StaticResolver) -> Arc<dyn Resolver> {
    Arc::new(r)
}

#[test]
fn fallback_sorts_last() {
    let registry = ResolverRegistry::new(vec![
        arc(StaticResolver::fallback("ubuntu")),
        arc(StaticResolver::new("pip")),
        arc(StaticResolver::new("cargo")),
        arc(StaticResolver::new("zz-last-alphabetically")),
    ])
    .unwrap();

    assert_eq!(
        registry.names(),
        vec!["cargo", "pip", "zz-last-alphabetically", "ubuntu"]
    );
    assert_eq!(registry.fallback().map(|r| r.name()), Some("ubuntu"));
    assert_eq!(registry.resolvers()[3].tier(), Tier::Fallback);
}

#[test]
fn duplicate_names_are_rejected() {
    let err = ResolverRegistry::new(vec![
        arc(StaticResolver::new("pip")),
        arc(StaticResolver::new("pip")),
    ])
    .unwrap_err();
    assert!(matches!(err, DependsError::Fatal { .. }));
    assert!(err.is_fatal());
}

#[test]
fn lookup_by_name() {
    let registry = ResolverRegistry::new(vec![arc(StaticResolver::new("npm"))]).unwrap();
    assert!(registry.contains("npm"));
    assert!(registry.by_name("npm").is_ok());
    let err = registry.by_name("go").err().unwrap();
    assert_eq!(err.to_string(), "`go` is not a known resolver");
    assert!(registry.fallback().is_none());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn resolver_rejects_foreign_source() {
    let npm = StaticResolver::new("npm");
    let err = npm.resolve(&dep("pip:requests")).await.unwrap_err();
    assert!(matches!(err, DependsError::UnsupportedSource { .. }));
    assert!(err.to_string().contains("cannot resolve dependencies from other sources"));
}

#[test]
fn claimant_follows_dispatch_routing() {
    let registry = ResolverRegistry::new(vec![
        arc(StaticResolver::new("pip")),
        arc(StaticResolver::fallback("ubuntu")),
    ])
    .unwrap();
    let claimant = |spec: &str| registry.claimant(&dep(spec)).map(|r| r.name().to_string());

    assert_eq!(claimant("pip:requests").as_deref(), Some("pip"));
    assert_eq!(claimant("pip:/usr/lib/libz.so.1").as_deref(), Some("ubuntu"));
    assert_eq!(claimant("go:golang.org/x/net").as_deref(), Some("ubuntu"));

    let no_fallback = ResolverRegistry::new(vec![arc(StaticResolver::new("pip"))]).unwrap();
    assert!(no_fallback.claimant(&dep("go:golang.org/x/net")).is_none());
}

#[test]
fn unmet_precondition_is_a_resolver_unavailable_error() {
    assert!(Availability::available().check("pip").is_ok());

    let err = StaticResolver::fallback("ubuntu")
        .unavailable("apt-cache not found")
        .is_available()
        .check("ubuntu")
        .unwrap_err();
    assert!(matches!(
        &err,
        DependsError::ResolverUnavailable { name, reason }
            if name == "ubuntu" && reason == "apt-cache not found"
    ));
    assert!(!err.is_fatal());
}
