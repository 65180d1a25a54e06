use std::sync::Arc;
use std::time::Duration;

use xdeps_core::{Dependency, Package, SourceRepository};
use xdeps_ops::ops_list::{listings, ResolverStatus};
use xdeps_ops::ops_resolve::{explain, render, resolve_with, OutputFormat, ResolveRequest};
use xdeps_ops::ops_target::TargetArg;
use xdeps_resolver::{
    ensure_source, Availability, Resolution, ResolutionStore, ResolveFuture, ResolveOptions,
    Resolver, ResolverRegistry, Tier,
};

/// Serves a fixed package table; reads a root from `manifest.txt`.
struct TableResolver {
    name: &'static str,
    tier: Tier,
    availability: Availability,
    packages: Vec<Package>,
}

impl TableResolver {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            tier: Tier::Ecosystem,
            availability: Availability::available(),
            packages: Vec::new(),
        }
    }

    fn package(mut self, spec: &str, deps: &[&str]) -> Self {
        self.packages.push(
            spec.parse::<Package>()
                .unwrap()
                .with_dependencies(deps.iter().map(|d| d.parse::<Dependency>().unwrap())),
        );
        self
    }
}

impl Resolver for TableResolver {
    fn name(&self) -> &str {
        self.name
    }

    fn tier(&self) -> Tier {
        self.tier
    }

    fn is_available(&self) -> Availability {
        self.availability.clone()
    }

    fn resolves_files(&self) -> bool {
        self.tier == Tier::Fallback
    }

    fn resolve<'a>(&'a self, dep: &'a Dependency) -> ResolveFuture<'a, Vec<Package>> {
        Box::pin(async move {
            ensure_source(self, dep)?;
            Ok(self.packages.iter().filter(|p| dep.matches(p)).cloned().collect())
        })
    }

    fn can_resolve_from_source(&self, repo: &SourceRepository) -> bool {
        repo.has_file("manifest.txt")
    }

    fn resolve_from_source<'a>(
        &'a self,
        repo: &'a SourceRepository,
    ) -> ResolveFuture<'a, Option<Package>> {
        Box::pin(async move {
            let deps = std::fs::read_to_string(repo.path("manifest.txt"))?;
            Ok(Some(
                format!("{}:{}@1.0", self.name, repo.name())
                    .parse::<Package>()?
                    .with_dependencies(
                        deps.lines()
                            .map(str::parse::<Dependency>)
                            .collect::<Result<Vec<_>, _>>()?,
                    )
                    .with_source_repo(repo.root()),
            ))
        })
    }
}

fn registry() -> ResolverRegistry {
    let pip = TableResolver::new("pip")
        .package("pip:app@1.0", &["pip:rich@>=12"])
        .package("pip:rich@13.7", &["pip:pygments@*"])
        .package("pip:pygments@2.17", &[]);
    let mut ubuntu = TableResolver::new("ubuntu");
    ubuntu.tier = Tier::Fallback;
    ubuntu.availability = Availability::unavailable("dpkg not found");
    ResolverRegistry::new(vec![
        Arc::new(pip) as Arc<dyn Resolver>,
        Arc::new(ubuntu) as Arc<dyn Resolver>,
    ])
    .unwrap()
}

fn options() -> ResolveOptions {
    ResolveOptions {
        max_workers: 2,
        depth_limit: None,
        timeout: Duration::from_secs(5),
    }
}

/// Resolve against the table registry without a persistent store.
async fn run(req: &ResolveRequest) -> miette::Result<Resolution> {
    resolve_with(req, &registry(), &options(), &mut ResolutionStore::in_memory()).await
}

#[tokio::test]
async fn resolves_dependency_into_json_file() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("deps.json");
    let req = ResolveRequest {
        target: Some("pip:app".to_string()),
        output_file: Some(out.clone()),
        ..ResolveRequest::default()
    };

    let resolution = run(&req).await.unwrap();
    assert_eq!(resolution.cache.len(), 3);

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(json["roots"][0]["name"], "app");
    assert_eq!(json["packages"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn refuses_to_overwrite_without_force() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("deps.json");
    std::fs::write(&out, "keep me").unwrap();
    let mut req = ResolveRequest {
        target: Some("pip:app".to_string()),
        output_file: Some(out.clone()),
        ..ResolveRequest::default()
    };

    let err = run(&req).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "keep me");

    req.force = true;
    run(&req).await.unwrap();
    assert_ne!(std::fs::read_to_string(&out).unwrap(), "keep me");
}

#[tokio::test]
async fn unknown_resolver_prefix_is_an_error() {
    let req = ResolveRequest {
        target: Some("go:golang.org/x/net".to_string()),
        ..ResolveRequest::default()
    };

    let err = run(&req).await.unwrap_err();
    assert_eq!(err.to_string(), "`go` is not a known resolver");
}

#[tokio::test]
async fn empty_result_points_to_list() {
    let req = ResolveRequest {
        target: Some("pip:nonexistent".to_string()),
        ..ResolveRequest::default()
    };

    let err = run(&req).await.unwrap_err();
    assert!(err.to_string().contains("xdeps list"));
}

#[tokio::test]
async fn resolves_source_tree() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("manifest.txt"), "pip:rich@>=13\n").unwrap();
    let req = ResolveRequest {
        target: Some(tmp.path().display().to_string()),
        output_file: Some(tmp.path().join("out.txt")),
        format: OutputFormat::Tree,
        ..ResolveRequest::default()
    };

    let resolution = run(&req).await.unwrap();
    assert_eq!(resolution.cache.roots().count(), 1);

    let tree = std::fs::read_to_string(tmp.path().join("out.txt")).unwrap();
    assert!(tree.contains("pip:rich@13.7.0"));
    assert!(tree.contains("pip:pygments@2.17.0"));
}

#[tokio::test]
async fn dot_output_names_every_package() {
    let req = ResolveRequest {
        target: Some("pip:rich".to_string()),
        ..ResolveRequest::default()
    };
    let resolution = run(&req).await.unwrap();
    let dot = render(&resolution, OutputFormat::Dot, None).unwrap();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("pip:rich@13.7.0"));
    assert!(dot.contains("pip:pygments@2.17.0"));
}

#[tokio::test]
async fn tree_stops_at_depth_limit() {
    let req = ResolveRequest {
        target: Some("pip:app".to_string()),
        ..ResolveRequest::default()
    };
    let resolution = run(&req).await.unwrap();

    let full = render(&resolution, OutputFormat::Tree, None).unwrap();
    assert!(full.contains("pip:pygments@2.17.0"));
    let cut = render(&resolution, OutputFormat::Tree, Some(1)).unwrap();
    assert!(cut.contains("pip:rich@13.7.0"));
    assert!(!cut.contains("pygments"));
}

#[tokio::test]
async fn why_writes_the_path_to_a_package() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("why.txt");
    let req = ResolveRequest {
        target: Some("pip:app".to_string()),
        output_file: Some(out.clone()),
        why: Some("pygments".to_string()),
        ..ResolveRequest::default()
    };

    run(&req).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(&out).unwrap(),
        "Path to pygments:\npip:app@1.0.0\n  pip:rich@13.7.0\n    pip:pygments@2.17.0\n"
    );
}

#[tokio::test]
async fn why_unknown_package_is_an_error() {
    let req = ResolveRequest {
        target: Some("pip:app".to_string()),
        ..ResolveRequest::default()
    };
    let resolution = run(&req).await.unwrap();

    let err = explain(&resolution, "ubuntu:pygments").unwrap_err();
    assert_eq!(err.to_string(), "`ubuntu:pygments` is not in the resolved graph");
}

#[tokio::test]
async fn stored_answers_survive_between_runs() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("resolutions.json");
    let req = ResolveRequest {
        target: Some("pip:app".to_string()),
        output_file: Some(tmp.path().join("first.json")),
        ..ResolveRequest::default()
    };

    let mut store = ResolutionStore::open(&db).unwrap();
    resolve_with(&req, &registry(), &options(), &mut store).await.unwrap();
    assert!(db.is_file());
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&db).unwrap()).unwrap();
    assert_eq!(saved["lookups"]["pip:app@*"][0]["package"], "pip:app@1.0.0");

    // The registry no longer knows these packages; the store does.
    let empty = ResolverRegistry::new(vec![Arc::new(TableResolver::new("pip")) as Arc<dyn Resolver>]).unwrap();
    let mut reopened = ResolutionStore::open(&db).unwrap();
    let again = ResolveRequest {
        output_file: Some(tmp.path().join("second.json")),
        ..req
    };
    let resolution = resolve_with(&again, &empty, &options(), &mut reopened).await.unwrap();
    assert_eq!(resolution.cache.len(), 3);
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("first.json")).unwrap(),
        std::fs::read_to_string(tmp.path().join("second.json")).unwrap()
    );
}

#[test]
fn lists_resolver_statuses() {
    let registry = registry();

    let all = listings(&registry, None);
    assert_eq!(all[0].status, ResolverStatus::Enabled);
    assert_eq!(
        all[1].status,
        ResolverStatus::NotAvailable("dpkg not found".to_string())
    );
    assert_eq!(all[1].to_string(), "ubuntu      not available: dpkg not found");

    let empty = tempfile::tempdir().unwrap();
    let path = TargetArg::parse(&empty.path().display().to_string(), &registry).unwrap();
    assert_eq!(listings(&registry, Some(&path))[0].status, ResolverStatus::IncompatiblePath);

    std::fs::write(empty.path().join("manifest.txt"), "").unwrap();
    let path = TargetArg::parse(&empty.path().display().to_string(), &registry).unwrap();
    assert_eq!(listings(&registry, Some(&path))[0].status, ResolverStatus::Enabled);

    let spec = TargetArg::parse("pip:rich", &registry).unwrap();
    assert_eq!(listings(&registry, Some(&spec))[0].to_string(), "pip         enabled");

    let file = TargetArg::parse("ubuntu:/usr/lib/libz.so.1", &registry).unwrap();
    assert_eq!(
        listings(&registry, Some(&file))[0].status,
        ResolverStatus::IncompatibleSpecifier
    );
}
