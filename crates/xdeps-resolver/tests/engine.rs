mod common;

use std::time::Duration;

use common::{call_counts, dep, package, registry, StaticResolver};
use xdeps_core::SourceRepository;
use xdeps_resolver::diagnostics::SkipReason;
use xdeps_resolver::{resolve, resolve_stored, ResolutionStore, ResolveOptions, ResolveTarget};

fn options() -> ResolveOptions {
    ResolveOptions {
        max_workers: 4,
        depth_limit: None,
        timeout: Duration::from_secs(5),
    }
}

fn target(specs: &[&str]) -> ResolveTarget {
    ResolveTarget::Dependencies(specs.iter().map(|s| dep(s)).collect())
}

fn names(resolution: &xdeps_resolver::Resolution) -> Vec<String> {
    resolution.cache.iter().map(|p| p.to_string()).collect()
}

#[tokio::test]
async fn resolves_transitive_closure() {
    let pip = StaticResolver::new("pip")
        .package("pip:app@1.0", &["pip:requests@>=2"])
        .package("pip:requests@2.31", &["pip:urllib3@<3"])
        .package("pip:requests@1.0", &[])
        .package("pip:urllib3@2.0", &[]);
    let registry = registry(vec![pip]);

    let resolution = resolve(target(&["pip:app"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(
        names(&resolution),
        vec!["pip:app@1.0.0", "pip:requests@2.31.0", "pip:urllib3@2.0.0"]
    );
    let roots: Vec<String> = resolution.cache.roots().map(|r| r.to_string()).collect();
    assert_eq!(roots, vec!["pip:app@1.0.0"]);
    assert!(resolution.report.is_empty());
}

#[tokio::test]
async fn cyclic_graph_terminates() {
    let npm = StaticResolver::new("npm")
        .package("npm:a@1.0.0", &["npm:b"])
        .package("npm:b@1.0.0", &["npm:a"]);
    let calls = npm.calls();
    let registry = registry(vec![npm]);

    let resolution = resolve(target(&["npm:a"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(resolution.cache.len(), 2);
    let a = resolution.cache.lookup("npm", "a").next().unwrap();
    let b = resolution.cache.lookup("npm", "b").next().unwrap();
    assert!(a.dependencies().contains(&dep("npm:b")));
    assert!(b.dependencies().contains(&dep("npm:a")));
    let edges = resolution.result().packages;
    assert!(edges.iter().all(|p| p.dependencies[0].resolved.len() == 1));
    let counts = call_counts(&calls);
    assert_eq!(counts.get("resolve npm:a@*"), Some(&1));
    assert_eq!(counts.get("resolve npm:b@*"), Some(&1));
}

#[tokio::test]
async fn shared_dependency_is_dispatched_once() {
    let pip = StaticResolver::new("pip")
        .package("pip:a@1.0", &["pip:six"])
        .package("pip:b@1.0", &["pip:six"])
        .package("pip:six@1.16", &[]);
    let calls = pip.calls();
    let registry = registry(vec![pip]);

    resolve(target(&["pip:a", "pip:b"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(call_counts(&calls).get("resolve pip:six@*"), Some(&1));
}

#[tokio::test]
async fn unknown_source_goes_to_fallback() {
    let ubuntu = StaticResolver::fallback("ubuntu").package("ubuntu:zlib1g@1.2.11", &[]);
    let pip = StaticResolver::new("pip").package("pip:app@1.0", &["go:zlib1g"]);
    let registry = registry(vec![ubuntu, pip]);

    let resolution = resolve(target(&["pip:app"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(resolution.cache.len(), 2);
    assert!(resolution.cache.contains(&dep("go:zlib1g")));
    let result = resolution.result();
    let app = &result.packages[0];
    assert_eq!(app.dependencies[0].resolved.len(), 1);
    assert!(result.skipped.is_empty());
}

#[tokio::test]
async fn file_dependency_goes_to_fallback() {
    let ubuntu = StaticResolver::fallback("ubuntu").package(
        "ubuntu:/usr/lib/libz.so.1@0.0.0",
        &["ubuntu:zlib1g"],
    )
    .package("ubuntu:zlib1g@1.2.11", &[]);
    let native = StaticResolver::new("native").package("native:tool@1.0", &["native:/usr/lib/libz.so.1"]);
    let registry = registry(vec![native, ubuntu]);

    let resolution = resolve(target(&["native:tool"]), &registry, &options())
        .await
        .unwrap();

    assert!(resolution.cache.contains(&dep("ubuntu:zlib1g")));
    assert!(resolution.cache.contains(&dep("native:/usr/lib/libz.so.1")));
}

#[tokio::test]
async fn claimed_source_never_reaches_fallback() {
    let ubuntu = StaticResolver::fallback("ubuntu").package("ubuntu:numpy@1.0", &[]);
    let ubuntu_calls = ubuntu.calls();
    let pip = StaticResolver::new("pip").package("pip:numpy@1.26", &[]);
    let registry = registry(vec![pip, ubuntu]);

    let resolution = resolve(target(&["pip:numpy"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(names(&resolution), vec!["pip:numpy@1.26.0"]);
    assert!(ubuntu_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn worker_count_does_not_change_the_graph() {
    let build = || {
        StaticResolver::new("pip")
            .package("pip:app@1.0", &["pip:a", "pip:b", "pip:c"])
            .package("pip:a@1.0", &["pip:shared", "pip:d"])
            .package("pip:b@1.0", &["pip:shared"])
            .package("pip:c@1.0", &["pip:d@>=2"])
            .package("pip:d@1.0", &[])
            .package("pip:d@2.0", &["pip:a"])
            .package("pip:shared@0.1", &[])
    };
    let serial = ResolveOptions {
        max_workers: 1,
        ..options()
    };

    let one = resolve(target(&["pip:app"]), &registry(vec![build()]), &serial)
        .await
        .unwrap();
    let four = resolve(target(&["pip:app"]), &registry(vec![build()]), &options())
        .await
        .unwrap();

    assert_eq!(names(&one), names(&four));
    assert_eq!(one.result(), four.result());
    assert_eq!(one.cache.len(), 7);
}

#[tokio::test]
async fn invalid_requirement_is_reported_as_skipped_branch() {
    let pip = StaticResolver::new("pip")
        .package("pip:scipy@1.0", &["pip:six"])
        .invalid_edge("numpy", "numpy>=abc", "`abc` is not a version")
        .package("pip:six@1.16", &[]);
    let registry = registry(vec![pip]);

    let resolution = resolve(target(&["pip:scipy"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(resolution.cache.len(), 2);
    assert_eq!(resolution.report.skipped.len(), 1);
    let skipped = &resolution.report.skipped[0];
    assert_eq!(skipped.dependency, dep("pip:numpy"));
    assert_eq!(
        skipped.reason,
        SkipReason::InvalidConstraint {
            required_by: "pip:scipy@1.0.0".to_string(),
            requirement: "numpy>=abc".to_string(),
            message: "`abc` is not a version".to_string(),
        }
    );
    assert_eq!(resolution.result().skipped.len(), 1);
}

#[tokio::test]
async fn unavailable_resolver_is_skipped_without_fallback() {
    let ubuntu = StaticResolver::fallback("ubuntu").package("ubuntu:numpy@1.0", &[]);
    let ubuntu_calls = ubuntu.calls();
    let pip = StaticResolver::new("pip")
        .package("pip:numpy@1.26", &[])
        .unavailable("python3 not found");
    let registry = registry(vec![pip, ubuntu]);

    let resolution = resolve(target(&["pip:numpy"]), &registry, &options())
        .await
        .unwrap();

    assert!(resolution.is_empty());
    assert!(ubuntu_calls.lock().unwrap().is_empty());
    assert_eq!(resolution.report.skipped.len(), 1);
    assert_eq!(
        resolution.report.skipped[0].reason,
        SkipReason::Unavailable("python3 not found".to_string())
    );
    assert_eq!(
        resolution.report.unavailable.get("pip").map(String::as_str),
        Some("python3 not found")
    );
}

#[tokio::test]
async fn no_fallback_reports_no_resolver() {
    let pip = StaticResolver::new("pip").package("pip:app@1.0", &["cargo:serde"]);
    let registry = registry(vec![pip]);

    let resolution = resolve(target(&["pip:app"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(resolution.cache.len(), 1);
    assert_eq!(resolution.report.skipped[0].dependency, dep("cargo:serde"));
    assert_eq!(resolution.report.skipped[0].reason, SkipReason::NoResolver);
}

#[tokio::test]
async fn backend_failure_is_isolated() {
    let pip = StaticResolver::new("pip")
        .package("pip:app@1.0", &["pip:broken", "pip:fine"])
        .package("pip:fine@1.0", &[])
        .failing("broken");
    let registry = registry(vec![pip]);

    let resolution = resolve(target(&["pip:app"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(resolution.cache.len(), 2);
    assert_eq!(resolution.report.skipped.len(), 1);
    let skipped = &resolution.report.skipped[0];
    assert_eq!(skipped.dependency, dep("pip:broken"));
    assert!(matches!(&skipped.reason, SkipReason::Failed(msg) if msg.contains("500")));
}

#[tokio::test]
async fn slow_resolver_times_out() {
    let npm = StaticResolver::new("npm")
        .package("npm:slow@1.0.0", &[])
        .delayed(Duration::from_secs(10));
    let registry = registry(vec![npm]);
    let opts = ResolveOptions {
        timeout: Duration::from_millis(50),
        ..options()
    };

    let resolution = resolve(target(&["npm:slow"]), &registry, &opts)
        .await
        .unwrap();

    assert!(resolution.is_empty());
    assert_eq!(resolution.report.skipped[0].reason, SkipReason::TimedOut(0));
}

#[tokio::test]
async fn unmatched_constraint_is_unresolved() {
    let cargo = StaticResolver::new("cargo").package("cargo:serde@1.0.190", &[]);
    let registry = registry(vec![cargo]);

    let resolution = resolve(target(&["cargo:serde@>=2"]), &registry, &options())
        .await
        .unwrap();

    assert!(resolution.is_empty());
    assert_eq!(resolution.report.skipped[0].reason, SkipReason::Unresolved);
}

#[tokio::test]
async fn depth_limit_stops_expansion() {
    let pip = StaticResolver::new("pip")
        .package("pip:a@1.0", &["pip:b"])
        .package("pip:b@1.0", &["pip:c"])
        .package("pip:c@1.0", &[]);
    let registry = registry(vec![pip]);
    let opts = ResolveOptions {
        depth_limit: Some(1),
        ..options()
    };

    let resolution = resolve(target(&["pip:a"]), &registry, &opts).await.unwrap();

    assert_eq!(names(&resolution), vec!["pip:a@1.0.0", "pip:b@1.0.0"]);
    assert_eq!(resolution.report.skipped[0].dependency, dep("pip:c"));
    assert_eq!(resolution.report.skipped[0].reason, SkipReason::DepthLimit(1));
}

#[tokio::test]
async fn augmentation_is_idempotent() {
    let pip = StaticResolver::new("pip")
        .package("pip:a@1.0", &["pip:b"])
        .package("pip:b@1.0", &[]);
    let ubuntu = StaticResolver::fallback("ubuntu")
        .package("ubuntu:libc6@2.35", &[])
        .augmenting(&["ubuntu:libc6"]);
    let calls = ubuntu.calls();
    let registry = registry(vec![pip, ubuntu]);

    let resolution = resolve(target(&["pip:a"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(resolution.cache.len(), 3);
    for p in resolution.cache.lookup("pip", "a").chain(resolution.cache.lookup("pip", "b")) {
        assert_eq!(p.dependencies().iter().filter(|d| d.source() == "ubuntu").count(), 1);
    }
    let counts = call_counts(&calls);
    assert_eq!(counts.get("augment pip:a@1.0.0"), Some(&1));
    assert_eq!(counts.get("augment pip:b@1.0.0"), Some(&1));
    assert_eq!(counts.get("augment ubuntu:libc6@2.35.0"), None);
    assert_eq!(counts.get("resolve ubuntu:libc6@*"), Some(&1));
}

#[tokio::test]
async fn cache_only_grows_across_levels() {
    let pip = StaticResolver::new("pip")
        .package("pip:a@1.0", &["pip:b"])
        .package("pip:a@2.0", &["pip:c"])
        .package("pip:b@1.0", &[])
        .package("pip:c@1.0", &[]);
    let registry = registry(vec![pip]);

    let resolution = resolve(target(&["pip:a"]), &registry, &options())
        .await
        .unwrap();

    assert_eq!(resolution.cache.len(), 4);
    assert_eq!(resolution.cache.roots().count(), 2);
}

#[tokio::test]
async fn repository_target_seeds_root_from_source() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = SourceRepository::open(tmp.path()).unwrap();
    let npm = StaticResolver::new("npm")
        .source_root("npm:my-app@0.1.0", &["npm:left-pad@^1.0.0"])
        .package("npm:left-pad@1.3.0", &[]);
    let registry = registry(vec![npm]);

    let resolution = resolve(ResolveTarget::Repository(repo), &registry, &options())
        .await
        .unwrap();

    let roots: Vec<String> = resolution.cache.roots().map(|r| r.to_string()).collect();
    assert_eq!(roots, vec!["npm:my-app@0.1.0"]);
    assert!(resolution.cache.contains(&dep("npm:left-pad@^1.0.0")));
}

#[tokio::test]
async fn repository_without_applicable_resolver_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = SourceRepository::open(tmp.path()).unwrap();
    let registry = registry(vec![StaticResolver::new("pip")]);

    let resolution = resolve(repo.into(), &registry, &options()).await.unwrap();
    assert!(resolution.is_empty());
}

#[tokio::test]
async fn stored_answers_skip_the_resolver() {
    let build = || {
        StaticResolver::new("pip")
            .package("pip:app@1.0", &["pip:six"])
            .package("pip:six@1.16", &[])
    };
    let mut store = ResolutionStore::in_memory();

    let first = build();
    let first_calls = first.calls();
    let fresh = resolve_stored(target(&["pip:app"]), &registry(vec![first]), &options(), &mut store)
        .await
        .unwrap();
    assert_eq!(first_calls.lock().unwrap().len(), 2);
    assert_eq!(store.len(), 2);

    let second = build();
    let second_calls = second.calls();
    let replayed = resolve_stored(target(&["pip:app"]), &registry(vec![second]), &options(), &mut store)
        .await
        .unwrap();
    assert!(second_calls.lock().unwrap().is_empty());
    assert_eq!(fresh.result(), replayed.result());
}

#[tokio::test]
async fn failures_are_not_stored() {
    let pip = StaticResolver::new("pip")
        .package("pip:app@1.0", &["pip:broken"])
        .failing("broken");
    let mut store = ResolutionStore::in_memory();

    resolve_stored(target(&["pip:app"]), &registry(vec![pip]), &options(), &mut store)
        .await
        .unwrap();

    assert!(store.get(&dep("pip:app")).is_some());
    assert!(store.get(&dep("pip:broken")).is_none());
}

#[test]
fn static_package_helper_parses() {
    let p = package("pip:x@1.2.3", &["pip:y@>=1"]);
    assert_eq!(p.dependencies().len(), 1);
}
