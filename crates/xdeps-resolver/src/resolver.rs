//! Core resolution algorithm: level-by-level expansion of dependencies over
//! every registered resolver, then augmentation rounds until a fixed point.
//!
//! Work for one depth level is fetched concurrently (bounded by
//! [`ResolveOptions::max_workers`]) and applied to the cache in a stable
//! order once the whole level has returned. A dependency is dispatched at
//! most once per run, which is what makes cyclic graphs terminate.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use xdeps_core::config::ResolveConfig;
use xdeps_core::{Dependency, Package, PackageId, SourceRepository};
use xdeps_util::errors::DependsError;

use crate::backend::{Availability, Resolver};
use crate::cache::{PackageCache, ResolutionResult, VisitedSet};
use crate::diagnostics::{ResolutionReport, SkipReason};
use crate::registry::ResolverRegistry;
use crate::store::ResolutionStore;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Knobs for one resolution run.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Upper bound on concurrently running resolver calls.
    pub max_workers: usize,
    /// Number of levels to expand beyond the roots; `None` is unbounded.
    pub depth_limit: Option<usize>,
    /// Time budget for a single resolver call.
    pub timeout: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            depth_limit: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ResolveOptions {
    pub fn from_config(config: &ResolveConfig) -> Self {
        Self {
            max_workers: config.jobs.max(1),
            depth_limit: config.depth_limit,
            timeout: config.timeout(),
        }
    }
}

/// What to start resolving from.
#[derive(Debug, Clone)]
pub enum ResolveTarget {
    Dependencies(Vec<Dependency>),
    Repository(SourceRepository),
}

impl From<Dependency> for ResolveTarget {
    fn from(dep: Dependency) -> Self {
        ResolveTarget::Dependencies(vec![dep])
    }
}

impl From<SourceRepository> for ResolveTarget {
    fn from(repo: SourceRepository) -> Self {
        ResolveTarget::Repository(repo)
    }
}

/// The output of a resolution run.
#[derive(Debug)]
pub struct Resolution {
    pub cache: PackageCache,
    pub report: ResolutionReport,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Serializable graph including the skipped branches.
    pub fn result(&self) -> ResolutionResult {
        let mut result = self.cache.to_result();
        result.skipped = self.report.skipped.clone();
        result
    }
}

enum Outcome {
    Resolved {
        dep: Dependency,
        result: Result<Vec<Package>, DependsError>,
    },
    Augmented {
        resolver: String,
        package: PackageId,
        result: Result<Package, DependsError>,
    },
}

impl Outcome {
    fn sort_key(&self) -> String {
        match self {
            Outcome::Resolved { dep, .. } => dep.to_string(),
            Outcome::Augmented {
                resolver, package, ..
            } => format!("{resolver} {package}"),
        }
    }
}

/// Resolve the transitive closure of `target` over every resolver in `registry`.
///
/// Individual backend failures and timeouts never abort the run; they are
/// recorded in [`Resolution::report`]. Only internal inconsistencies
/// (see [`DependsError::is_fatal`]) are returned as errors.
pub async fn resolve(
    target: ResolveTarget,
    registry: &ResolverRegistry,
    options: &ResolveOptions,
) -> miette::Result<Resolution> {
    resolve_stored(target, registry, options, &mut ResolutionStore::in_memory()).await
}

/// Like [`resolve`], answering dependencies found in `store` without calling
/// their resolver and recording every new answer into it.
///
/// The caller decides whether to [`ResolutionStore::save`] afterwards.
pub async fn resolve_stored(
    target: ResolveTarget,
    registry: &ResolverRegistry,
    options: &ResolveOptions,
    store: &mut ResolutionStore,
) -> miette::Result<Resolution> {
    let mut engine = Engine::new(registry, options, std::mem::take(store));
    let outcome = engine.start(target).await;
    *store = std::mem::take(&mut engine.store);
    outcome?;
    Ok(engine.finish())
}

struct Engine<'r> {
    registry: &'r ResolverRegistry,
    options: ResolveOptions,
    semaphore: Arc<Semaphore>,
    cache: PackageCache,
    report: ResolutionReport,
    visited: VisitedSet,
    /// Pending dependencies keyed by depth; the shallowest level runs first.
    frontier: BTreeMap<usize, Vec<Dependency>>,
    depths: HashMap<PackageId, usize>,
    availability: HashMap<String, Availability>,
    augmented: HashSet<(String, PackageId)>,
    depth_limited: BTreeSet<Dependency>,
    root_deps: Vec<Dependency>,
    store: ResolutionStore,
}

impl<'r> Engine<'r> {
    fn new(registry: &'r ResolverRegistry, options: &ResolveOptions, store: ResolutionStore) -> Self {
        Self {
            registry,
            options: options.clone(),
            semaphore: Arc::new(Semaphore::new(options.max_workers.max(1))),
            cache: PackageCache::new(),
            report: ResolutionReport::new(),
            visited: VisitedSet::new(),
            frontier: BTreeMap::new(),
            depths: HashMap::new(),
            availability: HashMap::new(),
            augmented: HashSet::new(),
            depth_limited: BTreeSet::new(),
            root_deps: Vec::new(),
            store,
        }
    }

    async fn start(&mut self, target: ResolveTarget) -> Result<(), DependsError> {
        match target {
            ResolveTarget::Dependencies(deps) => {
                for dep in deps {
                    self.root_deps.push(dep.clone());
                    self.enqueue(dep, 0);
                }
            }
            ResolveTarget::Repository(repo) => self.seed_from_source(&repo).await?,
        }
        self.run().await
    }

    fn enqueue(&mut self, dep: Dependency, depth: usize) {
        self.frontier.entry(depth).or_default().push(dep);
    }

    /// Check a resolver's preconditions once per run, warning the first time it fails.
    fn available(&mut self, resolver: &dyn Resolver) -> bool {
        if let Some(known) = self.availability.get(resolver.name()) {
            return known.is_available();
        }
        let availability = resolver.is_available();
        if let Err(e) = availability.check(resolver.name()) {
            tracing::warn!("{e}");
            if let Some(reason) = availability.reason() {
                self.report
                    .unavailable
                    .insert(resolver.name().to_string(), reason.to_string());
            }
        }
        let ok = availability.is_available();
        self.availability
            .insert(resolver.name().to_string(), availability);
        ok
    }

    /// Ask every applicable resolver for the root package of `repo`.
    async fn seed_from_source(&mut self, repo: &SourceRepository) -> Result<(), DependsError> {
        let registry = self.registry;
        for resolver in registry.resolvers() {
            if !resolver.can_resolve_from_source(repo) || !self.available(resolver.as_ref()) {
                continue;
            }
            tracing::info!(
                "Reading {} with `{}`",
                repo.root().display(),
                resolver.name()
            );
            let what = format!("reading {} with `{}`", repo.root().display(), resolver.name());
            match bounded(self.options.timeout, &what, resolver.resolve_from_source(repo)).await {
                Ok(Some(package)) => {
                    self.cache.add_root(package.id());
                    self.record(package, 0);
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("`{}` could not read {}: {e}", resolver.name(), repo.root().display());
                    self.report.warn(format!(
                        "`{}` could not read {}: {e}",
                        resolver.name(),
                        repo.root().display()
                    ));
                }
            }
        }
        Ok(())
    }

    async fn run(&mut self) -> Result<(), DependsError> {
        loop {
            if let Some((depth, level)) = self.frontier.pop_first() {
                self.expand_level(depth, level).await?;
                continue;
            }
            if !self.augment().await? {
                return Ok(());
            }
        }
    }

    /// Pick the resolver for `dep`, re-addressing it to the fallback when
    /// no ecosystem resolver claims it.
    fn route(&mut self, dep: &Dependency) -> Option<(Arc<dyn Resolver>, Dependency)> {
        let registry = self.registry;
        match registry.claimant(dep) {
            Some(resolver) if resolver.name() == dep.source() => {
                if self.available(resolver.as_ref()) {
                    return Some((Arc::clone(resolver), dep.clone()));
                }
                let reason = self
                    .report
                    .unavailable
                    .get(resolver.name())
                    .cloned()
                    .unwrap_or_default();
                self.report
                    .skip(dep.clone(), SkipReason::Unavailable(reason));
                None
            }
            Some(fallback) if self.available(fallback.as_ref()) => {
                tracing::debug!("No resolver claims {dep}; trying `{}`", fallback.name());
                Some((Arc::clone(fallback), dep.with_source(fallback.name())))
            }
            _ => {
                self.report.skip(dep.clone(), SkipReason::NoResolver);
                None
            }
        }
    }

    async fn expand_level(&mut self, depth: usize, level: Vec<Dependency>) -> Result<(), DependsError> {
        let mut tasks = JoinSet::new();
        let mut stored = Vec::new();
        for dep in level {
            if self.options.depth_limit.is_some_and(|limit| depth > limit) {
                if !self.visited.contains(&dep) {
                    self.depth_limited.insert(dep);
                }
                continue;
            }
            if !self.visited.visit(&dep) {
                continue;
            }
            let Some((resolver, routed)) = self.route(&dep) else {
                continue;
            };
            if routed != dep {
                self.cache.add_alias(dep.clone(), routed.clone());
                if !self.visited.visit(&routed) {
                    continue;
                }
            }

            if let Some(packages) = self.store.get(&routed) {
                tracing::debug!("Using stored answer for {routed}");
                stored.push(Outcome::Resolved {
                    dep: routed,
                    result: Ok(packages),
                });
                continue;
            }

            tracing::debug!("Resolving {routed} with `{}`", resolver.name());
            let sem = self.semaphore.clone();
            let timeout = self.options.timeout;
            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let what = format!("resolving {routed}");
                let result = bounded(timeout, &what, resolver.resolve(&routed)).await;
                Outcome::Resolved {
                    dep: routed,
                    result,
                }
            });
        }

        let mut outcomes = drain(tasks).await?;
        if !stored.is_empty() {
            outcomes.append(&mut stored);
            outcomes.sort_by_cached_key(Outcome::sort_key);
        }
        for outcome in outcomes {
            self.apply(outcome, depth)?;
        }
        Ok(())
    }

    /// Offer every cached package to every resolver that can add edges to
    /// it, once per (resolver, package). Returns whether any work was done.
    async fn augment(&mut self) -> Result<bool, DependsError> {
        let registry = self.registry;
        let mut tasks = JoinSet::new();
        for resolver in registry.resolvers() {
            let candidates: Vec<Package> = self
                .cache
                .iter()
                .filter(|pkg| resolver.can_update_dependencies(pkg))
                .filter(|pkg| {
                    !self
                        .augmented
                        .contains(&(resolver.name().to_string(), pkg.id()))
                })
                .cloned()
                .collect();
            if candidates.is_empty() || !self.available(resolver.as_ref()) {
                continue;
            }

            for package in candidates {
                self.augmented
                    .insert((resolver.name().to_string(), package.id()));
                tracing::debug!("Augmenting {package} with `{}`", resolver.name());
                let resolver = Arc::clone(resolver);
                let sem = self.semaphore.clone();
                let timeout = self.options.timeout;
                tasks.spawn(async move {
                    let _permit = sem.acquire_owned().await;
                    let what = format!("augmenting {package} with `{}`", resolver.name());
                    let result = bounded(timeout, &what, resolver.update_dependencies(&package)).await;
                    Outcome::Augmented {
                        resolver: resolver.name().to_string(),
                        package: package.id(),
                        result,
                    }
                });
            }
        }

        if tasks.is_empty() {
            return Ok(false);
        }
        for outcome in drain(tasks).await? {
            self.apply(outcome, 0)?;
        }
        Ok(true)
    }

    fn apply(&mut self, outcome: Outcome, depth: usize) -> Result<(), DependsError> {
        match outcome {
            Outcome::Resolved { dep, result } => match result {
                Ok(packages) => {
                    self.store.record(&dep, &packages);
                    for package in packages {
                        if !dep.matches(&package) {
                            tracing::debug!("Ignoring {package}: does not satisfy {dep}");
                            continue;
                        }
                        self.record(package, depth);
                    }
                    if !self.cache.contains(&dep) {
                        tracing::debug!("No package satisfies {dep}");
                        self.report.skip(dep, SkipReason::Unresolved);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let reason = match &e {
                        DependsError::Timeout { seconds, .. } => SkipReason::TimedOut(*seconds),
                        _ => SkipReason::Failed(e.to_string()),
                    };
                    tracing::warn!("Skipping {dep}: {reason}");
                    self.report.skip(dep, reason);
                }
            },
            Outcome::Augmented {
                resolver,
                package,
                result,
            } => match result {
                Ok(updated) if updated.id() == package => {
                    self.report.skip_invalid_edges(&updated);
                    let depth = self.depths.get(&package).copied().unwrap_or(0);
                    let added = self
                        .cache
                        .merge_dependencies(&package, updated.dependencies())
                        .ok_or_else(|| DependsError::Fatal {
                            message: format!("augmented package {package} is not cached"),
                        })?;
                    if !added.is_empty() {
                        tracing::info!("`{resolver}` added {} dependencies to {package}", added.len());
                    }
                    for dep in added {
                        self.enqueue(dep, depth + 1);
                    }
                }
                Ok(updated) => {
                    tracing::warn!(
                        "`{resolver}` returned {updated} while augmenting {package}; ignoring"
                    );
                    self.report.warn(format!(
                        "`{resolver}` returned {updated} while augmenting {package}"
                    ));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!("`{resolver}` could not augment {package}: {e}");
                    self.report
                        .warn(format!("`{resolver}` could not augment {package}: {e}"));
                }
            },
        }
        Ok(())
    }

    /// Cache `package` found at `depth` and queue its unseen dependencies one level deeper.
    fn record(&mut self, package: Package, depth: usize) {
        let depth = *self
            .depths
            .entry(package.id())
            .and_modify(|d| *d = (*d).min(depth))
            .or_insert(depth);
        if self.cache.get(&package.id()).is_none() {
            self.report.skip_invalid_edges(&package);
        }
        let insertion = self.cache.try_insert(package);
        for dep in insertion.added {
            self.enqueue(dep, depth + 1);
        }
    }

    fn finish(mut self) -> Resolution {
        for dep in &self.root_deps {
            let ids: Vec<PackageId> = self.cache.matching(dep).map(Package::id).collect();
            for id in ids {
                self.cache.add_root(id);
            }
        }
        if let Some(limit) = self.options.depth_limit {
            for dep in std::mem::take(&mut self.depth_limited) {
                if !self.visited.contains(&dep) {
                    self.report.skip(dep, SkipReason::DepthLimit(limit));
                }
            }
        }
        tracing::info!(
            "Resolved {} packages ({} skipped branches)",
            self.cache.len(),
            self.report.skipped.len()
        );
        Resolution {
            cache: self.cache,
            report: self.report,
        }
    }
}

/// Wait for every task, returning outcomes in a stable order.
async fn drain(mut tasks: JoinSet<Outcome>) -> Result<Vec<Outcome>, DependsError> {
    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        outcomes.push(joined.map_err(|e| DependsError::Fatal {
            message: format!("resolver task was cancelled: {e}"),
        })?);
    }
    outcomes.sort_by_cached_key(Outcome::sort_key);
    Ok(outcomes)
}

/// Run one resolver call under the time budget, turning a panic into an error.
async fn bounded<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T, DependsError>
where
    F: Future<Output = Result<T, DependsError>>,
{
    match AssertUnwindSafe(tokio::time::timeout(timeout, fut))
        .catch_unwind()
        .await
    {
        Ok(Ok(result)) => result,
        Ok(Err(_elapsed)) => Err(DependsError::Timeout {
            operation: what.to_string(),
            seconds: timeout.as_secs(),
        }),
        Err(_panic) => Err(DependsError::Generic {
            message: format!("resolver panicked while {what}"),
        }),
    }
}
