//! Operation: resolve a source tree or dependency and write the graph.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use xdeps_core::config::GlobalConfig;
use xdeps_resolver::graph::DependencyGraph;
use xdeps_resolver::{Resolution, ResolutionStore, ResolveOptions, ResolverRegistry};
use xdeps_util::errors::DependsError;
use xdeps_util::fs::ensure_parent_dir;
use xdeps_util::progress;

use crate::ops_target::TargetArg;

/// How the resolved graph is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Dot,
    Tree,
}

impl FromStr for OutputFormat {
    type Err = DependsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "dot" => Ok(OutputFormat::Dot),
            "tree" => Ok(OutputFormat::Tree),
            other => Err(DependsError::Generic {
                message: format!("Unknown output format `{other}` (expected json, dot or tree)"),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Json => "json",
            OutputFormat::Dot => "dot",
            OutputFormat::Tree => "tree",
        })
    }
}

/// Options for `xdeps resolve`.
#[derive(Debug, Default)]
pub struct ResolveRequest {
    /// Path or `source:name@constraint`; the current directory when absent.
    pub target: Option<String>,
    pub format: OutputFormat,
    pub output_file: Option<PathBuf>,
    /// Overwrite `output_file` if it exists.
    pub force: bool,
    pub jobs: Option<usize>,
    pub depth_limit: Option<usize>,
    pub timeout_secs: Option<u64>,
    /// Print the path from a root to this package (`name` or `source:name`)
    /// instead of the whole graph.
    pub why: Option<String>,
    /// Resolution store file; overrides `[cache]` and enables persistence.
    pub database: Option<PathBuf>,
}

impl ResolveRequest {
    /// Engine options: config values with command-line overrides applied.
    pub fn options(&self, config: &GlobalConfig) -> ResolveOptions {
        let mut options = ResolveOptions::from_config(&config.resolve);
        if let Some(jobs) = self.jobs {
            options.max_workers = jobs.max(1);
        }
        if self.depth_limit.is_some() {
            options.depth_limit = self.depth_limit;
        }
        if let Some(secs) = self.timeout_secs {
            options.timeout = Duration::from_secs(secs);
        }
        options
    }

    /// The resolution store to keep answers in between runs, if any.
    pub fn database(&self, config: &GlobalConfig) -> Option<PathBuf> {
        self.database
            .clone()
            .or_else(|| config.cache.database_path())
    }
}

/// Resolve with the built-in resolvers and write the result.
pub async fn resolve(req: &ResolveRequest, config: &GlobalConfig) -> miette::Result<()> {
    let registry = xdeps_backends::builtin_registry(config)?;
    let mut store = match req.database(config) {
        Some(path) => ResolutionStore::open(path)?,
        None => ResolutionStore::in_memory(),
    };
    resolve_with(req, &registry, &req.options(config), &mut store).await?;
    Ok(())
}

/// Resolve against `registry`, report skipped branches on stderr, and write
/// the rendered graph to the output file or stdout.
///
/// Answers found in `store` are reused; new ones are saved back to it.
pub async fn resolve_with(
    req: &ResolveRequest,
    registry: &ResolverRegistry,
    options: &ResolveOptions,
    store: &mut ResolutionStore,
) -> miette::Result<Resolution> {
    if let Some(ref path) = req.output_file {
        check_output_file(path, req.force)?;
    }

    let target = TargetArg::parse(req.target.as_deref().unwrap_or("."), registry)?;
    progress::status("Resolving", &target.to_string());

    let sp = progress::spinner("Resolving dependencies...");
    let result = xdeps_resolver::resolve_stored(target.into(), registry, options, store).await;
    sp.finish_and_clear();
    let resolution = result?;
    store.save()?;
    if let Some(path) = store.path() {
        tracing::info!("{} stored lookups in {}", store.len(), path.display());
    }

    report(&resolution);
    if resolution.is_empty() {
        return Err(DependsError::Resolution {
            message: "no packages were resolved. Try `xdeps list` to see which resolvers can handle this target"
                .to_string(),
        }
        .into());
    }

    let rendered = match req.why {
        Some(ref name) => explain(&resolution, name)?,
        None => render(&resolution, req.format, options.depth_limit)?,
    };
    tracing::debug!("Rendered {} bytes as {}", rendered.len(), req.format);
    match req.output_file {
        Some(ref path) => {
            ensure_parent_dir(path).map_err(DependsError::Io)?;
            std::fs::write(path, rendered.as_bytes()).map_err(DependsError::Io)?;
            progress::status_info("Wrote", &path.display().to_string());
        }
        None => print!("{rendered}"),
    }

    let roots = resolution.cache.roots().count();
    progress::status(
        "Finished",
        &format!(
            "{} package(s) from {roots} root(s), {} skipped",
            resolution.cache.len(),
            resolution.report.skipped.len()
        ),
    );
    Ok(resolution)
}

/// Render the resolved graph. Always ends with a newline.
///
/// `max_depth` bounds the tree format; packages reachable along a shorter
/// path can otherwise reappear below the engine's depth limit.
pub fn render(
    resolution: &Resolution,
    format: OutputFormat,
    max_depth: Option<usize>,
) -> miette::Result<String> {
    let mut out = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&resolution.result()).map_err(|e| {
            DependsError::Generic {
                message: format!("Failed to serialize result: {e}"),
            }
        })?,
        OutputFormat::Dot => DependencyGraph::from_cache(&resolution.cache).to_dot(),
        OutputFormat::Tree => DependencyGraph::from_cache(&resolution.cache).print_tree(max_depth),
    };
    if !out.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

/// Show why `name` is in the graph: one path from a root down to it.
pub fn explain(resolution: &Resolution, name: &str) -> miette::Result<String> {
    let graph = DependencyGraph::from_cache(&resolution.cache);
    let path = graph.find_path(name).ok_or_else(|| DependsError::Generic {
        message: format!("`{name}` is not in the resolved graph"),
    })?;
    let mut out = format!("Path to {name}:\n");
    for (depth, id) in path.iter().enumerate() {
        out.push_str(&format!("{}{id}\n", "  ".repeat(depth)));
    }
    Ok(out)
}

/// Refuse to clobber an existing file unless `force` is set.
pub fn check_output_file(path: &Path, force: bool) -> miette::Result<()> {
    if path.exists() && !force {
        return Err(DependsError::Generic {
            message: format!(
                "{} already exists! Re-run with `--force` to overwrite it",
                path.display()
            ),
        }
        .into());
    }
    Ok(())
}

fn report(resolution: &Resolution) {
    let report = &resolution.report;
    for (name, reason) in &report.unavailable {
        progress::status_warn("Unavailable", &format!("{name}: {reason}"));
    }
    for branch in &report.skipped {
        progress::status_warn("Skipped", &branch.to_string());
    }
    for warning in &report.warnings {
        progress::status_warn("Warning", warning);
    }
}
