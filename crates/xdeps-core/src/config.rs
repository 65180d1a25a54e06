use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global user configuration loaded from `~/.xdeps/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub resolve: ResolveConfig,

    #[serde(default)]
    pub registries: RegistryConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Resolution settings from `[resolve]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    #[serde(default = "default_jobs")]
    pub jobs: usize,
    #[serde(default = "default_timeout_secs", rename = "timeout-secs")]
    pub timeout_secs: u64,
    #[serde(default, rename = "depth-limit")]
    pub depth_limit: Option<usize>,
}

impl ResolveConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            timeout_secs: default_timeout_secs(),
            depth_limit: None,
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_timeout_secs() -> u64 {
    120
}

/// Registry base URLs from `[registries]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_pypi")]
    pub pypi: String,
    #[serde(default = "default_npm")]
    pub npm: String,
    #[serde(default = "default_crates")]
    pub crates: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pypi: default_pypi(),
            npm: default_npm(),
            crates: default_crates(),
        }
    }
}

fn default_pypi() -> String {
    "https://pypi.org/pypi".to_string()
}

fn default_npm() -> String {
    "https://registry.npmjs.org".to_string()
}

fn default_crates() -> String {
    "https://crates.io/api/v1".to_string()
}

/// Lookup memo and resolution store settings from `[cache]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_lookup_capacity", rename = "lookup-capacity")]
    pub lookup_capacity: usize,
    /// Keep resolver answers in `~/.xdeps/resolutions.json` between runs.
    #[serde(default)]
    pub persist: bool,
    /// Store file to use instead of the default; implies `persist`.
    #[serde(default)]
    pub database: Option<PathBuf>,
}

impl CacheConfig {
    /// Where resolver answers are persisted, if persistence is enabled.
    pub fn database_path(&self) -> Option<PathBuf> {
        match self.database {
            Some(ref path) => Some(path.clone()),
            None if self.persist => Some(dirs_path().join("resolutions.json")),
            None => None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lookup_capacity: default_lookup_capacity(),
            persist: false,
            database: None,
        }
    }
}

fn default_lookup_capacity() -> usize {
    4096
}

impl GlobalConfig {
    /// Load the global configuration from `~/.xdeps/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from an explicit path, or return defaults if the file doesn't exist.
    pub fn load_from(path: &Path) -> miette::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            xdeps_util::errors::DependsError::Generic {
                message: format!("Failed to read config {}: {e}", path.display()),
            }
        })?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> miette::Result<Self> {
        toml::from_str(content).map_err(|e| {
            xdeps_util::errors::DependsError::Generic {
                message: format!("Failed to parse config: {e}"),
            }
            .into()
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}

/// Returns the path to the xdeps data directory (`~/.xdeps/`).
pub fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".xdeps")
}
