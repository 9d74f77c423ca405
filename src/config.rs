// src/config.rs

//! Runtime configuration
//!
//! Settings are layered, later layers winning:
//!
//! 1. built-in defaults (platform directories from `dirs`)
//! 2. a TOML config file: `--config`, else `$FORMULARY_CONFIG`, else
//!    `<config dir>/formulary/config.toml` when it exists
//! 3. environment variables (`FORMULARY_PREFIX`, `FORMULARY_TOOLCHAIN`,
//!    `FORMULARY_CACHE`, `FORMULARY_REGISTRY`)
//! 4. command-line flags, applied by the CLI
//!
//! # Example
//!
//! ```toml
//! prefix = "/opt/formulary"
//! registry = "/srv/recipes"
//! jobs = 8
//! stage_timeout = 3600
//!
//! [fetch]
//! max_attempts = 5
//! base_delay_ms = 500
//! ```

use crate::error::{Error, Result};
use crate::fetch::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "FORMULARY_CONFIG";
/// Environment variable overriding the install prefix
pub const PREFIX_ENV: &str = "FORMULARY_PREFIX";
/// Environment variable overriding the toolchain locator
pub const TOOLCHAIN_ENV: &str = "FORMULARY_TOOLCHAIN";
/// Environment variable overriding the archive cache directory
pub const CACHE_ENV: &str = "FORMULARY_CACHE";
/// Environment variable overriding the registry directory
pub const REGISTRY_ENV: &str = "FORMULARY_REGISTRY";

/// Download retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Installation prefix, substituted as `%(prefix)s`
    pub prefix: PathBuf,
    /// Archive cache, keyed by checksum
    pub cache_dir: PathBuf,
    /// Parent of the per-package build trees
    pub build_root: PathBuf,
    /// Directory of `<name>.toml` recipes used to resolve dependencies
    pub registry: Option<PathBuf>,
    /// Toolchain locator, substituted as `%(toolchain)s`
    pub toolchain: Option<String>,
    /// Parallel make jobs (`MAKEFLAGS=-j<jobs>`)
    pub jobs: usize,
    /// Per-stage timeout in seconds; unset means no limit
    pub stage_timeout: Option<u64>,
    /// Install independent dependencies concurrently
    pub parallel: bool,
    pub fetch: FetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data = dirs::data_local_dir()
            .map(|d| d.join("formulary"))
            .unwrap_or_else(|| PathBuf::from(".formulary"));
        let cache = dirs::cache_dir()
            .map(|d| d.join("formulary"))
            .unwrap_or_else(|| PathBuf::from(".formulary/cache"));

        Self {
            prefix: data.join("prefix"),
            cache_dir: cache.join("downloads"),
            build_root: cache.join("build"),
            registry: None,
            toolchain: None,
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            stage_timeout: None,
            parallel: true,
            fetch: FetchConfig::default(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("formulary").join("config.toml"))
    }

    /// Load configuration from the process environment
    ///
    /// `explicit` is the `--config` flag. An explicitly named file must
    /// exist; the default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    /// Like [`Config::load`] with an injectable environment lookup
    pub fn load_with<F>(explicit: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| env(CONFIG_ENV).filter(|v| !v.is_empty()).map(PathBuf::from));

        let mut config = match named {
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::default(),
            },
        };
        config.apply_env(env);
        config.validate()?;
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse config TOML
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `FORMULARY_*` environment overrides
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).filter(|v| !v.is_empty());

        if let Some(prefix) = get(PREFIX_ENV) {
            self.prefix = PathBuf::from(prefix);
        }
        if let Some(toolchain) = get(TOOLCHAIN_ENV) {
            self.toolchain = Some(toolchain);
        }
        if let Some(cache) = get(CACHE_ENV) {
            self.cache_dir = PathBuf::from(cache);
        }
        if let Some(registry) = get(REGISTRY_ENV) {
            self.registry = Some(PathBuf::from(registry));
        }
    }

    /// Reject values no install could run with
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(Error::Config("jobs must be at least 1".to_string()));
        }
        if self.fetch.max_attempts == 0 {
            return Err(Error::Config("fetch.max_attempts must be at least 1".to_string()));
        }
        if self.stage_timeout == Some(0) {
            return Err(Error::Config("stage_timeout must be positive".to_string()));
        }
        if self.prefix.as_os_str().is_empty() {
            return Err(Error::Config("prefix must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout.map(Duration::from_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch.max_attempts,
            base_delay: Duration::from_millis(self.fetch.base_delay_ms),
        }
    }
}
