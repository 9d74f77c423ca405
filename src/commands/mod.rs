// src/commands/mod.rs
//! Command handlers for the formulary CLI

mod check;
mod fetch;
mod install;

pub use check::cmd_check;
pub use fetch::cmd_fetch;
pub use install::cmd_install;
pub use test::cmd_test;

use crate::cli::Overrides;
use anyhow::{Context, Result};
use formulary::recipe::{parse_recipe_file, Recipe};
use formulary::resolver::{DirectoryRegistry, Registry};
use formulary::{Config, Error};
use std::path::Path;
use tracing::debug;

/// Load config (file and environment), then apply command-line overrides
pub(crate) fn load_config(config_path: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;

    if let Some(prefix) = &overrides.prefix {
        config.prefix = prefix.clone();
    }
    if let Some(toolchain) = &overrides.toolchain {
        config.toolchain = Some(toolchain.clone());
    }
    if let Some(registry) = &overrides.registry {
        config.registry = Some(registry.clone());
    }
    if let Some(cache) = &overrides.cache {
        config.cache_dir = cache.clone();
    }
    if let Some(jobs) = overrides.jobs {
        config.jobs = jobs;
    }
    if let Some(timeout) = overrides.stage_timeout {
        config.stage_timeout = Some(timeout);
    }
    if overrides.no_parallel {
        config.parallel = false;
    }

    config.validate().context("Invalid configuration")?;
    debug!("Effective config: {:?}", config);
    Ok(config)
}

/// Load a recipe from a file path, or by name from the registry
pub(crate) fn load_recipe(spec: &str, config: &Config) -> Result<Recipe> {
    let path = Path::new(spec);
    let looks_like_path = spec.ends_with(".toml") || spec.contains(std::path::MAIN_SEPARATOR);

    if looks_like_path || path.is_file() {
        return parse_recipe_file(path)
            .with_context(|| format!("Failed to load recipe {}", path.display()));
    }

    let Some(dir) = &config.registry else {
        return Err(Error::MalformedRecipe(format!(
            "{} is not a recipe file and no registry is configured",
            spec
        )))
        .context("Failed to load recipe");
    };

    DirectoryRegistry::new(dir)
        .lookup(spec)?
        .ok_or_else(|| Error::UnresolvedDependency {
            name: spec.to_string(),
            required_by: "command line".to_string(),
        })
        .with_context(|| format!("No recipe named '{}' in {}", spec, dir.display()))
}
