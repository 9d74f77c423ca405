// src/commands/fetch.rs

//! Fetch command - download and verify sources without building

use super::{load_config, load_recipe};
use crate::cli::Overrides;
use anyhow::{Context, Result};
use formulary::kitchen::Installer;
use std::path::Path;

pub fn cmd_fetch(
    recipe: &str,
    config_path: Option<&Path>,
    overrides: &Overrides,
    show_progress: bool,
) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let recipe = load_recipe(recipe, &config)?;
    let installer = Installer::from_config(config, show_progress)?;

    let cached = installer.fetcher().is_cached(recipe.checksum());
    let path = installer
        .fetch(&recipe)
        .with_context(|| format!("Failed to fetch {}", recipe.source_url()))?;

    println!(
        "{} {} ({})",
        if cached { "Cached" } else { "Fetched" },
        path.display(),
        recipe.checksum().to_prefixed_string()
    );
    Ok(())
}
