// src/commands/check.rs

//! Check command - validate a recipe and print a summary

use super::{load_config, load_recipe};
use crate::cli::Overrides;
use anyhow::{Context, Result};
use formulary::recipe::validate_recipe;
use formulary::resolver::{DependencyResolver, DirectoryRegistry};
use std::path::Path;
use std::sync::Arc;

pub fn cmd_check(recipe: &str, config_path: Option<&Path>, overrides: &Overrides) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let recipe = load_recipe(recipe, &config)?;

    println!("Recipe: {} version {}", recipe.name(), recipe.version());
    if let Some(desc) = recipe.description() {
        println!("  {}", desc);
    }
    println!("Source: {}", recipe.source_url());
    println!("Checksum: {}", recipe.checksum().to_prefixed_string());
    if !recipe.dependencies().is_empty() {
        println!("Depends on: {}", recipe.dependencies().join(", "));
    }
    for (index, stage) in recipe.stages().iter().enumerate() {
        println!("  #{} {}", index, stage);
    }
    if let Some(test) = recipe.test_stage() {
        println!("  {}", test);
    }

    // Dependencies can only be checked against a registry
    if let Some(dir) = &config.registry {
        let resolver = DependencyResolver::new(Arc::new(DirectoryRegistry::new(dir)));
        let plan = resolver
            .plan(&recipe)
            .with_context(|| format!("Dependencies of {} do not resolve", recipe.name()))?;
        if !plan.is_empty() {
            println!("Install order: {}", plan.install_order().join(", "));
        }
    }

    let warnings = validate_recipe(&recipe);
    for warning in &warnings {
        println!("Warning: {}", warning);
    }
    if warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", warnings.len());
    }
    Ok(())
}
