// src/resolver/registry.rs

//! Recipe registries: where dependency names are looked up

use crate::error::{Error, Result};
use crate::recipe::{parse_recipe_file, Recipe};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source of recipes by package name
pub trait Registry: Send + Sync {
    /// Find the recipe for `name`, or `None` if the registry has no such package
    fn lookup(&self, name: &str) -> Result<Option<Recipe>>;
}

/// Registry backed by a directory of `<name>.toml` recipe files
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path where the recipe for `name` would live
    pub fn recipe_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.toml", name))
    }
}

impl Registry for DirectoryRegistry {
    fn lookup(&self, name: &str) -> Result<Option<Recipe>> {
        // Names never contain separators, but a lookup key might
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Ok(None);
        }

        let path = self.recipe_path(name);
        if !path.is_file() {
            debug!("No recipe for '{}' at {}", name, path.display());
            return Ok(None);
        }

        let recipe = parse_recipe_file(&path)?;
        if recipe.name() != name {
            return Err(Error::MalformedRecipe(format!(
                "{} declares package '{}', expected '{}'",
                path.display(),
                recipe.name(),
                name
            )));
        }
        Ok(Some(recipe))
    }
}

/// In-process registry, mostly for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    recipes: HashMap<String, Recipe>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipe, replacing any previous one with the same name
    pub fn insert(&mut self, recipe: Recipe) {
        self.recipes.insert(recipe.name().to_string(), recipe);
    }

    /// Builder-style [`MemoryRegistry::insert`]
    pub fn with(mut self, recipe: Recipe) -> Self {
        self.insert(recipe);
        self
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

impl Registry for MemoryRegistry {
    fn lookup(&self, name: &str) -> Result<Option<Recipe>> {
        Ok(self.recipes.get(name).cloned())
    }
}
