// src/resolver/plan.rs

//! Resolution plan: the dependency closure of a recipe, grouped into levels
//!
//! Level 0 holds packages with no dependencies, and every package sits one
//! level above its deepest dependency. Packages within a level never depend
//! on each other, so a level can be installed concurrently.

use super::registry::Registry;
use crate::error::{Error, Result};
use crate::recipe::Recipe;
use std::collections::{BTreeMap, HashMap, HashSet};

/// The transitive dependencies of one recipe, in install order
#[derive(Debug, Clone)]
pub struct ResolutionPlan {
    levels: Vec<Vec<String>>,
    recipes: HashMap<String, Recipe>,
}

impl ResolutionPlan {
    /// Walk `root`'s dependencies depth-first through `registry`
    ///
    /// Fails with [`Error::UnresolvedDependency`] for a name the registry
    /// does not know and [`Error::CyclicDependency`] when a name is reached
    /// again while still on the visiting stack.
    pub fn build(root: &Recipe, registry: &dyn Registry) -> Result<Self> {
        let mut walker = Walker {
            registry,
            levels: HashMap::new(),
            recipes: HashMap::new(),
        };

        let mut stack = vec![root.name().to_string()];
        for dep in root.dependencies() {
            walker.visit(dep, root.name(), &mut stack)?;
        }

        let mut by_level: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (name, level) in walker.levels {
            by_level.entry(level).or_default().push(name);
        }
        let levels = by_level
            .into_values()
            .map(|mut names| {
                names.sort();
                names
            })
            .collect();

        Ok(Self {
            levels,
            recipes: walker.recipes,
        })
    }

    /// Names grouped by level, lowest first, sorted within a level
    pub fn levels(&self) -> &[Vec<String>] {
        &self.levels
    }

    /// Flattened install order, dependencies before dependents
    pub fn install_order(&self) -> Vec<&str> {
        self.levels.iter().flatten().map(String::as_str).collect()
    }

    /// Transitive dependencies of a planned package, in install order
    pub fn closure_of(&self, name: &str) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut pending: Vec<&str> = self
            .recipes
            .get(name)
            .map(|r| r.dependencies().iter().map(String::as_str).collect())
            .unwrap_or_default();
        while let Some(dep) = pending.pop() {
            if seen.insert(dep)
                && let Some(recipe) = self.recipes.get(dep)
            {
                pending.extend(recipe.dependencies().iter().map(String::as_str));
            }
        }
        self.install_order()
            .into_iter()
            .filter(|n| seen.contains(n))
            .collect()
    }

    pub fn recipe(&self, name: &str) -> Option<&Recipe> {
        self.recipes.get(name)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

struct Walker<'a> {
    registry: &'a dyn Registry,
    levels: HashMap<String, usize>,
    recipes: HashMap<String, Recipe>,
}

impl Walker<'_> {
    fn visit(&mut self, name: &str, required_by: &str, stack: &mut Vec<String>) -> Result<usize> {
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut chain = stack[pos..].to_vec();
            chain.push(name.to_string());
            return Err(Error::CyclicDependency { chain });
        }
        if let Some(&level) = self.levels.get(name) {
            return Ok(level);
        }

        let recipe = self
            .registry
            .lookup(name)?
            .ok_or_else(|| Error::UnresolvedDependency {
                name: name.to_string(),
                required_by: required_by.to_string(),
            })?;

        stack.push(name.to_string());
        let mut level = 0;
        for dep in recipe.dependencies() {
            level = level.max(self.visit(dep, name, stack)? + 1);
        }
        stack.pop();

        self.levels.insert(name.to_string(), level);
        self.recipes.insert(name.to_string(), recipe);
        Ok(level)
    }
}
