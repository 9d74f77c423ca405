// src/resolver/mod.rs

//! Dependency resolution
//!
//! Makes sure every package a recipe depends on, directly or transitively,
//! is installed before the recipe itself is built. Names are looked up in a
//! [`Registry`]; missing packages are handed to a [`PackageBuilder`] in
//! dependency order, one level at a time.

mod plan;
mod registry;

pub use plan::ResolutionPlan;
pub use registry::{DirectoryRegistry, MemoryRegistry, Registry};

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Installs packages on behalf of the resolver
pub trait PackageBuilder: Send + Sync {
    /// Install location of `recipe` if that exact recipe is already installed
    ///
    /// An install of the same name from a different source counts as
    /// missing, so the resolver rebuilds it.
    fn installed(&self, recipe: &Recipe) -> Result<Option<PathBuf>>;

    /// Build and install `recipe`
    ///
    /// `deps` holds exactly the transitive dependencies of `recipe`.
    fn build(&self, recipe: &Recipe, deps: &ResolvedDependencies) -> Result<PathBuf>;
}

/// Installed dependencies of a recipe, in install order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedDependencies {
    order: Vec<String>,
    paths: HashMap<String, PathBuf>,
    built: Vec<String>,
}

impl ResolvedDependencies {
    fn record(&mut self, name: String, path: PathBuf, built: bool) {
        if built {
            self.built.push(name.clone());
        }
        self.order.push(name.clone());
        self.paths.insert(name, path);
    }

    /// The entries for `names`, keeping their order
    fn subset<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut subset = Self::default();
        for name in names {
            if let Some(path) = self.paths.get(name) {
                let built = self.built.iter().any(|b| b == name);
                subset.record(name.to_string(), path.clone(), built);
            }
        }
        subset
    }

    /// Install path of a dependency
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    /// Dependency names, dependencies before dependents
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Names that were installed by this resolution rather than already present
    pub fn newly_installed(&self) -> &[String] {
        &self.built
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.order
            .iter()
            .filter_map(|n| self.paths.get(n).map(|p| (n.as_str(), p.as_path())))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Per-name mutual exclusion inside one process
///
/// Two threads asking for the same package never build it twice; the
/// second waits for the first and then sees it installed.
#[derive(Debug, Default)]
pub struct NameLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `name`
    pub fn with_lock<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        f()
    }
}

/// Resolves and installs the dependency closure of a recipe
pub struct DependencyResolver {
    registry: Arc<dyn Registry>,
    locks: Arc<NameLocks>,
    parallel: bool,
}

impl DependencyResolver {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            locks: Arc::new(NameLocks::new()),
            parallel: true,
        }
    }

    /// Install independent packages of a level concurrently
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Share name locks with other resolvers or installers in this process
    pub fn with_locks(mut self, locks: Arc<NameLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn registry(&self) -> &dyn Registry {
        self.registry.as_ref()
    }

    /// Compute the resolution plan without installing anything
    pub fn plan(&self, recipe: &Recipe) -> Result<ResolutionPlan> {
        ResolutionPlan::build(recipe, self.registry.as_ref())
    }

    /// Ensure every dependency of `recipe` is installed
    ///
    /// Already-installed packages are not rebuilt, but their own
    /// dependencies are still checked and reported. On success every
    /// transitive dependency is present in the result.
    pub fn resolve(
        &self,
        recipe: &Recipe,
        builder: &dyn PackageBuilder,
    ) -> Result<ResolvedDependencies> {
        let plan = self.plan(recipe)?;
        if plan.is_empty() {
            debug!("{} has no dependencies", recipe.name());
            return Ok(ResolvedDependencies::default());
        }
        info!(
            "Resolving {} dependencies of {}: {}",
            plan.len(),
            recipe.name(),
            plan.install_order().join(", ")
        );

        let mut resolved = ResolvedDependencies::default();
        for level in plan.levels() {
            let snapshot = &resolved;
            let ensure = |name: &String| -> Result<(String, PathBuf, bool)> {
                let dep = plan.recipe(name).ok_or_else(|| Error::UnresolvedDependency {
                    name: name.clone(),
                    required_by: recipe.name().to_string(),
                })?;
                let deps = snapshot.subset(plan.closure_of(name));
                self.ensure_installed(dep, &deps, builder)
                    .map(|(path, built)| (name.clone(), path, built))
            };

            let results: Vec<Result<(String, PathBuf, bool)>> = if self.parallel && level.len() > 1 {
                level.par_iter().map(ensure).collect()
            } else {
                level.iter().map(ensure).collect()
            };

            let mut installed = Vec::with_capacity(results.len());
            for result in results {
                installed.push(result?);
            }
            for (name, path, built) in installed {
                resolved.record(name, path, built);
            }
        }

        Ok(resolved)
    }

    fn ensure_installed(
        &self,
        recipe: &Recipe,
        deps: &ResolvedDependencies,
        builder: &dyn PackageBuilder,
    ) -> Result<(PathBuf, bool)> {
        self.locks.with_lock(recipe.name(), || {
            if let Some(path) = builder.installed(recipe)? {
                debug!("Dependency {} already installed at {}", recipe.name(), path.display());
                return Ok((path, false));
            }
            info!("Installing dependency {}", recipe.display_id());
            builder.build(recipe, deps).map(|path| (path, true))
        })
    }
}
