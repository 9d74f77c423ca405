// src/kitchen/mod.rs

//! Kitchen: where recipes are turned into installed packages
//!
//! The [`Installer`] drives one install through its state machine:
//! - Resolving: make sure every dependency is installed
//! - Fetching: download, verify and unpack the source archive
//! - Configuring / Building / Installing: run the recipe's stages
//! - Testing: optionally run the test stage
//!
//! A receipt under the prefix marks the package as installed. Nothing is
//! rolled back on failure; a partially built tree stays where it is.

pub mod executor;
mod lock;
mod receipt;
mod state;
pub mod test_runner;

pub use executor::{ExecutionResult, StageContext, StageExecutor, StageOutcome};
pub use lock::PrefixLock;
pub use receipt::InstallReceipt;
pub use state::InstallState;
pub use test_runner::{TestResult, TestRunner};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{unpack, Fetcher, HttpTransport, Transport};
use crate::progress::{LogObserver, StateObserver};
use crate::recipe::Recipe;
use crate::resolver::{
    DependencyResolver, DirectoryRegistry, MemoryRegistry, NameLocks, PackageBuilder, Registry,
    ResolvedDependencies,
};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-install switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Run the test stage after installing
    pub run_tests: bool,
    /// Reinstall even if a matching receipt exists
    pub force: bool,
}

/// What an install did
#[derive(Debug)]
pub struct InstallReport {
    pub name: String,
    pub version: String,
    /// Final state; `Done` on every successful return
    pub state: InstallState,
    /// A matching receipt existed and nothing was rebuilt
    pub already_installed: bool,
    pub dependencies: ResolvedDependencies,
    pub stages: ExecutionResult,
    pub receipt: InstallReceipt,
    /// `None` when tests were not requested
    pub tests: Option<Result<TestResult>>,
}

impl InstallReport {
    /// Whether tests were requested and failed
    pub fn tests_failed(&self) -> bool {
        matches!(self.tests, Some(Err(_)))
    }
}

/// Tracks one package's state and reports transitions
struct Progress<'a> {
    package: &'a str,
    state: InstallState,
    observer: &'a dyn StateObserver,
}

impl<'a> Progress<'a> {
    fn new(package: &'a str, observer: &'a dyn StateObserver) -> Self {
        Self {
            package,
            state: InstallState::Pending,
            observer,
        }
    }

    fn advance(&mut self, next: InstallState) -> Result<()> {
        let from = self.state.clone();
        self.state.advance(next)?;
        self.observer.on_transition(self.package, &from, &self.state);
        Ok(())
    }

    /// Move to `Failed` if `result` is an error, then hand it back
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && !self.state.is_terminal()
        {
            let _ = self.advance(InstallState::Failed(e.to_string()));
        }
        result
    }
}

/// Installs recipes into a prefix
pub struct Installer {
    config: Config,
    fetcher: Fetcher,
    resolver: DependencyResolver,
    executor: StageExecutor,
    observer: Arc<dyn StateObserver>,
    locks: Arc<NameLocks>,
}

impl Installer {
    /// Create an installer with an explicit transport and registry
    pub fn new(config: Config, transport: Arc<dyn Transport>, registry: Arc<dyn Registry>) -> Self {
        let locks = Arc::new(NameLocks::new());
        let fetcher = Fetcher::new(&config.cache_dir, transport).with_retry(config.retry_policy());
        let resolver = DependencyResolver::new(registry)
            .with_parallel(config.parallel)
            .with_locks(Arc::clone(&locks));
        let executor = StageExecutor::new().with_timeout(config.stage_timeout());

        Self {
            config,
            fetcher,
            resolver,
            executor,
            observer: Arc::new(LogObserver),
            locks,
        }
    }

    /// Create an installer using HTTP and the configured registry directory
    pub fn from_config(config: Config, show_progress: bool) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new()?.with_progress(show_progress));
        let registry: Arc<dyn Registry> = match &config.registry {
            Some(dir) => Arc::new(DirectoryRegistry::new(dir)),
            None => Arc::new(MemoryRegistry::new()),
        };
        Ok(Self::new(config, transport, registry))
    }

    /// Report state transitions to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn StateObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// Install `recipe` and its dependencies
    pub fn install(&self, recipe: &Recipe, options: InstallOptions) -> Result<InstallReport> {
        info!("Installing {} into {}", recipe.display_id(), self.config.prefix.display());
        self.locks
            .with_lock(recipe.name(), || self.install_locked(recipe, options, None))
    }

    /// Download and verify the source archive only
    pub fn fetch(&self, recipe: &Recipe) -> Result<PathBuf> {
        self.fetcher.fetch_recipe(recipe)
    }

    /// Run the test stage of an installed recipe
    ///
    /// A recipe without a test stage succeeds immediately, installed or not.
    pub fn test(&self, recipe: &Recipe) -> Result<TestResult> {
        let runner = TestRunner::new(&self.executor);
        if recipe.test_stage().is_none() {
            return runner.run_tests(None, &StageContext::new(&self.config.prefix));
        }

        let receipt = InstallReceipt::load(&self.config.prefix, recipe.name())?
            .ok_or_else(|| Error::NotInstalled(recipe.name().to_string()))?;
        if !receipt.build_dir.is_dir() {
            return Err(Error::IoError(format!(
                "Build tree {} of {} no longer exists; reinstall with --force",
                receipt.build_dir.display(),
                recipe.name()
            )));
        }

        let ctx = self.stage_context(recipe, &receipt.build_dir)?;
        runner.run_tests(recipe.test_stage(), &ctx)
    }

    /// Directory a recipe is unpacked into
    pub fn build_dir(&self, recipe: &Recipe) -> PathBuf {
        self.config.build_root.join(recipe.display_id())
    }

    fn install_locked(
        &self,
        recipe: &Recipe,
        options: InstallOptions,
        deps: Option<&ResolvedDependencies>,
    ) -> Result<InstallReport> {
        let prefix = &self.config.prefix;
        let _lock = PrefixLock::try_acquire(prefix, recipe.name())?;

        if !options.force
            && let Some(receipt) = InstallReceipt::load(prefix, recipe.name())?
        {
            if receipt.matches(recipe) {
                info!(
                    "{} is already installed (use --force to reinstall)",
                    recipe.display_id()
                );
                return Ok(InstallReport {
                    name: recipe.name().to_string(),
                    version: recipe.version().to_string(),
                    state: InstallState::Done,
                    already_installed: true,
                    dependencies: ResolvedDependencies::default(),
                    stages: ExecutionResult::default(),
                    receipt,
                    tests: None,
                });
            }
            info!("{} has a receipt for a different source, reinstalling", recipe.name());
        }

        let mut progress = Progress::new(recipe.name(), self.observer.as_ref());

        progress.advance(InstallState::Resolving)?;
        let dependencies = match deps {
            Some(deps) => deps.clone(),
            None => {
                let resolved = self.resolver.resolve(recipe, self);
                progress.check(resolved)?
            }
        };

        progress.advance(InstallState::Fetching)?;
        let source_root = progress.check(self.prepare_source(recipe))?;

        let ctx = progress.check(self.stage_context(recipe, &source_root))?;
        let package = recipe.name();
        let observer = self.observer.as_ref();
        let stages = self.executor.run_with(recipe.stages(), &ctx, |index, stage| {
            let next = InstallState::for_stage(stage.kind());
            if progress.state != next {
                progress.advance(next)?;
            }
            observer.on_stage(package, index, stage);
            Ok(())
        });
        let stages = progress.check(stages)?;

        let receipt = InstallReceipt::new(recipe, prefix, &source_root, dependencies.names().to_vec());
        let receipt_path = progress.check(receipt.write())?;
        debug!("Wrote receipt {}", receipt_path.display());

        let tests = if options.run_tests {
            progress.advance(InstallState::Testing)?;
            let result = TestRunner::new(&self.executor).run_tests(recipe.test_stage(), &ctx);
            if let Err(e) = &result {
                // The install stands; the failure is reported, not rolled back
                warn!("Tests for {} failed: {}", recipe.display_id(), e);
            }
            Some(result)
        } else {
            None
        };

        progress.advance(InstallState::Done)?;
        info!(
            "Installed {} in {:.1}s",
            recipe.display_id(),
            stages.total_duration().as_secs_f64()
        );

        Ok(InstallReport {
            name: recipe.name().to_string(),
            version: recipe.version().to_string(),
            state: progress.state,
            already_installed: false,
            dependencies,
            stages,
            receipt,
            tests,
        })
    }

    /// Fetch, unpack and prepare a fresh source tree
    fn prepare_source(&self, recipe: &Recipe) -> Result<PathBuf> {
        let archive = self.fetcher.fetch_recipe(recipe)?;

        let build_dir = self.build_dir(recipe);
        if build_dir.exists() {
            debug!("Removing stale build tree {}", build_dir.display());
            fs::remove_dir_all(&build_dir)?;
        }
        let source_root = unpack(&archive, &build_dir)?;
        info!("Unpacked {} into {}", recipe.archive_filename(), source_root.display());

        for file in recipe.prepare_files() {
            let path = source_root.join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            OpenOptions::new().create(true).append(true).open(&path)?;
            debug!("Touched {}", path.display());
        }

        Ok(source_root)
    }

    /// Substitutions and environment shared by every stage of `recipe`
    fn stage_context(&self, recipe: &Recipe, source_root: &Path) -> Result<StageContext> {
        let prefix = self.config.prefix.to_string_lossy().into_owned();
        let jobs = self.config.jobs.to_string();
        let toolchain = self.toolchain_for(recipe)?;

        let mut builtins = vec![
            ("prefix".to_string(), prefix.clone()),
            ("source_dir".to_string(), source_root.to_string_lossy().into_owned()),
            ("jobs".to_string(), jobs.clone()),
        ];
        if let Some(toolchain) = &toolchain {
            builtins.push(("toolchain".to_string(), toolchain.clone()));
        }

        let mut ctx = StageContext::new(source_root)
            .with_vars(recipe.substitutions(builtins))
            .env("FORMULARY_PREFIX", prefix)
            .env("MAKEFLAGS", format!("-j{}", jobs));
        if let Some(toolchain) = toolchain {
            ctx = ctx.env("FORMULARY_TOOLCHAIN", toolchain);
        }
        Ok(ctx.envs(recipe.environment()))
    }

    /// Configured toolchain, else the recipe's tool located on `PATH`
    fn toolchain_for(&self, recipe: &Recipe) -> Result<Option<String>> {
        if let Some(toolchain) = &self.config.toolchain {
            return Ok(Some(toolchain.clone()));
        }
        let Some(tool) = recipe.toolchain_tool() else {
            return Ok(None);
        };
        match which::which(tool) {
            Ok(path) => {
                debug!("Located toolchain {} at {}", tool, path.display());
                Ok(Some(path.to_string_lossy().into_owned()))
            }
            Err(e) => Err(Error::Config(format!(
                "{} needs '{}' but it was not found on PATH ({}); set FORMULARY_TOOLCHAIN",
                recipe.name(),
                tool,
                e
            ))),
        }
    }
}

impl PackageBuilder for Installer {
    fn installed(&self, recipe: &Recipe) -> Result<Option<PathBuf>> {
        let receipt = InstallReceipt::load(&self.config.prefix, recipe.name())?;
        Ok(receipt.filter(|r| r.matches(recipe)).map(|r| r.prefix))
    }

    fn build(&self, recipe: &Recipe, deps: &ResolvedDependencies) -> Result<PathBuf> {
        // The resolver already holds the name lock for `recipe`
        let report = self.install_locked(recipe, InstallOptions::default(), Some(deps))?;
        Ok(report.receipt.prefix)
    }
}
