// src/cli.rs
//! CLI definitions for formulary
//!
//! This module contains the command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "formulary")]
#[command(version)]
#[command(about = "Fetch, verify, build and install packages from declarative recipes", long_about = None)]
pub struct Cli {
    /// Config file (default: $FORMULARY_CONFIG or <config dir>/formulary/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings that override the config file and environment
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Installation prefix (env: FORMULARY_PREFIX)
    #[arg(long)]
    pub prefix: Option<PathBuf>,

    /// Toolchain locator substituted as %(toolchain)s (env: FORMULARY_TOOLCHAIN)
    #[arg(long)]
    pub toolchain: Option<String>,

    /// Directory of <name>.toml recipes for dependencies (env: FORMULARY_REGISTRY)
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Source archive cache (env: FORMULARY_CACHE)
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Parallel make jobs
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Kill any stage running longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub stage_timeout: Option<u64>,

    /// Install dependencies one at a time
    #[arg(long)]
    pub no_parallel: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a recipe and its dependencies
    Install {
        /// Recipe file, or a package name in the registry
        recipe: String,

        /// Run the test stage after installing
        #[arg(long)]
        test: bool,

        /// Reinstall even if already installed
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Run the test stage of an installed recipe
    Test {
        /// Recipe file, or a package name in the registry
        recipe: String,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Download and verify a recipe's source archive
    Fetch {
        /// Recipe file, or a package name in the registry
        recipe: String,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Validate a recipe without building it
    Check {
        /// Recipe file, or a package name in the registry
        recipe: String,

        #[command(flatten)]
        overrides: Overrides,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install() {
        let cli = Cli::try_parse_from([
            "formulary", "install", "kdreports.toml", "--test", "--prefix", "/opt/kd", "-j", "4",
            "--no-parallel", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Install { recipe, test, force, overrides } => {
                assert_eq!(recipe, "kdreports.toml");
                assert!(test);
                assert!(!force);
                assert_eq!(overrides.prefix, Some(PathBuf::from("/opt/kd")));
                assert_eq!(overrides.jobs, Some(4));
                assert!(overrides.no_parallel);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["formulary", "-v", "-q", "check", "x.toml"]).is_err());
    }
}
