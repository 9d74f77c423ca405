// src/error.rs

//! Error types for the recipe executor
//!
//! Every failure an install can hit is a variant of [`Error`]. The CLI maps
//! them onto process exit codes with [`Error::exit_code`].

use crate::recipe::StageKind;
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, fetching, resolving or building a recipe
#[derive(Error, Debug)]
pub enum Error {
    /// Recipe is missing required fields or declares invalid values
    #[error("Malformed recipe: {0}")]
    MalformedRecipe(String),

    /// Transport failure while downloading a source archive
    #[error("Network error fetching {url}: {reason}")]
    Network {
        url: String,
        reason: String,
        retryable: bool,
    },

    /// Downloaded bytes do not hash to the declared checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Dependency name is not known to the registry
    #[error("Unresolved dependency '{name}' (required by {required_by})")]
    UnresolvedDependency { name: String, required_by: String },

    /// Dependency graph loops back on itself
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    /// A build stage exited unsuccessfully or could not be spawned
    #[error("{kind} stage #{stage_index} failed{}", exit_suffix(.exit_code))]
    StageFailed {
        stage_index: usize,
        kind: StageKind,
        exit_code: Option<i32>,
        output: String,
    },

    /// A build stage ran past its deadline and was killed
    #[error("{kind} stage #{stage_index} timed out after {}s", .timeout.as_secs())]
    StageTimeout {
        stage_index: usize,
        kind: StageKind,
        timeout: Duration,
    },

    /// The post-install test stage failed
    #[error("Tests failed{}", exit_suffix(.exit_code))]
    TestFailed {
        exit_code: Option<i32>,
        output: String,
    },

    /// Another process holds the install lock for this package
    #[error("Package '{0}' is being installed by another process")]
    Locked(String),

    /// Operation needs an installed package but no receipt exists
    #[error("Package '{0}' is not installed")]
    NotInstalled(String),

    /// Install state machine asked to make a transition it does not allow
    #[error("Invalid install state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Invalid configuration file or value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or subprocess I/O failure
    #[error("I/O error: {0}")]
    IoError(String),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    }
}

impl Error {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network { retryable: true, .. })
    }

    /// Process exit code for this failure
    ///
    /// Malformed recipes exit with 2; every resolution, fetch, build or test
    /// failure exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MalformedRecipe(_) => 2,
            _ => 1,
        }
    }

    /// Captured subprocess output, for stage and test failures
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            Error::StageFailed { output, .. } | Error::TestFailed { output, .. } => {
                Some(output.as_str())
            }
            _ => None,
        }
    }

    pub(crate) fn network(url: &str, reason: impl Into<String>, retryable: bool) -> Self {
        Error::Network {
            url: url.to_string(),
            reason: reason.into(),
            retryable,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}
