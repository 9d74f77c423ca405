// src/recipe/stage.rs

//! Build stage descriptors
//!
//! A stage is a tagged, validated argv rather than a shell string. The tag
//! drives the install state machine (configure, build, install, test).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The closed set of stage kinds a recipe may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Configure the source tree (`./configure`, `cmake -B`, ...)
    Configure,
    /// Compile (`make`)
    Build,
    /// Install into the prefix (`make install`)
    Install,
    /// Post-install verification (`make test`)
    Test,
}

impl StageKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Configure => "configure",
            StageKind::Build => "build",
            StageKind::Install => "install",
            StageKind::Test => "test",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a build: a program with arguments, run in a working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    kind: StageKind,
    command: Vec<String>,
    working_directory: Option<PathBuf>,
}

impl Stage {
    /// Create a stage, rejecting an empty command
    pub fn new(kind: StageKind, command: Vec<String>) -> Result<Self> {
        match command.first() {
            None => {
                return Err(Error::MalformedRecipe(format!(
                    "{} stage has an empty command",
                    kind
                )));
            }
            Some(program) if program.trim().is_empty() => {
                return Err(Error::MalformedRecipe(format!(
                    "{} stage has an empty program name",
                    kind
                )));
            }
            Some(_) => {}
        }

        Ok(Self {
            kind,
            command,
            working_directory: None,
        })
    }

    /// Run the stage in a subdirectory of the source tree
    ///
    /// The path must be relative and must not escape the source tree.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if dir.is_absolute() || dir.components().any(|c| c.as_os_str() == "..") {
            return Err(Error::MalformedRecipe(format!(
                "{} stage working directory must stay inside the source tree: {}",
                self.kind,
                dir.display()
            )));
        }
        self.working_directory = Some(dir);
        Ok(self)
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// The full argv
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The program to execute
    pub fn program(&self) -> &str {
        &self.command[0]
    }

    /// Arguments after the program
    pub fn args(&self) -> &[String] {
        &self.command[1..]
    }

    /// Working directory relative to the source root, if declared
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Resolve the working directory against a source root
    pub fn workdir_in(&self, source_root: &Path) -> PathBuf {
        match &self.working_directory {
            Some(dir) => source_root.join(dir),
            None => source_root.to_path_buf(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.command.join(" "))
    }
}
