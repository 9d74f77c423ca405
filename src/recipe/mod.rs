// src/recipe/mod.rs

//! Recipe model: the declarative description of a package build
//!
//! A recipe names a package, the source archive and its SHA-256, the
//! packages it depends on, and an ordered list of typed stages.
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "kdreports"
//! desc = "A Qt library for creating printable reports"
//! homepage = "https://github.com/KDAB/KDReports"
//! depends_on = ["qt"]
//!
//! [source]
//! url = "https://build.opensuse.org/source/isv:KDAB/KDReports/kdreports-1.6.0.tar.gz"
//! sha256 = "b3eb98916eca6a0e9bea31546782d006f66ebb2a5df45f0e68901b13fed20908"
//!
//! [prepare]
//! touch = [".license.accepted"]
//!
//! [toolchain]
//! locate = "qmake"
//!
//! [[install]]
//! kind = "configure"
//! command = ["./configure.sh", "-shared", "-release", "-qmake", "%(toolchain)s", "-prefix", "%(prefix)s"]
//!
//! [[install]]
//! kind = "build"
//! command = ["make"]
//!
//! [[install]]
//! kind = "install"
//! command = ["make", "install"]
//!
//! [test]
//! command = ["make", "test"]
//! ```

mod format;
mod model;
pub mod parser;
mod stage;

pub use format::{PackageSection, PrepareSection, RecipeFile, SourceSection, StageEntry, ToolchainSection};
pub use model::{substitute, Recipe, UNKNOWN_VERSION};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
pub use stage::{Stage, StageKind};
