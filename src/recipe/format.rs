// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files. These types mirror the file one-to-one and carry
//! no validation; [`super::Recipe`] is built from them by the parser.
//! Field spellings follow common formula conventions (`desc`, `url`,
//! `sha256`, `depends_on`) with longer aliases accepted.

use super::stage::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A recipe file as written on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeFile {
    /// Package metadata
    pub package: PackageSection,

    /// Source archive and its checksum
    pub source: SourceSection,

    /// Source tree preparation before the first stage
    #[serde(default)]
    pub prepare: PrepareSection,

    /// Build tool lookup
    #[serde(default)]
    pub toolchain: ToolchainSection,

    /// Ordered install stages (configure, build, install)
    #[serde(default, alias = "stages")]
    pub install: Vec<StageEntry>,

    /// Post-install test stage (optional)
    #[serde(default)]
    pub test: Option<StageEntry>,

    /// Custom `%(key)s` substitutions
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Extra environment variables for every stage
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name
    pub name: String,

    /// Package version; derived from the archive name when absent
    #[serde(default)]
    pub version: Option<String>,

    /// Short description
    #[serde(default, alias = "desc")]
    pub description: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// Names of recipes that must be installed first
    #[serde(default, alias = "dependencies")]
    pub depends_on: Vec<String>,
}

/// Source archive section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSection {
    /// Archive URL (`https://`, `http://` or `file://`)
    ///
    /// Supports `%(version)s` substitution.
    #[serde(alias = "archive")]
    pub url: String,

    /// SHA-256 of the archive, optionally `sha256:`-prefixed
    #[serde(alias = "checksum")]
    pub sha256: String,
}

/// Files to create in the source tree before configuring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrepareSection {
    /// Empty files to create, relative to the source root
    #[serde(default)]
    pub touch: Vec<String>,
}

/// Build tool lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolchainSection {
    /// Tool to locate on `PATH` when no toolchain path is configured
    ///
    /// The located path becomes `%(toolchain)s`.
    #[serde(default)]
    pub locate: Option<String>,
}

/// A single stage as written in the file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEntry {
    /// Stage kind; required for install stages, defaults to `test` for the test stage
    #[serde(default)]
    pub kind: Option<StageKind>,

    /// Program and arguments
    pub command: Vec<String>,

    /// Working directory relative to the source root
    #[serde(default, alias = "workdir")]
    pub working_directory: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const KDREPORTS: &str = r#"
[package]
name = "kdreports"
desc = "A Qt library for creating printable reports"
homepage = "https://github.com/KDAB/KDReports"
depends_on = ["qt"]

[source]
url = "https://build.opensuse.org/source/isv:KDAB/KDReports/kdreports-1.6.0.tar.gz"
sha256 = "b3eb98916eca6a0e9bea31546782d006f66ebb2a5df45f0e68901b13fed20908"

[prepare]
touch = [".license.accepted"]

[toolchain]
locate = "qmake"

[[install]]
kind = "configure"
command = ["./configure.sh", "-shared", "-release", "-qmake", "%(toolchain)s", "-prefix", "%(prefix)s"]

[[install]]
kind = "build"
command = ["make"]

[[install]]
kind = "install"
command = ["make", "install"]

[test]
command = ["make", "test"]
"#;

    #[test]
    fn test_parse_formula_spellings() {
        let file: RecipeFile = toml::from_str(KDREPORTS).unwrap();

        assert_eq!(file.package.name, "kdreports");
        assert_eq!(
            file.package.description.as_deref(),
            Some("A Qt library for creating printable reports")
        );
        assert_eq!(file.package.depends_on, vec!["qt"]);
        assert!(file.source.url.ends_with("kdreports-1.6.0.tar.gz"));
        assert_eq!(file.prepare.touch, vec![".license.accepted"]);
        assert_eq!(file.toolchain.locate.as_deref(), Some("qmake"));
        assert_eq!(file.install.len(), 3);
        assert_eq!(file.install[0].kind, Some(StageKind::Configure));
        assert_eq!(file.test.as_ref().unwrap().kind, None);
    }

    #[test]
    fn test_long_aliases() {
        let toml = r#"
[package]
name = "hello"
description = "greeter"
dependencies = ["libc"]

[source]
archive = "https://example.com/hello-2.12.tar.gz"
checksum = "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"

[[stages]]
kind = "build"
command = ["make"]
workdir = "src"
"#;
        let file: RecipeFile = toml::from_str(toml).unwrap();
        assert_eq!(file.package.depends_on, vec!["libc"]);
        assert!(file.source.sha256.starts_with("sha256:"));
        assert_eq!(file.install[0].working_directory.as_deref(), Some("src"));
        assert!(file.test.is_none());
        assert!(file.variables.is_empty());
    }

    #[test]
    fn test_missing_source_is_error() {
        let toml = r#"
[package]
name = "hello"
"#;
        assert!(toml::from_str::<RecipeFile>(toml).is_err());
    }

    #[test]
    fn test_unknown_stage_kind_is_error() {
        let toml = r#"
[package]
name = "hello"

[source]
url = "https://example.com/hello.tar.gz"
sha256 = "abc"

[[install]]
kind = "deploy"
command = ["true"]
"#;
        assert!(toml::from_str::<RecipeFile>(toml).is_err());
    }
}
