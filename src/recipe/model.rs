// src/recipe/model.rs

//! The validated, read-only recipe
//!
//! A [`Recipe`] is built once per invocation from a [`RecipeFile`] and then
//! shared immutably by the resolver, fetcher and kitchen. Every accessor
//! returns borrowed data; there are no setters.

use super::format::RecipeFile;
use super::stage::{Stage, StageKind};
use crate::error::{Error, Result};
use crate::hash::Checksum;
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Archive suffixes stripped when deriving a version from the file name
const ARCHIVE_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.zst", ".tzst", ".tar",
];

/// Version used when none is declared and none can be derived
pub const UNKNOWN_VERSION: &str = "unversioned";

/// A validated recipe
#[derive(Debug, Clone)]
pub struct Recipe {
    name: String,
    version: String,
    description: Option<String>,
    homepage: Option<Url>,
    source_url: Url,
    checksum: Checksum,
    dependencies: Vec<String>,
    stages: Vec<Stage>,
    test_stage: Option<Stage>,
    prepare: Vec<PathBuf>,
    toolchain_tool: Option<String>,
    variables: BTreeMap<String, String>,
    environment: BTreeMap<String, String>,
}

impl Recipe {
    /// Parse and validate a recipe from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        super::parser::parse_recipe(content)
    }

    /// Parse and validate a recipe file
    pub fn load(path: &Path) -> Result<Self> {
        super::parser::parse_recipe_file(path)
    }

    /// Validate a raw recipe file
    pub fn from_file(file: RecipeFile) -> Result<Self> {
        let RecipeFile {
            package,
            source,
            prepare,
            toolchain,
            install,
            test,
            variables,
            environment,
        } = file;

        let name = package.name.trim().to_string();
        validate_name(&name, "package name")?;

        let version = match package.version {
            Some(v) if v.trim().is_empty() => {
                return Err(Error::MalformedRecipe(
                    "package version cannot be empty when declared".to_string(),
                ));
            }
            Some(v) => v.trim().to_string(),
            None => derive_version(&name, &source.url),
        };

        let homepage = package
            .homepage
            .as_deref()
            .map(|h| {
                Url::parse(h)
                    .map_err(|e| Error::MalformedRecipe(format!("invalid homepage '{}': {}", h, e)))
            })
            .transpose()?;

        // The URL may reference %(version)s and %(name)s
        let mut url_vars = BTreeMap::new();
        url_vars.insert("name".to_string(), name.clone());
        url_vars.insert("version".to_string(), version.clone());
        let raw_url = substitute(source.url.trim(), &url_vars);
        if raw_url.is_empty() {
            return Err(Error::MalformedRecipe("source url is required".to_string()));
        }
        let source_url = Url::parse(&raw_url).map_err(|e| {
            Error::MalformedRecipe(format!("invalid source url '{}': {}", raw_url, e))
        })?;
        if !matches!(source_url.scheme(), "http" | "https" | "file") {
            return Err(Error::MalformedRecipe(format!(
                "unsupported source url scheme '{}' (expected http, https or file)",
                source_url.scheme()
            )));
        }

        let checksum = Checksum::parse(&source.sha256)
            .map_err(|e| Error::MalformedRecipe(format!("invalid sha256: {}", e)))?;

        let mut seen = HashSet::new();
        let mut dependencies = Vec::with_capacity(package.depends_on.len());
        for dep in package.depends_on {
            let dep = dep.trim().to_string();
            validate_name(&dep, "dependency name")?;
            if dep == name {
                return Err(Error::MalformedRecipe(format!(
                    "package '{}' cannot depend on itself",
                    name
                )));
            }
            if !seen.insert(dep.clone()) {
                return Err(Error::MalformedRecipe(format!(
                    "dependency '{}' is listed more than once",
                    dep
                )));
            }
            dependencies.push(dep);
        }

        if install.is_empty() {
            return Err(Error::MalformedRecipe(
                "recipe declares no install stages".to_string(),
            ));
        }

        let mut stages = Vec::with_capacity(install.len());
        let mut previous = StageKind::Configure;
        for (index, entry) in install.into_iter().enumerate() {
            let kind = entry.kind.ok_or_else(|| {
                Error::MalformedRecipe(format!("install stage #{} has no kind", index))
            })?;
            if kind == StageKind::Test {
                return Err(Error::MalformedRecipe(format!(
                    "install stage #{} has kind 'test'; declare it in [test] instead",
                    index
                )));
            }
            if kind < previous {
                return Err(Error::MalformedRecipe(format!(
                    "install stage #{} ({}) comes after a {} stage",
                    index, kind, previous
                )));
            }
            previous = kind;

            let mut stage = Stage::new(kind, entry.command)?;
            if let Some(dir) = entry.working_directory {
                stage = stage.with_working_directory(dir)?;
            }
            stages.push(stage);
        }

        let test_stage = match test {
            None => None,
            Some(entry) => {
                let kind = entry.kind.unwrap_or(StageKind::Test);
                if kind != StageKind::Test {
                    return Err(Error::MalformedRecipe(format!(
                        "test stage must have kind 'test', not '{}'",
                        kind
                    )));
                }
                let mut stage = Stage::new(kind, entry.command)?;
                if let Some(dir) = entry.working_directory {
                    stage = stage.with_working_directory(dir)?;
                }
                Some(stage)
            }
        };

        let mut prepare_files = Vec::with_capacity(prepare.touch.len());
        for file in prepare.touch {
            let path = PathBuf::from(file.trim());
            let escapes = path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if path.as_os_str().is_empty() || escapes {
                return Err(Error::MalformedRecipe(format!(
                    "prepare file must be a relative path inside the source tree: '{}'",
                    path.display()
                )));
            }
            prepare_files.push(path);
        }

        let toolchain_tool = match toolchain.locate {
            Some(tool) if tool.trim().is_empty() => {
                return Err(Error::MalformedRecipe(
                    "toolchain.locate cannot be empty".to_string(),
                ));
            }
            other => other.map(|t| t.trim().to_string()),
        };

        Ok(Self {
            name,
            version,
            description: package.description,
            homepage,
            source_url,
            checksum,
            dependencies,
            stages,
            test_stage,
            prepare: prepare_files,
            toolchain_tool,
            variables,
            environment,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn homepage(&self) -> Option<&Url> {
        self.homepage.as_ref()
    }

    /// Source archive URL with variables substituted
    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Declared dependency names, in declaration order
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Install stages, in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn test_stage(&self) -> Option<&Stage> {
        self.test_stage.as_ref()
    }

    /// Files to create in the source tree before the first stage
    pub fn prepare_files(&self) -> &[PathBuf] {
        &self.prepare
    }

    /// Build tool to locate when no toolchain path is configured
    pub fn toolchain_tool(&self) -> Option<&str> {
        self.toolchain_tool.as_deref()
    }

    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Archive filename from the URL
    pub fn archive_filename(&self) -> String {
        self.source_url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}-{}.tar.gz", self.name, self.version))
    }

    /// `name-version`, used for build directory names and log lines
    pub fn display_id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// Build the substitution table for stage commands
    ///
    /// Built-in `name` and `version` come first, then the caller's entries
    /// (prefix, toolchain, ...), then custom `[variables]`. Earlier entries win.
    pub fn substitutions<I>(&self, builtins: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), self.name.clone());
        vars.insert("version".to_string(), self.version.clone());
        for (key, value) in builtins {
            vars.entry(key).or_insert(value);
        }
        for (key, value) in &self.variables {
            vars.entry(key.clone()).or_insert_with(|| value.clone());
        }
        vars
    }
}

/// Replace `%(key)s` placeholders in a single pass
///
/// Unknown keys are left untouched. Substituted values are not rescanned.
pub fn substitute(template: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find(")s") {
            Some(end) if vars.contains_key(&after[..end]) => {
                out.push_str(&vars[&after[..end]]);
                rest = &after[end + 2..];
            }
            _ => {
                out.push_str("%(");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn validate_name(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::MalformedRecipe(format!("{} cannot be empty", what)));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '+' | '@'));
    if !valid || name.starts_with('.') {
        return Err(Error::MalformedRecipe(format!("invalid {}: '{}'", what, name)));
    }
    Ok(())
}

/// Derive a version from an archive URL like `.../kdreports-1.6.0.tar.gz`
fn derive_version(name: &str, url: &str) -> String {
    let filename = url.rsplit('/').next().unwrap_or("");
    let stem = ARCHIVE_SUFFIXES
        .iter()
        .find_map(|suffix| filename.strip_suffix(suffix))
        .unwrap_or(filename);

    if let Some(version) = stem.strip_prefix(&format!("{}-", name))
        && version.starts_with(|c: char| c.is_ascii_digit())
    {
        return version.to_string();
    }

    stem.rsplit_once('-')
        .map(|(_, v)| v)
        .filter(|v| v.starts_with(|c: char| c.is_ascii_digit()))
        .map(|v| v.to_string())
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}
