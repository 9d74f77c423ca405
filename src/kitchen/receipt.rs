// src/kitchen/receipt.rs

//! Install receipts
//!
//! A receipt at `<prefix>/.formulary/receipts/<name>.json` is what marks a
//! package as installed. It is written only after every install stage has
//! succeeded.

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Record of a completed install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    /// Source checksum, `sha256:`-prefixed
    pub checksum: String,
    pub prefix: PathBuf,
    /// Source tree the stages ran in; the `test` command reuses it
    pub build_dir: PathBuf,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl InstallReceipt {
    pub fn new(recipe: &Recipe, prefix: &Path, build_dir: &Path, dependencies: Vec<String>) -> Self {
        Self {
            name: recipe.name().to_string(),
            version: recipe.version().to_string(),
            checksum: recipe.checksum().to_prefixed_string(),
            prefix: prefix.to_path_buf(),
            build_dir: build_dir.to_path_buf(),
            installed_at: Utc::now(),
            dependencies,
        }
    }

    /// Where the receipt for `name` lives under `prefix`
    pub fn path_for(prefix: &Path, name: &str) -> PathBuf {
        prefix
            .join(".formulary")
            .join("receipts")
            .join(format!("{}.json", name))
    }

    /// Load the receipt for `name`, or `None` if it is not installed
    pub fn load(prefix: &Path, name: &str) -> Result<Option<Self>> {
        let path = Self::path_for(prefix, name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let receipt = serde_json::from_str(&content).map_err(|e| {
            Error::IoError(format!("Corrupt install receipt {}: {}", path.display(), e))
        })?;
        Ok(Some(receipt))
    }

    /// Write the receipt atomically (temp file, then rename)
    pub fn write(&self) -> Result<PathBuf> {
        let path = Self::path_for(&self.prefix, &self.name);
        let dir = path
            .parent()
            .ok_or_else(|| Error::IoError(format!("Invalid receipt path {}", path.display())))?;
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::IoError(format!("Failed to serialize receipt: {}", e)))?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(json.as_bytes())?;
        temp.write_all(b"\n")?;
        temp.persist(&path)
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Whether this receipt records the same source as `recipe`
    pub fn matches(&self, recipe: &Recipe) -> bool {
        self.name == recipe.name() && self.checksum == recipe.checksum().to_prefixed_string()
    }
}
