// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::recipe::format::RecipeFile;
use crate::recipe::model::Recipe;
use std::path::Path;

/// Parse and validate a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    let file: RecipeFile = toml::from_str(content)
        .map_err(|e| Error::MalformedRecipe(format!("Invalid recipe: {}", e)))?;
    Recipe::from_file(file)
}

/// Parse and validate a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::MalformedRecipe(format!(
            "Failed to read recipe file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_recipe(&content)
}

/// Check a valid recipe for things worth warning about
///
/// Hard errors are already rejected by [`Recipe::from_file`]; these are
/// advisory only.
pub fn validate_recipe(recipe: &Recipe) -> Vec<String> {
    let mut warnings = Vec::new();

    if recipe.description().is_none() {
        warnings.push("Missing package description".to_string());
    }
    if recipe.homepage().is_none() {
        warnings.push("Missing package homepage".to_string());
    }
    if recipe.source_url().scheme() == "http" {
        warnings.push(format!(
            "Source is fetched over plain http: {}",
            recipe.source_url()
        ));
    }
    if recipe.test_stage().is_none() {
        warnings.push("No test stage declared".to_string());
    }
    if !recipe
        .stages()
        .iter()
        .any(|s| s.kind() == crate::recipe::StageKind::Install)
    {
        warnings.push("No install stage declared; nothing will be written to the prefix".to_string());
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::StageKind;

    const CHECKSUM: &str = "b3eb98916eca6a0e9bea31546782d006f66ebb2a5df45f0e68901b13fed20908";

    fn recipe_with(body: &str) -> String {
        format!(
            r#"
[package]
name = "kdreports"
desc = "A Qt library for creating printable reports"
homepage = "https://github.com/KDAB/KDReports"
depends_on = ["qt"]

[source]
url = "https://build.opensuse.org/source/isv:KDAB/KDReports/kdreports-1.6.0.tar.gz"
sha256 = "{}"
{}"#,
            CHECKSUM, body
        )
    }

    const STAGES: &str = r#"
[[install]]
kind = "configure"
command = ["./configure.sh", "-prefix", "%(prefix)s"]

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
    fn test_parse_valid_recipe() {
        let recipe = parse_recipe(&recipe_with(STAGES)).unwrap();
        assert_eq!(recipe.name(), "kdreports");
        assert_eq!(recipe.version(), "1.6.0");
        assert_eq!(recipe.checksum().as_str(), CHECKSUM);
        assert_eq!(recipe.dependencies(), ["qt"]);
        assert_eq!(recipe.stages().len(), 3);
        assert_eq!(recipe.stages()[2].kind(), StageKind::Install);
        assert_eq!(recipe.test_stage().unwrap().command(), ["make", "test"]);
        assert_eq!(recipe.archive_filename(), "kdreports-1.6.0.tar.gz");
        assert!(validate_recipe(&recipe).is_empty());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let err = parse_recipe("this is not valid toml at all {}").unwrap_err();
        assert!(matches!(err, Error::MalformedRecipe(_)));
    }

    #[test]
    fn test_missing_stages_is_malformed() {
        let err = parse_recipe(&recipe_with("")).unwrap_err();
        assert!(err.to_string().contains("no install stages"));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let content = recipe_with(STAGES).replace("name = \"kdreports\"", "");
        assert!(matches!(parse_recipe(&content), Err(Error::MalformedRecipe(_))));
    }

    #[test]
    fn test_bad_checksum_is_malformed() {
        let content = recipe_with(STAGES).replace(CHECKSUM, "abc123");
        let err = parse_recipe(&content).unwrap_err();
        assert!(err.to_string().contains("invalid sha256"));

        let content = recipe_with(STAGES).replace(CHECKSUM, "");
        assert!(matches!(parse_recipe(&content), Err(Error::MalformedRecipe(_))));
    }

    #[test]
    fn test_bad_source_url_is_malformed() {
        let content = recipe_with(STAGES).replace(
            "https://build.opensuse.org/source/isv:KDAB/KDReports/kdreports-1.6.0.tar.gz",
            "not a url",
        );
        assert!(matches!(parse_recipe(&content), Err(Error::MalformedRecipe(_))));

        let content = recipe_with(STAGES).replace("https://build", "ftp://build");
        assert!(parse_recipe(&content).unwrap_err().to_string().contains("scheme"));
    }

    #[test]
    fn test_out_of_order_stages_rejected() {
        let body = r#"
[[install]]
kind = "install"
command = ["make", "install"]

[[install]]
kind = "configure"
command = ["./configure"]
"#;
        let err = parse_recipe(&recipe_with(body)).unwrap_err();
        assert!(err.to_string().contains("comes after"));
    }

    #[test]
    fn test_test_kind_not_allowed_in_install() {
        let body = r#"
[[install]]
kind = "test"
command = ["make", "test"]
"#;
        assert!(parse_recipe(&recipe_with(body)).is_err());

        let body = r#"
[[install]]
kind = "build"
command = ["make"]

[test]
kind = "build"
command = ["make", "check"]
"#;
        assert!(parse_recipe(&recipe_with(body)).is_err());
    }

    #[test]
    fn test_self_and_duplicate_dependencies_rejected() {
        let content = recipe_with(STAGES).replace(r#"["qt"]"#, r#"["qt", "qt"]"#);
        assert!(parse_recipe(&content).unwrap_err().to_string().contains("more than once"));

        let content = recipe_with(STAGES).replace(r#"["qt"]"#, r#"["kdreports"]"#);
        assert!(parse_recipe(&content).unwrap_err().to_string().contains("itself"));
    }

    #[test]
    fn test_prepare_paths_stay_in_tree() {
        let body = format!("{}\n[prepare]\ntouch = [\"../escape\"]\n", STAGES);
        assert!(parse_recipe(&recipe_with(&body)).is_err());

        let body = format!("{}\n[prepare]\ntouch = [\".license.accepted\"]\n", STAGES);
        let recipe = parse_recipe(&recipe_with(&body)).unwrap();
        assert_eq!(recipe.prepare_files().len(), 1);
    }

    #[test]
    fn test_version_substituted_into_url() {
        let content = recipe_with(STAGES)
            .replace("kdreports-1.6.0.tar.gz", "kdreports-%(version)s.tar.gz")
            .replace("name = \"kdreports\"", "name = \"kdreports\"\nversion = \"2.0.0\"");
        let recipe = parse_recipe(&content).unwrap();
        assert!(recipe.source_url().as_str().ends_with("kdreports-2.0.0.tar.gz"));
    }

    #[test]
    fn test_validate_warnings() {
        let content = r#"
[package]
name = "bare"

[source]
url = "http://example.com/bare-1.0.tar.gz"
sha256 = "b3eb98916eca6a0e9bea31546782d006f66ebb2a5df45f0e68901b13fed20908"

[[install]]
kind = "build"
command = ["make"]
"#;
        let recipe = parse_recipe(content).unwrap();
        let warnings = validate_recipe(&recipe);
        assert!(warnings.iter().any(|w| w.contains("description")));
        assert!(warnings.iter().any(|w| w.contains("homepage")));
        assert!(warnings.iter().any(|w| w.contains("plain http")));
        assert!(warnings.iter().any(|w| w.contains("test stage")));
        assert!(warnings.iter().any(|w| w.contains("No install stage")));
    }

    #[test]
    fn test_missing_file_is_malformed() {
        let err = parse_recipe_file(Path::new("/nonexistent/recipe.toml")).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
