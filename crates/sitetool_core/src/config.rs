use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_BLOCK_SIZE: usize = 50;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;
pub const DEFAULT_MIN_OCCURRENCES: usize = 2;
pub const DEFAULT_PAGE_EXTENSIONS: &[&str] = &["php"];
pub const DEFAULT_RESOURCE_ATTRS: &str = "data-lazyload,data-bkg,data-src,data-image-src";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub refactor: RefactorSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct SiteSection {
    pub domain: Option<String>,
    #[serde(default)]
    pub page_extensions: Vec<String>,
    pub resource_attrs: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct RefactorSection {
    pub min_block_size: Option<usize>,
    pub similarity_threshold: Option<f64>,
    pub min_occurrences: Option<usize>,
}

impl SiteConfig {
    /// Resolve the site domain: env SITETOOL_DOMAIN > config > None.
    pub fn domain(&self) -> Option<String> {
        if let Ok(value) = env::var("SITETOOL_DOMAIN") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        self.site.domain.clone()
    }

    /// Page-file extensions the refactoring engine scans for.
    pub fn page_extensions(&self) -> Vec<String> {
        if self.site.page_extensions.is_empty() {
            DEFAULT_PAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect()
        } else {
            self.site.page_extensions.clone()
        }
    }

    /// Comma-separated attribute names inspected by the resource scan.
    pub fn resource_attrs(&self) -> String {
        self.site
            .resource_attrs
            .clone()
            .unwrap_or_else(|| DEFAULT_RESOURCE_ATTRS.to_string())
    }

    pub fn min_block_size(&self) -> usize {
        self.refactor.min_block_size.unwrap_or(DEFAULT_MIN_BLOCK_SIZE)
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.refactor
            .similarity_threshold
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD)
    }

    pub fn min_occurrences(&self) -> usize {
        self.refactor
            .min_occurrences
            .unwrap_or(DEFAULT_MIN_OCCURRENCES)
    }
}

/// Load and parse a SiteConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SiteConfig> {
    if !config_path.exists() {
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SiteConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_builtin_tunables() {
        let config = SiteConfig::default();
        assert_eq!(config.min_block_size(), 50);
        assert_eq!(config.similarity_threshold(), 0.9);
        assert_eq!(config.min_occurrences(), 2);
        assert_eq!(config.page_extensions(), vec!["php".to_string()]);
        assert_eq!(
            config.resource_attrs(),
            "data-lazyload,data-bkg,data-src,data-image-src"
        );
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert!(config.site.domain.is_none());
        assert_eq!(config.min_block_size(), 50);
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[site]
domain = "https://www.example.org"
page_extensions = ["php", "html"]
resource_attrs = "data-src"

[refactor]
min_block_size = 80
similarity_threshold = 0.85
min_occurrences = 3
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(
            config.site.domain.as_deref(),
            Some("https://www.example.org")
        );
        assert_eq!(config.page_extensions(), vec!["php", "html"]);
        assert_eq!(config.resource_attrs(), "data-src");
        assert_eq!(config.min_block_size(), 80);
        assert_eq!(config.similarity_threshold(), 0.85);
        assert_eq!(config.min_occurrences(), 3);
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[refactor]\nmin_block_size = 64\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.min_block_size(), 64);
        assert_eq!(config.similarity_threshold(), 0.9);
        assert!(config.site.domain.is_none());
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[site\ndomain = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }
}
