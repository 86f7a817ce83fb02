//! Configuration file handling.
//!
//! This module provides loading and saving of invscan configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/invscan/config.toml`
//! - macOS: `~/Library/Application Support/invscan/config.toml`
//! - Windows: `%APPDATA%\invscan\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! cache_ttl_hours = 24
//! offline = false
//! default_format = "table"
//! plugins = ["javascript/packagelockjson", "python/requirements", "vulns/osv"]
//!
//! [walk]
//! skip_dirs = ["/proc", "/sys"]
//! skip_dir_glob = "*/node_modules/*/node_modules"
//! max_file_size = 104857600
//!
//! [ignore]
//! packages = ["@types/*"]
//! vulnerabilities = ["GHSA-35jh-r3h4-6jhm"]
//! ```

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::annotator::CacheDirAnnotator;
use crate::detector::OsvDetector;
use crate::enricher::IgnoreListEnricher;
use crate::extractor::walker::WalkOptions;
use crate::extractor::{PackageLockJsonExtractor, RequirementsExtractor};

/// Application configuration.
///
/// This struct represents all configurable options for invscan.
/// It can be loaded from a TOML file or created with default values.
///
/// # Example
///
/// ```no_run
/// use invscan::Config;
///
/// // Load from file (or use defaults if file doesn't exist)
/// let config = Config::load().unwrap();
///
/// println!("Cache TTL: {} hours", config.cache_ttl_hours);
/// println!("Plugins: {:?}", config.plugins);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long to keep cached OSV responses, in hours.
    ///
    /// Default: 24 hours
    pub cache_ttl_hours: u64,

    /// Plugins enabled when no `--plugins` flag is provided.
    ///
    /// Required extractors of these plugins are enabled automatically.
    pub plugins: Vec<String>,

    /// Scan without network access; plugins that need it can't be enabled.
    ///
    /// Default: false
    pub offline: bool,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    /// Base URL of the OSV API.
    pub osv_api_url: String,

    /// Filesystem walk filters and limits.
    pub walk: WalkConfig,

    /// Ignore list configuration for suppressing known issues.
    pub ignore: IgnoreConfig,
}

/// Filters and limits for the filesystem walk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Directories to skip, absolute or relative to the scan root.
    pub skip_dirs: Vec<String>,

    /// Skip directories whose root-relative path matches this regex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_dir_regex: Option<String>,

    /// Skip directories whose root-relative path matches this glob.
    /// Supports `*` as wildcard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_dir_glob: Option<String>,

    /// Skip files larger than this many bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,

    /// Abort the walk after this many files and directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_inodes: Option<usize>,

    pub read_symlinks: bool,
    pub store_absolute_path: bool,
    pub error_on_fs_errors: bool,

    /// Skip paths matched by `.gitignore` files in the scanned tree.
    pub use_gitignore: bool,
}

impl WalkConfig {
    /// Converts to the walker's options, compiling `skip_dir_regex`.
    ///
    /// # Errors
    ///
    /// Returns an error if `skip_dir_regex` is not a valid regex.
    pub fn to_options(&self) -> Result<WalkOptions> {
        let skip_dir_regex = self
            .skip_dir_regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("Invalid skip_dir_regex")?;

        Ok(WalkOptions {
            paths_to_extract: Vec::new(),
            ignore_sub_dirs: false,
            dirs_to_skip: self.skip_dirs.clone(),
            skip_dir_regex,
            skip_dir_glob: self.skip_dir_glob.clone(),
            max_file_size: self.max_file_size,
            max_inodes: self.max_inodes,
            read_symlinks: self.read_symlinks,
            store_absolute_path: self.store_absolute_path,
            error_on_fs_errors: self.error_on_fs_errors,
            use_gitignore: self.use_gitignore,
        })
    }
}

/// Configuration for ignoring specific packages or vulnerabilities.
///
/// Use this to suppress known false positives or accepted risks. Ignored
/// entries are kept in the report and marked with an exploitability signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names to mark as ignored.
    ///
    /// Supports glob patterns (e.g., "lodash*", "@types/*").
    pub packages: Vec<String>,

    /// Vulnerability IDs to mark as ignored (e.g., "CVE-2021-12345", "GHSA-xxxx").
    pub vulnerabilities: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a package should be ignored.
    pub fn should_ignore_package(&self, name: &str) -> bool {
        self.packages.iter().any(|pattern| glob_match(pattern, name))
    }

    /// Check if a vulnerability should be ignored.
    pub fn should_ignore_vulnerability(&self, vuln_id: &str) -> bool {
        self.vulnerabilities.iter().any(|id| id == vuln_id)
    }
}

/// Simple glob matching (supports * as wildcard).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Check prefix (before first *)
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Check suffix (after last *)
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    // Check middle parts
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_hours: 24,
            plugins: vec![
                PackageLockJsonExtractor::NAME.to_string(),
                RequirementsExtractor::NAME.to_string(),
                OsvDetector::NAME.to_string(),
                CacheDirAnnotator::NAME.to_string(),
                IgnoreListEnricher::NAME.to_string(),
            ],
            offline: false,
            default_format: "table".to_string(),
            osv_api_url: crate::detector::DEFAULT_API_URL.to_string(),
            walk: WalkConfig::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`, or defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use invscan::Config;
    ///
    /// let path = Config::config_path();
    /// println!("Config file: {}", path.display());
    /// ```
    pub fn config_path() -> PathBuf {
        crate::platform::config_dir().join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("lodash", "lodash"));
        assert!(!glob_match("lodash", "underscore"));
    }

    #[test]
    fn test_glob_match_prefix() {
        assert!(glob_match("lodash*", "lodash"));
        assert!(glob_match("lodash*", "lodash.debounce"));
        assert!(!glob_match("lodash*", "underscore"));
    }

    #[test]
    fn test_glob_match_suffix() {
        assert!(glob_match("*-cli", "typescript-cli"));
        assert!(!glob_match("*-cli", "typescript"));
    }

    #[test]
    fn test_glob_match_contains() {
        assert!(glob_match("*lodash*", "my-lodash-plugin"));
        assert!(!glob_match("*lodash*", "underscore"));
    }

    #[test]
    fn test_glob_match_paths() {
        assert!(glob_match("*/node_modules/*/node_modules", "app/node_modules/a/node_modules"));
        assert!(!glob_match("*/node_modules/*/node_modules", "app/node_modules/a"));
    }

    #[test]
    fn test_ignore_config() {
        let config = IgnoreConfig {
            packages: vec!["lodash".to_string(), "@types/*".to_string()],
            vulnerabilities: vec!["CVE-2021-12345".to_string()],
        };

        assert!(config.should_ignore_package("lodash"));
        assert!(config.should_ignore_package("@types/node"));
        assert!(!config.should_ignore_package("@babel/core"));
        assert!(config.should_ignore_vulnerability("CVE-2021-12345"));
        assert!(!config.should_ignore_vulnerability("CVE-2022-99999"));
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.cache_ttl_hours, 24);
        assert_eq!(config.default_format, "table");
        assert!(!config.offline);
        assert_eq!(config.plugins.len(), 5);
        assert!(config.ignore.packages.is_empty());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "offline = true\n[walk]\nskip_dirs = [\"/proc\"]\nskip_dir_regex = \"^vendor$\"\n[ignore]\nvulnerabilities = [\"GHSA-1\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.offline);
        assert_eq!(config.cache_ttl_hours, 24);
        assert_eq!(config.walk.skip_dirs, vec!["/proc"]);
        assert!(config.ignore.should_ignore_vulnerability("GHSA-1"));

        let options = config.walk.to_options().unwrap();
        assert!(options.skip_dir_regex.unwrap().is_match("vendor"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invscan").join("config.toml");
        let mut config = Config::default();
        config.walk.max_file_size = Some(1024);
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let walk = WalkConfig {
            skip_dir_regex: Some("(".to_string()),
            ..Default::default()
        };
        assert!(walk.to_options().is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
