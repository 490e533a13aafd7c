//! Configuration file loading and management
//!
//! This module handles loading and parsing the host configuration from
//! `$XDG_CONFIG_HOME/oxcom/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Main host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Host-wide settings
    #[serde(default)]
    pub host: HostConfig,
    /// Where type libraries come from
    #[serde(default)]
    pub typelibs: TypeLibConfig,
    /// Per-class settings, keyed by ProgID
    #[serde(default)]
    pub classes: HashMap<String, ClassConfig>,
}

/// Host settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
}

/// Type library sources
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeLibConfig {
    /// Extra directories scanned for `*.toml` manifests, before the
    /// standard locations
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    /// Register the libraries embedded in the test server
    /// Default: true
    #[serde(default = "default_true")]
    pub include_builtin: bool,
    /// Scan the user and system data directories
    /// Default: true
    #[serde(default = "default_true")]
    pub discover: bool,
}

/// Per-class configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassConfig {
    /// Whether the class is registered at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for TypeLibConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            include_builtin: true,
            discover: true,
        }
    }
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/oxcom/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "oxcom", "oxcom")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Create a default configuration file with documented comments
    pub fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> String {
        r#"# oxcom host configuration

[host]
# Log level: trace, debug, info, warn, error
# RUST_LOG takes precedence when set.
# Default: "info"
log_level = "info"

[typelibs]
# Extra directories scanned for type library manifests (*.toml).
# They are registered before the standard locations.
# search_paths = ["/opt/vendor/typelibs"]
search_paths = []

# Register the libraries embedded in the test server
# Default: true
include_builtin = true

# Scan $XDG_DATA_HOME/oxcom/typelibs and the system data directories
# Default: true
discover = true

# Per-class settings, keyed by ProgID. Classes are enabled unless
# listed here with enabled = false.
#
# [classes."OxcomTestSrv.DeviceEnumerator"]
# enabled = false
"#
        .to_string()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.host.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.host.log_level,
                valid_log_levels.join(", ")
            );
        }

        if let Some(index) = self
            .typelibs
            .search_paths
            .iter()
            .position(|p| p.as_os_str().is_empty())
        {
            anyhow::bail!("typelibs.search_paths[{}] is empty", index);
        }

        if self.classes.keys().any(|progid| progid.trim().is_empty()) {
            anyhow::bail!("classes: ProgID must not be empty");
        }

        Ok(())
    }

    /// Whether the class registered under `progid` should be made available.
    ///
    /// Matching ignores case, as ProgID lookups do.
    pub fn class_enabled(&self, progid: &str) -> bool {
        self.classes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(progid))
            .map_or(true, |(_, class)| class.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host.log_level, "info");
        assert!(config.typelibs.search_paths.is_empty());
        assert!(config.typelibs.include_builtin);
        assert!(config.typelibs.discover);
        assert!(config.classes.is_empty());
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[host]
log_level = "debug"

[typelibs]
search_paths = ["/opt/typelibs", "relative/libs"]
include_builtin = false
discover = false

[classes."OxcomTestSrv.DeviceEnumerator"]
enabled = false
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(config_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.host.log_level, "debug");
        assert_eq!(
            config.typelibs.search_paths,
            vec![PathBuf::from("/opt/typelibs"), PathBuf::from("relative/libs")]
        );
        assert!(!config.typelibs.include_builtin);
        assert!(!config.typelibs.discover);
        assert!(!config.classes["OxcomTestSrv.DeviceEnumerator"].enabled);
    }

    #[test]
    fn test_load_minimal_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[host]\nlog_level = \"warn\"\n").unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.host.log_level, "warn");
        assert_eq!(config.typelibs, TypeLibConfig::default());
        assert!(config.classes.is_empty());
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[host\nlog_level = ").unwrap();

        let err = Config::load(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_default_content_is_valid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::create_default_file(&path).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.host.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_search_path() {
        let mut config = Config::default();
        config.typelibs.search_paths = vec![PathBuf::from("/ok"), PathBuf::new()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("search_paths[1]"));
    }

    #[test]
    fn test_validate_empty_progid() {
        let mut config = Config::default();
        config.classes.insert("  ".to_string(), ClassConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_class_enabled() {
        let mut config = Config::default();
        config
            .classes
            .insert("OxcomTestSrv.RecordParamTest".to_string(), ClassConfig { enabled: false });

        assert!(!config.class_enabled("oxcomtestsrv.recordparamtest"));
        assert!(config.class_enabled("OxcomTestSrv.SafearrayParamTest"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path().unwrap();
        assert!(path.to_string_lossy().contains("oxcom"));
        assert!(path.ends_with("config.toml"));
    }

    #[test]
    fn test_full_config_roundtrip() {
        let mut config = Config::default();
        config.host.log_level = "trace".to_string();
        config.typelibs.search_paths.push(PathBuf::from("/srv/typelibs"));
        config
            .classes
            .insert("OxcomTestSrv.DeviceEnumerator".to_string(), ClassConfig { enabled: false });

        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config, deserialized);
    }
}
