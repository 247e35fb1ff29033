//! Per-group module configuration.
//!
//! Each plugin group reads `<config_dir>/<group>.toml`. Every top-level table
//! is one module section, keyed by the module's short name:
//!
//! ```toml
//! [virustotal]
//! enabled = true
//! key = "a0283a2c3d55728300d064874239b5346fb991317e8449fe43c902879d758088"
//! timeout = 60
//!
//! [jsondump]
//! enabled = true
//! indent = 4
//! ```
//!
//! A missing section means the module is disabled.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options of one module section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleOptions {
    #[serde(default)]
    pub enabled: bool,

    /// Module-specific keys.
    #[serde(flatten)]
    pub values: BTreeMap<String, toml::Value>,
}

impl ModuleOptions {
    /// An enabled section with no extra keys.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            values: BTreeMap::new(),
        }
    }

    /// A disabled section.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Set a module-specific key.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.as_integer())
    }
}

/// Configuration source for one plugin group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleConfig {
    group: String,
    path: Option<PathBuf>,
    sections: BTreeMap<String, ModuleOptions>,
}

impl ModuleConfig {
    /// A configuration with no sections (every module disabled).
    pub fn empty(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            path: None,
            sections: BTreeMap::new(),
        }
    }

    /// Add or replace a section.
    pub fn with_section(mut self, name: impl Into<String>, options: ModuleOptions) -> Self {
        self.sections.insert(name.into(), options);
        self
    }

    /// Load `<config_dir>/<group>.toml`.
    ///
    /// A missing file yields an empty configuration.
    pub fn load(config_dir: &Path, group: &str) -> Result<Self, ConfigError> {
        let path = config_dir.join(format!("{group}.toml"));
        if !path.exists() {
            debug!(group, path = %path.display(), "module config not found, all modules disabled");
            return Ok(Self::empty(group));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;

        let mut config = Self::parse_toml(group, &content, &path)?;
        config.path = Some(path);
        Ok(config)
    }

    /// Parse a group configuration from TOML text.
    pub fn parse_toml(group: &str, content: &str, path: &Path) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content).map_err(|e| ConfigError::TomlError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut sections = BTreeMap::new();
        for (name, value) in table {
            if !value.is_table() {
                return Err(ConfigError::InvalidSection {
                    path: path.to_path_buf(),
                    section: name,
                });
            }
            let options = value
                .try_into::<ModuleOptions>()
                .map_err(|e| ConfigError::TomlError {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            sections.insert(name, options);
        }

        debug!(group, sections = sections.len(), "loaded module config");
        Ok(Self {
            group: group.to_string(),
            path: None,
            sections,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// File the configuration was read from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Section for a module's short name.
    pub fn section(&self, name: &str) -> Option<&ModuleOptions> {
        self.sections.get(name)
    }

    /// Section for a module's short name, only when present and enabled.
    pub fn enabled_section(&self, name: &str) -> Option<&ModuleOptions> {
        self.section(name).filter(|opts| opts.enabled)
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.sections.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROCESSING: &str = r#"
[virustotal]
enabled = true
key = "abc"
timeout = 60

[suricata]
enabled = false

[strings]
"#;

    #[test]
    fn test_parse_sections() {
        let config =
            ModuleConfig::parse_toml("processing", PROCESSING, Path::new("processing.toml"))
                .unwrap();
        assert_eq!(config.group(), "processing");
        assert_eq!(config.section_names(), ["strings", "suricata", "virustotal"]);

        let vt = config.enabled_section("virustotal").unwrap();
        assert_eq!(vt.get_str("key"), Some("abc"));
        assert_eq!(vt.get_int("timeout"), Some(60));
        assert_eq!(vt.get_bool("key"), None);
    }

    #[test]
    fn test_disabled_and_missing_sections() {
        let config =
            ModuleConfig::parse_toml("processing", PROCESSING, Path::new("processing.toml"))
                .unwrap();
        assert!(config.section("suricata").is_some());
        assert!(config.enabled_section("suricata").is_none());
        // Missing `enabled` key defaults to disabled.
        assert!(config.enabled_section("strings").is_none());
        assert!(config.section("behavior").is_none());
    }

    #[test]
    fn test_non_table_section_rejected() {
        let err = ModuleConfig::parse_toml("reporting", "jsondump = true", Path::new("r.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSection { .. }));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = ModuleConfig::load(dir.path(), "auxiliary").unwrap();
        assert!(config.section_names().is_empty());
        assert!(config.path().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("reporting.toml"),
            "[jsondump]\nenabled = true\nindent = 2\n",
        )
        .unwrap();
        let config = ModuleConfig::load(dir.path(), "reporting").unwrap();
        assert_eq!(
            config.enabled_section("jsondump").unwrap().get_int("indent"),
            Some(2)
        );
        assert!(config.path().is_some());
    }

    #[test]
    fn test_load_malformed_file_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("processing.toml"), "[broken").unwrap();
        let err = ModuleConfig::load(dir.path(), "processing").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError { .. }));
    }

    #[test]
    fn test_builder() {
        let config = ModuleConfig::empty("auxiliary")
            .with_section("sniffer", ModuleOptions::enabled().with_value("bpf", "not port 8000"))
            .with_section("mitm", ModuleOptions::disabled());
        assert_eq!(
            config.enabled_section("sniffer").unwrap().get_str("bpf"),
            Some("not port 8000")
        );
        assert!(config.enabled_section("mitm").is_none());
    }
}
