//! Configuration directory resolution.
//!
//! Resolution order: CLI argument → environment variable → XDG config →
//! system config → none (built-in defaults: every module disabled, empty overlay).

use crate::OVERLAY_FILENAME;
use std::path::{Path, PathBuf};

/// Where the configuration directory was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via `DT_CONFIG_DIR`.
    Environment,

    /// Found in the XDG config directory.
    XdgConfig,

    /// Found in /etc/detonate/.
    SystemConfig,

    /// No directory; built-in defaults apply.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Resolved configuration locations.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Directory holding `<group>.toml` files (None if using defaults).
    pub config_dir: Option<PathBuf>,

    /// Source of `config_dir` (for diagnostics).
    pub source: ConfigSource,
}

impl ConfigPaths {
    /// Paths rooted at an explicit directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: Some(dir.into()),
            source: ConfigSource::CliArgument,
        }
    }

    /// Location of the signature overlay file, if a config dir is known.
    ///
    /// `DT_OVERLAY` overrides the default `<config_dir>/signature_overlay.json`.
    pub fn overlay_path(&self) -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_OVERLAY_PATH) {
            return Some(PathBuf::from(path));
        }
        self.config_dir.as_ref().map(|d| d.join(OVERLAY_FILENAME))
    }
}

/// Environment variable names.
const ENV_CONFIG_DIR: &str = "DT_CONFIG_DIR";
const ENV_OVERLAY_PATH: &str = "DT_OVERLAY";

/// Application name for XDG directories.
const APP_NAME: &str = "detonate";

/// Resolve the configuration directory.
///
/// 1. Explicit CLI path (if it exists)
/// 2. `DT_CONFIG_DIR`
/// 3. XDG config directory (~/.config/detonate/)
/// 4. System config (/etc/detonate/)
/// 5. None
pub fn resolve_config_dir(cli_dir: Option<&Path>) -> ConfigPaths {
    if let Some(dir) = cli_dir {
        if dir.is_dir() {
            return ConfigPaths {
                config_dir: Some(dir.to_path_buf()),
                source: ConfigSource::CliArgument,
            };
        }
    }

    if let Ok(env_dir) = std::env::var(ENV_CONFIG_DIR) {
        let dir = PathBuf::from(env_dir);
        if dir.is_dir() {
            return ConfigPaths {
                config_dir: Some(dir),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Some(dir) = xdg_config_dir() {
        if dir.is_dir() {
            return ConfigPaths {
                config_dir: Some(dir),
                source: ConfigSource::XdgConfig,
            };
        }
    }

    let system = system_config_dir();
    if system.is_dir() {
        return ConfigPaths {
            config_dir: Some(system),
            source: ConfigSource::SystemConfig,
        };
    }

    ConfigPaths::default()
}

/// Get the XDG config directory for detonate.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}
