//! Stage configuration loading for dt-core.
//!
//! Re-exports dt-config and bundles the per-group module configs with the
//! signature overlay so one load happens before any stage runs.

pub use dt_config::*;

use crate::logging::{event_names, Stage};
use crate::plugin::PluginGroup;
use tracing::{info, warn};

/// Everything a task run reads from configuration.
#[derive(Debug, Clone)]
pub struct StageConfigs {
    pub auxiliary: ModuleConfig,
    pub processing: ModuleConfig,
    pub reporting: ModuleConfig,
    pub overlay: Overlay,
    pub source: ConfigSource,
}

impl Default for StageConfigs {
    fn default() -> Self {
        Self {
            auxiliary: ModuleConfig::empty(PluginGroup::Auxiliary.as_str()),
            processing: ModuleConfig::empty(PluginGroup::Processing.as_str()),
            reporting: ModuleConfig::empty(PluginGroup::Reporting.as_str()),
            overlay: Overlay::empty(),
            source: ConfigSource::BuiltinDefault,
        }
    }
}

impl StageConfigs {
    /// Load every group file from the resolved directory.
    ///
    /// Malformed group files are errors. A malformed overlay is logged and
    /// replaced by an empty one.
    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let mut configs = Self::default();

        if let Some(dir) = &paths.config_dir {
            configs.auxiliary = ModuleConfig::load(dir, PluginGroup::Auxiliary.as_str())?;
            configs.processing = ModuleConfig::load(dir, PluginGroup::Processing.as_str())?;
            configs.reporting = ModuleConfig::load(dir, PluginGroup::Reporting.as_str())?;
        }

        if let Some(path) = paths.overlay_path() {
            configs.overlay = Overlay::load(&path).unwrap_or_else(|e| {
                warn!(
                    stage = %Stage::Init,
                    event = event_names::CONFIG_ERROR,
                    error = %e,
                    "ignoring signature overlay"
                );
                Overlay::empty()
            });
        }

        configs.source = paths.source.clone();
        info!(
            stage = %Stage::Init,
            event = event_names::CONFIG_LOADED,
            source = %configs.source,
            overlay_entries = configs.overlay.names().len(),
            "configuration loaded"
        );
        Ok(configs)
    }
}
