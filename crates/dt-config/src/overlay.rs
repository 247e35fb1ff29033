//! Signature overlay file.
//!
//! The overlay maps a signature's short name to attribute overrides applied
//! before any evaluation:
//!
//! ```json
//! {
//!   "antivm_generic_disk": {"severity": 1, "enabled": false},
//!   "injection_runpe": {"weight": 3, "families": ["Dridex"]}
//! }
//! ```
//!
//! Which attributes may be overridden is decided by the signature engine;
//! this type only loads the mapping.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Attribute overrides for one signature.
pub type AttributeOverrides = BTreeMap<String, Value>;

/// Signature name → attribute overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overlay {
    entries: BTreeMap<String, AttributeOverrides>,
}

impl Overlay {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the overlay from a JSON file. A missing file is an empty overlay.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no signature overlay file");
            return Ok(Self::empty());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| ConfigError::JsonError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Add overrides for one signature.
    pub fn with_entry(
        mut self,
        signature: impl Into<String>,
        overrides: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        self.entries
            .insert(signature.into(), overrides.into_iter().collect());
        self
    }

    /// Overrides declared for a signature name.
    pub fn get(&self, signature: &str) -> Option<&AttributeOverrides> {
        self.entries.get(signature)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
