//! Detonation analysis configuration.
//!
//! This crate provides:
//! - Per-group module configuration (`auxiliary.toml`, `processing.toml`, ...)
//! - The signature overlay file (`signature_overlay.json`)
//! - Config directory resolution (CLI → env → XDG → system → none)

pub mod modules;
pub mod overlay;
pub mod resolve;

pub use modules::{ModuleConfig, ModuleOptions};
pub use overlay::Overlay;
pub use resolve::{resolve_config_dir, ConfigPaths, ConfigSource};

use std::path::PathBuf;
use thiserror::Error;

/// File name of the signature overlay inside the config directory.
pub const OVERLAY_FILENAME: &str = "signature_overlay.json";

/// Errors that can occur while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    TomlError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    JsonError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("section [{section}] in {path} is not a table")]
    InvalidSection { path: PathBuf, section: String },
}
