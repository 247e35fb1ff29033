//! Plugin capabilities.
//!
//! Every loadable module implements exactly one capability trait below (or
//! [`crate::signatures::Signature`]). Modules are registered through typed
//! descriptors in a [`PluginRegistry`], instantiated fresh per task and
//! dropped when their stage ends.

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    AuxiliaryDescriptor, FeedDescriptor, MachineryDescriptor, ModuleDescriptor,
    ProcessingDescriptor, ReportingDescriptor,
};
pub use registry::{global, install_global, Plugin, PluginGroup, PluginRegistry};

use dt_common::{Machine, ModuleError, ModuleResult, ResultAggregate, Task};
use dt_config::ModuleOptions;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Context injected into processing and reporting modules.
#[derive(Debug, Clone, Copy)]
pub struct ModuleContext<'a> {
    pub task: &'a Task,
    /// `<root>/storage/analyses/<task id>`.
    pub analysis_path: &'a Path,
    /// The module's own configuration section.
    pub options: &'a ModuleOptions,
}

/// Enrichment module run after execution.
///
/// The returned value is merged into the aggregate under [`key`](Self::key).
pub trait ProcessingModule: Send {
    fn key(&self) -> &str;

    fn run(&mut self, ctx: &ModuleContext<'_>, results: &ResultAggregate) -> ModuleResult<Value>;
}

/// Report-emission module. Success and timing are tracked; output is a side effect.
pub trait ReportModule: Send {
    fn run(&mut self, ctx: &ModuleContext<'_>, results: &ResultAggregate) -> ModuleResult<()>;
}

/// Context handed to auxiliary modules. Owned so it outlives the start call.
#[derive(Debug, Clone)]
pub struct AuxiliaryContext {
    pub task: Task,
    pub machine: Machine,
    pub options: ModuleOptions,
}

/// Helper running alongside execution.
///
/// Both hooks default to [`ModuleError::NotImplemented`], which the
/// controller treats as "not applicable".
pub trait AuxiliaryModule: Send {
    fn start(&mut self, ctx: &AuxiliaryContext) -> ModuleResult<()> {
        let _ = ctx;
        Err(ModuleError::NotImplemented)
    }

    fn stop(&mut self, ctx: &AuxiliaryContext) -> ModuleResult<()> {
        let _ = ctx;
        Err(ModuleError::NotImplemented)
    }
}

/// Execution backend controlling analysis machines.
pub trait Machinery: Send {
    fn machines(&self) -> Vec<Machine>;

    fn start(&mut self, label: &str) -> ModuleResult<()>;

    fn stop(&mut self, label: &str) -> ModuleResult<()>;

    fn machine(&self, label: &str) -> Option<Machine> {
        self.machines().into_iter().find(|m| m.label == label)
    }
}

/// Threat-intelligence feed.
pub trait Feed: Send {
    /// Fetch upstream data. `true` means new data arrived.
    fn update(&mut self) -> ModuleResult<bool>;

    /// Post-process downloaded data. Optional.
    fn modify(&mut self) -> ModuleResult<()> {
        Err(ModuleError::NotImplemented)
    }

    fn run(&mut self, modified: bool) -> ModuleResult<()>;

    /// Where the feed's data lives on disk.
    fn feed_path(&self) -> PathBuf;
}
