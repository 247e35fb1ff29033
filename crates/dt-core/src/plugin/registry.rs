//! Capability registry.
//!
//! Each implementation is wrapped in a [`Plugin`] variant naming its
//! capability, so classification is a plain `match` performed once at
//! registration. Groups keep registration order; an empty group is valid.

use super::descriptor::{
    AuxiliaryDescriptor, FeedDescriptor, MachineryDescriptor, ProcessingDescriptor,
    ReportingDescriptor,
};
use crate::signatures::SignatureDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Named plugin bucket. Declaration order is classification priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginGroup {
    Auxiliary,
    Machinery,
    Processing,
    Reporting,
    Signatures,
    Feeds,
}

impl PluginGroup {
    pub const ALL: [PluginGroup; 6] = [
        PluginGroup::Auxiliary,
        PluginGroup::Machinery,
        PluginGroup::Processing,
        PluginGroup::Reporting,
        PluginGroup::Signatures,
        PluginGroup::Feeds,
    ];

    /// Group name; also the configuration file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginGroup::Auxiliary => "auxiliary",
            PluginGroup::Machinery => "machinery",
            PluginGroup::Processing => "processing",
            PluginGroup::Reporting => "reporting",
            PluginGroup::Signatures => "signatures",
            PluginGroup::Feeds => "feeds",
        }
    }
}

impl std::fmt::Display for PluginGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loadable implementation tagged with the one capability it provides.
#[derive(Debug, Clone)]
pub enum Plugin {
    Auxiliary(AuxiliaryDescriptor),
    Machinery(MachineryDescriptor),
    Processing(ProcessingDescriptor),
    Reporting(ReportingDescriptor),
    Signature(SignatureDescriptor),
    Feed(FeedDescriptor),
}

impl Plugin {
    pub fn group(&self) -> PluginGroup {
        match self {
            Plugin::Auxiliary(_) => PluginGroup::Auxiliary,
            Plugin::Machinery(_) => PluginGroup::Machinery,
            Plugin::Processing(_) => PluginGroup::Processing,
            Plugin::Reporting(_) => PluginGroup::Reporting,
            Plugin::Signature(_) => PluginGroup::Signatures,
            Plugin::Feed(_) => PluginGroup::Feeds,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Plugin::Auxiliary(d) => d.name(),
            Plugin::Machinery(d) => d.name(),
            Plugin::Processing(d) => d.name(),
            Plugin::Reporting(d) => d.name(),
            Plugin::Signature(d) => d.name(),
            Plugin::Feed(d) => d.name(),
        }
    }
}

macro_rules! impl_from_descriptor {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Plugin {
            fn from(desc: $ty) -> Self {
                Plugin::$variant(desc)
            }
        })*
    };
}

impl_from_descriptor! {
    AuxiliaryDescriptor => Auxiliary,
    MachineryDescriptor => Machinery,
    ProcessingDescriptor => Processing,
    ReportingDescriptor => Reporting,
    SignatureDescriptor => Signature,
    FeedDescriptor => Feed,
}

/// Registered plugins grouped by capability.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    auxiliary: Vec<AuxiliaryDescriptor>,
    machinery: Vec<MachineryDescriptor>,
    processing: Vec<ProcessingDescriptor>,
    reporting: Vec<ReportingDescriptor>,
    signatures: Vec<SignatureDescriptor>,
    feeds: Vec<FeedDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a set of plugins, in order.
    pub fn load(plugins: impl IntoIterator<Item = Plugin>) -> Self {
        let mut registry = Self::new();
        for plugin in plugins {
            registry.register(plugin);
        }
        registry
    }

    /// Append a plugin to its group. Returns the group it landed in.
    pub fn register(&mut self, plugin: impl Into<Plugin>) -> PluginGroup {
        let plugin = plugin.into();
        let group = plugin.group();
        debug!(group = %group, plugin = plugin.name(), "registered plugin");
        match plugin {
            Plugin::Auxiliary(d) => self.auxiliary.push(d),
            Plugin::Machinery(d) => self.machinery.push(d),
            Plugin::Processing(d) => self.processing.push(d),
            Plugin::Reporting(d) => self.reporting.push(d),
            Plugin::Signature(d) => self.signatures.push(d),
            Plugin::Feed(d) => self.feeds.push(d),
        }
        group
    }

    pub fn auxiliary(&self) -> &[AuxiliaryDescriptor] {
        &self.auxiliary
    }

    pub fn machinery(&self) -> &[MachineryDescriptor] {
        &self.machinery
    }

    pub fn processing(&self) -> &[ProcessingDescriptor] {
        &self.processing
    }

    pub fn reporting(&self) -> &[ReportingDescriptor] {
        &self.reporting
    }

    pub fn signatures(&self) -> &[SignatureDescriptor] {
        &self.signatures
    }

    pub fn feeds(&self) -> &[FeedDescriptor] {
        &self.feeds
    }

    /// Names in a group, in registration order.
    pub fn list(&self, group: PluginGroup) -> Vec<&str> {
        match group {
            PluginGroup::Auxiliary => self.auxiliary.iter().map(|d| d.name()).collect(),
            PluginGroup::Machinery => self.machinery.iter().map(|d| d.name()).collect(),
            PluginGroup::Processing => self.processing.iter().map(|d| d.name()).collect(),
            PluginGroup::Reporting => self.reporting.iter().map(|d| d.name()).collect(),
            PluginGroup::Signatures => self.signatures.iter().map(|d| d.name()).collect(),
            PluginGroup::Feeds => self.feeds.iter().map(|d| d.name()).collect(),
        }
    }

    pub fn len(&self, group: PluginGroup) -> usize {
        self.list(group).len()
    }

    pub fn is_empty(&self) -> bool {
        PluginGroup::ALL.iter().all(|g| self.len(*g) == 0)
    }

    /// Every group with its members, for listings.
    pub fn summary(&self) -> BTreeMap<PluginGroup, Vec<String>> {
        PluginGroup::ALL
            .iter()
            .map(|g| (*g, self.list(*g).into_iter().map(String::from).collect()))
            .collect()
    }
}

static GLOBAL: OnceLock<PluginRegistry> = OnceLock::new();

/// Install the process-wide registry. Only the first call succeeds; a
/// rejected registry is handed back.
pub fn install_global(registry: PluginRegistry) -> Result<&'static PluginRegistry, PluginRegistry> {
    let mut pending = Some(registry);
    let installed = GLOBAL.get_or_init(|| pending.take().unwrap_or_default());
    match pending {
        None => Ok(installed),
        Some(rejected) => Err(rejected),
    }
}

/// The process-wide registry, once installed.
pub fn global() -> Option<&'static PluginRegistry> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fake_processing, fake_report, fake_signature};

    #[test]
    fn test_empty_groups_list_nothing() {
        let registry = PluginRegistry::new();
        for group in PluginGroup::ALL {
            assert!(registry.list(group).is_empty());
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_classifies_by_capability() {
        let mut registry = PluginRegistry::new();
        assert_eq!(
            registry.register(fake_processing("strings", 0, "strings", 1)),
            PluginGroup::Processing
        );
        assert_eq!(registry.register(fake_report("jsondump", 0)), PluginGroup::Reporting);
        assert_eq!(
            registry.register(fake_signature("antivm_disk").descriptor()),
            PluginGroup::Signatures
        );

        assert_eq!(registry.list(PluginGroup::Processing), ["strings"]);
        assert_eq!(registry.list(PluginGroup::Reporting), ["jsondump"]);
        assert_eq!(registry.list(PluginGroup::Signatures), ["antivm_disk"]);
        assert!(registry.list(PluginGroup::Auxiliary).is_empty());
    }

    #[test]
    fn test_registration_order_kept() {
        let registry = PluginRegistry::load([
            Plugin::from(fake_processing("zeta", 5, "z", 1)),
            Plugin::from(fake_processing("alpha", 1, "a", 1)),
        ]);
        assert_eq!(registry.list(PluginGroup::Processing), ["zeta", "alpha"]);
    }

    #[test]
    fn test_summary_has_every_group() {
        let summary = PluginRegistry::new().summary();
        assert_eq!(summary.len(), PluginGroup::ALL.len());
        assert_eq!(
            serde_json::to_string(&PluginGroup::Signatures).unwrap(),
            "\"signatures\""
        );
    }

    struct Pool {
        machines: Vec<dt_common::Machine>,
        running: Vec<String>,
    }

    impl crate::plugin::Machinery for Pool {
        fn machines(&self) -> Vec<dt_common::Machine> {
            self.machines.clone()
        }

        fn start(&mut self, label: &str) -> dt_common::ModuleResult<()> {
            self.running.push(label.to_string());
            Ok(())
        }

        fn stop(&mut self, label: &str) -> dt_common::ModuleResult<()> {
            self.running.retain(|l| l != label);
            Ok(())
        }
    }

    #[test]
    fn test_machinery_lookup_by_label() {
        let mut registry = PluginRegistry::new();
        let group = registry.register(MachineryDescriptor::new("kvm", || {
            Ok(Box::new(Pool {
                machines: vec![
                    dt_common::Machine::new("win7", "win7-x64"),
                    dt_common::Machine::new("win10", "win10-x64"),
                ],
                running: Vec::new(),
            }) as Box<dyn crate::plugin::Machinery>)
        }));
        assert_eq!(group, PluginGroup::Machinery);

        let mut pool = registry.machinery()[0].instantiate().unwrap();
        assert_eq!(pool.machine("win10-x64").unwrap().name, "win10");
        assert!(pool.machine("linux").is_none());
        pool.start("win7-x64").unwrap();
        pool.stop("win7-x64").unwrap();
    }
}
