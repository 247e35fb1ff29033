//! Modules shipped with the core.

pub mod jsondump;

pub use jsondump::JsonDump;

use crate::plugin::{PluginRegistry, ReportModule, ReportingDescriptor};

/// Registry holding every built-in module.
pub fn registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    registry.register(
        ReportingDescriptor::new(jsondump::NAME, || {
            Ok(Box::new(JsonDump) as Box<dyn ReportModule>)
        })
        .with_order(jsondump::ORDER),
    );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginGroup;

    #[test]
    fn test_builtin_registry() {
        let registry = registry();
        assert_eq!(registry.list(PluginGroup::Reporting), ["jsondump"]);
        assert!(registry.list(PluginGroup::Processing).is_empty());
    }
}
