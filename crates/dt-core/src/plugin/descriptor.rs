//! Typed module descriptors.
//!
//! A descriptor is the registered form of an implementation: its short name,
//! declared order and a factory producing a fresh instance per run.

use super::{AuxiliaryModule, Feed, Machinery, ProcessingModule, ReportModule};
use dt_common::ModuleResult;
use std::fmt;
use std::sync::Arc;

type Factory<M> = Arc<dyn Fn() -> ModuleResult<Box<M>> + Send + Sync>;

/// Registered implementation of one capability `M`.
pub struct ModuleDescriptor<M: ?Sized> {
    name: String,
    order: i32,
    factory: Factory<M>,
}

impl<M: ?Sized> ModuleDescriptor<M> {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> ModuleResult<Box<M>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            order: 0,
            factory: Arc::new(factory),
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Short name; also the configuration section name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// Construct a fresh instance.
    pub fn instantiate(&self) -> ModuleResult<Box<M>> {
        (self.factory)()
    }
}

impl<M: ?Sized> Clone for ModuleDescriptor<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            order: self.order,
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<M: ?Sized> fmt::Debug for ModuleDescriptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

pub type ProcessingDescriptor = ModuleDescriptor<dyn ProcessingModule>;
pub type ReportingDescriptor = ModuleDescriptor<dyn ReportModule>;
pub type AuxiliaryDescriptor = ModuleDescriptor<dyn AuxiliaryModule>;
pub type MachineryDescriptor = ModuleDescriptor<dyn Machinery>;

/// Feeds are enabled by their own declaration, not by a config section.
#[derive(Debug, Clone)]
pub struct FeedDescriptor {
    module: ModuleDescriptor<dyn Feed>,
    enabled: bool,
}

impl FeedDescriptor {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> ModuleResult<Box<dyn Feed>> + Send + Sync + 'static,
    {
        Self {
            module: ModuleDescriptor::new(name, factory),
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn instantiate(&self) -> ModuleResult<Box<dyn Feed>> {
        self.module.instantiate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::ModuleContext;
    use dt_common::{ModuleError, ResultAggregate};
    use serde_json::{json, Value};

    struct Constant;

    impl ProcessingModule for Constant {
        fn key(&self) -> &str {
            "constant"
        }

        fn run(&mut self, _: &ModuleContext<'_>, _: &ResultAggregate) -> ModuleResult<Value> {
            Ok(json!(1))
        }
    }

    #[test]
    fn test_each_instantiation_is_fresh() {
        let desc: ProcessingDescriptor =
            ModuleDescriptor::new("constant", || Ok(Box::new(Constant) as Box<dyn ProcessingModule>))
                .with_order(3);
        assert_eq!(desc.name(), "constant");
        assert_eq!(desc.order(), 3);
        let a = desc.instantiate().unwrap();
        let b = desc.clone().instantiate().unwrap();
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_factory_error_surfaces() {
        let desc: ProcessingDescriptor =
            ModuleDescriptor::new("broken", || Err(ModuleError::dependency("libmagic")));
        assert!(matches!(desc.instantiate(), Err(ModuleError::Dependency(_))));
        assert!(format!("{desc:?}").contains("broken"));
    }
}
