//! Auxiliary module lifecycle around the execution window.
//!
//! `start` brings up every enabled auxiliary module and remembers the ones
//! that started. `stop` stops exactly that set, once.

use crate::logging::Stage;
use crate::pipeline::log_module_failure;
use crate::plugin::{AuxiliaryContext, AuxiliaryModule, PluginRegistry};
use dt_common::{Machine, ModuleError, Task};
use dt_config::ModuleConfig;
use tracing::{debug, error, info};

struct Started {
    name: String,
    module: Box<dyn AuxiliaryModule>,
    ctx: AuxiliaryContext,
}

/// Starts and stops auxiliary modules for one task.
pub struct AuxiliaryController<'a> {
    registry: &'a PluginRegistry,
    config: &'a ModuleConfig,
    task: Task,
    machine: Machine,
    started: Vec<Started>,
}

impl<'a> AuxiliaryController<'a> {
    pub fn new(
        registry: &'a PluginRegistry,
        config: &'a ModuleConfig,
        task: &Task,
        machine: &Machine,
    ) -> Self {
        Self {
            registry,
            config,
            task: task.clone(),
            machine: machine.clone(),
            started: Vec::new(),
        }
    }

    /// Start every enabled module, in registration order. Returns how many started.
    pub fn start(&mut self) -> usize {
        for descriptor in self.registry.auxiliary() {
            let name = descriptor.name();

            let mut module = match descriptor.instantiate() {
                Ok(module) => module,
                Err(e) => {
                    error!(stage = %Stage::Auxiliary, module = name, error = %e, "failed to load auxiliary module");
                    continue;
                }
            };

            let Some(options) = self.config.enabled_section(name) else {
                debug!(stage = %Stage::Auxiliary, module = name, "auxiliary module not enabled");
                continue;
            };

            let ctx = AuxiliaryContext {
                task: self.task.clone(),
                machine: self.machine.clone(),
                options: options.clone(),
            };

            match module.start(&ctx) {
                Ok(()) => {
                    debug!(stage = %Stage::Auxiliary, module = name, "started auxiliary module");
                    self.started.push(Started {
                        name: name.to_string(),
                        module,
                        ctx,
                    });
                }
                Err(ModuleError::NotImplemented) => {
                    debug!(stage = %Stage::Auxiliary, module = name, "auxiliary module has no start hook");
                }
                Err(e) => log_module_failure(Stage::Auxiliary, name, &e),
            }
        }

        info!(
            stage = %Stage::Auxiliary,
            started = self.started.len(),
            task_id = %self.task.id,
            "auxiliary modules started"
        );
        self.started.len()
    }

    /// Stop the modules that started. Later calls do nothing.
    pub fn stop(&mut self) {
        for Started { name, mut module, ctx } in self.started.drain(..) {
            match module.stop(&ctx) {
                Ok(()) => debug!(stage = %Stage::Auxiliary, module = %name, "stopped auxiliary module"),
                Err(ModuleError::NotImplemented) => {}
                Err(e) => log_module_failure(Stage::Auxiliary, &name, &e),
            }
        }
    }

    /// Names of the currently running modules.
    pub fn started(&self) -> Vec<&str> {
        self.started.iter().map(|s| s.name.as_str()).collect()
    }
}

impl Drop for AuxiliaryController<'_> {
    fn drop(&mut self) {
        if !self.started.is_empty() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fake_auxiliary, failing_auxiliary, AuxiliaryBehavior, AuxiliaryProbe};
    use dt_common::CATEGORY_FILE;
    use dt_config::ModuleOptions;

    fn config(names: &[&str]) -> ModuleConfig {
        names.iter().fold(ModuleConfig::empty("auxiliary"), |cfg, n| {
            cfg.with_section(*n, ModuleOptions::enabled())
        })
    }

    #[test]
    fn test_only_started_modules_are_stopped() {
        let sniffer = AuxiliaryProbe::default();
        let mitm = AuxiliaryProbe::default();
        let reboot = AuxiliaryProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(fake_auxiliary("sniffer", AuxiliaryBehavior::Ok, &sniffer));
        registry.register(fake_auxiliary("mitm", AuxiliaryBehavior::FailStart, &mitm));
        registry.register(fake_auxiliary("reboot", AuxiliaryBehavior::NotApplicable, &reboot));
        registry.register(failing_auxiliary("broken"));
        let config = config(&["sniffer", "mitm", "reboot", "broken"]);
        let task = Task::new(1, "x", CATEGORY_FILE);
        let machine = Machine::new("win7", "win7-x64");

        let mut controller = AuxiliaryController::new(&registry, &config, &task, &machine);
        assert_eq!(controller.start(), 1);
        assert_eq!(controller.started(), ["sniffer"]);
        controller.stop();
        controller.stop();

        assert_eq!((sniffer.starts(), sniffer.stops()), (1, 1));
        assert_eq!((mitm.starts(), mitm.stops()), (1, 0));
        assert_eq!((reboot.starts(), reboot.stops()), (1, 0));
    }

    #[test]
    fn test_disabled_module_never_started() {
        let probe = AuxiliaryProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(fake_auxiliary("sniffer", AuxiliaryBehavior::Ok, &probe));
        let config = ModuleConfig::empty("auxiliary");
        let task = Task::new(1, "x", CATEGORY_FILE);
        let machine = Machine::new("win7", "win7-x64");

        let mut controller = AuxiliaryController::new(&registry, &config, &task, &machine);
        assert_eq!(controller.start(), 0);
        controller.stop();
        assert_eq!((probe.starts(), probe.stops()), (0, 0));
    }

    #[test]
    fn test_stop_failure_does_not_block_siblings() {
        let a = AuxiliaryProbe::default();
        let b = AuxiliaryProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(fake_auxiliary("a", AuxiliaryBehavior::FailStop, &a));
        registry.register(fake_auxiliary("b", AuxiliaryBehavior::Ok, &b));
        let config = config(&["a", "b"]);
        let task = Task::new(1, "x", CATEGORY_FILE);
        let machine = Machine::new("win7", "win7-x64");

        {
            let mut controller = AuxiliaryController::new(&registry, &config, &task, &machine);
            assert_eq!(controller.start(), 2);
        }
        assert_eq!(a.stops(), 1);
        assert_eq!(b.stops(), 1);
    }

    #[test]
    fn test_context_carries_task_machine_and_options() {
        let probe = AuxiliaryProbe::default();
        let mut registry = PluginRegistry::new();
        registry.register(fake_auxiliary("sniffer", AuxiliaryBehavior::Ok, &probe));
        let config = ModuleConfig::empty("auxiliary").with_section(
            "sniffer",
            ModuleOptions::enabled().with_value("interface", "vboxnet0"),
        );
        let task = Task::new(42, "x", CATEGORY_FILE);
        let machine = Machine::new("win7", "win7-x64");

        let mut controller = AuxiliaryController::new(&registry, &config, &task, &machine);
        controller.start();
        let ctx = probe.last_context().unwrap();
        assert_eq!(ctx.task.id, dt_common::TaskId(42));
        assert_eq!(ctx.machine.label, "win7-x64");
        assert_eq!(ctx.options.get_str("interface"), Some("vboxnet0"));
    }
}
