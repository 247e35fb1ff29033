//! Generic module pipeline.
//!
//! One execution pattern shared by the processing and reporting stages:
//! sort descriptors by order, instantiate, resolve the module's config
//! section, run with timing, then hand the output to the stage's merge
//! policy. A failing module contributes nothing; the stage always finishes.

pub mod processing;
pub mod reporting;

pub use processing::{ProcessingPipeline, ProcessingStage};
pub use reporting::{ReportingPipeline, ReportingStage};

use crate::logging::{event_names, Stage};
use crate::plugin::{ModuleContext, ModuleDescriptor, PluginRegistry};
use dt_common::{ModuleError, ModuleResult, ResultAggregate, StatStage, Task};
use dt_config::ModuleConfig;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What a module handed back.
#[derive(Debug, Clone, PartialEq)]
pub enum Contribution {
    /// Merge `value` into the aggregate under `key`.
    Keyed { key: String, value: Value },
    /// Output already happened as a side effect.
    SideEffect,
}

/// Per-stage behavior plugged into [`ModulePipeline`].
pub trait StagePolicy {
    type Module: ?Sized;

    const STAGE: Stage;
    const STATS: StatStage;

    fn descriptors(registry: &PluginRegistry) -> &[ModuleDescriptor<Self::Module>];

    fn invoke(
        module: &mut Self::Module,
        ctx: &ModuleContext<'_>,
        results: &ResultAggregate,
    ) -> ModuleResult<Contribution>;

    /// Runs once before the first module, only when the stage has modules.
    fn prepare(results: &mut ResultAggregate) {
        let _ = results;
    }
}

/// Outcome of one stage run, by module name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    pub completed: Vec<String>,
    /// Missing or disabled config section.
    pub skipped: Vec<String>,
    /// Constructor failure, run failure or rejected contribution.
    pub failed: Vec<String>,
}

/// A stage runner bound to one task.
pub struct ModulePipeline<'a, P: StagePolicy> {
    registry: &'a PluginRegistry,
    config: &'a ModuleConfig,
    task: &'a Task,
    analysis_path: PathBuf,
    _policy: PhantomData<P>,
}

impl<'a, P: StagePolicy> ModulePipeline<'a, P> {
    pub fn new(
        registry: &'a PluginRegistry,
        config: &'a ModuleConfig,
        task: &'a Task,
        analysis_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            config,
            task,
            analysis_path: analysis_path.into(),
            _policy: PhantomData,
        }
    }

    /// Run every enabled module of the stage against `results`.
    pub fn run(&self, results: &mut ResultAggregate) -> StageSummary {
        let stage = P::STAGE;
        let mut summary = StageSummary::default();

        let descriptors = P::descriptors(self.registry);
        if descriptors.is_empty() {
            info!(stage = %stage, event = event_names::STAGE_EMPTY, "no {stage} modules loaded");
            return summary;
        }

        let mut ordered: Vec<&ModuleDescriptor<P::Module>> = descriptors.iter().collect();
        ordered.sort_by_key(|d| d.order());

        P::prepare(results);

        for descriptor in ordered {
            let name = descriptor.name();

            let mut module = match descriptor.instantiate() {
                Ok(module) => module,
                Err(e) => {
                    error!(
                        stage = %stage,
                        module = name,
                        event = event_names::MODULE_LOAD_FAILED,
                        error = %e,
                        "failed to load module"
                    );
                    summary.failed.push(name.to_string());
                    continue;
                }
            };

            let Some(options) = self.config.enabled_section(name) else {
                debug!(
                    stage = %stage,
                    module = name,
                    event = event_names::MODULE_SKIPPED,
                    "module not enabled in {} configuration",
                    self.config.group()
                );
                summary.skipped.push(name.to_string());
                continue;
            };

            let ctx = ModuleContext {
                task: self.task,
                analysis_path: &self.analysis_path,
                options,
            };

            let started = Instant::now();
            let outcome = P::invoke(module.as_mut(), &ctx, results);
            let elapsed = started.elapsed();

            match outcome {
                Ok(contribution) => {
                    results.statistics.record(P::STATS, name, elapsed);
                    if let Contribution::Keyed { key, value } = contribution {
                        if let Err(e) = results.merge(&key, value) {
                            warn!(stage = %stage, module = name, key = %key, error = %e, "rejected module output");
                            summary.failed.push(name.to_string());
                            continue;
                        }
                    }
                    debug!(
                        stage = %stage,
                        module = name,
                        event = event_names::MODULE_FINISHED,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "module finished"
                    );
                    summary.completed.push(name.to_string());
                }
                Err(ModuleError::NotImplemented) => {
                    debug!(stage = %stage, module = name, "module has no run hook");
                    summary.completed.push(name.to_string());
                }
                Err(e) => {
                    log_module_failure(stage, name, &e);
                    summary.failed.push(name.to_string());
                }
            }
        }

        info!(
            stage = %stage,
            event = event_names::STAGE_FINISHED,
            completed = summary.completed.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "{stage} stage finished"
        );
        summary
    }
}

/// Declared failures warn; anything else errors with full detail.
pub(crate) fn log_module_failure(stage: Stage, name: &str, err: &ModuleError) {
    if err.is_declared() {
        warn!(
            stage = %stage,
            module = name,
            event = event_names::MODULE_DECLARED_FAILURE,
            category = %err.category(),
            error = %err,
            "module failed"
        );
    } else {
        error!(
            stage = %stage,
            module = name,
            event = event_names::MODULE_UNEXPECTED_FAILURE,
            category = %err.category(),
            error = %err,
            detail = ?err,
            "unexpected failure running module"
        );
    }
}
