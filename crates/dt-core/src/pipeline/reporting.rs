//! Reporting stage: modules emit side effects; only success and timing count.

use super::{Contribution, ModulePipeline, StagePolicy};
use crate::logging::Stage;
use crate::plugin::{ModuleContext, ModuleDescriptor, PluginRegistry, ReportModule};
use dt_common::{ModuleResult, ResultAggregate, StatStage};

pub struct ReportingStage;

impl StagePolicy for ReportingStage {
    type Module = dyn ReportModule;

    const STAGE: Stage = Stage::Reporting;
    const STATS: StatStage = StatStage::Reporting;

    fn descriptors(registry: &PluginRegistry) -> &[ModuleDescriptor<Self::Module>] {
        registry.reporting()
    }

    fn invoke(
        module: &mut Self::Module,
        ctx: &ModuleContext<'_>,
        results: &ResultAggregate,
    ) -> ModuleResult<Contribution> {
        module.run(ctx, results)?;
        Ok(Contribution::SideEffect)
    }

    fn prepare(results: &mut ResultAggregate) {
        results.begin_reporting();
    }
}

pub type ReportingPipeline<'a> = ModulePipeline<'a, ReportingStage>;
