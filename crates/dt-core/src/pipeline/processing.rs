//! Processing (enrichment) stage: each module's value is merged under its key.

use super::{Contribution, ModulePipeline, StagePolicy};
use crate::logging::Stage;
use crate::plugin::{ModuleContext, ModuleDescriptor, PluginRegistry, ProcessingModule};
use dt_common::{ModuleResult, ResultAggregate, StatStage};

pub struct ProcessingStage;

impl StagePolicy for ProcessingStage {
    type Module = dyn ProcessingModule;

    const STAGE: Stage = Stage::Processing;
    const STATS: StatStage = StatStage::Processing;

    fn descriptors(registry: &PluginRegistry) -> &[ModuleDescriptor<Self::Module>] {
        registry.processing()
    }

    fn invoke(
        module: &mut Self::Module,
        ctx: &ModuleContext<'_>,
        results: &ResultAggregate,
    ) -> ModuleResult<Contribution> {
        let value = module.run(ctx, results)?;
        Ok(Contribution::Keyed {
            key: module.key().to_string(),
            value,
        })
    }
}

pub type ProcessingPipeline<'a> = ModulePipeline<'a, ProcessingStage>;
