//! One task's post-execution stages: processing, signatures, reporting.

use crate::auxiliary::AuxiliaryController;
use crate::config::StageConfigs;
use crate::logging::{event_names, Stage};
use crate::pipeline::{ProcessingPipeline, ReportingPipeline, StageSummary};
use crate::plugin::PluginRegistry;
use crate::signatures::{SignatureEngine, SignatureSummary};
use dt_common::{Machine, ResultAggregate, Task, TaskId};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// What happened to one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub processing: StageSummary,
    pub signatures: SignatureSummary,
    pub reporting: StageSummary,
    pub malscore: f64,
    pub malfamily: String,
}

/// Runs the stages of a task in their fixed order.
pub struct AnalysisRunner<'a> {
    registry: &'a PluginRegistry,
    configs: &'a StageConfigs,
    root: PathBuf,
    version: Option<String>,
}

impl<'a> AnalysisRunner<'a> {
    /// `root` holds `storage/analyses/<task id>/`.
    pub fn new(registry: &'a PluginRegistry, configs: &'a StageConfigs, root: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            configs,
            root: root.into(),
            version: None,
        }
    }

    /// Gate signatures against `version` instead of the crate version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Auxiliary controller for the execution window of `task`.
    pub fn auxiliary(&self, task: &Task, machine: &Machine) -> AuxiliaryController<'a> {
        AuxiliaryController::new(self.registry, &self.configs.auxiliary, task, machine)
    }

    /// Processing, then signatures, then reporting.
    pub fn process(&self, task: &Task, results: &mut ResultAggregate) -> TaskSummary {
        let analysis_path = task.analysis_path(&self.root);
        info!(stage = %Stage::Init, event = event_names::RUN_STARTED, task_id = %task.id, "processing task");

        let processing =
            ProcessingPipeline::new(self.registry, &self.configs.processing, task, &analysis_path)
                .run(results);

        let mut engine = SignatureEngine::new(self.registry).with_overlay(self.configs.overlay.clone());
        if let Some(version) = &self.version {
            engine = engine.with_version(version.clone());
        }
        let signatures = engine.run(results);

        let reporting =
            ReportingPipeline::new(self.registry, &self.configs.reporting, task, &analysis_path)
                .run(results);

        info!(
            stage = %Stage::Reporting,
            event = event_names::RUN_FINISHED,
            task_id = %task.id,
            malscore = results.malscore,
            "task finished"
        );

        TaskSummary {
            task_id: task.id,
            processing,
            signatures,
            reporting,
            malscore: results.malscore,
            malfamily: results.malfamily.clone(),
        }
    }
}
