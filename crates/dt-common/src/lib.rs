//! Detonation analysis common types.
//!
//! This crate provides the data model shared by every stage of the
//! analysis core:
//! - Task and execution-backend machine descriptors
//! - Captured behavior (process records and their call logs)
//! - The result aggregate mutated by processing, signatures and reporting
//! - The error taxonomy modules report failures through

pub mod behavior;
pub mod error;
pub mod results;
pub mod task;

pub use behavior::{Behavior, CallArgument, CallCursor, CallLog, CallRecord, ProcessRecord};
pub use error::{ErrorCategory, ModuleError, ModuleResult};
pub use results::{
    AggregateError, AnalysisInfo, MatchRecord, ResultAggregate, StatStage, Statistics, Target,
    TargetFile, TimedRecord,
};
pub use task::{Machine, Task, TaskId, CATEGORY_FILE, CATEGORY_URL};
