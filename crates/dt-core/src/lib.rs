//! Detonation analysis core.
//!
//! After a sample has been executed, this crate:
//! - classifies loaded modules into capability groups ([`plugin`])
//! - runs processing and reporting modules with failure isolation ([`pipeline`])
//! - starts and stops auxiliary modules around execution ([`auxiliary`])
//! - evaluates signatures, scores them and attributes a family ([`signatures`])
//! - refreshes threat-intelligence feeds ([`feeds`])
//!
//! The binary entry point is in `main.rs`.

pub mod analysis;
pub mod auxiliary;
pub mod builtin;
pub mod config;
pub mod exit_codes;
pub mod feeds;
pub mod logging;
pub mod pipeline;
pub mod plugin;
pub mod signatures;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use analysis::{AnalysisRunner, TaskSummary};
pub use auxiliary::AuxiliaryController;
pub use feeds::FeedRunner;
pub use plugin::{Plugin, PluginGroup, PluginRegistry};
pub use signatures::{SignatureEngine, SignatureSummary};
