//! Signature engine.
//!
//! Signatures are detection rules evaluated after processing. Evented
//! signatures watch the call trace one call at a time; batch signatures run
//! once against the finished aggregate. Matches are then scored and used to
//! guess a malware family.

pub mod consensus;
pub mod engine;
pub mod family;
pub mod meta;
pub mod scoring;
pub mod version;

pub use consensus::{FamilyConsensus, TokenConsensus};
pub use engine::{SignatureEngine, SignatureSummary, ENGINE_VERSION};
pub use family::resolve_family;
pub use meta::SignatureMeta;
pub use scoring::{malscore, MAX_SCORE};
pub use version::{check_version, DottedVersion, VersionGate};

use dt_common::{CallRecord, MatchRecord, ModuleError, ModuleResult, ProcessRecord, ResultAggregate};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while preparing a signature.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid version string '{value}'")]
    InvalidVersion { value: String },

    #[error("signature '{signature}' has no overridable attribute '{attribute}'")]
    UnknownAttribute { signature: String, attribute: String },

    #[error("override for '{signature}.{attribute}' must be {expected}")]
    InvalidAttribute {
        signature: String,
        attribute: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Module(#[from] ModuleError),
}

/// Outcome of an evented hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep watching.
    Inconclusive,
    Matched,
    NotMatched,
}

/// A detection rule instance, created fresh for each evaluation.
///
/// Batch signatures implement [`run`](Self::run); evented ones implement
/// [`on_call`](Self::on_call) and optionally [`on_complete`](Self::on_complete).
pub trait Signature: Send {
    /// Classification, already carrying any overlay overrides.
    fn meta(&self) -> &SignatureMeta;

    fn run(&mut self, results: &ResultAggregate) -> ModuleResult<bool> {
        let _ = results;
        Err(ModuleError::NotImplemented)
    }

    fn on_call(&mut self, call: &CallRecord, process: &ProcessRecord) -> ModuleResult<Verdict> {
        let _ = (call, process);
        Err(ModuleError::NotImplemented)
    }

    fn on_complete(&mut self) -> ModuleResult<Verdict> {
        Err(ModuleError::NotImplemented)
    }

    /// Evidence attached to the match record.
    fn data(&self) -> Vec<Value> {
        Vec::new()
    }

    fn as_result(&self) -> MatchRecord {
        self.meta().to_match(self.data())
    }
}

type SignatureFactory = Arc<dyn Fn(SignatureMeta) -> ModuleResult<Box<dyn Signature>> + Send + Sync>;

/// Registered signature: declared metadata plus a factory receiving the
/// effective (overlaid) metadata.
#[derive(Clone)]
pub struct SignatureDescriptor {
    meta: SignatureMeta,
    factory: SignatureFactory,
}

impl SignatureDescriptor {
    pub fn new<F>(meta: SignatureMeta, factory: F) -> Self
    where
        F: Fn(SignatureMeta) -> ModuleResult<Box<dyn Signature>> + Send + Sync + 'static,
    {
        Self {
            meta,
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Declared metadata, before any overlay.
    pub fn meta(&self) -> &SignatureMeta {
        &self.meta
    }

    pub fn instantiate(&self, meta: SignatureMeta) -> ModuleResult<Box<dyn Signature>> {
        (self.factory)(meta)
    }
}

impl fmt::Debug for SignatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureDescriptor")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
