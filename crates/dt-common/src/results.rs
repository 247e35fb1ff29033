//! The result aggregate shared by every analysis stage.
//!
//! The aggregate starts with the telemetry produced by the execution
//! environment (`target`, `info`, `behavior`), is extended by processing
//! modules (one top-level key per module), receives signature matches and the
//! derived `malscore`/`malfamily`, and is finally handed to reporting modules.
//!
//! Persisted shape (JSON):
//!
//! ```json
//! {
//!   "target": {"category": "file", "file": {"name": "a.exe", "clamav": "Win.Trojan.Foo"}},
//!   "info": {"id": 1, "category": "file"},
//!   "behavior": {"processes": [{"process_name": "a.exe", "process_id": 1, "calls": []}]},
//!   "statistics": {"processing": [{"name": "behavior", "time": 0.012}], "signatures": [], "reporting": []},
//!   "signatures": [],
//!   "malscore": 0.0,
//!   "malfamily": "",
//!   "feeds": {},
//!   "virustotal": {"results": []}
//! }
//! ```

use crate::behavior::Behavior;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors when merging a module contribution into the aggregate.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("key '{key}' is owned by the core and cannot be contributed by a module")]
    ReservedKey { key: String },

    #[error("contribution for '{key}' does not match the expected shape: {source}")]
    InvalidSection {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Keys written only by the core itself.
const RESERVED_KEYS: &[&str] = &["statistics", "signatures", "malscore", "malfamily", "feeds"];

/// Static information about a file target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetFile {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub path: String,

    /// Signature-scanner detection name, if the scanner flagged the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamav: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What was analyzed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<TargetFile>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// General analysis information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInfo {
    #[serde(default)]
    pub id: u64,

    #[serde(default)]
    pub category: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One timing entry: `{name, time}` with `time` in seconds, millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedRecord {
    pub name: String,
    pub time: f64,
}

impl TimedRecord {
    pub fn new(name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            time: elapsed.as_millis() as f64 / 1000.0,
        }
    }
}

/// Stage a timing entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatStage {
    Processing,
    Signatures,
    Reporting,
}

impl std::fmt::Display for StatStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatStage::Processing => write!(f, "processing"),
            StatStage::Signatures => write!(f, "signatures"),
            StatStage::Reporting => write!(f, "reporting"),
        }
    }
}

/// Per-stage timing statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub processing: Vec<TimedRecord>,
    #[serde(default)]
    pub signatures: Vec<TimedRecord>,
    #[serde(default)]
    pub reporting: Vec<TimedRecord>,
}

impl Statistics {
    /// Append a timing entry to a stage.
    pub fn record(&mut self, stage: StatStage, name: impl Into<String>, elapsed: Duration) {
        self.bucket_mut(stage).push(TimedRecord::new(name, elapsed));
    }

    pub fn bucket(&self, stage: StatStage) -> &[TimedRecord] {
        match stage {
            StatStage::Processing => &self.processing,
            StatStage::Signatures => &self.signatures,
            StatStage::Reporting => &self.reporting,
        }
    }

    fn bucket_mut(&mut self, stage: StatStage) -> &mut Vec<TimedRecord> {
        match stage {
            StatStage::Processing => &mut self.processing,
            StatStage::Signatures => &mut self.signatures,
            StatStage::Reporting => &mut self.reporting,
        }
    }

    /// Names recorded for a stage, in order.
    pub fn names(&self, stage: StatStage) -> Vec<&str> {
        self.bucket(stage).iter().map(|r| r.name.as_str()).collect()
    }
}

/// Serializable result of a matched signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub severity: u32,
    pub confidence: u32,
    pub weight: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub families: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    /// Evidence the signature attached to its match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<Value>,

    /// Additional descriptive fields a signature chose to declare.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchRecord {
    pub fn new(name: impl Into<String>, severity: u32, confidence: u32, weight: f64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            severity,
            confidence,
            weight,
            families: Vec::new(),
            categories: Vec::new(),
            references: Vec::new(),
            data: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Set declared families.
    pub fn with_families(mut self, families: Vec<&str>) -> Self {
        self.families = families.into_iter().map(String::from).collect();
        self
    }
}

/// Nested results container for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultAggregate {
    #[serde(default)]
    pub target: Target,

    #[serde(default)]
    pub info: AnalysisInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Behavior>,

    #[serde(default)]
    pub statistics: Statistics,

    #[serde(default)]
    pub signatures: Vec<MatchRecord>,

    #[serde(default)]
    pub malscore: f64,

    #[serde(default)]
    pub malfamily: String,

    #[serde(default)]
    pub feeds: BTreeMap<String, PathBuf>,

    /// Per-module enrichment results keyed by each module's result key.
    #[serde(flatten)]
    pub enrichment: BTreeMap<String, Value>,

    #[serde(skip)]
    reporting: bool,
}

impl ResultAggregate {
    /// Create an aggregate for a target category.
    pub fn new(category: impl Into<String>) -> Self {
        let category = category.into();
        Self {
            target: Target {
                category: category.clone(),
                ..Default::default()
            },
            info: AnalysisInfo {
                category,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Attach behavioral telemetry.
    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Merge a single-key module contribution.
    ///
    /// `target`, `info` and `behavior` are parsed into their typed sections;
    /// any other non-reserved key lands in the enrichment map. A later
    /// contribution under the same key replaces the earlier one.
    pub fn merge(&mut self, key: &str, value: Value) -> Result<(), AggregateError> {
        let invalid = |source| AggregateError::InvalidSection {
            key: key.to_string(),
            source,
        };
        match key {
            "target" => self.target = serde_json::from_value(value).map_err(invalid)?,
            "info" => self.info = serde_json::from_value(value).map_err(invalid)?,
            "behavior" => self.behavior = Some(serde_json::from_value(value).map_err(invalid)?),
            k if RESERVED_KEYS.contains(&k) => {
                return Err(AggregateError::ReservedKey { key: k.to_string() })
            }
            _ => {
                self.enrichment.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// Enrichment result contributed under `key`.
    pub fn enrichment(&self, key: &str) -> Option<&Value> {
        self.enrichment.get(key)
    }

    /// Processes in capture order (empty without behavior).
    pub fn processes(&self) -> &[crate::behavior::ProcessRecord] {
        self.behavior
            .as_ref()
            .map(|b| b.processes.as_slice())
            .unwrap_or(&[])
    }

    /// Mark the aggregate as handed over to reporting.
    pub fn begin_reporting(&mut self) {
        self.reporting = true;
    }

    pub fn is_reporting(&self) -> bool {
        self.reporting
    }
}
