//! Signature classification metadata and overlay application.

use super::SignatureError;
use dt_common::{CallRecord, MatchRecord, ProcessRecord};
use dt_config::overlay::AttributeOverrides;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Severities a signature may declare.
pub const SEVERITY_RANGE: RangeInclusive<u32> = 1..=10;

/// Identity, classification and applicability filters of a signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 1 (informational) to 10.
    pub severity: u32,
    /// 0 to 100.
    pub confidence: u32,
    pub weight: f64,
    #[serde(default)]
    pub order: i32,
    pub enabled: bool,
    #[serde(default)]
    pub evented: bool,

    /// Oldest compatible engine version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<String>,
    /// Newest compatible engine version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub families: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_processnames: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_apinames: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_categories: Option<BTreeSet<String>>,
    /// Task categories (`file`, `url`) this signature applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_analysistypes: Option<BTreeSet<String>>,
}

fn string_set(items: &[&str]) -> Option<BTreeSet<String>> {
    Some(items.iter().map(|s| s.to_string()).collect())
}

impl SignatureMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            severity: 1,
            confidence: 100,
            weight: 1.0,
            order: 0,
            enabled: true,
            evented: false,
            minimum: None,
            maximum: None,
            families: Vec::new(),
            categories: Vec::new(),
            authors: Vec::new(),
            references: Vec::new(),
            filter_processnames: None,
            filter_apinames: None,
            filter_categories: None,
            filter_analysistypes: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_severity(mut self, severity: u32) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_confidence(mut self, confidence: u32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn evented(mut self) -> Self {
        self.evented = true;
        self
    }

    pub fn with_minimum(mut self, version: impl Into<String>) -> Self {
        self.minimum = Some(version.into());
        self
    }

    pub fn with_maximum(mut self, version: impl Into<String>) -> Self {
        self.maximum = Some(version.into());
        self
    }

    pub fn with_families(mut self, families: &[&str]) -> Self {
        self.families = families.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_categories(mut self, categories: &[&str]) -> Self {
        self.categories = categories.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn filter_processes(mut self, names: &[&str]) -> Self {
        self.filter_processnames = string_set(names);
        self
    }

    pub fn filter_apis(mut self, apis: &[&str]) -> Self {
        self.filter_apinames = string_set(apis);
        self
    }

    pub fn filter_call_categories(mut self, categories: &[&str]) -> Self {
        self.filter_categories = string_set(categories);
        self
    }

    pub fn filter_analysis_types(mut self, types: &[&str]) -> Self {
        self.filter_analysistypes = string_set(types);
        self
    }

    /// Whether the task category passes the analysis-type filter.
    pub fn applies_to(&self, category: &str) -> bool {
        self.filter_analysistypes
            .as_ref()
            .map_or(true, |types| types.contains(category))
    }

    /// Whether a call passes every declared process/API/category filter.
    pub fn accepts_call(&self, call: &CallRecord, process: &ProcessRecord) -> bool {
        let passes = |filter: &Option<BTreeSet<String>>, value: &str| {
            filter.as_ref().map_or(true, |set| set.contains(value))
        };
        passes(&self.filter_processnames, &process.process_name)
            && passes(&self.filter_apinames, &call.api)
            && passes(&self.filter_categories, &call.category)
    }

    /// Build the match record for this signature.
    pub fn to_match(&self, data: Vec<Value>) -> MatchRecord {
        let mut extra = Map::new();
        if !self.authors.is_empty() {
            extra.insert("authors".to_string(), Value::from(self.authors.clone()));
        }
        MatchRecord {
            name: self.name.clone(),
            description: self.description.clone(),
            severity: self.severity,
            confidence: self.confidence,
            weight: self.weight,
            families: self.families.clone(),
            categories: self.categories.clone(),
            references: self.references.clone(),
            data,
            extra,
        }
    }

    /// Apply every override, returning the ones that were rejected.
    ///
    /// Rejected keys leave the attribute untouched.
    pub fn apply_overrides(&mut self, overrides: &AttributeOverrides) -> Vec<SignatureError> {
        overrides
            .iter()
            .filter_map(|(attr, value)| self.apply_override(attr, value).err())
            .collect()
    }

    /// Set one overridable attribute.
    pub fn apply_override(&mut self, attribute: &str, value: &Value) -> Result<(), SignatureError> {
        let invalid = |expected: &'static str| SignatureError::InvalidAttribute {
            signature: self.name.clone(),
            attribute: attribute.to_string(),
            expected,
        };

        match attribute {
            "description" => self.description = as_string(value).ok_or_else(|| invalid("a string"))?,
            "severity" => {
                self.severity = as_u32(value)
                    .filter(|s| SEVERITY_RANGE.contains(s))
                    .ok_or_else(|| invalid("an integer from 1 to 10"))?
            }
            "confidence" => {
                self.confidence = as_u32(value).ok_or_else(|| invalid("a non-negative integer"))?
            }
            "weight" => self.weight = value.as_f64().ok_or_else(|| invalid("a number"))?,
            "order" => {
                self.order = value
                    .as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(|| invalid("an integer"))?
            }
            "enabled" => self.enabled = value.as_bool().ok_or_else(|| invalid("a boolean"))?,
            "evented" => self.evented = value.as_bool().ok_or_else(|| invalid("a boolean"))?,
            "minimum" => self.minimum = as_optional_string(value).ok_or_else(|| invalid("a string or null"))?,
            "maximum" => self.maximum = as_optional_string(value).ok_or_else(|| invalid("a string or null"))?,
            "families" => self.families = as_strings(value).ok_or_else(|| invalid("a list of strings"))?,
            "categories" => {
                self.categories = as_strings(value).ok_or_else(|| invalid("a list of strings"))?
            }
            "authors" => self.authors = as_strings(value).ok_or_else(|| invalid("a list of strings"))?,
            "references" => {
                self.references = as_strings(value).ok_or_else(|| invalid("a list of strings"))?
            }
            "filter_processnames" => {
                self.filter_processnames = as_filter(value).ok_or_else(|| invalid("a list of strings or null"))?
            }
            "filter_apinames" => {
                self.filter_apinames = as_filter(value).ok_or_else(|| invalid("a list of strings or null"))?
            }
            "filter_categories" => {
                self.filter_categories = as_filter(value).ok_or_else(|| invalid("a list of strings or null"))?
            }
            "filter_analysistypes" => {
                self.filter_analysistypes =
                    as_filter(value).ok_or_else(|| invalid("a list of strings or null"))?
            }
            _ => {
                return Err(SignatureError::UnknownAttribute {
                    signature: self.name.clone(),
                    attribute: attribute.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(String::from)
}

fn as_u32(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|v| u32::try_from(v).ok())
}

fn as_optional_string(value: &Value) -> Option<Option<String>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) => Some(Some(s.clone())),
        _ => None,
    }
}

fn as_strings(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(String::from))
        .collect()
}

fn as_filter(value: &Value) -> Option<Option<BTreeSet<String>>> {
    match value {
        Value::Null => Some(None),
        other => as_strings(other).map(|v| Some(v.into_iter().collect())),
    }
}
