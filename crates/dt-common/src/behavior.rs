//! Captured behavior: processes and their intercepted API calls.
//!
//! A [`CallLog`] is an immutable, finite sequence of [`CallRecord`]s. Readers
//! never share a traversal position: each call to [`CallLog::cursor`] (or
//! [`ProcessRecord::calls`]) issues a fresh [`CallCursor`] starting at the first
//! call, so one consumer draining its cursor cannot perturb another's view.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single named argument of an intercepted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallArgument {
    pub name: String,
    pub value: String,
}

/// One intercepted API invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// API name (e.g. `NtCreateFile`).
    pub api: String,

    /// Call category tag (e.g. `filesystem`, `network`, `registry`).
    pub category: String,

    #[serde(default)]
    pub arguments: Vec<CallArgument>,

    #[serde(default = "default_status")]
    pub status: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<String>,

    /// Capture ordinal within the process.
    #[serde(default)]
    pub timestamp: u64,
}

fn default_status() -> bool {
    true
}

impl CallRecord {
    pub fn new(api: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            category: category.into(),
            arguments: Vec::new(),
            status: true,
            return_value: None,
            timestamp: 0,
        }
    }

    /// Add an argument.
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.push(CallArgument {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Set the capture ordinal.
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Value of the first argument with the given name.
    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| arg.value.as_str())
    }
}

/// Ordered, immutable call sequence of one process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallLog {
    calls: Vec<CallRecord>,
}

impl CallLog {
    pub fn new(calls: Vec<CallRecord>) -> Self {
        Self { calls }
    }

    /// Issue a new cursor positioned before the first call.
    pub fn cursor(&self) -> CallCursor<'_> {
        CallCursor {
            calls: &self.calls,
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn as_slice(&self) -> &[CallRecord] {
        &self.calls
    }
}

impl From<Vec<CallRecord>> for CallLog {
    fn from(calls: Vec<CallRecord>) -> Self {
        CallLog::new(calls)
    }
}

/// Independent read position into a [`CallLog`].
#[derive(Debug, Clone)]
pub struct CallCursor<'a> {
    calls: &'a [CallRecord],
    position: usize,
}

impl<'a> CallCursor<'a> {
    /// Number of calls already yielded.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Calls not yet yielded.
    pub fn remaining(&self) -> &'a [CallRecord] {
        &self.calls[self.position..]
    }
}

impl<'a> Iterator for CallCursor<'a> {
    type Item = &'a CallRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let call = self.calls.get(self.position)?;
        self.position += 1;
        Some(call)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.calls.len() - self.position;
        (n, Some(n))
    }
}

impl ExactSizeIterator for CallCursor<'_> {}

/// A monitored process and its call trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub process_name: String,
    pub process_id: u32,

    #[serde(default)]
    pub parent_id: u32,

    #[serde(default)]
    calls: CallLog,
}

impl ProcessRecord {
    pub fn new(process_name: impl Into<String>, process_id: u32) -> Self {
        Self {
            process_name: process_name.into(),
            process_id,
            parent_id: 0,
            calls: CallLog::default(),
        }
    }

    /// Replace the call trace.
    pub fn with_calls(mut self, calls: Vec<CallRecord>) -> Self {
        self.calls = CallLog::new(calls);
        self
    }

    /// Fresh cursor over this process's calls.
    pub fn calls(&self) -> CallCursor<'_> {
        self.calls.cursor()
    }

    pub fn call_log(&self) -> &CallLog {
        &self.calls
    }
}

/// Behavioral telemetry section of the result aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(default)]
    pub processes: Vec<ProcessRecord>,

    /// Anything else the behavior module emitted (process tree, summary, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Behavior {
    pub fn new(processes: Vec<ProcessRecord>) -> Self {
        Self {
            processes,
            extra: Map::new(),
        }
    }

    /// Total number of calls across all processes.
    pub fn call_count(&self) -> usize {
        self.processes.iter().map(|p| p.call_log().len()).sum()
    }
}
