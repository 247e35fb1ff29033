//! Task and machine identity types.
//!
//! A [`Task`] identifies one analysis. It is created by the surrounding
//! scheduler and handed by reference to every stage; nothing in the core
//! mutates it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Category of a task whose target is a file sample.
pub const CATEGORY_FILE: &str = "file";

/// Category of a task whose target is a URL.
pub const CATEGORY_URL: &str = "url";

/// Numeric task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        TaskId(id)
    }
}

/// One analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Target descriptor: a file path or a URL, depending on `category`.
    pub target: String,

    /// Target category (`"file"`, `"url"`, ...).
    pub category: String,

    /// Label of the machine the task was assigned to, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_on: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, target: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            category: category.into(),
            machine: None,
            added_on: None,
        }
    }

    /// Assign the machine label.
    pub fn with_machine(mut self, label: impl Into<String>) -> Self {
        self.machine = Some(label.into());
        self
    }

    pub fn is_file(&self) -> bool {
        self.category == CATEGORY_FILE
    }

    /// Per-task storage directory under a storage root.
    ///
    /// Layout: `<root>/storage/analyses/<id>`.
    pub fn analysis_path(&self, root: &Path) -> PathBuf {
        root.join("storage")
            .join("analyses")
            .join(self.id.to_string())
    }
}

/// Execution-backend machine descriptor handed to auxiliary modules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
    pub label: String,
    /// Guest platform (`"windows"`, `"linux"`, ...).
    pub platform: String,
    pub ip: String,
    /// Host-side network interface used for traffic capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}

impl Machine {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            platform: "windows".to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_path_layout() {
        let task = Task::new(42, "/tmp/sample.exe", CATEGORY_FILE);
        let path = task.analysis_path(Path::new("/opt/detonate"));
        assert_eq!(path, PathBuf::from("/opt/detonate/storage/analyses/42"));
    }

    #[test]
    fn test_task_category() {
        assert!(Task::new(1, "a.exe", CATEGORY_FILE).is_file());
        assert!(!Task::new(2, "http://example.com", CATEGORY_URL).is_file());
    }

    #[test]
    fn test_task_serialization() {
        let task = Task::new(7, "x.doc", "file").with_machine("win7-x64");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["machine"], "win7-x64");
        assert!(json.get("added_on").is_none());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }
}
