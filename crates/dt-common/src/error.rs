//! Error taxonomy for analysis modules.
//!
//! Every pluggable module (processing, reporting, auxiliary, signature, feed)
//! reports failure through [`ModuleError`]. The orchestration layer never
//! propagates these past a stage boundary; it classifies them and logs:
//!
//! | Variant            | Meaning                               | Handling            |
//! |--------------------|---------------------------------------|---------------------|
//! | `Dependency`       | declared dependency missing           | warn, no contribution |
//! | `Processing`       | declared processing-domain failure    | warn, no contribution |
//! | `Report`           | declared report-domain failure        | warn, no contribution |
//! | `NotImplemented`   | hook not provided by this module      | silent no-op        |
//! | `Io`/`Json`/`Other`| unexpected failure                    | error with detail   |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for module hooks.
pub type ModuleResult<T> = std::result::Result<T, ModuleError>;

/// Error categories for grouping module failures in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// A library or external tool the module needs is unavailable.
    Dependency,
    /// The module understood its input but could not produce a result.
    Domain,
    /// The hook is not provided.
    Unimplemented,
    /// Anything the module did not anticipate.
    Unexpected,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Dependency => write!(f, "dependency"),
            ErrorCategory::Domain => write!(f, "domain"),
            ErrorCategory::Unimplemented => write!(f, "unimplemented"),
            ErrorCategory::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Failure reported by a module hook.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("missing dependency: {0}")]
    Dependency(String),

    #[error("processing error: {0}")]
    Processing(String),

    #[error("report error: {0}")]
    Report(String),

    #[error("hook not implemented")]
    NotImplemented,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl ModuleError {
    /// Shorthand for a declared processing failure.
    pub fn processing(message: impl Into<String>) -> Self {
        ModuleError::Processing(message.into())
    }

    /// Shorthand for a declared report failure.
    pub fn report(message: impl Into<String>) -> Self {
        ModuleError::Report(message.into())
    }

    /// Shorthand for a declared missing dependency.
    pub fn dependency(message: impl Into<String>) -> Self {
        ModuleError::Dependency(message.into())
    }

    /// Shorthand for an unexpected failure.
    pub fn other(message: impl Into<String>) -> Self {
        ModuleError::Other(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ModuleError::Dependency(_) => ErrorCategory::Dependency,
            ModuleError::Processing(_) | ModuleError::Report(_) => ErrorCategory::Domain,
            ModuleError::NotImplemented => ErrorCategory::Unimplemented,
            ModuleError::Io(_) | ModuleError::Json(_) | ModuleError::Other(_) => {
                ErrorCategory::Unexpected
            }
        }
    }

    /// True for failures a module declares on purpose (dependency or domain).
    ///
    /// These are logged as warnings; everything else that is not
    /// `NotImplemented` is logged as an error with full detail.
    pub fn is_declared(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Dependency | ErrorCategory::Domain
        )
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, ModuleError::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        assert_eq!(
            ModuleError::dependency("yara").category(),
            ErrorCategory::Dependency
        );
        assert_eq!(
            ModuleError::processing("bad pcap").category(),
            ErrorCategory::Domain
        );
        assert_eq!(
            ModuleError::report("disk full").category(),
            ErrorCategory::Domain
        );
        assert_eq!(
            ModuleError::NotImplemented.category(),
            ErrorCategory::Unimplemented
        );
        assert_eq!(
            ModuleError::other("boom").category(),
            ErrorCategory::Unexpected
        );
    }

    #[test]
    fn test_declared_errors() {
        assert!(ModuleError::dependency("pefile").is_declared());
        assert!(ModuleError::processing("truncated").is_declared());
        assert!(!ModuleError::NotImplemented.is_declared());
        assert!(!ModuleError::other("panic-ish").is_declared());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!ModuleError::from(io).is_declared());
    }

    #[test]
    fn test_error_display() {
        let err = ModuleError::dependency("libmagic");
        assert_eq!(err.to_string(), "missing dependency: libmagic");
        assert_eq!(ModuleError::NotImplemented.to_string(), "hook not implemented");
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Domain.to_string(), "domain");
        assert_eq!(
            serde_json::to_string(&ErrorCategory::Unimplemented).unwrap(),
            "\"unimplemented\""
        );
    }
}
