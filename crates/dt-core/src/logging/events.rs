//! Stage and event names shared by every log line.
//!
//! Log statements attach `stage = %Stage::...` and `event = event_names::...`
//! so JSONL output can be filtered without parsing messages.

use serde::{Deserialize, Serialize};

/// Phases of one analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup, registry and configuration loading.
    Init,
    /// Auxiliary modules around execution.
    Auxiliary,
    /// Execution backend control.
    Machinery,
    Processing,
    Signatures,
    Reporting,
    /// Threat-intelligence feed refresh.
    Feeds,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Auxiliary => "auxiliary",
            Stage::Machinery => "machinery",
            Stage::Processing => "processing",
            Stage::Signatures => "signatures",
            Stage::Reporting => "reporting",
            Stage::Feeds => "feeds",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standard event names.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_ERROR: &str = "config.error";

    pub const STAGE_EMPTY: &str = "stage.empty";
    pub const STAGE_FINISHED: &str = "stage.finished";

    pub const MODULE_LOAD_FAILED: &str = "module.load_failed";
    pub const MODULE_SKIPPED: &str = "module.skipped";
    pub const MODULE_FINISHED: &str = "module.finished";
    pub const MODULE_DECLARED_FAILURE: &str = "module.declared_failure";
    pub const MODULE_UNEXPECTED_FAILURE: &str = "module.unexpected_failure";

    pub const SIGNATURE_VERSION_SKIPPED: &str = "signature.version_skipped";
    pub const SIGNATURE_OVERLAY_REJECTED: &str = "signature.overlay_rejected";
    pub const SIGNATURE_MATCHED: &str = "signature.matched";

    pub const FEED_UPDATED: &str = "feed.updated";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display_matches_serde() {
        for stage in [Stage::Init, Stage::Processing, Stage::Feeds] {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{stage}\""));
        }
    }

    #[test]
    fn test_event_names_are_dotted() {
        for name in [
            event_names::RUN_STARTED,
            event_names::MODULE_SKIPPED,
            event_names::SIGNATURE_MATCHED,
        ] {
            assert!(name.contains('.'), "{name}");
        }
    }
}
