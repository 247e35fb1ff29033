//! Exit codes for the dt-core CLI.
//!
//! Ranges:
//! - 0: task stages completed (module failures are logged, never fatal)
//! - 10-19: caller errors (arguments, configuration, input documents)
//! - 20-29: internal errors

/// Process exit status. Values are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed.
    Clean = 0,

    /// Invalid arguments or configuration files.
    ArgsError = 10,

    /// Input document (results file) unreadable as a result aggregate.
    InputError = 12,

    /// Internal error (bug).
    InternalError = 20,

    /// I/O error.
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// True for 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// True for 20 and above.
    pub fn is_internal_error(self) -> bool {
        self.as_i32() >= 20
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::InputError => "ERR_INPUT",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        assert!(!ExitCode::Clean.is_user_error());
        assert!(ExitCode::ArgsError.is_user_error());
        assert!(ExitCode::InputError.is_user_error());
        assert!(ExitCode::InternalError.is_internal_error());
        assert!(ExitCode::IoError.is_internal_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitCode::InputError.to_string(), "ERR_INPUT (12)");
        assert_eq!(i32::from(ExitCode::IoError), 21);
    }
}
