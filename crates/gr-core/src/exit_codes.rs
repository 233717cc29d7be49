//! Exit codes for the gr-core CLI.
//!
//! Exit codes communicate operation outcome without requiring output
//! parsing and are a stable contract for automation.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors (bugs, should be reported)

use gr_common::{Error, ErrorCategory};

/// Exit codes for gr-core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success: report produced
    Clean = 0,

    /// Invalid arguments
    ArgsError = 10,

    /// Invalid configuration (schema, parameters, actions)
    ConfigError = 11,

    /// Data problem (degenerate clustering, candidate contract violation)
    DataError = 12,

    /// File I/O or JSON problem
    IoError = 13,

    /// Predictor collaborator failure
    PredictorError = 14,

    /// Internal invariant violation
    InternalError = 20,
}

impl ExitCode {
    /// Map an engine error to its exit code.
    pub fn from_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Cluster | ErrorCategory::Candidate => ExitCode::DataError,
            ErrorCategory::Predictor => ExitCode::PredictorError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }
}
