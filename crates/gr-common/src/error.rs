//! Error types for the group recourse engine.
//!
//! Structured error handling with stable error codes for machine parsing and
//! category classification for grouping. The engine either returns a complete
//! report or raises exactly one of these; it never returns partial results.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for group recourse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Schema, parameter, and action-shape errors.
    Config,
    /// Clustering errors.
    Cluster,
    /// Candidate generation errors that escaped local recovery.
    Candidate,
    /// Predictor collaborator errors.
    Predictor,
    /// File I/O and serialization errors (CLI surface).
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Cluster => write!(f, "cluster"),
            ErrorCategory::Candidate => write!(f, "candidate"),
            ErrorCategory::Predictor => write!(f, "predictor"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for the engine and its CLI.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("unknown feature: '{name}'")]
    UnknownFeature { name: String },

    #[error("feature id {id} out of range for schema of {len} features")]
    UnknownFeatureId { id: usize, len: usize },

    #[error("unknown category '{label}' for feature '{feature}'")]
    UnknownCategory { feature: String, label: String },

    #[error("feature '{feature}' kind mismatch: {message}")]
    FeatureKindMismatch { feature: String, message: String },

    #[error("instance arity mismatch: schema has {expected} features, instance has {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("action maps no features")]
    EmptyAction,

    #[error("final action count {final_k} exceeds initial cluster count {initial_k}")]
    FinalExceedsInitial { final_k: usize, initial_k: usize },

    // Cluster errors (20-29)
    #[error("clustering requested {requested} clusters but input has only {distinct} distinct points")]
    DegenerateClusters { requested: usize, distinct: usize },

    #[error("clustering invariant violated: {0}")]
    ClusterInvariant(String),

    // Candidate errors (30-39)
    #[error("candidate source failed: {0}")]
    CandidateSource(String),

    // Predictor errors (40-49)
    #[error("predictor failed: {0}")]
    Predictor(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the stable error code for this error.
    ///
    /// Codes are grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Cluster errors
    /// - 30-39: Candidate errors
    /// - 40-49: Predictor errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::SchemaValidation(_) => 11,
            Error::UnknownFeature { .. } => 12,
            Error::UnknownFeatureId { .. } => 12,
            Error::UnknownCategory { .. } => 13,
            Error::FeatureKindMismatch { .. } => 14,
            Error::ArityMismatch { .. } => 15,
            Error::EmptyAction => 16,
            Error::FinalExceedsInitial { .. } => 17,
            Error::DegenerateClusters { .. } => 20,
            Error::ClusterInvariant(_) => 21,
            Error::CandidateSource(_) => 30,
            Error::Predictor(_) => 40,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::SchemaValidation(_)
            | Error::UnknownFeature { .. }
            | Error::UnknownFeatureId { .. }
            | Error::UnknownCategory { .. }
            | Error::FeatureKindMismatch { .. }
            | Error::ArityMismatch { .. }
            | Error::EmptyAction
            | Error::FinalExceedsInitial { .. } => ErrorCategory::Config,

            Error::DegenerateClusters { .. } | Error::ClusterInvariant(_) => ErrorCategory::Cluster,

            Error::CandidateSource(_) => ErrorCategory::Candidate,

            Error::Predictor(_) => ErrorCategory::Predictor,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether the caller can plausibly fix the condition and retry.
    ///
    /// Configuration and I/O errors are recoverable by user action;
    /// predictor failures and internal invariant breaks are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::ClusterInvariant(_) | Error::Predictor(_) => false,
            Error::DegenerateClusters { .. } => true, // reduce initial_k or dedupe input
            _ => true,
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable by the caller.
    pub recoverable: bool,

    /// Additional structured context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::FinalExceedsInitial { final_k, initial_k } => {
                context.insert("final_k".to_string(), serde_json::json!(final_k));
                context.insert("initial_k".to_string(), serde_json::json!(initial_k));
            }
            Error::DegenerateClusters { requested, distinct } => {
                context.insert("requested".to_string(), serde_json::json!(requested));
                context.insert("distinct".to_string(), serde_json::json!(distinct));
            }
            Error::ArityMismatch { expected, actual } => {
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_grouped_by_category() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(
            Error::DegenerateClusters {
                requested: 5,
                distinct: 3
            }
            .code(),
            20
        );
        assert_eq!(Error::Predictor("boom".into()).code(), 40);
    }

    #[test]
    fn category_assignment() {
        assert_eq!(Error::EmptyAction.category(), ErrorCategory::Config);
        assert_eq!(
            Error::ClusterInvariant("x".into()).category(),
            ErrorCategory::Cluster
        );
        assert_eq!(
            Error::Predictor("x".into()).category(),
            ErrorCategory::Predictor
        );
    }

    #[test]
    fn structured_error_carries_context() {
        let err = Error::DegenerateClusters {
            requested: 10,
            distinct: 4,
        };
        let s = StructuredError::from(&err);
        assert_eq!(s.code, 20);
        assert_eq!(s.context.get("distinct"), Some(&serde_json::json!(4)));
        assert!(s.recoverable);
        assert!(s.to_json().contains(r#""category":"cluster""#));
    }

    #[test]
    fn predictor_errors_are_not_recoverable() {
        assert!(!Error::Predictor("x".into()).is_recoverable());
    }
}
