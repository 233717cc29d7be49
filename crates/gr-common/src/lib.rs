//! Group recourse common types and errors.
//!
//! This crate provides foundational types shared across gr-core modules:
//! - Feature schema with interned feature ids
//! - Immutable instances and partial-reassignment actions
//! - Common error types with stable codes
//! - Output format specification for the CLI

pub mod action;
pub mod error;
pub mod outcome;
pub mod output;
pub mod schema;

pub use action::{apply_action, Action, Edit};
pub use error::{Error, ErrorCategory, Result, StructuredError};
pub use outcome::Outcome;
pub use output::OutputFormat;
pub use schema::{
    CategoryId, FeatureDef, FeatureId, FeatureKind, FeatureSchema, Instance, Value,
    NO_ACTION_TOKEN,
};
