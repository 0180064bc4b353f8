//! Core error types for adjutant-core.
//!
//! This module defines the error hierarchy using thiserror. Two outcomes
//! are deliberately NOT errors: retry exhaustion (a legitimate terminal
//! result, see `workflow::RetryOutcome`) and a degraded stage (recorded in
//! the run, see `workflow::StageOutput`).

use thiserror::Error;

/// Core error type for adjutant-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed input rejected at a validation boundary
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An external collaborator could not produce data
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Workflow construction or execution errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Malformed-input errors. Never retried; surfaced immediately to the
/// caller of the failing engine.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be greater than start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// Required identity field is absent
    #[error("Missing required field '{field}' on {kind}")]
    MissingField { kind: String, field: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Collaborator failures. Recoverable: the orchestrator applies the
/// configured degrade-or-fail-fast policy.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The collaborator is unreachable or returned no usable data
    #[error("Source '{source_name}' unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },
}

impl SourceError {
    /// Convenience constructor for the common unavailable case.
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        SourceError::Unavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// Workflow-specific errors.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Stage wiring rejected at pipeline construction
    #[error("Invalid wiring for stage '{stage}': {message}")]
    InvalidWiring { stage: String, message: String },

    /// Two stages declared the same output slot
    #[error("Duplicate output key '{key}'")]
    DuplicateOutputKey { key: String },
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
