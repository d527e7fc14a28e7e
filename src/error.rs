//! Error types for stress-ensemble

use thiserror::Error;

/// Errors that can occur during training or inference
#[derive(Debug, Error)]
pub enum StressError {
    /// Malformed input, insufficient class balance, degenerate columns
    #[error("Validation error: {0}")]
    Validation(String),

    /// A ratio feature hit a zero denominator or an input was not finite
    #[error("Numeric domain error: {0}")]
    NumericDomain(String),

    /// The artifact does not match what this build can produce
    #[error("Artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StressError {
    /// Stable machine-readable code, used by the CLI and the C ABI
    pub fn code(&self) -> &'static str {
        match self {
            StressError::Validation(_) => "VALIDATION_ERROR",
            StressError::NumericDomain(_) => "NUMERIC_DOMAIN_ERROR",
            StressError::ArtifactMismatch(_) => "ARTIFACT_MISMATCH",
            StressError::Json(_) => "JSON_ERROR",
            StressError::Io(_) => "IO_ERROR",
        }
    }
}

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, StressError>;
