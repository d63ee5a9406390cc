//! Error types for rusts-bench-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Empty measurement name")]
    EmptyMeasurement,

    #[error("Point has no timestamp")]
    MissingTimestamp,

    #[error("No fields provided")]
    NoFields,
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
