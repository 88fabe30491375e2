//! Error types for vetting domain operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid vetting config: {0}")]
    InvalidConfig(String),

    #[error("Invalid stage name: {0}")]
    InvalidStage(String),

    #[error("Invalid project type: {0}")]
    InvalidProjectType(String),

    #[error("Non-canonical value: {0}")]
    NonCanonical(String),

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
}

/// Result type for vetting domain operations
pub type Result<T> = std::result::Result<T, DomainError>;
