//! Error taxonomy for the lab's boundary operations.
//!
//! Store and configuration code works in `anyhow`; the service boundary
//! narrows failures into the three kinds callers must tell apart.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabError {
    /// Rejected input. Nothing was persisted.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Unknown run identifier or advisor key.
    #[error("not found: {0}")]
    NotFound(String),
    /// The primary write or read against the event store failed.
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl LabError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "internal",
        }
    }
}

pub type LabResult<T> = std::result::Result<T, LabError>;
