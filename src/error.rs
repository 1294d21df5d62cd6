//! Error types for the closeness core

use thiserror::Error;
use uuid::Uuid;

/// Input rejected at measurement construction.
///
/// Finite out-of-range values are clamped, not reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Non-finite value for {field}")]
    NonFinite { field: String },
}

/// Failures from the persistence collaborator. Never retried by the core.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Settings could not be saved: {0}")]
    Settings(String),
}

/// Failures producing an export buffer
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No data to export")]
    NoData,

    #[error("Export encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Export cancelled")]
    Cancelled,
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::EncodingFailure(e.to_string())
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        ExportError::EncodingFailure(e.to_string())
    }
}

/// Any error the core can surface to its host
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
