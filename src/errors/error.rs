use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domains::batch::types::JobStatus;
use crate::domains::core::file_storage::FileStorageError;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Record not found: {0} with ID {1}")]
    NotFound(String, String),

    #[error("Database error: {0}")]
    Other(String),
}

/// Domain-level errors
#[derive(Debug, Error)]
pub enum DomainError {
    /// Extracted template text was blank or otherwise unusable for discovery.
    #[error("unrecognized template format: no usable text extracted")]
    UnrecognizedTemplateFormat,

    /// No registered adapter matched the requested extension.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The external document-conversion process is not running.
    #[error("document conversion service unavailable")]
    ConversionServiceUnavailable,

    /// A stored template file is gone from disk.
    #[error("template file missing: {0}")]
    TemplateFileMissing(String),

    /// Pickup-retry loop exhausted without the job record becoming visible.
    #[error("job {0} never became visible to the worker")]
    JobNotVisible(Uuid),

    /// Archive requested before the job reached its terminal state.
    #[error("archive not ready: job is {0}")]
    ArchiveNotReady(JobStatus),

    /// Terminal job has no archive path recorded.
    #[error("job {0} has no archive path")]
    ArchivePathMissing(Uuid),

    #[error("entity not found: {0} with ID {1}")]
    EntityNotFound(String, Uuid),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("document codec error: {0}")]
    DocumentCodec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<FileStorageError> for DomainError {
    fn from(error: FileStorageError) -> Self {
        match error {
            FileStorageError::NotFound(path) => DomainError::TemplateFileMissing(path),
            other => DomainError::Storage(other.to_string()),
        }
    }
}

/// Validation errors for fields and value bindings
#[derive(Debug, Error, Clone, Serialize)]
pub enum ValidationError {
    #[error("field '{field}' is required but has no value")]
    Required { field: String },

    #[error("binding references unknown field '{field}'")]
    UnknownField { field: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required {
            field: field.to_string(),
        }
    }

    pub fn unknown_field(field: &str) -> Self {
        Self::UnknownField {
            field: field.to_string(),
        }
    }
}
