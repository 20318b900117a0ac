//! Error types for mediavault

use std::path::PathBuf;

use thiserror::Error;

use crate::serve::NotFoundPayload;

/// Result type alias for mediavault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for mediavault
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Unknown bucket: {0}")]
    InvalidBucket(String),

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Source vanished before copy: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("File not found: {}/{}", .0.bucket, .0.filename)]
    NotFound(Box<NotFoundPayload>),

    #[error("Hard loss: {bucket}/{filename} absent from both primary and mirror")]
    HardLoss { bucket: String, filename: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Check if the error is expected to resolve on the next reconciliation sweep
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VaultError::WriteFailed(_) | VaultError::StreamError(_) | VaultError::Io(_)
        )
    }

    /// Benign race: the source disappeared between detection and copy.
    /// Skipped without recording a failure, never retried.
    pub fn is_benign(&self) -> bool {
        matches!(self, VaultError::SourceMissing(_))
    }
}
