use std::io;

/// Crate-local error type for `tandem-store` operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("integrity check failed for {file}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("invalid structure file {file}: {reason}")]
    Structure { file: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
