//! Error types for engramdb.

use std::path::PathBuf;

use thiserror::Error;

use crate::embedding::EmbeddingModelType;

/// Main error type for engramdb operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Lookup by an identifier the store does not hold.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A connection endpoint does not reference an existing engram.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Vectors of different dimensionality were combined.
    #[error("Dimension mismatch: expected {expected} dimensions, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector search has not been initialized for this store.
    #[error("Vector search is not initialized; call init_vector_search first")]
    NotInitialized,

    /// Vector search is already bound to a different embedding model.
    #[error("Vector search already initialized with {current}, cannot switch to {requested}")]
    AlreadyInitialized {
        current: EmbeddingModelType,
        requested: EmbeddingModelType,
    },

    /// The embedding backend failed to produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// One item of a batch failed; the whole batch is rejected.
    #[error("Embedding error at batch index {index}: {message}")]
    EmbeddingBatch { index: usize, message: String },

    /// Caller-supplied values are out of range or malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage backend error.
    #[error("{0}")]
    Database(crate::sqlite::Error),

    /// Tokenization error.
    #[error("Tokenization error: {0}")]
    Tokenization(#[from] tokenizers::Error),

    /// ONNX session error.
    #[error("ONNX session error: {0}")]
    Onnx(#[from] ort::Error),

    /// HuggingFace Hub error.
    #[error("HuggingFace Hub error: {0}")]
    HfHub(#[from] hf_hub::api::sync::ApiError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A lock was poisoned by a panicking thread.
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

impl From<crate::sqlite::Error> for Error {
    /// Storage errors caused by caller input keep their domain meaning.
    fn from(err: crate::sqlite::Error) -> Self {
        match err {
            crate::sqlite::Error::InvalidLimit(msg) => Error::Validation(msg),
            crate::sqlite::Error::MismatchedDimensions { expected, actual } => {
                Error::DimensionMismatch { expected, actual }
            }
            other => Error::Database(other),
        }
    }
}

impl Error {
    /// True for errors the caller can fix by changing its input or call order.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::InvalidReference(_)
                | Error::DimensionMismatch { .. }
                | Error::NotInitialized
                | Error::AlreadyInitialized { .. }
                | Error::Validation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_display() {
        let err = Error::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        let msg = err.to_string();
        assert!(msg.contains("384"));
        assert!(msg.contains("768"));
    }

    #[test]
    fn test_already_initialized_names_both_models() {
        let err = Error::AlreadyInitialized {
            current: EmbeddingModelType::Hashing,
            requested: EmbeddingModelType::E5,
        };
        let msg = err.to_string();
        assert!(msg.contains("hashing"));
        assert!(msg.contains("e5"));
    }

    #[test]
    fn test_storage_errors_keep_domain_meaning() {
        let err: Error =
            crate::sqlite::Error::InvalidLimit("Limit must be greater than 0".into()).into();
        assert!(matches!(err, Error::Validation(_)));

        let err: Error = crate::sqlite::Error::Sqlite("disk I/O error".into()).into();
        assert!(matches!(err, Error::Database(_)));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_caller_error_classification() {
        assert!(Error::NotInitialized.is_caller_error());
        assert!(Error::Validation("bad".into()).is_caller_error());
        assert!(!Error::Embedding("backend down".into()).is_caller_error());
        assert!(!Error::Lock("poisoned".into()).is_caller_error());
    }
}
