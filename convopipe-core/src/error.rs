//! Error types for convopipe-core

use thiserror::Error;

/// Main error type for the convopipe-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No object stored under the requested key
    #[error("object not found: {0}")]
    NotFound(String),

    /// Storage error that is not a missing object
    #[error("storage error: {0}")]
    Storage(String),

    /// Remote object store error
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// Inference call error
    #[error("classifier error: {0}")]
    Classifier(String),
}

impl Error {
    /// True when the error means the key does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias for convopipe-core
pub type Result<T> = std::result::Result<T, Error>;
