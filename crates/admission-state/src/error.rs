//! Error types for admission-state

use thiserror::Error;

/// Errors raised by object store and capability source collaborators
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend could not be reached or refused the request
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The requested record does not exist
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    /// The backend answered with a payload that does not decode
    #[error("Decoding failed: {0}")]
    Decode(String),

    /// Local IO error (filesystem store)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Shorthand for a [`StorageError::NotFound`] on `kind`/`name`.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        StorageError::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            StorageError::Decode(err.to_string())
        } else {
            StorageError::Unavailable(err.to_string())
        }
    }
}
