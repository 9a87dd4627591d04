use std::error::Error;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or rejected the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable context.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A transaction kept losing against concurrent writers.
    #[error("transaction on `{path}` gave up after {attempts} conflicting attempts")]
    Contention {
        /// Document the transaction targeted.
        path: String,
        /// Number of attempts made.
        attempts: usize,
    },
    /// A stored document does not decode into the expected shape.
    #[error("stored value at `{path}` is corrupted")]
    Corrupted {
        /// Document that failed to decode.
        path: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a decoding error for the document at `path`.
    pub fn corrupted(path: impl Into<String>, source: serde_json::Error) -> Self {
        StorageError::Corrupted {
            path: path.into(),
            source,
        }
    }
}

/// Decode a stored document into its typed model.
pub fn decode<T: DeserializeOwned>(path: &str, value: Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|source| StorageError::corrupted(path, source))
}

/// Encode a typed model into a storable document.
pub fn encode<T: Serialize>(path: &str, value: &T) -> StorageResult<Value> {
    serde_json::to_value(value).map_err(|source| StorageError::corrupted(path, source))
}
