use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A persisted record could not be mapped back onto its entity.
    #[error("corrupted record `{id}`: {reason}")]
    Corrupted { id: String, reason: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a corrupted-record error.
    pub fn corrupted(id: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::Corrupted {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
