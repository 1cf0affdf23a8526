//! Storage error types.

use flowstead_core::CoreError;
use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid tenant id '{0}': use letters, digits, '-' and '_'")]
    InvalidTenant(String),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("WAL error: {0}")]
    Wal(#[from] flowstead_wal::WalError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Io(_) => true,
            StorageError::Wal(e) => e.is_retryable(),
            StorageError::Core(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Core(inner) => inner,
            other => CoreError::Storage {
                retryable: other.is_retryable(),
                reason: other.to_string(),
            },
        }
    }
}
