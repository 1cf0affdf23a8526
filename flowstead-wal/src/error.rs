//! WAL error types.

use thiserror::Error;

/// Errors raised while reading or writing the log.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record at offset {offset} failed checksum (stored {expected:#010x}, computed {actual:#010x})")]
    CorruptedRecord {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    #[error("bad record header at offset {offset}: {reason}")]
    InvalidHeader { offset: u64, reason: String },

    #[error("record of {size} bytes exceeds limit of {max}")]
    RecordTooLarge { size: usize, max: usize },

    #[error("record of {size} bytes cannot fit in a {segment_size}-byte segment")]
    SegmentTooSmall { size: usize, segment_size: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WalError {
    /// Returns whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalError::Io(_))
    }
}
