//! Log error types.

use crate::index::IndexPosition;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the store, index or segment.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offset {offset} out of range for segment [{base_offset}, {next_offset})")]
    OffsetOutOfRange {
        offset: u64,
        base_offset: u64,
        next_offset: u64,
    },

    #[error("index entry not found: {0}")]
    EntryNotFound(IndexPosition),

    #[error("index full: capacity {capacity} bytes")]
    IndexFull { capacity: u64 },

    #[error("malformed record: {0}")]
    Malformed(String),

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("corrupt index {path:?}: length {len} is not a multiple of the entry width")]
    CorruptIndex { path: PathBuf, len: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("closed")]
    Closed,
}

impl LogError {
    /// Returns whether the error means "no such record".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LogError::OffsetOutOfRange { .. } | LogError::EntryNotFound(_)
        )
    }

    /// Returns whether the error means the segment should be rotated.
    pub fn is_capacity(&self) -> bool {
        matches!(self, LogError::IndexFull { .. })
    }

    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LogError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = LogError::EntryNotFound(IndexPosition::Last);
        assert!(not_found.is_not_found());
        assert!(!not_found.is_capacity());
        assert!(!not_found.is_retryable());

        let full = LogError::IndexFull { capacity: 120 };
        assert!(full.is_capacity());
        assert!(!full.is_not_found());

        let io = LogError::from(std::io::Error::other("disk gone"));
        assert!(io.is_retryable());
        assert!(!io.is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = LogError::OffsetOutOfRange {
            offset: 5,
            base_offset: 16,
            next_offset: 20,
        };
        assert_eq!(err.to_string(), "offset 5 out of range for segment [16, 20)");
        assert_eq!(
            LogError::EntryNotFound(IndexPosition::At(3)).to_string(),
            "index entry not found: #3"
        );
    }
}
