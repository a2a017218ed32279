//! Records stored in a segment.
//!
//! A segment treats record payloads as opaque. It only needs to stamp the
//! assigned offset onto a record and to turn it into bytes and back, which is
//! what [`Record`] captures.

use crate::error::LogError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A record a segment can append and read back.
pub trait Record: Sized {
    /// Stamps the absolute offset the segment assigned.
    fn set_offset(&mut self, offset: u64);

    /// Returns the record's absolute offset.
    fn offset(&self) -> u64;

    /// Serializes the record for the store.
    fn encode(&self) -> Result<Vec<u8>, LogError>;

    /// Deserializes a record read from the store.
    fn decode(bytes: &[u8]) -> Result<Self, LogError>;
}

/// The default record: an opaque value plus its offset in the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub value: Bytes,
    pub offset: u64,
}

impl LogRecord {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
            offset: 0,
        }
    }
}

impl Record for LogRecord {
    fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn encode(&self) -> Result<Vec<u8>, LogError> {
        serde_json::to_vec(self).map_err(|e| LogError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, LogError> {
        serde_json::from_slice(bytes).map_err(|e| LogError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_record_encode_decode() {
        let mut record = LogRecord::new(&b"hello world"[..]);
        record.set_offset(42);

        let bytes = record.encode().unwrap();
        let decoded = LogRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.offset(), 42);
    }

    #[test]
    fn test_log_record_decode_malformed() {
        let err = LogRecord::decode(b"\x00\x01not json").unwrap_err();
        assert!(matches!(err, LogError::Malformed(_)));
    }
}
