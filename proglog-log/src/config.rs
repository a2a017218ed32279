//! Segment configuration.

use crate::error::LogError;
use crate::{DEFAULT_MAX_BYTES, ENTRY_WIDTH};
use serde::{Deserialize, Serialize};

/// Log configuration consumed by the storage core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-segment limits.
    pub segment: SegmentConfig,
}

/// Rotation thresholds for a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Store size at which the segment reports itself maxed.
    pub max_store_bytes: u64,
    /// Index size at which the segment reports itself maxed. Rounded down to
    /// a multiple of the index entry width before use.
    pub max_index_bytes: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: DEFAULT_MAX_BYTES,
            max_index_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    pub fn with_max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Rejects limits a segment could never operate under.
    pub fn validate(&self) -> Result<(), LogError> {
        if self.segment.max_store_bytes == 0 {
            return Err(LogError::InvalidConfig(
                "segment.max_store_bytes must be greater than zero".to_string(),
            ));
        }
        if self.segment.max_index_bytes < ENTRY_WIDTH {
            return Err(LogError::InvalidConfig(format!(
                "segment.max_index_bytes must hold at least one {}-byte entry, got {}",
                ENTRY_WIDTH, self.segment.max_index_bytes
            )));
        }
        Ok(())
    }
}

impl SegmentConfig {
    /// Index capacity actually pre-allocated: the configured maximum rounded
    /// down to a whole number of entries.
    pub fn index_capacity(&self) -> u64 {
        nearest_multiple(self.max_index_bytes, ENTRY_WIDTH)
    }
}

/// Largest multiple of `k` that is not greater than `j`.
pub(crate) fn nearest_multiple(j: u64, k: u64) -> u64 {
    (j / k) * k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.segment.max_store_bytes, 1024);
        assert_eq!(config.segment.max_index_bytes, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_index_capacity_rounds_down() {
        let config = Config::new().with_max_index_bytes(125);
        assert_eq!(config.segment.index_capacity(), 120);

        let config = Config::new().with_max_index_bytes(120);
        assert_eq!(config.segment.index_capacity(), 120);

        assert_eq!(nearest_multiple(11, 12), 0);
        assert_eq!(nearest_multiple(1024, 12), 1020);
    }

    #[test]
    fn test_validate_rejects_unusable_limits() {
        let config = Config::new().with_max_store_bytes(0);
        assert!(matches!(
            config.validate(),
            Err(LogError::InvalidConfig(_))
        ));

        let config = Config::new().with_max_index_bytes(11);
        assert!(matches!(
            config.validate(),
            Err(LogError::InvalidConfig(_))
        ));

        let config = Config::new().with_max_index_bytes(12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip_with_partial_fields() {
        let config: Config =
            serde_json::from_str(r#"{"segment":{"max_store_bytes":4096}}"#).unwrap();
        assert_eq!(config.segment.max_store_bytes, 4096);
        assert_eq!(config.segment.max_index_bytes, 1024);
    }
}
