//! Benchmark utilities.

use bytes::Bytes;
use proglog_log::{Config, LogRecord, Segment};
use tempfile::TempDir;

/// Opens a fresh segment with room for `records` index entries and a store
/// limit that will not be hit first.
pub fn create_test_segment(records: u64) -> (TempDir, Segment) {
    let dir = TempDir::new().unwrap();
    let config = Config::new()
        .with_max_store_bytes(u64::MAX)
        .with_max_index_bytes(records * proglog_log::ENTRY_WIDTH);
    let segment = Segment::open(dir.path(), 0, &config).unwrap();
    (dir, segment)
}

/// Builds a record whose value is `size` bytes.
pub fn create_test_record(size: usize) -> LogRecord {
    LogRecord::new(Bytes::from(vec![b'x'; size]))
}
