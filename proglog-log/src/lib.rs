//! # proglog-log
//!
//! Storage core for proglog's commit log.
//!
//! This crate provides the three units a segmented log is built from:
//! - [`Store`]: append-only file of length-prefixed payloads
//! - [`Index`]: memory-mapped, fixed-width relative offset to store position map
//! - [`Segment`]: one store plus one index sharing a base offset; assigns
//!   offsets and reports when it should be rotated
//!
//! Choosing the active segment, routing offsets across segments and retention
//! policy belong to the caller.

pub mod config;
pub mod error;
pub mod index;
pub mod record;
pub mod segment;
pub mod store;

pub use config::{Config, SegmentConfig};
pub use error::LogError;
pub use index::{Index, IndexPosition};
pub use record::{LogRecord, Record};
pub use segment::{
    index_filename, parse_segment_filename, store_filename, Segment, SegmentFileKind,
    SegmentScanner,
};
pub use store::Store;

/// Width of the big-endian length prefix in front of every store entry.
pub const LEN_WIDTH: u64 = 8;

/// Width of the relative offset field of an index entry.
pub const OFFSET_WIDTH: u64 = 4;

/// Width of the store position field of an index entry.
pub const POSITION_WIDTH: u64 = 8;

/// Total width of one index entry.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Default limit for both the store and the index of a segment.
pub const DEFAULT_MAX_BYTES: u64 = 1024;
