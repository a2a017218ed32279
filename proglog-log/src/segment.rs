//! Log segments.
//!
//! A segment binds one [`Store`] and one [`Index`] under a common base
//! offset. Files are named after that base offset:
//! - `<base_offset>.store`: length-prefixed record bytes
//! - `<base_offset>.index`: relative offset to store position entries
//!
//! The segment assigns absolute offsets, translates them to relative index
//! slots and reports when it is full. Rotating to a new segment is up to the
//! caller.

use crate::config::{Config, SegmentConfig};
use crate::error::LogError;
use crate::index::{Index, IndexPosition};
use crate::record::Record;
use crate::store::Store;
use crate::LEN_WIDTH;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

const STORE_EXTENSION: &str = "store";
const INDEX_EXTENSION: &str = "index";

/// Which of a segment's two files a filename refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFileKind {
    Store,
    Index,
}

/// Store file name for a base offset: `<base_offset>.store`
pub fn store_filename(base_offset: u64) -> String {
    format!("{}.{}", base_offset, STORE_EXTENSION)
}

/// Index file name for a base offset: `<base_offset>.index`
pub fn index_filename(base_offset: u64) -> String {
    format!("{}.{}", base_offset, INDEX_EXTENSION)
}

/// Parse base offset and file kind from a segment filename.
pub fn parse_segment_filename(name: &str) -> Option<(u64, SegmentFileKind)> {
    let (stem, extension) = name.rsplit_once('.')?;
    let kind = match extension {
        STORE_EXTENSION => SegmentFileKind::Store,
        INDEX_EXTENSION => SegmentFileKind::Index,
        _ => return None,
    };
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((stem.parse().ok()?, kind))
}

/// A store and index pair covering offsets `[base_offset, next_offset)`.
pub struct Segment {
    base_offset: u64,
    /// Published after the store and index writes of an append succeed.
    next_offset: AtomicU64,
    /// Serializes offset assignment with the store and index writes.
    append_lock: Mutex<()>,
    store: Store,
    index: Index,
    config: SegmentConfig,
}

impl Segment {
    /// Opens or creates the segment with `base_offset` in `dir`.
    ///
    /// An existing segment resumes after its last indexed record. Index
    /// entries whose store bytes never made it to disk are discarded first.
    pub fn open(dir: &Path, base_offset: u64, config: &Config) -> Result<Self, LogError> {
        config.validate()?;

        let store = Store::open(dir.join(store_filename(base_offset)))?;
        let index = Index::open(dir.join(index_filename(base_offset)), &config.segment)?;

        discard_unbacked_entries(&store, &index)?;

        let next_offset = match index.read(IndexPosition::Last) {
            Ok((relative, _)) => base_offset + u64::from(relative) + 1,
            Err(e) if e.is_not_found() => base_offset,
            Err(e) => return Err(e),
        };

        tracing::debug!(
            "opened segment {} in {}: next_offset={}, store={} bytes, index={} bytes",
            base_offset,
            dir.display(),
            next_offset,
            store.size(),
            index.size()
        );

        Ok(Self {
            base_offset,
            next_offset: AtomicU64::new(next_offset),
            append_lock: Mutex::new(()),
            store,
            index,
            config: config.segment,
        })
    }

    /// Returns the absolute offset of the first record this segment can hold.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns the absolute offset the next append will be assigned.
    pub fn next_offset(&self) -> u64 {
        self.next_offset.load(Ordering::Acquire)
    }

    /// Returns the number of records in the segment.
    pub fn len(&self) -> u64 {
        self.next_offset() - self.base_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the segment's limits.
    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Returns the underlying store, e.g. to stream it with [`Store::read_at`].
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Returns the underlying index.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Appends a record, stamping and returning its absolute offset.
    ///
    /// Nothing is indexed unless the store write succeeded, and the next
    /// offset only advances once both writes did.
    pub fn append<R: Record>(&self, record: &mut R) -> Result<u64, LogError> {
        let _guard = self.append_lock.lock();

        let offset = self.next_offset.load(Ordering::Acquire);
        let relative = u32::try_from(offset - self.base_offset).map_err(|_| {
            LogError::IndexFull {
                capacity: self.index.capacity(),
            }
        })?;

        // Refuse up front so a full index never leaves orphaned store bytes.
        if !self.index.has_room() {
            return Err(LogError::IndexFull {
                capacity: self.index.capacity(),
            });
        }

        record.set_offset(offset);
        let bytes = record.encode()?;
        let (_, position) = self.store.append(&bytes)?;
        self.index.write(relative, position)?;

        self.next_offset.store(offset + 1, Ordering::Release);
        Ok(offset)
    }

    /// Reads the record at absolute `offset`.
    pub fn read<R: Record>(&self, offset: u64) -> Result<R, LogError> {
        let next_offset = self.next_offset();
        let out_of_range = || LogError::OffsetOutOfRange {
            offset,
            base_offset: self.base_offset,
            next_offset,
        };

        if offset < self.base_offset || offset >= next_offset {
            return Err(out_of_range());
        }
        let relative = u32::try_from(offset - self.base_offset).map_err(|_| out_of_range())?;

        let (_, position) = self.index.read(IndexPosition::At(relative))?;
        let bytes = self.store.read(position)?;
        R::decode(&bytes)
    }

    /// Returns whether either the store or the index has reached its limit.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.index.capacity()
    }

    /// Flushes the store and the index to disk.
    pub fn sync(&self) -> Result<(), LogError> {
        self.store.sync()?;
        self.index.sync()
    }

    /// Closes the index, then the store. Both are attempted; the first error
    /// is returned.
    pub fn close(&self) -> Result<(), LogError> {
        let index_result = self.index.close();
        let store_result = self.store.close();
        tracing::debug!("closed segment {}", self.base_offset);
        index_result.and(store_result)
    }

    /// Closes the segment and deletes both of its files.
    ///
    /// If this fails the files may or may not still exist.
    pub fn remove(&self) -> Result<(), LogError> {
        self.close()?;
        std::fs::remove_file(self.index.path())?;
        std::fs::remove_file(self.store.path())?;
        tracing::info!("removed segment {}", self.base_offset);
        Ok(())
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("base_offset", &self.base_offset)
            .field("next_offset", &self.next_offset())
            .field("store", &self.store)
            .field("index", &self.index)
            .finish()
    }
}

/// Drops trailing index entries whose store entry is not fully on disk.
///
/// After a crash the index mapping can outlive store bytes that were still
/// buffered; those entries would point past the end of the store.
fn discard_unbacked_entries(store: &Store, index: &Index) -> Result<(), LogError> {
    let store_size = store.size();
    let total = index.len();
    let mut keep = total;

    while keep > 0 {
        let slot = u32::try_from(keep - 1).map_err(|_| LogError::EntryNotFound(IndexPosition::Last))?;
        let (_, position) = index.read(IndexPosition::At(slot))?;
        if frame_fits(store, position, store_size)? {
            break;
        }
        keep -= 1;
    }

    if keep < total {
        tracing::warn!(
            "index {} references {} record(s) missing from {}; discarding them",
            index.path().display(),
            total - keep,
            store.path().display()
        );
        index.truncate(keep)?;
    }
    Ok(())
}

fn frame_fits(store: &Store, position: u64, store_size: u64) -> Result<bool, LogError> {
    let Some(prefix_end) = position.checked_add(LEN_WIDTH) else {
        return Ok(false);
    };
    if prefix_end > store_size {
        return Ok(false);
    }
    let mut len = [0u8; LEN_WIDTH as usize];
    if store.read_at(&mut len, position)? < len.len() {
        return Ok(false);
    }
    let end = prefix_end.checked_add(u64::from_be_bytes(len));
    Ok(end.is_some_and(|end| end <= store_size))
}

/// Segment directory scanner.
pub struct SegmentScanner;

impl SegmentScanner {
    /// Lists the base offsets of all segments in a directory, sorted
    /// ascending. A segment counts if either of its files is present.
    pub fn list_base_offsets(dir: &Path) -> Result<Vec<u64>, LogError> {
        let mut offsets = BTreeSet::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some((base_offset, _)) = parse_segment_filename(&name) {
                offsets.insert(base_offset);
            }
        }

        Ok(offsets.into_iter().collect())
    }

    /// Returns the highest base offset, or None if no segments exist.
    pub fn latest_base_offset(dir: &Path) -> Result<Option<u64>, LogError> {
        let offsets = Self::list_base_offsets(dir)?;
        Ok(offsets.last().copied())
    }
}
