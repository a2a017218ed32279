//! Memory-mapped offset index.
//!
//! The index file is a dense array of fixed-width entries with no header:
//!
//! ```text
//! +--------------------------+--------------------------+
//! | relative offset (u32 BE) | store position (u64 BE)  |
//! | 4 bytes                  | 8 bytes                  |
//! +--------------------------+--------------------------+
//! ```
//!
//! Entry `n` lives at byte `n * ENTRY_WIDTH`, so lookups are arithmetic, not a
//! scan. While open, the file is grown to the configured capacity and mapped;
//! `close` truncates it back to the bytes actually written.

use crate::config::SegmentConfig;
use crate::error::LogError;
use crate::{ENTRY_WIDTH, OFFSET_WIDTH};
use memmap2::MmapMut;
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Which index entry to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPosition {
    /// The most recently written entry.
    Last,
    /// The entry for the given relative offset.
    At(u32),
}

impl fmt::Display for IndexPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexPosition::Last => write!(f, "last"),
            IndexPosition::At(n) => write!(f, "#{}", n),
        }
    }
}

struct Mapped {
    file: File,
    mmap: MmapMut,
}

struct IndexState {
    /// `None` once the index has been closed.
    mapped: Option<Mapped>,
    /// Bytes of valid entries.
    size: u64,
}

/// A single `.index` file.
pub struct Index {
    path: PathBuf,
    capacity: u64,
    state: Mutex<IndexState>,
}

impl Index {
    /// Opens or creates the index file at `path`, pre-sized to the segment's
    /// index capacity.
    pub fn open(path: impl AsRef<Path>, config: &SegmentConfig) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len % ENTRY_WIDTH != 0 {
            return Err(LogError::CorruptIndex { path, len });
        }

        // An index left over from a larger configuration keeps its entries.
        let capacity = config.index_capacity().max(len);
        if capacity == 0 {
            return Err(LogError::InvalidConfig(format!(
                "index capacity must hold at least one {}-byte entry",
                ENTRY_WIDTH
            )));
        }
        file.set_len(capacity)?;

        // SAFETY: the file is owned by this index for as long as the mapping
        // lives, and it is only resized after the mapping has been dropped.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let slots = len / ENTRY_WIDTH;
        let entries = recover_entries(&mmap, slots);
        if entries < slots {
            tracing::warn!(
                "index {} has {} slots but only {} valid entries; ignoring the rest",
                path.display(),
                slots,
                entries
            );
        }

        Ok(Self {
            path,
            capacity,
            state: Mutex::new(IndexState {
                mapped: Some(Mapped { file, mmap }),
                size: entries * ENTRY_WIDTH,
            }),
        })
    }

    /// Returns the index file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes of written entries.
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Pre-allocated bytes available for entries.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of written entries.
    pub fn len(&self) -> u64 {
        self.size() / ENTRY_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns whether one more entry fits.
    pub fn has_room(&self) -> bool {
        self.size() + ENTRY_WIDTH <= self.capacity
    }

    /// Returns whether the index has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().mapped.is_none()
    }

    /// Reads an entry, returning `(relative_offset, store_position)`.
    pub fn read(&self, position: IndexPosition) -> Result<(u32, u64), LogError> {
        let state = self.state.lock();
        let mapped = state.mapped.as_ref().ok_or(LogError::Closed)?;

        let entries = state.size / ENTRY_WIDTH;
        let slot = match position {
            IndexPosition::Last if entries > 0 => entries - 1,
            IndexPosition::At(n) if u64::from(n) < entries => u64::from(n),
            _ => return Err(LogError::EntryNotFound(position)),
        };

        Ok(entry_at(&mapped.mmap, slot))
    }

    /// Appends an entry at the end of the index.
    pub fn write(&self, offset: u32, position: u64) -> Result<(), LogError> {
        let mut state = self.state.lock();
        let size = state.size;
        let mapped = state.mapped.as_mut().ok_or(LogError::Closed)?;

        if size + ENTRY_WIDTH > self.capacity {
            return Err(LogError::IndexFull {
                capacity: self.capacity,
            });
        }
        debug_assert_eq!(u64::from(offset), size / ENTRY_WIDTH, "index entries are dense");

        let start = size as usize;
        let mid = start + OFFSET_WIDTH as usize;
        let end = start + ENTRY_WIDTH as usize;
        mapped.mmap[start..mid].copy_from_slice(&offset.to_be_bytes());
        mapped.mmap[mid..end].copy_from_slice(&position.to_be_bytes());

        state.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Drops every entry from slot `entries` onwards.
    pub(crate) fn truncate(&self, entries: u64) -> Result<(), LogError> {
        let mut state = self.state.lock();
        let size = state.size;
        let mapped = state.mapped.as_mut().ok_or(LogError::Closed)?;

        let new_size = (entries * ENTRY_WIDTH).min(size);
        // Zero the tail so a later crash can't resurrect these entries.
        mapped.mmap[new_size as usize..size as usize].fill(0);
        state.size = new_size;

        tracing::debug!(
            "truncated index {} to {} entries",
            self.path.display(),
            new_size / ENTRY_WIDTH
        );
        Ok(())
    }

    /// Flushes the mapping to disk.
    pub fn sync(&self) -> Result<(), LogError> {
        let state = self.state.lock();
        let mapped = state.mapped.as_ref().ok_or(LogError::Closed)?;
        mapped.mmap.flush()?;
        Ok(())
    }

    /// Flushes the mapping, unmaps it and truncates the file to the written
    /// entries. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), LogError> {
        let mut state = self.state.lock();
        let size = state.size;
        match state.mapped.take() {
            Some(mapped) => release(mapped, size),
            None => Ok(()),
        }
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(mapped) = state.mapped.take() {
            if let Err(e) = release(mapped, state.size) {
                tracing::error!("failed to close index {}: {}", self.path.display(), e);
            }
        }
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("size", &state.size)
            .field("capacity", &self.capacity)
            .field("closed", &state.mapped.is_none())
            .finish()
    }
}

/// Flush, unmap, then truncate; in that order.
fn release(mapped: Mapped, size: u64) -> Result<(), LogError> {
    let Mapped { file, mmap } = mapped;
    mmap.flush()?;
    drop(mmap);
    file.set_len(size)?;
    file.sync_all()?;
    Ok(())
}

fn entry_at(mmap: &[u8], slot: u64) -> (u32, u64) {
    let start = (slot * ENTRY_WIDTH) as usize;
    let mid = start + OFFSET_WIDTH as usize;
    let end = start + ENTRY_WIDTH as usize;

    let mut offset = [0u8; OFFSET_WIDTH as usize];
    offset.copy_from_slice(&mmap[start..mid]);
    let mut position = [0u8; 8];
    position.copy_from_slice(&mmap[mid..end]);

    (u32::from_be_bytes(offset), u64::from_be_bytes(position))
}

/// Counts the leading slots that hold real entries.
///
/// A file that was never closed still has its pre-allocated, zero-filled
/// tail. Real entries are dense (slot `n` holds relative offset `n`) with
/// strictly increasing positions, so the first slot breaking either rule ends
/// the index.
fn recover_entries(mmap: &[u8], slots: u64) -> u64 {
    let mut prev_position = None;
    for slot in 0..slots {
        let (offset, position) = entry_at(mmap, slot);
        if u64::from(offset) != slot {
            return slot;
        }
        if prev_position.is_some_and(|prev| position <= prev) {
            return slot;
        }
        prev_position = Some(position);
    }
    slots
}
