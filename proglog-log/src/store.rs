//! Append-only store of length-prefixed payloads.
//!
//! Every entry is framed as:
//!
//! ```text
//! +----------------------+---------------------+
//! | length (u64, BE)     | payload             |
//! | 8 bytes              | length bytes        |
//! +----------------------+---------------------+
//! ```
//!
//! Writes go through a buffered writer. Every read path flushes that buffer
//! first, so a read always observes all earlier appends on the same instance.

use crate::error::LogError;
use crate::LEN_WIDTH;
use bytes::Bytes;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Mutable store state; guarded as a whole so `size` always matches what was
/// handed to the writer.
struct StoreState {
    /// `None` once the store has been closed.
    writer: Option<BufWriter<File>>,
    /// Next append position.
    size: u64,
    /// Makes the next append keep only this many frame bytes and then fail,
    /// flushing them to the file first if the flag is set.
    #[cfg(test)]
    torn_write: Option<(usize, bool)>,
}

/// A single `.store` file.
pub struct Store {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl Store {
    /// Opens or creates the store file at `path`, resuming at its current end.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path,
            state: Mutex::new(StoreState {
                writer: Some(BufWriter::new(file)),
                size,
                #[cfg(test)]
                torn_write: None,
            }),
        })
    }

    /// Returns the store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of bytes appended so far, buffered or not.
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Returns whether the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().writer.is_none()
    }

    /// Appends a framed payload.
    ///
    /// Returns `(bytes_written, position)` where `position` is where the
    /// entry's length prefix starts. If the write fails, whatever part of the
    /// frame was accepted is discarded so `size` stays the next append
    /// position.
    pub fn append(&self, payload: &[u8]) -> Result<(u64, u64), LogError> {
        let mut state = self.state.lock();
        let position = state.size;
        #[cfg(test)]
        let torn_write = state.torn_write.take();
        let writer = state.writer.as_mut().ok_or(LogError::Closed)?;

        #[cfg(test)]
        let result = match torn_write {
            Some((keep, flush)) => write_torn_frame(writer, payload, keep, flush),
            None => write_frame(writer, payload),
        };
        #[cfg(not(test))]
        let result = write_frame(writer, payload);

        if let Err(e) = result {
            discard_torn_write(&mut state, &self.path);
            return Err(e.into());
        }

        let written = LEN_WIDTH + payload.len() as u64;
        state.size += written;
        Ok((written, position))
    }

    #[cfg(test)]
    pub(crate) fn inject_torn_write(&self, keep: usize, flush: bool) {
        self.state.lock().torn_write = Some((keep, flush));
    }

    /// Reads the payload of the entry starting at `position`.
    pub fn read(&self, position: u64) -> Result<Bytes, LogError> {
        let mut state = self.state.lock();
        let size = state.size;
        let writer = state.writer.as_mut().ok_or(LogError::Closed)?;
        writer.flush()?;
        let file = writer.get_ref();

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        read_exact_at(file, &mut len_buf, position)?;
        let len = u64::from_be_bytes(len_buf);

        // Never trust a length that runs past what was written.
        let available = position
            .checked_add(LEN_WIDTH)
            .map_or(0, |start| size.saturating_sub(start));
        if len > available {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "entry at {} claims {} bytes, only {} available",
                    position, len, available
                ),
            )
            .into());
        }

        let mut payload = vec![0u8; len as usize];
        read_exact_at(file, &mut payload, position + LEN_WIDTH)?;
        Ok(Bytes::from(payload))
    }

    /// Reads raw bytes starting at `offset` into `buf`, ignoring framing.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()` only
    /// when the end of the store is reached.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, LogError> {
        let mut state = self.state.lock();
        let writer = state.writer.as_mut().ok_or(LogError::Closed)?;
        writer.flush()?;
        let file = writer.get_ref();

        let mut filled = 0;
        while filled < buf.len() {
            match pread(file, &mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Flushes buffered appends and syncs file data to disk.
    pub fn sync(&self) -> Result<(), LogError> {
        let mut state = self.state.lock();
        let writer = state.writer.as_mut().ok_or(LogError::Closed)?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Flushes buffered appends and closes the file. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), LogError> {
        let mut state = self.state.lock();
        if let Some(mut writer) = state.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("size", &state.size)
            .field("closed", &state.writer.is_none())
            .finish()
    }
}

fn write_frame(writer: &mut BufWriter<File>, payload: &[u8]) -> io::Result<()> {
    writer.write_all(&(payload.len() as u64).to_be_bytes())?;
    writer.write_all(payload)
}

#[cfg(test)]
fn write_torn_frame(
    writer: &mut BufWriter<File>,
    payload: &[u8],
    keep: usize,
    flush: bool,
) -> io::Result<()> {
    let mut frame = (payload.len() as u64).to_be_bytes().to_vec();
    frame.extend_from_slice(payload);
    writer.write_all(&frame[..keep.min(frame.len())])?;
    if flush {
        writer.flush()?;
    }
    Err(io::Error::other("torn write"))
}

/// Drops the bytes of a failed append, wherever they ended up.
///
/// If the store can't be restored its writer is dropped, and every later
/// operation fails with [`LogError::Closed`].
fn discard_torn_write(state: &mut StoreState, path: &Path) {
    let Some(writer) = state.writer.take() else {
        return;
    };
    let (file, buffered) = writer.into_parts();
    let buffered = buffered.unwrap_or_else(|panicked| panicked.into_inner());

    match restore_writer(file, &buffered, state.size) {
        Ok(writer) => state.writer = Some(writer),
        Err(e) => tracing::error!(
            "failed to discard torn write in {}: {}; store is unusable",
            path.display(),
            e
        ),
    }
}

/// Rebuilds a writer whose file plus buffer hold exactly the first `size`
/// bytes of the store.
///
/// Earlier appends may still sit in `buffered`; bytes of the failed frame
/// always come after them, on disk or in the buffer.
fn restore_writer(file: File, buffered: &[u8], size: u64) -> io::Result<BufWriter<File>> {
    let on_disk = file.metadata()?.len();
    if on_disk >= size {
        file.set_len(size)?;
        return Ok(BufWriter::new(file));
    }

    let pending = (size - on_disk) as usize;
    if pending > buffered.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "{} bytes on disk and {} buffered, expected {}",
                on_disk,
                buffered.len(),
                size
            ),
        ));
    }
    let mut writer = BufWriter::new(file);
    writer.write_all(&buffered[..pending])?;
    Ok(writer)
}

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match pread(file, buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("short read at offset {}", offset),
                ))
            }
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
