//! Append-only log writer.
//!
//! A [`LogWriter`] owns one log file and appends varint-framed key/value
//! records behind an in-memory write buffer. The header's tail offset is the
//! durability line: [`LogWriter::flush`] drains the buffer, rewrites the
//! header with the advanced tail, and fsyncs, so anything written since the
//! last flush is invisible to readers (and gets overwritten on the next
//! append run) if the process dies first.
//!
//! # Position discipline
//!
//! The file cursor normally sits at `tail - buffered_bytes`, so draining the
//! buffer lands exactly at the tail. Rewriting the header moves the cursor to
//! the front, and a failed drain leaves it somewhere mid-write; both mark the
//! writer displaced, and the next operation re-seeks before touching the
//! file. The tail only advances by bytes the buffer actually accepted.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{CinnabarError, Result};
use crate::header::FileHeader;
use crate::index;
use crate::record;

/// Default write-buffer capacity.
const DEFAULT_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Tuning knobs for a [`LogWriter`].
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Bytes buffered in memory before they are drained to the file.
    /// Records larger than this bypass the buffer entirely.
    pub buffer_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Appends key/value records to a log file.
///
/// One log file has exactly one writer; an internal mutex serializes `put`,
/// `flush` and `close` against each other, so a writer may be shared across
/// threads, but the global record order is whatever order the lock was won.
/// Readers may open the same file concurrently and see everything up to the
/// last flushed tail.
#[derive(Debug)]
pub struct LogWriter {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    file: File,
    header: FileHeader,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    capacity: usize,
    displaced: bool,
    dirty: bool,
}

impl LogWriter {
    /// Creates a new log file, truncating anything already at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(path, WriterConfig::default())
    }

    /// Creates a new log file with custom tuning.
    pub fn create_with_config(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let header = FileHeader::new();
        file.write_all(&header.to_bytes())?;

        tracing::debug!(path = %path.display(), id = header.id(), "created log");
        Ok(Self::from_parts(path, file, header, config))
    }

    /// Opens an existing log file to append more records.
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        Self::append_with_config(path, WriterConfig::default())
    }

    /// Opens an existing log file to append, with custom tuning.
    pub fn append_with_config(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let header = FileHeader::read_from(&file)?;
        file.seek(SeekFrom::Start(header.tail()))?;

        tracing::debug!(
            path = %path.display(),
            id = header.id(),
            tail = header.tail(),
            "opened log for append"
        );
        Ok(Self::from_parts(path, file, header, config))
    }

    fn from_parts(path: PathBuf, file: File, header: FileHeader, config: WriterConfig) -> Self {
        Self {
            path,
            inner: Mutex::new(Inner {
                file,
                header,
                buf: Vec::with_capacity(config.buffer_capacity),
                scratch: Vec::new(),
                capacity: config.buffer_capacity,
                displaced: false,
                dirty: false,
            }),
        }
    }

    /// Appends one key/value record.
    ///
    /// Fails with [`CinnabarError::BlankKey`] / [`CinnabarError::BlankValue`]
    /// on empty input. The record becomes durable only after the next
    /// [`flush`](Self::flush).
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CinnabarError::BlankKey);
        }
        if value.is_empty() {
            return Err(CinnabarError::BlankValue);
        }
        self.lock().put(key, value)
    }

    /// Drains the buffer, rewrites the header with the current tail, fsyncs.
    ///
    /// After a successful flush every preceding `put` survives a crash.
    pub fn flush(&self) -> Result<()> {
        self.lock().flush()
    }

    /// Flushes and closes the writer, surfacing the error from either step.
    pub fn close(self) -> Result<()> {
        self.flush()
    }

    /// Flushes, then builds an index snapshot of this log at `index_path`.
    pub fn write_index(&self, index_path: impl AsRef<Path>) -> Result<()> {
        self.flush()?;
        index::write_index(index_path, &self.path)
    }

    /// A copy of the current in-memory header (tail included).
    pub fn header(&self) -> FileHeader {
        self.lock().header
    }

    /// The log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("writer mutex poisoned")
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.dirty {
            if let Err(err) = inner.flush() {
                tracing::error!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to flush log during drop"
                );
            }
        }
    }
}

impl Inner {
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.reseek_if_displaced()?;

        self.scratch.clear();
        record::encode(&mut self.scratch, key, value);

        if !self.buf.is_empty() && self.buf.len() + self.scratch.len() > self.capacity {
            self.drain()?;
        }

        if self.scratch.len() >= self.capacity {
            // Oversized record: write through, bypassing the buffer.
            if let Err(err) = self.file.write_all(&self.scratch) {
                self.displaced = true;
                return Err(err.into());
            }
        } else {
            self.buf.extend_from_slice(&self.scratch);
        }

        self.header.advance_tail(self.scratch.len() as u64);
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.reseek_if_displaced()?;
        self.drain()?;

        // The header rewrite moves the cursor away from the tail; record that
        // before any of the fallible steps below.
        self.displaced = true;

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.to_bytes())?;
        self.file.sync_all()?;
        self.dirty = false;

        tracing::trace!(tail = self.header.tail(), "flushed log");
        Ok(())
    }

    /// Writes the buffered bytes at the cursor, which `reseek_if_displaced`
    /// has positioned at `tail - buf.len()`.
    fn drain(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if let Err(err) = self.file.write_all(&self.buf) {
            self.displaced = true;
            return Err(err.into());
        }
        self.buf.clear();
        Ok(())
    }

    fn reseek_if_displaced(&mut self) -> Result<()> {
        if self.displaced {
            let resume = self.header.tail() - self.buf.len() as u64;
            self.file.seek(SeekFrom::Start(resume))?;
            self.displaced = false;
        }
        Ok(())
    }
}
