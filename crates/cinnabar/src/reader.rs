//! Random-access log reads and the forward scan.
//!
//! A [`LogReader`] resolves record offsets handed out by the index into keys
//! and values. Values come back as [`ValueReader`] section views over the
//! shared descriptor, so large values can be streamed instead of
//! materialized. The forward scan ([`LogReader::records`]) snapshots the
//! whole `[128, tail)` region into memory and decodes it record by record;
//! it is what the index builder runs over.
//!
//! All reads are positional, so any number of readers and iterators may work
//! the same file concurrently. The tail is captured at open time and never
//! refreshed; records appended (and flushed) later need a fresh reader.

use std::fs::File;
use std::io;
use std::path::Path;

use bytes::Bytes;

use crate::error::{CinnabarError, Result};
use crate::fileio;
use crate::header::{FILE_HEADER_LEN, FileHeader};
use crate::record;

/// Reads keys and values back out of a log file.
#[derive(Debug)]
pub struct LogReader {
    file: File,
    header: FileHeader,
}

impl LogReader {
    /// Opens a log file for reading and validates its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let header = FileHeader::read_from(&file)?;
        Ok(Self { file, header })
    }

    /// The header captured at open time.
    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// Fetches the record at `offset`, materializing the value.
    pub fn get(&self, offset: u64) -> Result<(Bytes, Bytes)> {
        let (key, value) = self.get_reader(offset)?;
        Ok((key, value.read_all()?))
    }

    /// Fetches the key at `offset` and a lazy view over its value.
    ///
    /// `offset` must point at the first byte of a record's key-length varint,
    /// inside `[128, tail)`; anything else fails with
    /// [`CinnabarError::InvalidOffset`] or a decode error.
    pub fn get_reader(&self, offset: u64) -> Result<(Bytes, ValueReader<'_>)> {
        if offset < FILE_HEADER_LEN as u64 || offset >= self.header.tail() {
            return Err(CinnabarError::InvalidOffset { offset });
        }

        // The length prefix is at most 20 bytes; near the tail we get fewer.
        let mut prefix = [0u8; record::MAX_PREFIX_LEN];
        let available = fileio::read_at_most(&self.file, &mut prefix, offset)?;
        let (key_len, value_len, consumed) = record::decode_prefix(&prefix[..available])?;

        let key_offset = offset + consumed as u64;
        let end = key_offset
            .checked_add(key_len)
            .and_then(|v| v.checked_add(value_len));
        let Some(end) = end else {
            return Err(CinnabarError::Decode {
                reason: "record length overflows",
            });
        };
        if end > self.header.tail() {
            return Err(CinnabarError::Decode {
                reason: "record extends past the log tail",
            });
        }
        let value_offset = key_offset + key_len;

        let mut key = vec![0u8; key_len as usize];
        fileio::read_exact_at(&self.file, &mut key, key_offset)?;

        Ok((
            Bytes::from(key),
            ValueReader {
                file: &self.file,
                offset: value_offset,
                len: value_len,
                pos: 0,
            },
        ))
    }

    /// Scans every record in `[128, tail)`, in append order.
    ///
    /// The valid region is snapshotted into memory up front; decoding then
    /// proceeds without further I/O and the yielded keys and values are
    /// zero-copy slices of the snapshot. Reaching the tail exactly ends the
    /// iteration cleanly; a region that ends mid-record is a decode error.
    pub fn records(&self) -> Result<LogRecords> {
        let len = (self.header.tail() - FILE_HEADER_LEN as u64) as usize;
        let mut data = vec![0u8; len];
        fileio::read_exact_at(&self.file, &mut data, FILE_HEADER_LEN as u64)?;
        Ok(LogRecords {
            data: Bytes::from(data),
            pos: 0,
            done: false,
        })
    }
}

/// One record yielded by a forward scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Byte offset of the record in the log file.
    pub pos: u64,
    pub key: Bytes,
    pub value: Bytes,
}

/// Forward iterator over the records of a log snapshot.
///
/// The first error is sticky: after yielding it, the iterator is exhausted.
#[derive(Debug)]
pub struct LogRecords {
    data: Bytes,
    pos: usize,
    done: bool,
}

impl Iterator for LogRecords {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos == self.data.len() {
            self.done = true;
            return None;
        }

        match record::decode(&self.data.slice(self.pos..)) {
            Ok((key, value, consumed)) => {
                let pos = FILE_HEADER_LEN as u64 + self.pos as u64;
                self.pos += consumed;
                Some(Ok(LogEntry { pos, key, value }))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Lazy view over one value's byte region.
///
/// A plain `(file, offset, length)` value: cloning the coordinates is cheap
/// and nothing is read until asked. [`read_all`](Self::read_all) materializes
/// the value in one positional read; the [`io::Read`] impl streams it.
#[derive(Debug)]
pub struct ValueReader<'a> {
    file: &'a File,
    offset: u64,
    len: u64,
    pos: u64,
}

impl ValueReader<'_> {
    /// Length of the value in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reads the whole value, independent of any streaming progress.
    pub fn read_all(&self) -> Result<Bytes> {
        let mut buf = vec![0u8; self.len as usize];
        fileio::read_exact_at(self.file, &mut buf, self.offset)?;
        Ok(Bytes::from(buf))
    }
}

impl io::Read for ValueReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = (self.len - self.pos) as usize;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(remaining);
        let n = fileio::read_at_most(self.file, &mut buf[..want], self.offset + self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}
