//! Static hash index: builder and reader.
//!
//! An index is a point-in-time snapshot of a log, rebuildable at any moment
//! and never mutated in place:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Offset  │  Size   │  Description                          │
//! ├────────────────────────────────────────────────────────────┤
//! │  0       │  128    │  FileHeader (copied from the log)     │
//! │  128     │  2048   │  256 × (u32 table_offset, u32 count)  │
//! │  2176    │  ...    │  slot tables, one per nonempty bucket │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each slot table is an open-addressed array of `(u32 checksum, u32
//! log_pos)` cells sized at twice its bucket's population, so the load factor
//! is exactly 0.5. `log_pos == 0` marks an empty cell, which is also what
//! terminates a probe: a reader walks slots linearly (wrapping at the table
//! end) from `checksum/256 mod count` and stops at the first empty cell.
//! Placement is deterministic, so rebuilding over the same log reproduces the
//! index bit for bit.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::checksum::{Checksum, NUM_BUCKETS};
use crate::error::Result;
use crate::fileio;
use crate::header::{FILE_HEADER_LEN, FileHeader};
use crate::reader::LogReader;

/// Size of one bucket directory entry.
const DIRECTORY_ENTRY_LEN: usize = 8;

/// Size of the full bucket directory.
const BUCKET_DIRECTORY_LEN: usize = NUM_BUCKETS * DIRECTORY_ENTRY_LEN;

/// Size of one slot.
const SLOT_LEN: usize = 8;

/// One cell of a slot table: the key's checksum and where its record starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slot {
    checksum: u32,
    log_pos: u32,
}

/// Scans a log and (over-)writes an index snapshot of it.
///
/// The log must be flushed: only records inside `[128, tail)` are indexed.
pub fn write_index(index_path: impl AsRef<Path>, log_path: impl AsRef<Path>) -> Result<()> {
    let reader = LogReader::open(log_path)?;
    let file = File::create(index_path)?;
    let mut dst = BufWriter::new(file);
    build_index(&reader, &mut dst)?;
    dst.flush()?;
    Ok(())
}

/// Scans `reader` and writes a complete index to `dst`.
fn build_index(reader: &LogReader, dst: &mut impl Write) -> Result<()> {
    // Accumulate (checksum, position) pairs per bucket, in append order.
    let mut buckets: Vec<Vec<Slot>> = vec![Vec::new(); NUM_BUCKETS];
    let mut records = 0u64;
    for entry in reader.records()? {
        let entry = entry?;
        let cksum = Checksum::of(&entry.key);
        buckets[cksum.bucket()].push(Slot {
            checksum: cksum.value(),
            log_pos: entry.pos as u32,
        });
        records += 1;
    }

    // The header is the log's, verbatim: same id, same tail.
    dst.write_all(&reader.header().to_bytes())?;

    // Bucket directory. Tables are laid out contiguously after it, each
    // sized at twice its bucket's population.
    let mut directory = [0u8; BUCKET_DIRECTORY_LEN];
    let mut table_pos = (FILE_HEADER_LEN + BUCKET_DIRECTORY_LEN) as u32;
    for (i, dense) in buckets.iter().enumerate() {
        let count = (dense.len() * 2) as u32;
        directory[i * DIRECTORY_ENTRY_LEN..i * DIRECTORY_ENTRY_LEN + 4]
            .copy_from_slice(&table_pos.to_le_bytes());
        directory[i * DIRECTORY_ENTRY_LEN + 4..(i + 1) * DIRECTORY_ENTRY_LEN]
            .copy_from_slice(&count.to_le_bytes());
        table_pos += count * SLOT_LEN as u32;
    }
    dst.write_all(&directory)?;

    // Slot tables, reusing one scratch table across buckets.
    let mut table: Vec<Slot> = Vec::new();
    for dense in &buckets {
        write_slot_table(dst, dense, &mut table)?;
    }

    tracing::debug!(
        records,
        live_buckets = buckets.iter().filter(|b| !b.is_empty()).count(),
        bytes = table_pos,
        "wrote index"
    );
    Ok(())
}

/// Open-addresses one bucket's entries into `table` and writes it out.
fn write_slot_table(dst: &mut impl Write, dense: &[Slot], table: &mut Vec<Slot>) -> Result<()> {
    if dense.is_empty() {
        return Ok(());
    }

    let count = dense.len() * 2;
    table.clear();
    table.resize(count, Slot::default());

    for &slot in dense {
        let mut n = Checksum::from(slot.checksum).slot() as usize % count;
        while table[n].log_pos != 0 {
            n += 1;
            if n == count {
                n = 0;
            }
        }
        table[n] = slot;
    }

    let mut buf = [0u8; SLOT_LEN];
    for slot in &*table {
        buf[0..4].copy_from_slice(&slot.checksum.to_le_bytes());
        buf[4..8].copy_from_slice(&slot.log_pos.to_le_bytes());
        dst.write_all(&buf)?;
    }
    Ok(())
}

/// Searches index files for candidate log offsets.
#[derive(Debug)]
pub struct IndexReader {
    file: File,
    header: FileHeader,
}

impl IndexReader {
    /// Opens an index file and validates its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let header = FileHeader::read_from(&file)?;
        Ok(Self { file, header })
    }

    /// The header captured at open time (id and tail match the source log).
    pub fn header(&self) -> FileHeader {
        self.header
    }

    /// Returns a probe iterator over slots matching `key`'s checksum.
    ///
    /// The iterator yields candidate log offsets only; checksum collisions
    /// mean a candidate may belong to a different key, and it is the caller's
    /// job to verify against the log.
    pub fn seek(&self, key: &[u8]) -> Result<ProbeIter<'_>> {
        let cksum = Checksum::of(key);

        let mut entry = [0u8; DIRECTORY_ENTRY_LEN];
        let entry_offset = (FILE_HEADER_LEN + cksum.bucket() * DIRECTORY_ENTRY_LEN) as u64;
        fileio::read_exact_at(&self.file, &mut entry, entry_offset)?;

        let table_offset = u32::from_le_bytes(
            entry[0..4]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        );
        let count = u32::from_le_bytes(
            entry[4..8]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        );

        Ok(ProbeIter {
            file: &self.file,
            cksum,
            table_offset: u64::from(table_offset),
            count,
            cursor: if count > 0 { cksum.slot() % count } else { 0 },
            steps: 0,
            done: count == 0,
        })
    }
}

/// Walks one bucket's slot table, yielding candidate log offsets.
///
/// Terminates at the first empty slot or after `count` steps, whichever comes
/// first. The first I/O error is sticky.
#[derive(Debug)]
pub struct ProbeIter<'a> {
    file: &'a File,
    cksum: Checksum,
    table_offset: u64,
    count: u32,
    cursor: u32,
    steps: u32,
    done: bool,
}

impl Iterator for ProbeIter<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done && self.steps < self.count {
            let mut buf = [0u8; SLOT_LEN];
            let offset = self.table_offset + u64::from(self.cursor) * SLOT_LEN as u64;
            if let Err(err) = fileio::read_exact_at(self.file, &mut buf, offset) {
                self.done = true;
                return Some(Err(err.into()));
            }

            let checksum = u32::from_le_bytes(
                buf[0..4]
                    .try_into()
                    .expect("slice is exactly 4 bytes after bounds check"),
            );
            let log_pos = u32::from_le_bytes(
                buf[4..8]
                    .try_into()
                    .expect("slice is exactly 4 bytes after bounds check"),
            );

            if log_pos == 0 {
                break;
            }

            self.steps += 1;
            self.cursor += 1;
            if self.cursor == self.count {
                self.cursor = 0;
            }

            if checksum == self.cksum.value() {
                return Some(Ok(u64::from(log_pos)));
            }
        }
        self.done = true;
        None
    }
}
