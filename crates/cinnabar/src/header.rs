//! The shared 128-byte file header.
//!
//! Both file kinds carry the same fixed prefix:
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  Offset  │  Size  │  Description                 │
//! ├──────────────────────────────────────────────────┤
//! │  0       │  2     │  Magic: 0xCCDB (u16 LE)      │
//! │  2       │  2     │  Major version: 1            │
//! │  4       │  2     │  Minor version: 0            │
//! │  6       │  4     │  File id (u32 LE, nonzero)   │
//! │  10      │  4     │  Tail offset (u32 LE)        │
//! │  14      │  114   │  Reserved (zero padding)     │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The id is drawn randomly when a log is created and copied verbatim into
//! every index built from it, which is what lets [`crate::Db`] verify that an
//! index and a log belong together. The tail is the authoritative end of
//! valid data: bytes past it are invisible even when physically present.

use std::fmt;
use std::fs::File;

use crate::error::{CinnabarError, Result};
use crate::fileio;

/// Length of the fixed header at the front of both file kinds.
pub(crate) const FILE_HEADER_LEN: usize = 128;

/// Magic number identifying cinnabar files.
const MAGIC: u16 = 0xCCDB;

/// Major format version written and required by this build.
const MAJOR_VERSION: u16 = 1;

/// Oldest minor format version this build supports.
const MINOR_VERSION: u16 = 0;

/// The fixed per-file header: format version, random file id, tail offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    major: u16,
    minor: u16,
    id: u32,
    tail: u64,
}

impl FileHeader {
    /// Creates a header for a fresh log: current version, random nonzero id,
    /// tail at the first byte past the header.
    pub(crate) fn new() -> Self {
        let mut id = rand::random::<u32>();
        while id == 0 {
            id = rand::random();
        }
        Self {
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            id,
            tail: FILE_HEADER_LEN as u64,
        }
    }

    /// The file id shared between a log and its indexes.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// End of valid data: everything at or past this offset is absent.
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Format version as `(major, minor)`.
    pub fn version(&self) -> (u16, u16) {
        (self.major, self.minor)
    }

    pub(crate) fn advance_tail(&mut self, bytes: u64) {
        self.tail += bytes;
    }

    /// Serializes into the fixed 128-byte layout.
    pub(crate) fn to_bytes(&self) -> [u8; FILE_HEADER_LEN] {
        let mut buf = [0u8; FILE_HEADER_LEN];
        buf[0..2].copy_from_slice(&MAGIC.to_le_bytes());
        buf[2..4].copy_from_slice(&self.major.to_le_bytes());
        buf[4..6].copy_from_slice(&self.minor.to_le_bytes());
        buf[6..10].copy_from_slice(&self.id.to_le_bytes());
        buf[10..14].copy_from_slice(&(self.tail as u32).to_le_bytes());
        buf
    }

    /// Parses and validates a serialized header.
    // The minor guard is a forward-compatibility floor; it is vacuous while
    // the floor sits at zero.
    #[allow(unused_comparisons, clippy::absurd_extreme_comparisons)]
    pub(crate) fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FILE_HEADER_LEN {
            return Err(CinnabarError::HeaderCorrupt);
        }

        let magic = u16::from_le_bytes(
            data[0..2]
                .try_into()
                .expect("slice is exactly 2 bytes after bounds check"),
        );
        if magic != MAGIC {
            return Err(CinnabarError::BadMagic);
        }

        let major = u16::from_le_bytes(
            data[2..4]
                .try_into()
                .expect("slice is exactly 2 bytes after bounds check"),
        );
        if major != MAJOR_VERSION {
            return Err(CinnabarError::WrongMajorVersion { found: major });
        }

        let minor = u16::from_le_bytes(
            data[4..6]
                .try_into()
                .expect("slice is exactly 2 bytes after bounds check"),
        );
        if minor < MINOR_VERSION {
            return Err(CinnabarError::UnsupportedMinorVersion { found: minor });
        }

        let id = u32::from_le_bytes(
            data[6..10]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        );
        if id == 0 {
            return Err(CinnabarError::BadFileId);
        }

        let tail = u64::from(u32::from_le_bytes(
            data[10..14]
                .try_into()
                .expect("slice is exactly 4 bytes after bounds check"),
        ));
        if tail < FILE_HEADER_LEN as u64 {
            return Err(CinnabarError::HeaderCorrupt);
        }

        Ok(Self {
            major,
            minor,
            id,
            tail,
        })
    }

    /// Reads and validates the header at the front of an open file.
    pub(crate) fn read_from(file: &File) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_LEN];
        let n = fileio::read_at_most(file, &mut buf, 0)?;
        if n < FILE_HEADER_LEN {
            return Err(CinnabarError::HeaderCorrupt);
        }
        Self::from_bytes(&buf)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(id: u32, tail: u64) -> Self {
        Self {
            major: MAJOR_VERSION,
            minor: MINOR_VERSION,
            id,
            tail,
        }
    }
}

impl fmt::Display for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version {}.{}", self.major, self.minor)?;
        writeln!(f, "Identifier: {:08x}", self.id)?;
        writeln!(f, "Size: {}", self.tail)
    }
}
