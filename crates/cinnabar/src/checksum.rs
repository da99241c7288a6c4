//! Key checksum used to steer index placement and probing.
//!
//! The hash is the DJB string hash with XOR mixing, folded over the raw key
//! bytes. It is a slot selector, not an integrity checksum: two keys may share
//! a checksum, and readers resolve that by comparing full keys against the
//! log. The 32-bit result is split into two coordinates: the low 8 bits pick
//! one of 256 buckets, the remaining 24 bits pick the starting slot within
//! that bucket's table.

/// Number of buckets in every index file.
pub(crate) const NUM_BUCKETS: usize = 256;

/// Initial checksum value.
const CHECKSUM_INIT: u32 = 5381;

/// 32-bit key checksum with bucket/slot coordinate accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(u32);

impl Checksum {
    /// Hashes a raw byte string. No normalization is applied.
    pub fn of(data: &[u8]) -> Self {
        let mut h = CHECKSUM_INIT;
        for &b in data {
            h = (h << 5).wrapping_add(h) ^ u32::from(b);
        }
        Self(h)
    }

    /// Bucket coordinate: `checksum mod 256`.
    pub fn bucket(self) -> usize {
        self.0 as usize % NUM_BUCKETS
    }

    /// Slot coordinate: `checksum / 256`, reduced modulo the table size by
    /// the caller.
    pub fn slot(self) -> u32 {
        self.0 / NUM_BUCKETS as u32
    }

    /// The raw 32-bit value as stored in index slots.
    pub fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for Checksum {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
