//! Unsigned LEB128 varints.
//!
//! Seven data bits per byte, least-significant group first, with the high bit
//! of each byte marking continuation. A `u64` needs at most ten bytes.

use crate::error::{CinnabarError, Result};

/// Maximum encoded length of a `u64`.
pub(crate) const MAX_VARINT_LEN: usize = 10;

/// Appends the varint encoding of `value` to `buf`.
pub(crate) fn write_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push(value as u8 | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Decodes a varint from the head of `data`.
///
/// Returns the value and the number of bytes consumed. Fails with
/// [`CinnabarError::Decode`] when the input ends mid-varint or the encoding
/// does not fit a `u64`.
pub(crate) fn read_uvarint(data: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        // The tenth byte carries the last u64 bit; anything above overflows.
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(CinnabarError::Decode {
                reason: "varint overflows u64",
            });
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if data.len() >= MAX_VARINT_LEN {
        Err(CinnabarError::Decode {
            reason: "varint too long",
        })
    } else {
        Err(CinnabarError::Decode {
            reason: "truncated varint",
        })
    }
}
