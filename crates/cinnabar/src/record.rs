//! Log record codec.
//!
//! Records are framed as `varint(K) || varint(V) || key || value` with both
//! lengths written as LEB128 varints. The writer rejects zero lengths; the
//! decoder accepts whatever lengths frame a complete record so that older or
//! foreign writers stay readable.

use bytes::Bytes;

use crate::error::{CinnabarError, Result};
use crate::varint;

/// Upper bound on the two length varints at the front of a record.
pub(crate) const MAX_PREFIX_LEN: usize = 2 * varint::MAX_VARINT_LEN;

/// Appends the encoded record to `buf`.
pub(crate) fn encode(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    varint::write_uvarint(buf, key.len() as u64);
    varint::write_uvarint(buf, value.len() as u64);
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
}

/// Decodes the two length varints at the head of `data`.
///
/// Returns `(key_len, value_len, bytes_consumed)`. The caller is expected to
/// fetch the key and value regions itself; `data` only needs to cover the
/// prefix.
pub(crate) fn decode_prefix(data: &[u8]) -> Result<(u64, u64, usize)> {
    let (key_len, n) = varint::read_uvarint(data)?;
    let (value_len, m) = varint::read_uvarint(&data[n..])?;
    Ok((key_len, value_len, n + m))
}

/// Decodes one complete record from the head of `data`.
///
/// Returns the key, the value (both zero-copy slices of `data`), and the
/// total bytes consumed.
pub(crate) fn decode(data: &Bytes) -> Result<(Bytes, Bytes, usize)> {
    let (key_len, value_len, prefix) = decode_prefix(data)?;

    let key_len = usize::try_from(key_len).map_err(|_| CinnabarError::Decode {
        reason: "key length overflows usize",
    })?;
    let value_len = usize::try_from(value_len).map_err(|_| CinnabarError::Decode {
        reason: "value length overflows usize",
    })?;

    let key_end = prefix
        .checked_add(key_len)
        .ok_or(CinnabarError::Decode {
            reason: "record length overflows",
        })?;
    let end = key_end
        .checked_add(value_len)
        .ok_or(CinnabarError::Decode {
            reason: "record length overflows",
        })?;
    if data.len() < end {
        return Err(CinnabarError::Decode {
            reason: "truncated record",
        });
    }

    Ok((data.slice(prefix..key_end), data.slice(key_end..end), end))
}
