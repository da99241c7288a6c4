//! Crate error types.

/// Errors surfaced by cinnabar writers, readers and the index builder.
///
/// Header validation failures carry their own tags so callers can tell a
/// foreign file ([`BadMagic`](CinnabarError::BadMagic)) from a corrupted one
/// ([`HeaderCorrupt`](CinnabarError::HeaderCorrupt)) or a version skew.
#[derive(Debug, thiserror::Error)]
pub enum CinnabarError {
    /// Header prefix is not the `0xCCDB` magic number.
    #[error("bad magic number")]
    BadMagic,

    /// Major format version is not the one this build writes.
    #[error("wrong major version: {found}")]
    WrongMajorVersion { found: u16 },

    /// Minor format version is older than this build supports.
    #[error("unsupported minor version: {found}")]
    UnsupportedMinorVersion { found: u16 },

    /// Header could not be read, or its tail points inside the header.
    #[error("header corrupt")]
    HeaderCorrupt,

    /// A paired index and log carry different file ids.
    #[error("file headers differ: index id {index:08x}, log id {log:08x}")]
    HeadersDiffer { index: u32, log: u32 },

    /// Header file id is zero.
    #[error("bad file id")]
    BadFileId,

    /// Log lookup outside the valid `[128, tail)` range.
    #[error("invalid log offset: {offset}")]
    InvalidOffset { offset: u64 },

    /// Keys must not be blank.
    #[error("keys must not be blank")]
    BlankKey,

    /// Values must not be blank.
    #[error("values must not be blank")]
    BlankValue,

    /// Underlying OS I/O error.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Malformed varint or truncated record.
    #[error("decode error: {reason}")]
    Decode { reason: &'static str },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CinnabarError>;
