use std::io;

use thiserror::Error;

/// A convenience `Result` type for TSM file operations.
pub type Result<T> = std::result::Result<T, TsmError>;

/// The error type for TSM file operations.
#[derive(Debug, Error)]
pub enum TsmError {
    /// The first four bytes of the file are not the TSM magic number.
    #[error("bad magic number: {0:#010x}")]
    BadMagic(u32),

    /// The file carries a format version this build cannot read.
    #[error("unsupported version: got {got}, exp {exp}")]
    UnsupportedVersion { got: u8, exp: u8 },

    /// The file ends before a structure it promises is complete.
    #[error("truncated file: {0}")]
    TruncatedFile(&'static str),

    /// The index bytes do not parse as a sequence of key records.
    #[error("malformed index: {0}")]
    MalformedIndex(String),

    /// A block's stored CRC32 does not match its payload.
    #[error("block checksum mismatch: exp {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A block header carries a type tag outside the known set.
    #[error("unknown block type: {0}")]
    UnknownBlockType(u8),

    /// A block payload or one of its sub-streams does not decode.
    #[error("block decode: {0}")]
    BlockDecode(String),

    /// `write` was called with no values.
    #[error("cannot write an empty block")]
    EmptyBlock,

    /// The writer was used after `close`.
    #[error("writer already closed")]
    WriterClosed,

    /// `add` was called on an indirect index.
    #[error("indirect index is immutable")]
    ImmutableIndex,

    /// The key does not fit the index's 2-byte length prefix.
    #[error("max key length exceeded: {got} > {max}")]
    KeyTooLong { got: usize, max: usize },

    /// A single key accumulated more blocks than the index's 2-byte count can hold.
    #[error("max index entries exceeded: {got} > {max}")]
    MaxEntriesExceeded { got: usize, max: usize },

    /// Underlying I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
