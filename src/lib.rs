//! A TSM file is composed of four sections: header, blocks, index and the footer.
//!
//! ```text
//! ┌────────┬────────────────────────────────────┬─────────────┬──────────────┐
//! │ Header │               Blocks               │    Index    │    Footer    │
//! │5 bytes │              N bytes               │   N bytes   │   8 bytes    │
//! └────────┴────────────────────────────────────┴─────────────┴──────────────┘
//! ```
//!
//! The header is a magic number to identify the file type and a version number.
//!
//! Blocks are sequences of pairs of CRC32 and data.  The block data is opaque to the
//! file.  The CRC32 is used for block level error detection.  The length of the blocks
//! is stored in the index.
//!
//! Following the blocks is the index for the blocks in the file.  The index is composed
//! of a sequence of index entries ordered lexicographically by key and then by time.
//! Each index entry starts with a key length and key followed by a count of the number
//! of blocks for that key in the file.  Each block entry is composed of the min and max
//! time for the block, the offset into the file where the block is located and the size
//! of the block.
//!
//! The last section is the footer that stores the offset of the start of the index.
//!
//! Writing is a single linear pass: [`TsmWriter::write`] appends one compressed block
//! per call and records it in an in-memory [`DirectIndex`]; [`TsmWriter::close`]
//! serializes the index and the footer.  Reading starts from the footer:
//! [`TsmReader`] recovers the index bytes and serves point lookups and full-key scans,
//! either through a fully materialized [`DirectIndex`] or through an [`IndirectIndex`]
//! view over the raw index bytes.

pub mod block;
pub mod codec;
pub mod error;
pub mod file_store;
pub mod value;

pub use error::{Result, TsmError};
pub use file_store::index::{DirectIndex, IndexEntry, IndirectIndex, TsmIndex};
pub use file_store::reader::TsmReader;
pub use file_store::writer::TsmWriter;
pub use value::{Value, Values};
