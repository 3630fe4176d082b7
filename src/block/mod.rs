//! Block payload framing.  A block payload is self-describing:
//!
//! ```text
//! ┌─────────────────┬──────────┬────────────┬─────────┬──────────┐
//! │ first timestamp │   type   │ ts length  │   ts    │  values  │
//! │     8 bytes     │  1 byte  │  varint    │ N bytes │ N bytes  │
//! └─────────────────┴──────────┴────────────┴─────────┴──────────┘
//! ```
//!
//! The first 8 bytes are the minimum timestamp of the block, duplicating the
//! index entry so a payload lifted out of its file still decodes.  The value
//! bytes run to the end of the payload; their length is implied.

use bytes::BufMut;

use crate::codec::varint::{VarInt, MAX_VARINT_LEN64};
use crate::error::{Result, TsmError};

pub mod decoder;
pub mod encoder;

/// BLOCK_FLOAT64 designates a block encodes float64 values.
pub const BLOCK_FLOAT64: u8 = 0;

/// BLOCK_INTEGER designates a block encodes int64 values.
pub const BLOCK_INTEGER: u8 = 1;

/// BLOCK_BOOLEAN designates a block encodes boolean values.
pub const BLOCK_BOOLEAN: u8 = 2;

/// BLOCK_STRING designates a block encodes string values.
pub const BLOCK_STRING: u8 = 3;

/// ENCODED_BLOCK_HEADER_SIZE is the size of the header for an encoded block.
/// The first 8 bytes are the minimum timestamp of the block.  The next byte
/// is a block encoding type indicator.
pub(crate) const ENCODED_BLOCK_HEADER_SIZE: usize = 9;

/// pack_block appends the framed payload for one block to dst: the first
/// timestamp, the type tag, the varint length of the timestamp sub-block,
/// then the two encoded sub-blocks.
pub(crate) fn pack_block(dst: &mut Vec<u8>, first_time: i64, typ: u8, ts: &[u8], values: &[u8]) {
    dst.reserve(ENCODED_BLOCK_HEADER_SIZE + MAX_VARINT_LEN64 + ts.len() + values.len());

    dst.put_u64(first_time as u64);
    dst.push(typ);

    (ts.len() as u64).encode_var_vec(dst);
    dst.extend_from_slice(ts);
    dst.extend_from_slice(values);
}

/// unpack_block splits a framed payload into its type tag, timestamp bytes
/// and value bytes.
pub(crate) fn unpack_block(buf: &[u8]) -> Result<(u8, &[u8], &[u8])> {
    if buf.len() <= ENCODED_BLOCK_HEADER_SIZE {
        return Err(TsmError::BlockDecode(format!(
            "decode of short block: got {}, exp > {}",
            buf.len(),
            ENCODED_BLOCK_HEADER_SIZE
        )));
    }

    // The first 8 bytes are the minimum timestamp of the block, the type tag
    // follows.
    let typ = buf[8];
    let buf = &buf[9..];

    // Unpack the timestamp block length.
    let (ts_len, n) = u64::decode_var(buf).ok_or_else(|| {
        TsmError::BlockDecode("unable to read timestamp block length".to_string())
    })?;

    // Unpack the timestamp bytes.
    let ts_end = n + ts_len as usize;
    if ts_end > buf.len() {
        return Err(TsmError::BlockDecode(
            "not enough data for timestamp block".to_string(),
        ));
    }
    let ts = &buf[n..ts_end];

    // The value bytes are the rest of the block.
    let values = &buf[ts_end..];

    Ok((typ, ts, values))
}

/// block_type returns the type of value encoded in a block or an error if
/// the block type is unknown.
pub fn block_type(block: &[u8]) -> Result<u8> {
    if block.len() <= ENCODED_BLOCK_HEADER_SIZE {
        return Err(TsmError::BlockDecode(format!(
            "decode of short block: got {}, exp > {}",
            block.len(),
            ENCODED_BLOCK_HEADER_SIZE
        )));
    }

    let typ = block[8];
    match typ {
        BLOCK_FLOAT64 | BLOCK_INTEGER | BLOCK_BOOLEAN | BLOCK_STRING => Ok(typ),
        _ => Err(TsmError::UnknownBlockType(typ)),
    }
}

/// min_time returns the minimum timestamp recorded in a block's leading
/// 8 bytes.
pub fn min_time(block: &[u8]) -> Result<i64> {
    if block.len() < 8 {
        return Err(TsmError::BlockDecode(
            "decode of short block: no minimum timestamp".to_string(),
        ));
    }
    Ok(u64::from_be_bytes(block[..8].try_into().unwrap()) as i64)
}
