//! String encoding appends each string to a byte slice prefixed with its
//! variable byte length, then compresses the whole slice with snappy.  A
//! 1 byte header carries the encoding type in the 4 high bits.

use crate::codec::varint::VarInt;
use crate::codec::{Decoder, Encoder};
use crate::error::{Result, TsmError};

/// STRING_COMPRESSED_SNAPPY is a compressed encoding using snappy compression.
const STRING_COMPRESSED_SNAPPY: u8 = 1;

/// StringEncoder encodes multiple strings into a byte slice.
pub struct StringEncoder {
    // The uncompressed encoded bytes.
    bytes: Vec<u8>,
}

impl StringEncoder {
    pub fn new(sz: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(sz),
        }
    }
}

impl Encoder<Vec<u8>> for StringEncoder {
    fn write(&mut self, s: Vec<u8>) {
        // Append the length of the string using variable byte encoding,
        // followed by the string bytes.
        (s.len() as u64).encode_var_vec(&mut self.bytes);
        self.bytes.extend_from_slice(&s);
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let max_encoded_len = snap::raw::max_compress_len(self.bytes.len());
        if max_encoded_len == 0 {
            return Err(TsmError::BlockDecode("source length too large".to_string()));
        }

        let mut compressed = vec![0u8; max_encoded_len + 1];
        compressed[0] = STRING_COMPRESSED_SNAPPY << 4;

        let mut encoder = snap::raw::Encoder::new();
        let n = encoder
            .compress(&self.bytes, &mut compressed[1..])
            .map_err(|e| TsmError::BlockDecode(e.to_string()))?;

        compressed.truncate(1 + n);
        Ok(compressed)
    }
}

/// StringDecoder iterates the strings of one encoded byte slice.
pub struct StringDecoder {
    b: Vec<u8>,
    l: usize,
    i: usize,

    lower: usize,
    upper: usize,

    err: Option<TsmError>,
}

impl StringDecoder {
    pub fn new(b: &[u8]) -> Result<Self> {
        if b.is_empty() {
            return Err(TsmError::BlockDecode("no string data found".to_string()));
        }

        // First byte stores the encoding type; only the snappy format exists
        // currently.
        let mut decoder = snap::raw::Decoder::new();
        let decoded = decoder
            .decompress_vec(&b[1..])
            .map_err(|e| TsmError::BlockDecode(e.to_string()))?;

        Ok(Self {
            b: decoded,
            l: 0,
            i: 0,
            lower: 0,
            upper: 0,
            err: None,
        })
    }

    fn read_range(&mut self) -> Result<(usize, usize)> {
        // Read the length of the string.
        let (length, n) = u64::decode_var(&self.b[self.i..]).ok_or_else(|| {
            TsmError::BlockDecode("invalid encoded string length".to_string())
        })?;

        // The length of this string plus the length of the variable byte
        // encoded length.
        self.l = length as usize + n;

        let lower = self.i + n;
        let upper = lower + length as usize;
        if upper < lower {
            return Err(TsmError::BlockDecode("string length overflow".to_string()));
        }
        if upper > self.b.len() {
            return Err(TsmError::BlockDecode(
                "not enough data to represent encoded string".to_string(),
            ));
        }

        Ok((lower, upper))
    }
}

impl Decoder<Vec<u8>> for StringDecoder {
    fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        self.i += self.l;
        if self.i >= self.b.len() {
            return false;
        }

        match self.read_range() {
            Ok((lower, upper)) => {
                self.lower = lower;
                self.upper = upper;
                true
            }
            Err(e) => {
                self.err = Some(e);
                false
            }
        }
    }

    fn read(&self) -> Vec<u8> {
        self.b[self.lower..self.upper].to_vec()
    }

    fn err(&self) -> Option<&TsmError> {
        self.err.as_ref()
    }
}
