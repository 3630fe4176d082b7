//! Timestamp encoding is adaptive and based on the structure of the
//! timestamps that are encoded.  Values to be encoded should be sorted
//! before encoding.  When encoded, the values are first delta-encoded: the
//! first value is the starting timestamp, subsequent values are the
//! difference from the prior value.
//!
//! Timestamps often fall on even boundaries of time such as every 10s.  When
//! the deltas have this structure and are all the same, the time range is
//! stored using run length encoding, with the deltas scaled down by the
//! largest power-of-ten divisor common to all of them.  Otherwise each delta
//! is stored using variable-length encoding.
//!
//! Each compressed byte slice has a 1 byte header indicating the compression
//! type.  The 4 high bits indicate the encoding type.  The 4 low bits are
//! used by the encoding type.
//!
//! For run-length encoding, the 4 low bits store the log10 of the scaling
//! factor.  The next 8 bytes are the starting timestamp, the next 1-10 bytes
//! is the scaled delta value using variable-length encoding, and the final
//! 1-10 bytes is the count of values.
//!
//! For delta encoding, the next 8 bytes are the starting timestamp and the
//! remaining bytes are the variable-length encoded deltas.

use bytes::BufMut;

use crate::codec::varint::VarInt;
use crate::codec::{Decoder, Encoder};
use crate::error::{Result, TsmError};

/// TIME_COMPRESSED_DELTA is a delta format with variable-length deltas.
const TIME_COMPRESSED_DELTA: u8 = 1;
/// TIME_COMPRESSED_RLE is a run-length encoding format.
const TIME_COMPRESSED_RLE: u8 = 2;

/// TimeEncoder encodes unix nanosecond timestamps to byte slices.
pub struct TimeEncoder {
    ts: Vec<u64>,
}

impl TimeEncoder {
    pub fn new(sz: usize) -> Self {
        Self {
            ts: Vec::with_capacity(sz),
        }
    }

    /// reduce differential-encodes the pending timestamps in place and
    /// returns the largest power-of-ten divisor common to all deltas along
    /// with whether the deltas can be run-length encoded.
    fn reduce(&mut self) -> (u64, bool) {
        let deltas = self.ts.as_mut_slice();

        let mut divisor = 1_000_000_000_000_u64; // 1e12
        let mut rle = true;

        // Iterate in reverse so we can apply deltas in place.
        for i in (1..deltas.len()).rev() {
            deltas[i] = deltas[i].wrapping_sub(deltas[i - 1]);
            let v = deltas[i];

            // If the delta is not divisible, try the next smallest divisor.
            while divisor > 1 && v % divisor != 0 {
                divisor /= 10;
            }

            // The deltas can be RLE if they are all equal.
            rle = i == deltas.len() - 1 || rle && (deltas[i + 1] == deltas[i]);
        }

        (divisor, rle)
    }

    fn encode_rle(&self, first: u64, delta: u64, div: u64) -> Vec<u8> {
        // Large varints can take up to 10 bytes, we're encoding 2 + 1 byte type.
        let mut bytes = Vec::with_capacity(29);

        // 4 high bits used for the encoding type, 4 low bits are the log10
        // of the scaling factor.
        bytes.push((TIME_COMPRESSED_RLE << 4) | log10(div));

        // The starting timestamp.
        bytes.put_u64(first);

        // The scaled delta.
        (delta / div).encode_var_vec(&mut bytes);

        // The number of times the delta is repeated.
        (self.ts.len() as u64).encode_var_vec(&mut bytes);

        bytes
    }

    fn encode_delta(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(1 + 8 + self.ts.len());

        bytes.push(TIME_COMPRESSED_DELTA << 4);

        // The starting timestamp.
        bytes.put_u64(self.ts[0]);

        // The deltas, already applied in place by reduce.
        for &d in &self.ts[1..] {
            d.encode_var_vec(&mut bytes);
        }

        bytes
    }
}

impl Encoder<i64> for TimeEncoder {
    fn write(&mut self, v: i64) {
        self.ts.push(v as u64);
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        if self.ts.is_empty() {
            return Ok(vec![]);
        }

        // rle is true if the deltas are all the same.
        let (div, rle) = self.reduce();

        if rle && self.ts.len() > 1 {
            return Ok(self.encode_rle(self.ts[0], self.ts[1], div));
        }

        Ok(self.encode_delta())
    }
}

fn log10(mut v: u64) -> u8 {
    let mut n = 0;
    while v >= 10 {
        v /= 10;
        n += 1;
    }
    n
}

/// TimeDecoder iterates the timestamps of one encoded byte slice.
pub enum TimeDecoder<'a> {
    Rle(RleDecoder),
    Delta(DeltaDecoder<'a>),
    Empty,
}

impl<'a> TimeDecoder<'a> {
    pub fn new(b: &'a [u8]) -> Result<Self> {
        if b.is_empty() {
            return Ok(TimeDecoder::Empty);
        }

        let encoding = b[0] >> 4;
        // Lower 4 bits hold the 10 based exponent, so we can scale the
        // values back up.
        let div = 10u64.pow(u32::from(b[0] & 0xF));

        let b = &b[1..];
        match encoding {
            TIME_COMPRESSED_DELTA => Ok(TimeDecoder::Delta(DeltaDecoder::new(b)?)),
            TIME_COMPRESSED_RLE => Ok(TimeDecoder::Rle(RleDecoder::new(b, div)?)),
            _ => Err(TsmError::BlockDecode(format!(
                "unknown timestamp encoding {}",
                encoding
            ))),
        }
    }
}

impl<'a> Decoder<i64> for TimeDecoder<'a> {
    fn next(&mut self) -> bool {
        match self {
            Self::Rle(d) => d.next(),
            Self::Delta(d) => d.next(),
            Self::Empty => false,
        }
    }

    fn read(&self) -> i64 {
        match self {
            Self::Rle(d) => d.read(),
            Self::Delta(d) => d.read(),
            Self::Empty => 0,
        }
    }

    fn err(&self) -> Option<&TsmError> {
        match self {
            Self::Rle(_) => None,
            Self::Delta(d) => d.err.as_ref(),
            Self::Empty => None,
        }
    }
}

pub struct RleDecoder {
    first: i64,
    delta: i64,
    repeat: u64,

    i: u64,
    cur: i64,
}

impl RleDecoder {
    fn new(b: &[u8], div: u64) -> Result<Self> {
        if b.len() < 8 {
            return Err(TsmError::BlockDecode(
                "not enough data to decode RLE starting value".to_string(),
            ));
        }

        // The first 8 bytes is the starting timestamp.
        let first = u64::from_be_bytes(b[..8].try_into().unwrap());
        let mut i = 8;

        // Next 1-10 bytes is the scaled delta value.
        let (delta, n) = u64::decode_var(&b[i..])
            .ok_or_else(|| TsmError::BlockDecode("invalid RLE delta value".to_string()))?;
        i += n;

        // Last 1-10 bytes is how many times the delta repeats.
        let (repeat, _) = u64::decode_var(&b[i..])
            .ok_or_else(|| TsmError::BlockDecode("invalid RLE repeat value".to_string()))?;

        Ok(Self {
            first: first as i64,
            delta: delta.wrapping_mul(div) as i64,
            repeat,
            i: 0,
            cur: 0,
        })
    }

    fn next(&mut self) -> bool {
        if self.i >= self.repeat {
            return false;
        }

        self.cur = if self.i == 0 {
            self.first
        } else {
            self.cur.wrapping_add(self.delta)
        };
        self.i += 1;
        true
    }

    fn read(&self) -> i64 {
        self.cur
    }
}

pub struct DeltaDecoder<'a> {
    b: &'a [u8],
    i: usize,

    first: i64,
    started: bool,
    cur: i64,
    err: Option<TsmError>,
}

impl<'a> DeltaDecoder<'a> {
    fn new(b: &'a [u8]) -> Result<Self> {
        if b.len() < 8 {
            return Err(TsmError::BlockDecode(
                "not enough data to decode starting timestamp".to_string(),
            ));
        }

        let first = u64::from_be_bytes(b[..8].try_into().unwrap());
        Ok(Self {
            b,
            i: 8,
            first: first as i64,
            started: false,
            cur: 0,
            err: None,
        })
    }

    fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        if !self.started {
            self.started = true;
            self.cur = self.first;
            return true;
        }

        if self.i >= self.b.len() {
            return false;
        }

        match u64::decode_var(&self.b[self.i..]) {
            Some((d, n)) => {
                self.cur = self.cur.wrapping_add(d as i64);
                self.i += n;
                true
            }
            None => {
                self.err = Some(TsmError::BlockDecode(
                    "invalid timestamp delta".to_string(),
                ));
                false
            }
        }
    }

    fn read(&self) -> i64 {
        self.cur
    }
}

/// count_timestamps returns the number of timestamps encoded in b without
/// decoding them.
pub fn count_timestamps(b: &[u8]) -> Result<usize> {
    if b.is_empty() {
        return Ok(0);
    }

    match b[0] >> 4 {
        TIME_COMPRESSED_DELTA => {
            if b.len() < 9 {
                return Err(TsmError::BlockDecode(
                    "not enough data to count timestamps".to_string(),
                ));
            }
            // Every varint delta ends with a byte with the top bit clear.
            let deltas = b[9..].iter().filter(|&&x| x < 0x80).count();
            Ok(1 + deltas)
        }
        TIME_COMPRESSED_RLE => {
            if b.len() < 10 {
                return Err(TsmError::BlockDecode(
                    "not enough data to count timestamps".to_string(),
                ));
            }
            let mut i = 9;
            let (_, n) = u64::decode_var(&b[i..])
                .ok_or_else(|| TsmError::BlockDecode("invalid RLE delta value".to_string()))?;
            i += n;
            let (repeat, _) = u64::decode_var(&b[i..])
                .ok_or_else(|| TsmError::BlockDecode("invalid RLE repeat value".to_string()))?;
            Ok(repeat as usize)
        }
        other => Err(TsmError::BlockDecode(format!(
            "unknown timestamp encoding {}",
            other
        ))),
    }
}
