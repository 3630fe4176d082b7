//! Float encoding XORs each value's bit pattern against the previous value.
//! Consecutive values in a series tend to share their sign, exponent and
//! high mantissa bits, so the XOR residual has leading zero bits and stores
//! compactly with variable-length encoding; a repeated value stores in one
//! byte.  A 1 byte header carries the encoding type in the 4 high bits.

use crate::codec::varint::VarInt;
use crate::codec::{Decoder, Encoder};
use crate::error::{Result, TsmError};

/// FLOAT_COMPRESSED_XOR is an XOR-predictor format with variable-length
/// residuals.
const FLOAT_COMPRESSED_XOR: u8 = 1;

/// FloatEncoder encodes float64 values to byte slices.
pub struct FloatEncoder {
    values: Vec<f64>,
}

impl FloatEncoder {
    pub fn new(sz: usize) -> Self {
        Self {
            values: Vec::with_capacity(sz),
        }
    }
}

impl Encoder<f64> for FloatEncoder {
    fn write(&mut self, v: f64) {
        self.values.push(v);
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        if self.values.is_empty() {
            return Ok(vec![]);
        }

        let mut bytes = Vec::with_capacity(1 + self.values.len() * 9);
        bytes.push(FLOAT_COMPRESSED_XOR << 4);

        let mut prev = 0u64;
        for &v in &self.values {
            let bits = v.to_bits();
            (bits ^ prev).encode_var_vec(&mut bytes);
            prev = bits;
        }

        Ok(bytes)
    }
}

/// FloatDecoder iterates the float64 values of one encoded byte slice.
pub struct FloatDecoder<'a> {
    b: &'a [u8],
    i: usize,

    prev: u64,
    err: Option<TsmError>,
}

impl<'a> FloatDecoder<'a> {
    pub fn new(b: &'a [u8]) -> Result<Self> {
        if b.is_empty() {
            return Ok(Self {
                b,
                i: 0,
                prev: 0,
                err: None,
            });
        }

        let encoding = b[0] >> 4;
        if encoding != FLOAT_COMPRESSED_XOR {
            return Err(TsmError::BlockDecode(format!(
                "unknown float encoding {}",
                encoding
            )));
        }

        Ok(Self {
            b,
            i: 1,
            prev: 0,
            err: None,
        })
    }
}

impl<'a> Decoder<f64> for FloatDecoder<'a> {
    fn next(&mut self) -> bool {
        if self.err.is_some() || self.i >= self.b.len() {
            return false;
        }

        match u64::decode_var(&self.b[self.i..]) {
            Some((x, n)) => {
                self.prev ^= x;
                self.i += n;
                true
            }
            None => {
                self.err = Some(TsmError::BlockDecode(
                    "invalid float residual".to_string(),
                ));
                false
            }
        }
    }

    fn read(&self) -> f64 {
        f64::from_bits(self.prev)
    }

    fn err(&self) -> Option<&TsmError> {
        self.err.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[f64]) -> Vec<f64> {
        let mut enc = FloatEncoder::new(values.len());
        for &v in values {
            enc.write(v);
        }
        let b = enc.bytes().unwrap();

        let mut dec = FloatDecoder::new(&b).unwrap();
        let mut got = vec![];
        while dec.next() {
            got.push(dec.read());
        }
        assert!(dec.err().is_none());
        got
    }

    #[test]
    fn test_round_trip() {
        let values = vec![1.0, 2.0, 3.0, 2.5, -7.25, 0.0];
        assert_eq!(round_trip(&values), values);
    }

    #[test]
    fn test_repeated_value_is_one_byte() {
        let values = vec![12.5; 50];

        let mut enc = FloatEncoder::new(values.len());
        for &v in &values {
            enc.write(v);
        }
        let b = enc.bytes().unwrap();

        // Header + one full residual + one byte per repeat.
        assert!(
            b.len() <= 1 + 10 + (values.len() - 1),
            "unexpected length: got {}",
            b.len()
        );
        assert_eq!(round_trip(&values), values);
    }

    #[test]
    fn test_special_values() {
        let values = vec![f64::MAX, f64::MIN, f64::INFINITY, f64::NEG_INFINITY, -0.0];
        let got = round_trip(&values);
        for (g, e) in got.iter().zip(values.iter()) {
            assert_eq!(g.to_bits(), e.to_bits());
        }
    }

    #[test]
    fn test_empty() {
        let mut enc = FloatEncoder::new(0);
        let b = enc.bytes().unwrap();
        assert!(b.is_empty());

        let mut dec = FloatDecoder::new(&b).unwrap();
        assert!(!dec.next());
    }
}
