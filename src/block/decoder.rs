use crate::block::{
    unpack_block, BLOCK_BOOLEAN, BLOCK_FLOAT64, BLOCK_INTEGER, BLOCK_STRING,
    ENCODED_BLOCK_HEADER_SIZE,
};
use crate::codec::boolean::BooleanDecoder;
use crate::codec::float::FloatDecoder;
use crate::codec::integer::IntegerDecoder;
use crate::codec::string::StringDecoder;
use crate::codec::timestamp::{self, TimeDecoder};
use crate::codec::Decoder;
use crate::error::{Result, TsmError};
use crate::value::{
    BooleanValues, FieldType, FloatValues, IntegerValues, StringValues, Value, Values,
};

/// decode_block decodes a framed payload, appending its points onto values.
/// The variant of values must match the payload's type tag.
pub fn decode_block(block: &[u8], values: &mut Values) -> Result<()> {
    let typ = crate::block::block_type(block)?;

    match values {
        Values::Float(values) if typ == BLOCK_FLOAT64 => decode_float_block(block, values),
        Values::Integer(values) if typ == BLOCK_INTEGER => decode_integer_block(block, values),
        Values::Bool(values) if typ == BLOCK_BOOLEAN => decode_boolean_block(block, values),
        Values::Str(values) if typ == BLOCK_STRING => decode_string_block(block, values),
        other => Err(TsmError::BlockDecode(format!(
            "invalid block type: exp {}, got {}",
            other.block_type(),
            typ
        ))),
    }
}

pub fn decode_float_block(block: &[u8], values: &mut FloatValues) -> Result<()> {
    let (tb, vb) = pre_decode(block, BLOCK_FLOAT64)?;
    decode_block_using(TimeDecoder::new(tb)?, FloatDecoder::new(vb)?, values)
}

pub fn decode_integer_block(block: &[u8], values: &mut IntegerValues) -> Result<()> {
    let (tb, vb) = pre_decode(block, BLOCK_INTEGER)?;
    decode_block_using(TimeDecoder::new(tb)?, IntegerDecoder::new(vb)?, values)
}

pub fn decode_boolean_block(block: &[u8], values: &mut BooleanValues) -> Result<()> {
    let (tb, vb) = pre_decode(block, BLOCK_BOOLEAN)?;
    decode_block_using(TimeDecoder::new(tb)?, BooleanDecoder::new(vb)?, values)
}

pub fn decode_string_block(block: &[u8], values: &mut StringValues) -> Result<()> {
    let (tb, vb) = pre_decode(block, BLOCK_STRING)?;
    decode_block_using(TimeDecoder::new(tb)?, StringDecoder::new(vb)?, values)
}

fn pre_decode(block: &[u8], exp_typ: u8) -> Result<(&[u8], &[u8])> {
    let (typ, tb, vb) = unpack_block(block)?;
    if typ != exp_typ {
        return Err(TsmError::BlockDecode(format!(
            "invalid block type: exp {}, got {}",
            exp_typ, typ
        )));
    }
    Ok((tb, vb))
}

/// The timestamp and value cursors are advanced in lock-step; one point is
/// appended per pair.
fn decode_block_using<T, D>(
    mut ts_dec: TimeDecoder<'_>,
    mut v_dec: D,
    values: &mut Vec<Value<T>>,
) -> Result<()>
where
    T: FieldType,
    D: Decoder<T>,
{
    while ts_dec.next() {
        if !v_dec.next() {
            if let Some(err) = v_dec.err() {
                return Err(TsmError::BlockDecode(format!(
                    "read values block: {}",
                    err
                )));
            }
            return Err(TsmError::BlockDecode(
                "can not read all values block".to_string(),
            ));
        }

        values.push(Value::new(ts_dec.read(), v_dec.read()));
    }

    if let Some(err) = ts_dec.err() {
        return Err(TsmError::BlockDecode(format!(
            "read timestamp block: {}",
            err
        )));
    }

    Ok(())
}

/// block_count returns the number of points encoded in a framed payload
/// without materializing them.
pub fn block_count(block: &[u8]) -> Result<usize> {
    if block.len() <= ENCODED_BLOCK_HEADER_SIZE {
        return Err(TsmError::BlockDecode(format!(
            "decode of short block: got {}, exp > {}",
            block.len(),
            ENCODED_BLOCK_HEADER_SIZE
        )));
    }

    let (_typ, tb, _vb) = unpack_block(block)?;
    timestamp::count_timestamps(tb)
}
