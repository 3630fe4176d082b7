use crate::block::{pack_block, BLOCK_BOOLEAN, BLOCK_FLOAT64, BLOCK_INTEGER, BLOCK_STRING};
use crate::codec::boolean::BooleanEncoder;
use crate::codec::float::FloatEncoder;
use crate::codec::integer::IntegerEncoder;
use crate::codec::string::StringEncoder;
use crate::codec::timestamp::TimeEncoder;
use crate::codec::Encoder;
use crate::error::{Result, TsmError};
use crate::value::{
    BooleanValues, FieldType, FloatValues, IntegerValues, StringValues, Value, Values,
};

/// encode_block appends the framed payload for values to dst.  All values
/// must share one type and be sorted by timestamp; the first and last
/// timestamps become the block's min and max.
pub fn encode_block(dst: &mut Vec<u8>, values: &Values) -> Result<()> {
    if values.is_empty() {
        return Err(TsmError::EmptyBlock);
    }

    match values {
        Values::Float(values) => encode_float_block(dst, values),
        Values::Integer(values) => encode_integer_block(dst, values),
        Values::Bool(values) => encode_boolean_block(dst, values),
        Values::Str(values) => encode_string_block(dst, values),
    }
}

pub fn encode_float_block(dst: &mut Vec<u8>, values: &FloatValues) -> Result<()> {
    encode_block_using(dst, values, BLOCK_FLOAT64, FloatEncoder::new(values.len()))
}

pub fn encode_integer_block(dst: &mut Vec<u8>, values: &IntegerValues) -> Result<()> {
    encode_block_using(dst, values, BLOCK_INTEGER, IntegerEncoder::new(values.len()))
}

pub fn encode_boolean_block(dst: &mut Vec<u8>, values: &BooleanValues) -> Result<()> {
    encode_block_using(dst, values, BLOCK_BOOLEAN, BooleanEncoder::new(values.len()))
}

pub fn encode_string_block(dst: &mut Vec<u8>, values: &StringValues) -> Result<()> {
    encode_block_using(dst, values, BLOCK_STRING, StringEncoder::new(values.len()))
}

/// A block is encoded using different compression strategies for timestamps
/// and values, then framed with the first timestamp and the type tag.
fn encode_block_using<T, E>(
    dst: &mut Vec<u8>,
    values: &[Value<T>],
    typ: u8,
    mut v_enc: E,
) -> Result<()>
where
    T: FieldType,
    E: Encoder<T>,
{
    if values.is_empty() {
        return Err(TsmError::EmptyBlock);
    }

    let mut ts_enc = TimeEncoder::new(values.len());
    for v in values {
        ts_enc.write(v.unix_nano);
        v_enc.write(v.value.clone());
    }

    let tb = ts_enc.bytes()?;
    let vb = v_enc.bytes()?;

    pack_block(dst, values[0].unix_nano, typ, &tb, &vb);
    Ok(())
}
