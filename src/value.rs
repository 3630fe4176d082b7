use std::fmt::Debug;

use crate::block::{BLOCK_BOOLEAN, BLOCK_FLOAT64, BLOCK_INTEGER, BLOCK_STRING};
use crate::error::{Result, TsmError};

/// FieldType is implemented by the four scalar types a block can hold.
pub trait FieldType: Debug + Send + Sync + Clone + PartialOrd + PartialEq {}

impl FieldType for f64 {}
impl FieldType for i64 {}
impl FieldType for bool {}
impl FieldType for Vec<u8> {}

/// Value is a single timestamped point of one scalar type.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct Value<T>
where
    T: FieldType,
{
    pub unix_nano: i64,
    pub value: T,
}

impl<T> Value<T>
where
    T: FieldType,
{
    pub fn new(unix_nano: i64, value: T) -> Self {
        Self { unix_nano, value }
    }
}

pub type FloatValue = Value<f64>;
pub type IntegerValue = Value<i64>;
pub type BooleanValue = Value<bool>;
pub type StringValue = Value<Vec<u8>>;

pub type FloatValues = Vec<FloatValue>;
pub type IntegerValues = Vec<IntegerValue>;
pub type BooleanValues = Vec<BooleanValue>;
pub type StringValues = Vec<StringValue>;

/// TValues are the collection helpers shared by every typed value vector.
pub trait TValues {
    fn min_time(&self) -> i64;
    fn max_time(&self) -> i64;
    fn ordered(&self) -> bool;
    fn deduplicate(self) -> Self;
}

impl<T> TValues for Vec<Value<T>>
where
    T: FieldType,
{
    fn min_time(&self) -> i64 {
        self[0].unix_nano
    }

    fn max_time(&self) -> i64 {
        self[self.len() - 1].unix_nano
    }

    /// ordered returns true if the timestamps are strictly ascending.
    fn ordered(&self) -> bool {
        if self.len() <= 1 {
            return true;
        }

        for i in 1..self.len() {
            if self[i - 1].unix_nano >= self[i].unix_nano {
                return false;
            }
        }
        true
    }

    /// deduplicate returns the values sorted ascending by time with any values
    /// that have the same timestamp removed.  The value written last is kept.
    fn deduplicate(mut self) -> Self {
        if self.len() <= 1 || self.ordered() {
            return self;
        }

        self.sort_by(|a, b| a.unix_nano.cmp(&b.unix_nano));

        let mut out: Vec<Value<T>> = Vec::with_capacity(self.len());
        for v in self {
            match out.last_mut() {
                Some(last) if last.unix_nano == v.unix_nano => *last = v,
                _ => out.push(v),
            }
        }
        out
    }
}

/// Values describes the various types of block data that can be held within
/// a TSM file.  All values in one `Values` share a type.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Float(FloatValues),
    Integer(IntegerValues),
    Bool(BooleanValues),
    Str(StringValues),
}

impl Values {
    /// with_block_type returns an empty `Values` of the variant matching a
    /// block type tag.
    pub fn with_block_type(typ: u8) -> Result<Self> {
        match typ {
            BLOCK_FLOAT64 => Ok(Values::Float(vec![])),
            BLOCK_INTEGER => Ok(Values::Integer(vec![])),
            BLOCK_BOOLEAN => Ok(Values::Bool(vec![])),
            BLOCK_STRING => Ok(Values::Str(vec![])),
            _ => Err(TsmError::UnknownBlockType(typ)),
        }
    }

    /// block_type returns the type tag recorded for this variant in a block
    /// header.
    pub fn block_type(&self) -> u8 {
        match self {
            Values::Float(_) => BLOCK_FLOAT64,
            Values::Integer(_) => BLOCK_INTEGER,
            Values::Bool(_) => BLOCK_BOOLEAN,
            Values::Str(_) => BLOCK_STRING,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Values::Float(v) => v.len(),
            Values::Integer(v) => v.len(),
            Values::Bool(v) => v.len(),
            Values::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn min_time(&self) -> i64 {
        match self {
            Values::Float(v) => v.min_time(),
            Values::Integer(v) => v.min_time(),
            Values::Bool(v) => v.min_time(),
            Values::Str(v) => v.min_time(),
        }
    }

    pub fn max_time(&self) -> i64 {
        match self {
            Values::Float(v) => v.max_time(),
            Values::Integer(v) => v.max_time(),
            Values::Bool(v) => v.max_time(),
            Values::Str(v) => v.max_time(),
        }
    }

    pub fn ordered(&self) -> bool {
        match self {
            Values::Float(v) => v.ordered(),
            Values::Integer(v) => v.ordered(),
            Values::Bool(v) => v.ordered(),
            Values::Str(v) => v.ordered(),
        }
    }

    pub fn deduplicate(self) -> Self {
        match self {
            Values::Float(v) => Values::Float(v.deduplicate()),
            Values::Integer(v) => Values::Integer(v.deduplicate()),
            Values::Bool(v) => Values::Bool(v.deduplicate()),
            Values::Str(v) => Values::Str(v.deduplicate()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered() {
        let values: FloatValues = vec![Value::new(1, 1.0), Value::new(2, 2.0), Value::new(3, 3.0)];
        assert!(values.ordered());

        let values: FloatValues = vec![Value::new(2, 1.0), Value::new(1, 2.0)];
        assert!(!values.ordered());

        // Duplicate timestamps are not ordered.
        let values: FloatValues = vec![Value::new(1, 1.0), Value::new(1, 2.0)];
        assert!(!values.ordered());
    }

    #[test]
    fn test_deduplicate_keeps_last() {
        let values: FloatValues = vec![
            Value::new(2, 2.0),
            Value::new(1, 1.0),
            Value::new(2, 4.0),
            Value::new(3, 3.0),
        ];

        let got = values.deduplicate();
        let exp: FloatValues = vec![Value::new(1, 1.0), Value::new(2, 4.0), Value::new(3, 3.0)];
        assert_eq!(got, exp, "unexpected values: got {:?}, exp {:?}", got, exp);
    }

    #[test]
    fn test_deduplicate_ordered_untouched() {
        let values: FloatValues = vec![Value::new(1, 1.0), Value::new(2, 2.0)];
        let got = values.clone().deduplicate();
        assert_eq!(got, values);
    }

    #[test]
    fn test_min_max_time() {
        let values = Values::Integer(vec![Value::new(10, 1), Value::new(20, 2), Value::new(30, 3)]);
        assert_eq!(values.min_time(), 10);
        assert_eq!(values.max_time(), 30);
        assert_eq!(values.len(), 3);
    }
}
