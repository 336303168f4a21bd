//! Runtime values for encoding/decoding (codec representation).

use crate::decimal::Decimal64;
use std::collections::{BTreeSet, HashMap};

/// A single value of any schema type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Float(f32),
    Double(f64),
    Decimal(Decimal64),
    String(String),
    Bytes(Vec<u8>),
    /// Enum value by name.
    Enum(String),
    /// Set bit names of a bitset.
    Bits(BTreeSet<String>),
    /// Array or vector elements.
    List(Vec<Value>),
    /// Map entries in wire order.
    Map(Vec<(Value, Value)>),
    Struct(HashMap<String, Value>),
}

impl Value {
    /// Any integer variant widened to `i128`.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::U8(x) => Some(*x as i128),
            Value::U16(x) => Some(*x as i128),
            Value::U32(x) => Some(*x as i128),
            Value::U64(x) => Some(*x as i128),
            Value::I8(x) => Some(*x as i128),
            Value::I16(x) => Some(*x as i128),
            Value::I32(x) => Some(*x as i128),
            Value::I64(x) => Some(*x as i128),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i128().and_then(|x| u64::try_from(x).ok())
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|x| i64::try_from(x).ok())
    }

    /// Float variants, or an integer converted to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x as f64),
            Value::Double(x) => Some(*x),
            other => other.as_i128().map(|x| x as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Struct(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Bits(_) => "bits",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
        }
    }

    /// Build a struct value from `(field, value)` pairs.
    pub fn structure<I, K>(fields: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Build a bitset value from bit names.
    pub fn bits<I, S>(names: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Bits(names.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Decimal64> for Value {
    fn from(d: Decimal64) -> Self {
        Value::Decimal(d)
    }
}
