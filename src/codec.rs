//! Encode/decode values against a resolved type model.
//!
//! All integers are little-endian and nothing is padded: struct fields follow each
//! other in declaration order, arrays carry no count, and vectors, maps, strings and
//! bytes are prefixed with a `uint32` count. One converter is compiled per type
//! when the [`Codec`] is built and reused for every call.

use crate::decimal::Decimal64;
use crate::external::{ExternalCodec, ExternalRegistry};
use crate::layout::TypeLayout;
use crate::model::{ScalarKind, TypeKind, TypeMap};
use crate::value::Value;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("{type_name}: expected {expected} value, got {actual}")]
    TypeMismatch { type_name: String, expected: &'static str, actual: &'static str },
    #[error("{type_name}: value {value} out of range")]
    OutOfRange { type_name: String, value: String },
    #[error("{type_name}: unknown enum value {name:?}")]
    UnknownEnum { type_name: String, name: String },
    #[error("{type_name}: no enum value maps to {value}")]
    UnmappedEnumValue { type_name: String, value: i128 },
    #[error("{type_name}: unknown bit {name:?}")]
    UnknownBit { type_name: String, name: String },
    #[error("{type_name}: undeclared bits set in {value:#x}")]
    UndeclaredBits { type_name: String, value: u64 },
    #[error("{type_name}: expected {expected} elements, got {actual}")]
    ArrayLength { type_name: String, expected: usize, actual: usize },
    #[error("{type_name}: invalid UTF-8")]
    InvalidUtf8 { type_name: String },
    #[error("{type_name}: invalid bool byte {byte}")]
    InvalidBool { type_name: String, byte: u8 },
    #[error("buffer underrun: need {needed} bytes at offset {offset}, {available} available")]
    Underrun { needed: usize, offset: usize, available: usize },
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("external type {0} has no registered codec")]
    UnsupportedExternal(String),
    #[error("external codec: {0}")]
    External(String),
    #[error("Unknown type: {0}")]
    UnknownType(String),
    #[error("{type_name}: {count} zero-size elements exceeds the limit of {limit}")]
    TooManyElements { type_name: String, count: usize, limit: usize },
}

/// Most elements a vector or map may hold when its elements encode to zero bytes.
/// Other element types are bounded by the input length.
pub const MAX_ZERO_SIZE_ELEMENTS: usize = 1 << 16;

/// Compiled encode/decode plan of one type.
enum Converter {
    Scalar(ScalarKind),
    Decimal,
    String,
    Bytes,
    Enum {
        base: ScalarKind,
        by_name: HashMap<String, i64>,
        by_value: HashMap<i64, String>,
        first: String,
    },
    Bitset {
        base: ScalarKind,
        by_name: HashMap<String, u32>,
        by_offset: BTreeMap<u32, String>,
        mask: u64,
    },
    Array { element: String, len: usize },
    /// `zero_size`: every element encodes to zero bytes.
    Vector { element: String, zero_size: bool },
    Map { key: String, value: String, zero_size: bool },
    Struct { fields: Vec<(String, String)> },
    External(Option<Arc<dyn ExternalCodec>>),
}

impl Converter {
    fn compile(kind: &TypeKind, name: &str, types: &TypeMap, externals: &ExternalRegistry) -> Converter {
        let zero_size = |type_name: &str| types.get(type_name).is_some_and(|d| d.size == Some(0));
        match kind {
            TypeKind::Scalar(k) => Converter::Scalar(*k),
            TypeKind::Decimal => Converter::Decimal,
            TypeKind::String => Converter::String,
            TypeKind::Bytes => Converter::Bytes,
            TypeKind::Enum { base_type, values } => Converter::Enum {
                base: *base_type,
                by_name: values.iter().map(|v| (v.name.clone(), v.value)).collect(),
                by_value: values.iter().map(|v| (v.value, v.name.clone())).collect(),
                first: values.first().map(|v| v.name.clone()).unwrap_or_default(),
            },
            TypeKind::Bitset { base_type, bits } => Converter::Bitset {
                base: *base_type,
                by_name: bits.iter().map(|b| (b.name.clone(), b.offset)).collect(),
                by_offset: bits.iter().map(|b| (b.offset, b.name.clone())).collect(),
                mask: bits.iter().fold(0, |m, b| m | (1u64 << b.offset)),
            },
            TypeKind::Array { element_type, array_size } => Converter::Array {
                element: element_type.clone(),
                len: *array_size,
            },
            TypeKind::Vector { element_type } => Converter::Vector {
                element: element_type.clone(),
                zero_size: zero_size(element_type),
            },
            TypeKind::Map { key_type, value_type } => Converter::Map {
                key: key_type.clone(),
                value: value_type.clone(),
                zero_size: zero_size(key_type) && zero_size(value_type),
            },
            TypeKind::Struct { fields } => Converter::Struct {
                fields: fields.iter().map(|f| (f.name.clone(), f.type_name.clone())).collect(),
            },
            TypeKind::External => Converter::External(externals.get(name).cloned()),
        }
    }
}

/// Slice cursor for decoding.
struct Reader<'b> {
    buf: &'b [u8],
    pos: usize,
}

impl<'b> Reader<'b> {
    fn new(buf: &'b [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'b [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::Underrun { needed: n, offset: self.pos, available: self.remaining() });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_len(&mut self) -> Result<usize, CodecError> {
        Ok(LittleEndian::read_u32(self.take(4)?) as usize)
    }
}

/// Encoders/decoders for every type of a schema.
pub struct Codec {
    converters: HashMap<String, Converter>,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").field("types", &self.converters.len()).finish()
    }
}

impl Codec {
    pub fn new(types: &TypeMap, externals: &ExternalRegistry) -> Self {
        let converters = types
            .iter()
            .map(|def| (def.name.clone(), Converter::compile(&def.kind, &def.name, types, externals)))
            .collect();
        Codec { converters }
    }

    fn converter(&self, type_name: &str) -> Result<&Converter, CodecError> {
        self.converters
            .get(type_name)
            .ok_or_else(|| CodecError::UnknownType(type_name.to_string()))
    }

    /// Append the encoding of `value` as `type_name` to `out`.
    pub fn encode(&self, type_name: &str, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self.converter(type_name)? {
            Converter::Scalar(kind) => encode_scalar(*kind, type_name, value, out),
            Converter::Decimal => {
                let d = match value {
                    Value::Decimal(d) => *d,
                    other => match (other.as_i64(), other.as_u64()) {
                        (Some(x), _) => Decimal64::from(x),
                        (None, Some(x)) => Decimal64::from(x),
                        _ => return Err(mismatch(type_name, "decimal", value)),
                    },
                };
                out.write_u64::<LittleEndian>(d.to_bits())?;
                Ok(())
            }
            Converter::String => match value {
                Value::String(s) => write_bytes(type_name, s.as_bytes(), out),
                other => Err(mismatch(type_name, "string", other)),
            },
            Converter::Bytes => match value {
                Value::Bytes(b) => write_bytes(type_name, b, out),
                other => Err(mismatch(type_name, "bytes", other)),
            },
            Converter::Enum { base, by_name, by_value, .. } => {
                let x = match value {
                    Value::Enum(name) => *by_name.get(name).ok_or_else(|| CodecError::UnknownEnum {
                        type_name: type_name.to_string(),
                        name: name.clone(),
                    })?,
                    other => {
                        let x = other.as_i64().ok_or_else(|| mismatch(type_name, "enum", other))?;
                        if !by_value.contains_key(&x) {
                            return Err(CodecError::UnmappedEnumValue {
                                type_name: type_name.to_string(),
                                value: x as i128,
                            });
                        }
                        x
                    }
                };
                write_int(out, *base, x as i128)?;
                Ok(())
            }
            Converter::Bitset { base, by_name, mask, .. } => {
                let x = match value {
                    Value::Bits(names) => {
                        let mut x = 0u64;
                        for name in names {
                            let offset = by_name.get(name).ok_or_else(|| CodecError::UnknownBit {
                                type_name: type_name.to_string(),
                                name: name.clone(),
                            })?;
                            x |= 1u64 << *offset;
                        }
                        x
                    }
                    other => {
                        let x = other.as_u64().ok_or_else(|| mismatch(type_name, "bits", other))?;
                        if x & !mask != 0 {
                            return Err(CodecError::UndeclaredBits { type_name: type_name.to_string(), value: x });
                        }
                        x
                    }
                };
                write_int(out, *base, x as i128)?;
                Ok(())
            }
            Converter::Array { element, len } => {
                let items = value.as_list().ok_or_else(|| mismatch(type_name, "list", value))?;
                if items.len() != *len {
                    return Err(CodecError::ArrayLength {
                        type_name: type_name.to_string(),
                        expected: *len,
                        actual: items.len(),
                    });
                }
                for item in items {
                    self.encode(element, item, out)?;
                }
                Ok(())
            }
            Converter::Vector { element, .. } => {
                let items = value.as_list().ok_or_else(|| mismatch(type_name, "list", value))?;
                write_len(type_name, items.len(), out)?;
                for item in items {
                    self.encode(element, item, out)?;
                }
                Ok(())
            }
            Converter::Map { key, value: value_type, .. } => {
                let entries = match value {
                    Value::Map(entries) => entries,
                    other => return Err(mismatch(type_name, "map", other)),
                };
                write_len(type_name, entries.len(), out)?;
                for (k, v) in entries {
                    self.encode(key, k, out)?;
                    self.encode(value_type, v, out)?;
                }
                Ok(())
            }
            Converter::Struct { fields } => {
                let map = value.as_struct().ok_or_else(|| mismatch(type_name, "struct", value))?;
                for (field, field_type) in fields {
                    match map.get(field) {
                        Some(v) => self.encode(field_type, v, out)?,
                        None => self.encode(field_type, &self.default_value(field_type)?, out)?,
                    }
                }
                Ok(())
            }
            Converter::External(Some(codec)) => codec.encode(value, out),
            Converter::External(None) => Err(CodecError::UnsupportedExternal(type_name.to_string())),
        }
    }

    /// Decode one `type_name` value from the start of `input`; returns the value and bytes consumed.
    pub fn decode(&self, type_name: &str, input: &[u8]) -> Result<(Value, usize), CodecError> {
        let mut r = Reader::new(input);
        let value = self.read(type_name, &mut r)?;
        Ok((value, r.pos))
    }

    fn read(&self, type_name: &str, r: &mut Reader<'_>) -> Result<Value, CodecError> {
        match self.converter(type_name)? {
            Converter::Scalar(kind) => read_scalar(*kind, type_name, r),
            Converter::Decimal => Ok(Value::Decimal(Decimal64::from_bits(LittleEndian::read_u64(r.take(8)?)))),
            Converter::String => {
                let len = r.read_len()?;
                let bytes = r.take(len)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| CodecError::InvalidUtf8 { type_name: type_name.to_string() })?;
                Ok(Value::String(s.to_string()))
            }
            Converter::Bytes => {
                let len = r.read_len()?;
                Ok(Value::Bytes(r.take(len)?.to_vec()))
            }
            Converter::Enum { base, by_value, .. } => {
                let x = read_int(*base, r)?;
                i64::try_from(x)
                    .ok()
                    .and_then(|v| by_value.get(&v))
                    .map(|name| Value::Enum(name.clone()))
                    .ok_or(CodecError::UnmappedEnumValue { type_name: type_name.to_string(), value: x })
            }
            Converter::Bitset { base, by_offset, mask, .. } => {
                let x = read_int(*base, r)? as u64;
                if x & !mask != 0 {
                    return Err(CodecError::UndeclaredBits { type_name: type_name.to_string(), value: x });
                }
                let names: BTreeSet<String> = by_offset
                    .iter()
                    .filter(|(offset, _)| x & (1 << **offset) != 0)
                    .map(|(_, name)| name.clone())
                    .collect();
                Ok(Value::Bits(names))
            }
            Converter::Array { element, len } => {
                let mut items = Vec::with_capacity((*len).min(r.remaining()));
                for _ in 0..*len {
                    items.push(self.read(element, r)?);
                }
                Ok(Value::List(items))
            }
            Converter::Vector { element, zero_size } => {
                let count = element_count(type_name, *zero_size, r)?;
                let mut items = Vec::with_capacity(count.min(r.remaining()));
                for _ in 0..count {
                    items.push(self.read(element, r)?);
                }
                Ok(Value::List(items))
            }
            Converter::Map { key, value, zero_size } => {
                let count = element_count(type_name, *zero_size, r)?;
                let mut entries = Vec::with_capacity(count.min(r.remaining()));
                for _ in 0..count {
                    let k = self.read(key, r)?;
                    let v = self.read(value, r)?;
                    entries.push((k, v));
                }
                Ok(Value::Map(entries))
            }
            Converter::Struct { fields } => {
                let mut map = HashMap::with_capacity(fields.len());
                for (field, field_type) in fields {
                    map.insert(field.clone(), self.read(field_type, r)?);
                }
                Ok(Value::Struct(map))
            }
            Converter::External(Some(codec)) => {
                let (value, consumed) = codec.decode(&r.buf[r.pos..])?;
                r.take(consumed)?;
                Ok(value)
            }
            Converter::External(None) => Err(CodecError::UnsupportedExternal(type_name.to_string())),
        }
    }

    /// Zero value of `type_name`: 0, false, empty, first enum value, all-default struct.
    pub fn default_value(&self, type_name: &str) -> Result<Value, CodecError> {
        Ok(match self.converter(type_name)? {
            Converter::Scalar(kind) => scalar_default(*kind),
            Converter::Decimal => Value::Decimal(Decimal64::ZERO),
            Converter::String => Value::String(String::new()),
            Converter::Bytes => Value::Bytes(Vec::new()),
            Converter::Enum { first, .. } => Value::Enum(first.clone()),
            Converter::Bitset { .. } => Value::Bits(BTreeSet::new()),
            Converter::Array { element, len } => {
                let item = self.default_value(element)?;
                Value::List(vec![item; *len])
            }
            Converter::Vector { .. } => Value::List(Vec::new()),
            Converter::Map { .. } => Value::Map(Vec::new()),
            Converter::Struct { fields } => {
                let mut map = HashMap::with_capacity(fields.len());
                for (field, field_type) in fields {
                    map.insert(field.clone(), self.default_value(field_type)?);
                }
                Value::Struct(map)
            }
            Converter::External(Some(codec)) => codec.default_value(),
            Converter::External(None) => return Err(CodecError::UnsupportedExternal(type_name.to_string())),
        })
    }
}

fn element_count(type_name: &str, zero_size: bool, r: &mut Reader<'_>) -> Result<usize, CodecError> {
    let count = r.read_len()?;
    if zero_size && count > MAX_ZERO_SIZE_ELEMENTS {
        return Err(CodecError::TooManyElements {
            type_name: type_name.to_string(),
            count,
            limit: MAX_ZERO_SIZE_ELEMENTS,
        });
    }
    Ok(count)
}

fn mismatch(type_name: &str, expected: &'static str, actual: &Value) -> CodecError {
    CodecError::TypeMismatch { type_name: type_name.to_string(), expected, actual: actual.kind() }
}

fn write_len(type_name: &str, len: usize, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let len = u32::try_from(len).map_err(|_| CodecError::OutOfRange {
        type_name: type_name.to_string(),
        value: format!("length {}", len),
    })?;
    out.write_u32::<LittleEndian>(len)?;
    Ok(())
}

fn write_bytes(type_name: &str, bytes: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
    write_len(type_name, bytes.len(), out)?;
    out.extend_from_slice(bytes);
    Ok(())
}

fn encode_scalar(kind: ScalarKind, type_name: &str, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match kind {
        ScalarKind::Bool => {
            let b = value.as_bool().ok_or_else(|| mismatch(type_name, "bool", value))?;
            out.write_u8(b as u8)?;
        }
        ScalarKind::Float32 => {
            let x = value.as_f64().ok_or_else(|| mismatch(type_name, "float", value))?;
            out.write_f32::<LittleEndian>(x as f32)?;
        }
        ScalarKind::Float64 => {
            let x = value.as_f64().ok_or_else(|| mismatch(type_name, "float", value))?;
            out.write_f64::<LittleEndian>(x)?;
        }
        _ => {
            let x = value.as_i128().ok_or_else(|| mismatch(type_name, "integer", value))?;
            let (min, max) = kind.int_range().unwrap_or((0, 0));
            if x < min || x > max {
                return Err(CodecError::OutOfRange { type_name: type_name.to_string(), value: x.to_string() });
            }
            write_int(out, kind, x)?;
        }
    }
    Ok(())
}

fn write_int(out: &mut Vec<u8>, kind: ScalarKind, x: i128) -> std::io::Result<()> {
    match kind {
        ScalarKind::Bool => out.write_u8(x as u8),
        ScalarKind::Int8 => out.write_i8(x as i8),
        ScalarKind::Uint8 => out.write_u8(x as u8),
        ScalarKind::Int16 => out.write_i16::<LittleEndian>(x as i16),
        ScalarKind::Uint16 => out.write_u16::<LittleEndian>(x as u16),
        ScalarKind::Int32 => out.write_i32::<LittleEndian>(x as i32),
        ScalarKind::Uint32 => out.write_u32::<LittleEndian>(x as u32),
        ScalarKind::Int64 => out.write_i64::<LittleEndian>(x as i64),
        ScalarKind::Uint64 => out.write_u64::<LittleEndian>(x as u64),
        ScalarKind::Float32 => out.write_f32::<LittleEndian>(x as f32),
        ScalarKind::Float64 => out.write_f64::<LittleEndian>(x as f64),
    }
}

fn read_int(kind: ScalarKind, r: &mut Reader<'_>) -> Result<i128, CodecError> {
    let b = r.take(kind.size())?;
    Ok(match kind {
        ScalarKind::Bool | ScalarKind::Uint8 => b[0] as i128,
        ScalarKind::Int8 => b[0] as i8 as i128,
        ScalarKind::Int16 => LittleEndian::read_i16(b) as i128,
        ScalarKind::Uint16 => LittleEndian::read_u16(b) as i128,
        ScalarKind::Int32 => LittleEndian::read_i32(b) as i128,
        ScalarKind::Uint32 => LittleEndian::read_u32(b) as i128,
        ScalarKind::Int64 => LittleEndian::read_i64(b) as i128,
        ScalarKind::Uint64 => LittleEndian::read_u64(b) as i128,
        ScalarKind::Float32 => LittleEndian::read_f32(b) as i128,
        ScalarKind::Float64 => LittleEndian::read_f64(b) as i128,
    })
}

fn read_scalar(kind: ScalarKind, type_name: &str, r: &mut Reader<'_>) -> Result<Value, CodecError> {
    let b = r.take(kind.size())?;
    Ok(match kind {
        ScalarKind::Bool => match b[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            byte => return Err(CodecError::InvalidBool { type_name: type_name.to_string(), byte }),
        },
        ScalarKind::Int8 => Value::I8(b[0] as i8),
        ScalarKind::Uint8 => Value::U8(b[0]),
        ScalarKind::Int16 => Value::I16(LittleEndian::read_i16(b)),
        ScalarKind::Uint16 => Value::U16(LittleEndian::read_u16(b)),
        ScalarKind::Int32 => Value::I32(LittleEndian::read_i32(b)),
        ScalarKind::Uint32 => Value::U32(LittleEndian::read_u32(b)),
        ScalarKind::Int64 => Value::I64(LittleEndian::read_i64(b)),
        ScalarKind::Uint64 => Value::U64(LittleEndian::read_u64(b)),
        ScalarKind::Float32 => Value::Float(LittleEndian::read_f32(b)),
        ScalarKind::Float64 => Value::Double(LittleEndian::read_f64(b)),
    })
}

fn scalar_default(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::Bool => Value::Bool(false),
        ScalarKind::Int8 => Value::I8(0),
        ScalarKind::Uint8 => Value::U8(0),
        ScalarKind::Int16 => Value::I16(0),
        ScalarKind::Uint16 => Value::U16(0),
        ScalarKind::Int32 => Value::I32(0),
        ScalarKind::Uint32 => Value::U32(0),
        ScalarKind::Int64 => Value::I64(0),
        ScalarKind::Uint64 => Value::U64(0),
        ScalarKind::Float32 => Value::Float(0.0),
        ScalarKind::Float64 => Value::Double(0.0),
    }
}

/// Handle for encoding and decoding one type of a loaded schema.
#[derive(Debug, Clone, Copy)]
pub struct TypeConverter<'a> {
    codec: &'a Codec,
    type_name: &'a str,
    type_hash: u64,
    layout: TypeLayout,
}

impl<'a> TypeConverter<'a> {
    pub(crate) fn new(codec: &'a Codec, type_name: &'a str, type_hash: u64, layout: TypeLayout) -> Self {
        TypeConverter { codec, type_name, type_hash, layout }
    }

    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    pub fn type_hash(&self) -> u64 {
        self.type_hash
    }

    pub fn layout(&self) -> TypeLayout {
        self.layout
    }

    pub fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(self.layout.size.unwrap_or(64));
        self.serialize_into(value, &mut out)?;
        Ok(out)
    }

    /// Append the encoding of `value` to `out`. On error `out` may hold a partial encoding.
    pub fn serialize_into(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
        self.codec.encode(self.type_name, value, out)
    }

    /// Decode one value from the start of `input`; returns the value and the bytes consumed.
    pub fn decode(&self, input: &[u8]) -> Result<(Value, usize), CodecError> {
        self.codec.decode(self.type_name, input)
    }

    /// Decode a value that must occupy all of `input`.
    pub fn deserialize(&self, input: &[u8]) -> Result<Value, CodecError> {
        let (value, consumed) = self.decode(input).map_err(|e| match e {
            CodecError::Underrun { needed, offset, .. } => CodecError::SizeMismatch {
                expected: offset + needed,
                actual: input.len(),
            },
            other => other,
        })?;
        if consumed != input.len() {
            return Err(CodecError::SizeMismatch { expected: consumed, actual: input.len() });
        }
        Ok(value)
    }

    pub fn default_value(&self) -> Result<Value, CodecError> {
        self.codec.default_value(self.type_name)
    }
}
