//! Raw descriptor records as produced by a loader (YAML, JSON, or built in code).
//!
//! These are loosely typed: which sub-fields are required depends on `type_class`,
//! and is checked by [`TypeMap::resolve`](crate::model::TypeMap::resolve).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural kind of a type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeClass {
    Scalar,
    String,
    Bytes,
    Vector,
    Array,
    Map,
    Enum,
    Bitset,
    Struct,
    Decimal,
    External,
}

impl TypeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeClass::Scalar => "scalar",
            TypeClass::String => "string",
            TypeClass::Bytes => "bytes",
            TypeClass::Vector => "vector",
            TypeClass::Array => "array",
            TypeClass::Map => "map",
            TypeClass::Enum => "enum",
            TypeClass::Bitset => "bitset",
            TypeClass::Struct => "struct",
            TypeClass::Decimal => "decimal",
            TypeClass::External => "external",
        }
    }
}

impl std::fmt::Display for TypeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared type record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawType {
    pub type_class: TypeClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<RawField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<RawEnumValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<Vec<RawBit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RawType {
    /// Empty record of the given class; set the class-specific fields afterwards.
    pub fn new(type_class: TypeClass) -> Self {
        RawType {
            type_class,
            size: None,
            fields: None,
            values: None,
            bits: None,
            element_type: None,
            array_size: None,
            key_type: None,
            value_type: None,
            base_type: None,
            comment: None,
        }
    }

    pub fn structure(fields: Vec<RawField>) -> Self {
        RawType {
            fields: Some(fields),
            ..RawType::new(TypeClass::Struct)
        }
    }

    pub fn enumeration(base_type: &str, values: Vec<RawEnumValue>) -> Self {
        RawType {
            base_type: Some(base_type.to_string()),
            values: Some(values),
            ..RawType::new(TypeClass::Enum)
        }
    }

    pub fn bitset(base_type: &str, bits: Vec<RawBit>) -> Self {
        RawType {
            base_type: Some(base_type.to_string()),
            bits: Some(bits),
            ..RawType::new(TypeClass::Bitset)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RawField {
    pub fn new(name: &str, type_name: &str) -> Self {
        RawField { name: name.to_string(), type_name: type_name.to_string(), comment: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEnumValue {
    pub name: String,
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RawEnumValue {
    pub fn new(name: &str, value: i64) -> Self {
        RawEnumValue { name: name.to_string(), value, comment: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBit {
    pub name: String,
    pub offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RawBit {
    pub fn new(name: &str, offset: u32) -> Self {
        RawBit { name: name.to_string(), offset, comment: None }
    }
}

/// One protocol record: `{proto_id, messages: {id: {name, type, ...}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProtocol {
    pub proto_id: u16,
    #[serde(default)]
    pub messages: BTreeMap<u16, RawMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMessage {
    /// Declared id; must equal the key in the protocol's message table. Defaults to the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u16>,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RawMessage {
    pub fn new(name: &str, type_name: &str) -> Self {
        RawMessage {
            message_id: None,
            name: name.to_string(),
            type_name: type_name.to_string(),
            comment: None,
        }
    }
}
