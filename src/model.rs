//! Typed, immutable type model resolved from raw descriptor records.
//!
//! [`TypeMap::resolve`] turns declared records into [`TypeDef`]s, synthesizes every
//! intrinsic and container type referenced by name (`uint8`, `int64[]`, `string{int32}`),
//! and computes static sizes. Names that are referenced but neither declared nor
//! intrinsic are left dangling; they surface as
//! [`ResolutionError`](crate::error::ResolutionError) when the schema is validated.

use crate::error::LoadError;
use crate::parser::{parse_type_expr, TypeExpr};
use crate::raw::{RawProtocol, RawType, TypeClass};
use crate::validation::{invalid_path_part, is_valid_name};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Integer type used for vector, map, string and bytes length prefixes.
pub const SIZE_TYPE: &str = "uint32";
/// The 64-bit decimal type.
pub const DECIMAL_TYPE: &str = "dec64";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Float32,
    Float64,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 11] = [
        ScalarKind::Bool,
        ScalarKind::Int8,
        ScalarKind::Uint8,
        ScalarKind::Int16,
        ScalarKind::Uint16,
        ScalarKind::Int32,
        ScalarKind::Uint32,
        ScalarKind::Int64,
        ScalarKind::Uint64,
        ScalarKind::Float32,
        ScalarKind::Float64,
    ];

    pub fn from_name(name: &str) -> Option<ScalarKind> {
        ScalarKind::ALL.iter().copied().find(|k| k.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int8 => "int8",
            ScalarKind::Uint8 => "uint8",
            ScalarKind::Int16 => "int16",
            ScalarKind::Uint16 => "uint16",
            ScalarKind::Int32 => "int32",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Float32 => "float32",
            ScalarKind::Float64 => "float64",
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ScalarKind::Bool | ScalarKind::Int8 | ScalarKind::Uint8 => 1,
            ScalarKind::Int16 | ScalarKind::Uint16 => 2,
            ScalarKind::Int32 | ScalarKind::Uint32 | ScalarKind::Float32 => 4,
            ScalarKind::Int64 | ScalarKind::Uint64 | ScalarKind::Float64 => 8,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.int_range().is_some()
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            ScalarKind::Uint8 | ScalarKind::Uint16 | ScalarKind::Uint32 | ScalarKind::Uint64
        )
    }

    /// Inclusive value range of integer kinds.
    pub fn int_range(&self) -> Option<(i128, i128)> {
        Some(match self {
            ScalarKind::Int8 => (i8::MIN as i128, i8::MAX as i128),
            ScalarKind::Uint8 => (0, u8::MAX as i128),
            ScalarKind::Int16 => (i16::MIN as i128, i16::MAX as i128),
            ScalarKind::Uint16 => (0, u16::MAX as i128),
            ScalarKind::Int32 => (i32::MIN as i128, i32::MAX as i128),
            ScalarKind::Uint32 => (0, u32::MAX as i128),
            ScalarKind::Int64 => (i64::MIN as i128, i64::MAX as i128),
            ScalarKind::Uint64 => (0, u64::MAX as i128),
            ScalarKind::Bool | ScalarKind::Float32 | ScalarKind::Float64 => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitsetBit {
    pub name: String,
    pub offset: u32,
    pub comment: Option<String>,
}

/// Class-specific part of a type definition.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Scalar(ScalarKind),
    String,
    Bytes,
    Decimal,
    Vector { element_type: String },
    Array { element_type: String, array_size: usize },
    Map { key_type: String, value_type: String },
    Enum { base_type: ScalarKind, values: Vec<EnumValue> },
    Bitset { base_type: ScalarKind, bits: Vec<BitsetBit> },
    Struct { fields: Vec<Field> },
    External,
}

/// A resolved type. `size` is `None` for variable-length types.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub size: Option<usize>,
    pub comment: Option<String>,
    pub kind: TypeKind,
}

impl TypeDef {
    /// Intrinsic type for `name`, if it is one.
    pub fn intrinsic(name: &str) -> Option<TypeDef> {
        let (kind, size) = if let Some(k) = ScalarKind::from_name(name) {
            (TypeKind::Scalar(k), Some(k.size()))
        } else {
            match name {
                "string" => (TypeKind::String, None),
                "bytes" => (TypeKind::Bytes, None),
                DECIMAL_TYPE => (TypeKind::Decimal, Some(8)),
                _ => return None,
            }
        };
        Some(TypeDef { name: name.to_string(), size, comment: None, kind })
    }

    pub fn type_class(&self) -> TypeClass {
        match &self.kind {
            TypeKind::Scalar(_) => TypeClass::Scalar,
            TypeKind::String => TypeClass::String,
            TypeKind::Bytes => TypeClass::Bytes,
            TypeKind::Decimal => TypeClass::Decimal,
            TypeKind::Vector { .. } => TypeClass::Vector,
            TypeKind::Array { .. } => TypeClass::Array,
            TypeKind::Map { .. } => TypeClass::Map,
            TypeKind::Enum { .. } => TypeClass::Enum,
            TypeKind::Bitset { .. } => TypeClass::Bitset,
            TypeKind::Struct { .. } => TypeClass::Struct,
            TypeKind::External => TypeClass::External,
        }
    }

    /// Directly referenced type names (element, key, value, base and field types).
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        match &self.kind {
            TypeKind::Vector { element_type } | TypeKind::Array { element_type, .. } => {
                deps.insert(element_type.clone());
            }
            TypeKind::Map { key_type, value_type } => {
                deps.insert(key_type.clone());
                deps.insert(value_type.clone());
            }
            TypeKind::Enum { base_type, .. } | TypeKind::Bitset { base_type, .. } => {
                deps.insert(base_type.name().to_string());
            }
            TypeKind::Struct { fields } => {
                deps.extend(fields.iter().map(|f| f.type_name.clone()));
            }
            TypeKind::Scalar(_)
            | TypeKind::String
            | TypeKind::Bytes
            | TypeKind::Decimal
            | TypeKind::External => {}
        }
        deps
    }

    pub fn fields(&self) -> &[Field] {
        match &self.kind {
            TypeKind::Struct { fields } => fields,
            _ => &[],
        }
    }
}

/// Every type of a loaded schema, keyed by fully-qualified name.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    types: BTreeMap<String, TypeDef>,
}

impl TypeMap {
    /// Resolve raw records into typed definitions.
    pub fn resolve(raw: &BTreeMap<String, RawType>) -> Result<TypeMap, LoadError> {
        Self::resolve_with_roots(raw, std::iter::empty::<&str>())
    }

    /// Like [`resolve`](Self::resolve), also synthesizing the types named by `roots`
    /// (e.g. message payloads that no declared type references).
    pub fn resolve_with_roots<'r>(
        raw: &BTreeMap<String, RawType>,
        roots: impl IntoIterator<Item = &'r str>,
    ) -> Result<TypeMap, LoadError> {
        let mut types = BTreeMap::new();
        for (name, record) in raw {
            let def = build_declared(name, record)?;
            types.insert(name.clone(), def);
        }

        let mut pending: Vec<String> = types.values().flat_map(TypeDef::dependencies).collect();
        pending.extend(roots.into_iter().map(str::to_string));
        while let Some(name) = pending.pop() {
            if types.contains_key(&name) {
                continue;
            }
            if let Some(def) = synthesize(&name)? {
                pending.extend(def.dependencies());
                types.insert(name, def);
            }
        }

        let mut map = TypeMap { types };
        map.compute_sizes()?;
        Ok(map)
    }

    /// Add a single type without checks. The caller keeps sizes consistent.
    pub fn insert(&mut self, def: TypeDef) {
        self.types.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.types.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Dependencies of `name` that are not present in the map.
    pub fn missing_dependencies(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|def| def.dependencies().into_iter().filter(|d| !self.contains(d)).collect())
            .unwrap_or_default()
    }

    fn compute_sizes(&mut self) -> Result<(), LoadError> {
        let mut done: BTreeMap<String, Option<usize>> = BTreeMap::new();
        let names: Vec<String> = self.types.keys().cloned().collect();
        for name in &names {
            let mut stack = Vec::new();
            let mut on_stack = HashSet::new();
            self.size_of(name, &mut done, &mut stack, &mut on_stack)?;
        }
        for (name, size) in done {
            if let Some(def) = self.types.get_mut(&name) {
                def.size = size;
            }
        }
        Ok(())
    }

    fn size_of(
        &self,
        name: &str,
        done: &mut BTreeMap<String, Option<usize>>,
        stack: &mut Vec<String>,
        on_stack: &mut HashSet<String>,
    ) -> Result<Option<usize>, LoadError> {
        if let Some(size) = done.get(name) {
            return Ok(*size);
        }
        let def = match self.types.get(name) {
            Some(d) => d,
            None => return Ok(None),
        };
        if on_stack.contains(name) {
            let start = stack.iter().position(|n| n == name).unwrap_or(0);
            let mut cycle = stack[start..].to_vec();
            cycle.push(name.to_string());
            return Err(LoadError::Cycle(cycle));
        }
        stack.push(name.to_string());
        on_stack.insert(name.to_string());

        let mut dep_sizes = BTreeMap::new();
        for dep in def.dependencies() {
            let size = self.size_of(&dep, done, stack, on_stack)?;
            dep_sizes.insert(dep, size);
        }

        stack.pop();
        on_stack.remove(name);

        let size = match &def.kind {
            TypeKind::Scalar(k) => Some(k.size()),
            TypeKind::Enum { base_type, .. } | TypeKind::Bitset { base_type, .. } => {
                Some(base_type.size())
            }
            TypeKind::Decimal => Some(8),
            TypeKind::String | TypeKind::Bytes | TypeKind::Vector { .. } | TypeKind::Map { .. } => {
                None
            }
            TypeKind::Array { element_type, array_size } => dep_sizes
                .get(element_type)
                .copied()
                .flatten()
                .map(|s| s * array_size),
            TypeKind::Struct { fields } => fields.iter().try_fold(0usize, |acc, f| {
                dep_sizes.get(&f.type_name).copied().flatten().map(|s| acc + s)
            }),
            TypeKind::External => def.size,
        };
        done.insert(name.to_string(), size);
        Ok(size)
    }
}

fn invalid_type(type_name: &str, reason: impl Into<String>) -> LoadError {
    LoadError::InvalidType { type_name: type_name.to_string(), reason: reason.into() }
}

fn require<'a, T>(
    value: &'a Option<T>,
    type_name: &str,
    class: TypeClass,
    attribute: &'static str,
) -> Result<&'a T, LoadError> {
    value.as_ref().ok_or_else(|| LoadError::MissingAttribute {
        type_name: type_name.to_string(),
        type_class: class.as_str(),
        attribute,
    })
}

fn check_unique<'a>(
    type_name: &str,
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), LoadError> {
    let mut seen = HashSet::new();
    for name in names {
        if !is_valid_name(name) {
            return Err(LoadError::InvalidName {
                part: name.to_string(),
                context: format!("{} of {}", kind, type_name),
            });
        }
        if !seen.insert(name) {
            return Err(LoadError::Duplicate {
                type_name: type_name.to_string(),
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

fn integer_base(type_name: &str, class: TypeClass, base: &str) -> Result<ScalarKind, LoadError> {
    match ScalarKind::from_name(base) {
        Some(k) if k.is_integer() => Ok(k),
        _ => Err(invalid_type(
            type_name,
            format!("{} base_type {} is not an integer scalar", class, base),
        )),
    }
}

fn build_declared(name: &str, raw: &RawType) -> Result<TypeDef, LoadError> {
    if let Some(part) = invalid_path_part(name) {
        return Err(LoadError::InvalidName { part: part.to_string(), context: format!("type {}", name) });
    }
    if TypeDef::intrinsic(name).is_some() {
        return Err(invalid_type(name, "name shadows an intrinsic type"));
    }
    let class = raw.type_class;
    if raw.size.is_some() && !matches!(class, TypeClass::External | TypeClass::Decimal) {
        return Err(invalid_type(name, format!("size is derived for type_class {}", class)));
    }

    let kind = match class {
        TypeClass::Scalar | TypeClass::String | TypeClass::Bytes => {
            return Err(invalid_type(name, format!("type_class {} is intrinsic and cannot be declared", class)));
        }
        TypeClass::Decimal => {
            if raw.size.unwrap_or(8) != 8 {
                return Err(invalid_type(name, "only 8-byte decimals are supported"));
            }
            TypeKind::Decimal
        }
        TypeClass::Struct => {
            let fields: Vec<Field> = raw
                .fields
                .iter()
                .flatten()
                .map(|f| Field {
                    name: f.name.clone(),
                    type_name: f.type_name.clone(),
                    comment: f.comment.clone(),
                })
                .collect();
            check_unique(name, "field", fields.iter().map(|f| f.name.as_str()))?;
            TypeKind::Struct { fields }
        }
        TypeClass::Enum => {
            let base = require(&raw.base_type, name, class, "base_type")?;
            let base_type = integer_base(name, class, base)?;
            let values = require(&raw.values, name, class, "values")?;
            if values.is_empty() {
                return Err(invalid_type(name, "enum must declare at least one value"));
            }
            check_unique(name, "enum value", values.iter().map(|v| v.name.as_str()))?;
            let (min, max) = base_type.int_range().unwrap_or((i128::MIN, i128::MAX));
            let mut seen = HashSet::new();
            for v in values {
                if (v.value as i128) < min || (v.value as i128) > max {
                    return Err(invalid_type(
                        name,
                        format!("enum value {}={} does not fit {}", v.name, v.value, base_type.name()),
                    ));
                }
                if !seen.insert(v.value) {
                    return Err(invalid_type(name, format!("enum value {} is used more than once", v.value)));
                }
            }
            TypeKind::Enum {
                base_type,
                values: values
                    .iter()
                    .map(|v| EnumValue { name: v.name.clone(), value: v.value, comment: v.comment.clone() })
                    .collect(),
            }
        }
        TypeClass::Bitset => {
            let base = require(&raw.base_type, name, class, "base_type")?;
            let base_type = integer_base(name, class, base)?;
            if !base_type.is_unsigned() {
                return Err(invalid_type(name, format!("bitset base_type {} must be unsigned", base)));
            }
            let bits = require(&raw.bits, name, class, "bits")?;
            check_unique(name, "bit", bits.iter().map(|b| b.name.as_str()))?;
            let width = base_type.size() as u32 * 8;
            let mut seen = HashSet::new();
            for b in bits {
                if b.offset >= width {
                    return Err(invalid_type(
                        name,
                        format!("bit {} offset {} exceeds {} bits", b.name, b.offset, width),
                    ));
                }
                if !seen.insert(b.offset) {
                    return Err(invalid_type(name, format!("bit offset {} is used more than once", b.offset)));
                }
            }
            TypeKind::Bitset {
                base_type,
                bits: bits
                    .iter()
                    .map(|b| BitsetBit { name: b.name.clone(), offset: b.offset, comment: b.comment.clone() })
                    .collect(),
            }
        }
        TypeClass::Vector => TypeKind::Vector {
            element_type: checked_ref(require(&raw.element_type, name, class, "element_type")?)?,
        },
        TypeClass::Array => TypeKind::Array {
            element_type: checked_ref(require(&raw.element_type, name, class, "element_type")?)?,
            array_size: *require(&raw.array_size, name, class, "array_size")?,
        },
        TypeClass::Map => TypeKind::Map {
            key_type: checked_ref(require(&raw.key_type, name, class, "key_type")?)?,
            value_type: checked_ref(require(&raw.value_type, name, class, "value_type")?)?,
        },
        TypeClass::External => TypeKind::External,
    };

    Ok(TypeDef {
        name: name.to_string(),
        size: raw.size,
        comment: raw.comment.clone(),
        kind,
    })
}

fn checked_ref(reference: &str) -> Result<String, LoadError> {
    let expr = parse_type_expr(reference).map_err(LoadError::InvalidTypeExpr)?;
    let canonical = expr.canonical_name();
    if canonical != reference {
        return Err(LoadError::InvalidTypeExpr(format!(
            "{:?} is not canonical, write {:?}",
            reference, canonical
        )));
    }
    Ok(canonical)
}

/// Build the definition of a referenced but undeclared name, if it is intrinsic or a container.
fn synthesize(reference: &str) -> Result<Option<TypeDef>, LoadError> {
    let name = checked_ref(reference)?;
    let expr = parse_type_expr(&name).map_err(LoadError::InvalidTypeExpr)?;
    let kind = match expr {
        TypeExpr::Named(n) => return Ok(TypeDef::intrinsic(&n)),
        TypeExpr::Vector(elem) => TypeKind::Vector { element_type: elem.canonical_name() },
        TypeExpr::Array(elem, n) => TypeKind::Array { element_type: elem.canonical_name(), array_size: n },
        TypeExpr::Map { key, value } => TypeKind::Map {
            key_type: key.canonical_name(),
            value_type: value.canonical_name(),
        },
    };
    Ok(Some(TypeDef { name, size: None, comment: None, kind }))
}

/// One message of a protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub proto_id: u16,
    pub message_id: u16,
    pub name: String,
    pub type_name: String,
    pub comment: Option<String>,
}

/// A named protocol with its messages ordered by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    pub name: String,
    pub proto_id: u16,
    pub messages: BTreeMap<u16, Message>,
    pub comment: Option<String>,
}

impl Protocol {
    /// Resolve a raw protocol record; checks names, id/key agreement and name uniqueness.
    pub fn resolve(name: &str, raw: &RawProtocol) -> Result<Protocol, LoadError> {
        if let Some(part) = invalid_path_part(name) {
            return Err(LoadError::InvalidName {
                part: part.to_string(),
                context: format!("protocol {}", name),
            });
        }
        let mut seen = HashSet::new();
        let mut messages = BTreeMap::new();
        for (&key, msg) in &raw.messages {
            if !is_valid_name(&msg.name) {
                return Err(LoadError::InvalidName {
                    part: msg.name.clone(),
                    context: format!("message of protocol {}", name),
                });
            }
            if !seen.insert(msg.name.as_str()) {
                return Err(LoadError::DuplicateMessage { protocol: name.to_string(), name: msg.name.clone() });
            }
            let message_id = msg.message_id.unwrap_or(key);
            if message_id != key {
                return Err(LoadError::MessageIdMismatch {
                    protocol: name.to_string(),
                    name: msg.name.clone(),
                    declared: message_id,
                    key,
                });
            }
            messages.insert(
                key,
                Message {
                    proto_id: raw.proto_id,
                    message_id,
                    name: msg.name.clone(),
                    type_name: msg.type_name.clone(),
                    comment: msg.comment.clone(),
                },
            );
        }
        Ok(Protocol {
            name: name.to_string(),
            proto_id: raw.proto_id,
            messages,
            comment: raw.comment.clone(),
        })
    }

    /// Payload type names of all messages.
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.messages.values().map(|m| m.type_name.clone()).collect()
    }

    pub fn message_by_name(&self, name: &str) -> Option<&Message> {
        self.messages.values().find(|m| m.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawEnumValue, RawField};

    fn raw(entries: Vec<(&str, RawType)>) -> BTreeMap<String, RawType> {
        entries.into_iter().map(|(n, t)| (n.to_string(), t)).collect()
    }

    #[test]
    fn containers_are_synthesized_from_references() {
        let types = TypeMap::resolve(&raw(vec![(
            "pkg/holder",
            RawType::structure(vec![
                RawField::new("ids", "int64[]"),
                RawField::new("pos", "float32[3]"),
                RawField::new("names", "string{int32}"),
            ]),
        )]))
        .unwrap();
        for name in ["int64[]", "int64", "float32[3]", "float32", "string{int32}", "string", "int32"] {
            assert!(types.contains(name), "{} should be synthesized", name);
        }
        assert_eq!(types.get("float32[3]").unwrap().size, Some(12));
        assert_eq!(types.get("pkg/holder").unwrap().size, None);
    }

    #[test]
    fn struct_size_is_sum_of_static_fields() {
        let types = TypeMap::resolve(&raw(vec![
            ("kind", RawType::enumeration("uint16", vec![RawEnumValue::new("a", 0)])),
            (
                "point",
                RawType::structure(vec![
                    RawField::new("x", "int32"),
                    RawField::new("k", "kind"),
                    RawField::new("v", "dec64"),
                ]),
            ),
        ]))
        .unwrap();
        assert_eq!(types.get("point").unwrap().size, Some(14));
    }

    #[test]
    fn roots_are_synthesized_without_declarations() {
        let types = TypeMap::resolve_with_roots(&BTreeMap::new(), ["int16[]", "bool"]).unwrap();
        assert!(types.contains("int16[]"));
        assert!(types.contains("int16"));
        assert!(types.contains("bool"));
        assert!(!types.contains("string"));
    }

    #[test]
    fn dangling_reference_leaves_size_unknown() {
        let types = TypeMap::resolve(&raw(vec![(
            "a",
            RawType::structure(vec![RawField::new("b", "missing/type")]),
        )]))
        .unwrap();
        assert_eq!(types.get("a").unwrap().size, None);
        assert_eq!(types.missing_dependencies("a"), vec!["missing/type".to_string()]);
    }
}
