//! JSON manifest of a loaded schema: `types.json` and `protocols.json`.
//!
//! Each output file is one generation unit with its own [`ManifestContext`]; nothing
//! carries over between units.

use crate::error::LookupError;
use crate::model::{TypeDef, TypeKind};
use crate::protocol::Schema;
use crate::raw::{RawBit, RawEnumValue, RawField, RawType, TypeClass};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const TYPES_FILE: &str = "types.json";
pub const PROTOCOLS_FILE: &str = "protocols.json";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Serialize)]
struct TypeEntry {
    name: String,
    #[serde(flatten)]
    descriptor: RawType,
    size: Option<usize>,
    alignment: usize,
    flat: bool,
    /// Decimal string; JSON numbers lose precision above 2^53.
    hash: String,
}

#[derive(Debug, Serialize)]
struct MessageEntry {
    message_id: u16,
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProtocolEntry {
    name: String,
    proto_id: u16,
    messages: Vec<MessageEntry>,
    fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Entry {
    Type(TypeEntry),
    Protocol(ProtocolEntry),
}

/// State of one manifest file being generated.
pub struct ManifestContext<'s> {
    schema: &'s Schema,
    seen: BTreeSet<String>,
    entries: Vec<Entry>,
}

impl<'s> ManifestContext<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        ManifestContext { schema, seen: BTreeSet::new(), entries: Vec::new() }
    }

    /// Add a type entry; adding the same name twice is a no-op.
    pub fn add_type(&mut self, type_name: &str) -> Result<(), LookupError> {
        if !self.seen.insert(type_name.to_string()) {
            return Ok(());
        }
        let def = self.schema.type_def(type_name)?;
        let layout = self.schema.layout(type_name)?;
        self.entries.push(Entry::Type(TypeEntry {
            name: def.name.clone(),
            descriptor: descriptor(def),
            size: layout.size,
            alignment: layout.alignment,
            flat: layout.flat,
            hash: self.schema.type_hash(type_name)?.to_string(),
        }));
        Ok(())
    }

    pub fn add_protocol(&mut self, proto_name: &str) -> Result<(), LookupError> {
        if !self.seen.insert(proto_name.to_string()) {
            return Ok(());
        }
        let info = self.schema.protocol_info_by_name(proto_name)?;
        self.entries.push(Entry::Protocol(ProtocolEntry {
            name: info.proto_name.to_string(),
            proto_id: info.proto_id,
            messages: info
                .messages
                .iter()
                .map(|m| MessageEntry {
                    message_id: m.message_id,
                    name: m.message_name.to_string(),
                    type_name: m.type_name.to_string(),
                    hash: m.message_hash.to_string(),
                    comment: m.comment.map(str::to_string),
                })
                .collect(),
            fingerprint: info.proto_hash.to_string(),
            comment: info.comment.map(str::to_string),
        }));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty-printed JSON array of the entries in insertion order.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries)
    }
}

/// Manifest of every declared struct, enum and bitset, by name.
pub fn types_manifest(schema: &Schema) -> Result<String, ManifestError> {
    let mut ctx = ManifestContext::new(schema);
    for def in schema.types() {
        if matches!(def.type_class(), TypeClass::Struct | TypeClass::Enum | TypeClass::Bitset) {
            ctx.add_type(&def.name)?;
        }
    }
    Ok(ctx.render()?)
}

/// Manifest of every protocol, by name.
pub fn protocols_manifest(schema: &Schema) -> Result<String, ManifestError> {
    let mut ctx = ManifestContext::new(schema);
    let names: Vec<&str> = schema.protocols()?.iter().map(|p| p.proto_name).collect();
    for name in names {
        ctx.add_protocol(name)?;
    }
    Ok(ctx.render()?)
}

/// Write both manifests into `out_dir`, creating it if needed. Returns the written paths.
pub fn write_manifests(schema: &Schema, out_dir: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    fs::create_dir_all(out_dir).map_err(|source| ManifestError::Io { path: out_dir.to_path_buf(), source })?;
    let mut written = Vec::new();
    for (file, text) in [(TYPES_FILE, types_manifest(schema)?), (PROTOCOLS_FILE, protocols_manifest(schema)?)] {
        let path = out_dir.join(file);
        fs::write(&path, text).map_err(|source| ManifestError::Io { path: path.clone(), source })?;
        written.push(path);
    }
    Ok(written)
}

/// Descriptor record equivalent to `def`, comments included.
fn descriptor(def: &TypeDef) -> RawType {
    let mut raw = RawType::new(def.type_class());
    raw.comment = def.comment.clone();
    match &def.kind {
        TypeKind::Struct { fields } => {
            raw.fields = Some(
                fields
                    .iter()
                    .map(|f| RawField { comment: f.comment.clone(), ..RawField::new(&f.name, &f.type_name) })
                    .collect(),
            );
        }
        TypeKind::Enum { base_type, values } => {
            raw.base_type = Some(base_type.name().to_string());
            raw.values = Some(
                values
                    .iter()
                    .map(|v| RawEnumValue { comment: v.comment.clone(), ..RawEnumValue::new(&v.name, v.value) })
                    .collect(),
            );
        }
        TypeKind::Bitset { base_type, bits } => {
            raw.base_type = Some(base_type.name().to_string());
            raw.bits = Some(
                bits.iter()
                    .map(|b| RawBit { comment: b.comment.clone(), ..RawBit::new(&b.name, b.offset) })
                    .collect(),
            );
        }
        TypeKind::Vector { element_type } => raw.element_type = Some(element_type.clone()),
        TypeKind::Array { element_type, array_size } => {
            raw.element_type = Some(element_type.clone());
            raw.array_size = Some(*array_size);
        }
        TypeKind::Map { key_type, value_type } => {
            raw.key_type = Some(key_type.clone());
            raw.value_type = Some(value_type.clone());
        }
        TypeKind::Scalar(_) | TypeKind::String | TypeKind::Bytes | TypeKind::Decimal | TypeKind::External => {}
    }
    raw
}
