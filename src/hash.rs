//! Structural fingerprints of types, messages and protocols.
//!
//! A type hash is the first 8 bytes (little-endian) of the MD5 of its canonical
//! signature, XORed with the hashes of its direct dependencies. Comments never take
//! part. Message hashes XOR the message identity with the payload type hash, and a
//! protocol fingerprint XORs its message hashes, so it does not depend on message
//! order. Two edits whose contributions cancel out are not detected.

use crate::error::ResolutionError;
use crate::model::{Message, Protocol, TypeDef, TypeKind, TypeMap};
use byteorder::{ByteOrder, LittleEndian};
use md5::{Digest, Md5};
use serde_json::{json, Value as Json};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error(transparent)]
    Unresolved(#[from] ResolutionError),
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Canonical, comment-free description of a type.
pub fn type_signature(def: &TypeDef) -> String {
    let mut pairs: Vec<Json> = vec![
        json!(["type", def.name]),
        json!(["type_class", def.type_class().as_str()]),
    ];
    match &def.kind {
        TypeKind::Struct { fields } => {
            let fields: Vec<Json> = fields.iter().map(|f| json!([f.name, f.type_name])).collect();
            pairs.push(json!(["fields", fields]));
        }
        TypeKind::Enum { base_type, values } => {
            let values: Vec<Json> = values.iter().map(|v| json!([v.name, v.value])).collect();
            pairs.push(json!(["base_type", base_type.name()]));
            pairs.push(json!(["values", values]));
        }
        TypeKind::Bitset { base_type, bits } => {
            let bits: Vec<Json> = bits.iter().map(|b| json!([b.name, b.offset])).collect();
            pairs.push(json!(["base_type", base_type.name()]));
            pairs.push(json!(["bits", bits]));
        }
        TypeKind::Array { element_type, array_size } => {
            pairs.push(json!(["element_type", element_type]));
            pairs.push(json!(["array_size", array_size]));
        }
        TypeKind::Vector { element_type } => {
            pairs.push(json!(["element_type", element_type]));
        }
        TypeKind::Map { key_type, value_type } => {
            pairs.push(json!(["key_type", key_type]));
            pairs.push(json!(["value_type", value_type]));
        }
        TypeKind::External => {
            pairs.push(json!(["size", def.size]));
        }
        TypeKind::Scalar(_) | TypeKind::String | TypeKind::Bytes | TypeKind::Decimal => {}
    }
    Json::Array(pairs).to_string()
}

/// Canonical description of a message's identity (payload excluded).
pub fn message_signature(message: &Message) -> String {
    json!([
        ["name", message.name],
        ["proto_id", message.proto_id],
        ["message_id", message.message_id],
    ])
    .to_string()
}

/// First 8 bytes of the MD5 digest, little-endian.
pub fn digest(signature: &str) -> u64 {
    let hash = Md5::digest(signature.as_bytes());
    LittleEndian::read_u64(&hash[..8])
}

/// Memoized, cycle-guarded hashing over one [`TypeMap`].
pub struct HashEngine<'a> {
    types: &'a TypeMap,
    memo: HashMap<String, u64>,
    in_progress: Vec<String>,
}

impl<'a> HashEngine<'a> {
    pub fn new(types: &'a TypeMap) -> Self {
        HashEngine { types, memo: HashMap::new(), in_progress: Vec::new() }
    }

    pub fn hash_type(&mut self, name: &str) -> Result<u64, HashError> {
        self.hash_dep(name, name)
    }

    pub fn hash_message(&mut self, message: &Message) -> Result<u64, HashError> {
        let payload = self.hash_dep(&message.type_name, &message.name)?;
        Ok(digest(&message_signature(message)) ^ payload)
    }

    pub fn protocol_fingerprint(&mut self, protocol: &Protocol) -> Result<u64, HashError> {
        let mut hashes = Vec::with_capacity(protocol.messages.len());
        for message in protocol.messages.values() {
            hashes.push(self.hash_message(message)?);
        }
        Ok(combine(hashes))
    }

    fn hash_dep(&mut self, name: &str, referenced_by: &str) -> Result<u64, HashError> {
        if let Some(h) = self.memo.get(name) {
            return Ok(*h);
        }
        let types = self.types;
        let def = types.get(name).ok_or_else(|| ResolutionError {
            missing: name.to_string(),
            referenced_by: referenced_by.to_string(),
        })?;
        if let Some(start) = self.in_progress.iter().position(|n| n == name) {
            let mut cycle = self.in_progress[start..].to_vec();
            cycle.push(name.to_string());
            return Err(HashError::Cycle(cycle));
        }

        self.in_progress.push(name.to_string());
        let mut hash = digest(&type_signature(def));
        let mut result: Result<(), HashError> = Ok(());
        for dep in def.dependencies() {
            match self.hash_dep(&dep, name) {
                Ok(h) => hash ^= h,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.in_progress.pop();
        result?;

        self.memo.insert(name.to_string(), hash);
        Ok(hash)
    }
}

/// Hash of one type against `types`.
pub fn hash_type(name: &str, types: &TypeMap) -> Result<u64, HashError> {
    HashEngine::new(types).hash_type(name)
}

/// XOR of message hashes.
pub fn combine(message_hashes: impl IntoIterator<Item = u64>) -> u64 {
    message_hashes.into_iter().fold(0, |acc, h| acc ^ h)
}

/// Names of types sharing a hash with an earlier type in `hashes`, if any.
pub fn find_collision<'n>(hashes: impl IntoIterator<Item = (&'n str, u64)>) -> Option<(&'n str, &'n str, u64)> {
    let mut seen: HashMap<u64, &str> = HashMap::new();
    for (name, hash) in hashes {
        if let Some(first) = seen.insert(hash, name) {
            return Some((first, name, hash));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawEnumValue, RawField, RawType};
    use std::collections::BTreeMap;

    fn types(entries: Vec<(&str, RawType)>) -> TypeMap {
        let raw: BTreeMap<String, RawType> = entries.into_iter().map(|(n, t)| (n.to_string(), t)).collect();
        TypeMap::resolve(&raw).unwrap()
    }

    #[test]
    fn signature_is_compact_json_without_comments() {
        let mut rt = RawType::enumeration("uint8", vec![RawEnumValue::new("one", 1)]);
        rt.comment = Some("ignored".into());
        let map = types(vec![("e", rt)]);
        assert_eq!(
            type_signature(map.get("e").unwrap()),
            r#"[["type","e"],["type_class","enum"],["base_type","uint8"],["values",[["one",1]]]]"#
        );
    }

    #[test]
    fn hash_xors_dependencies() {
        let map = types(vec![("s", RawType::structure(vec![RawField::new("a", "int8[]")]))]);
        let own = digest(&type_signature(map.get("s").unwrap()));
        let vec_hash = hash_type("int8[]", &map).unwrap();
        let int8 = hash_type("int8", &map).unwrap();
        assert_eq!(vec_hash, digest(&type_signature(map.get("int8[]").unwrap())) ^ int8);
        assert_eq!(hash_type("s", &map).unwrap(), own ^ vec_hash);
    }

    #[test]
    fn unresolved_dependency_is_an_error() {
        let map = types(vec![("s", RawType::structure(vec![RawField::new("a", "nope")]))]);
        assert_eq!(
            hash_type("s", &map),
            Err(HashError::Unresolved(ResolutionError { missing: "nope".into(), referenced_by: "s".into() }))
        );
    }

    #[test]
    fn cycle_is_detected() {
        let mut map = types(vec![("a", RawType::structure(vec![]))]);
        map.insert(TypeDef {
            name: "a".into(),
            size: None,
            comment: None,
            kind: TypeKind::Struct {
                fields: vec![crate::model::Field { name: "me".into(), type_name: "a".into(), comment: None }],
            },
        });
        assert!(matches!(hash_type("a", &map), Err(HashError::Cycle(c)) if c == vec!["a", "a"]));
    }

    #[test]
    fn collision_finder_reports_both_names() {
        assert_eq!(find_collision(vec![("a", 1), ("b", 2), ("c", 1)]), Some(("a", "c", 1)));
        assert_eq!(find_collision(vec![("a", 1), ("b", 2)]), None);
    }
}
