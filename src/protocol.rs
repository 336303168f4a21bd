//! Loaded schema: resolved types, protocols, layouts, hashes and converters.
//!
//! [`Schema::load`] validates everything up front and either returns a fully usable,
//! immutable schema or the first error found. Lookups on a loaded schema fail with
//! [`LookupError`] instead of returning `None`.

use crate::codec::{Codec, CodecError, TypeConverter};
use crate::error::{HashCollisionError, LoadError, LookupError, ResolutionError};
use crate::external::ExternalRegistry;
use crate::hash::{find_collision, HashEngine, HashError};
use crate::layout::{FieldGroup, LayoutPlanner, TypeLayout};
use crate::model::{Message, Protocol, TypeDef, TypeMap};
use crate::raw::{RawProtocol, RawType, TypeClass};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// Error of a convenience call that both looks up a type and runs the codec.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Clone)]
struct MessageEntry {
    proto_name: String,
    message: Message,
    hash: u64,
}

/// One message of a loaded schema with everything needed to handle its payload.
#[derive(Debug, Clone, Copy)]
pub struct MessageInfo<'a> {
    pub proto_id: u16,
    pub proto_name: &'a str,
    pub message_id: u16,
    pub message_name: &'a str,
    pub type_name: &'a str,
    pub message_hash: u64,
    pub type_converter: TypeConverter<'a>,
    pub comment: Option<&'a str>,
}

/// One protocol of a loaded schema; `messages` are ordered by id.
#[derive(Debug, Clone)]
pub struct ProtocolInfo<'a> {
    pub proto_id: u16,
    pub proto_name: &'a str,
    pub messages: Vec<MessageInfo<'a>>,
    pub proto_hash: u64,
    pub comment: Option<&'a str>,
}

#[derive(Debug)]
pub struct Schema {
    types: TypeMap,
    type_hashes: HashMap<String, u64>,
    layouts: HashMap<String, TypeLayout>,
    field_groups: HashMap<String, Vec<FieldGroup>>,
    protocols: BTreeMap<String, Protocol>,
    proto_names: HashMap<u16, String>,
    proto_hashes: HashMap<u16, u64>,
    messages: BTreeMap<(u16, u16), MessageEntry>,
    message_ids: HashMap<(String, String), (u16, u16)>,
    codec: Codec,
    externals: ExternalRegistry,
}

impl Schema {
    pub fn load(
        types: &BTreeMap<String, RawType>,
        protocols: &BTreeMap<String, RawProtocol>,
    ) -> Result<Schema, LoadError> {
        Self::load_with_externals(types, protocols, ExternalRegistry::new())
    }

    /// Load with host codecs for `external` types.
    pub fn load_with_externals(
        types: &BTreeMap<String, RawType>,
        protocols: &BTreeMap<String, RawProtocol>,
        externals: ExternalRegistry,
    ) -> Result<Schema, LoadError> {
        Self::load_with_type_hasher(types, protocols, externals, |engine, name| engine.hash_type(name))
    }

    /// Load computing each type hash with `type_hash`; message hashes always use the engine.
    pub(crate) fn load_with_type_hasher<F>(
        types: &BTreeMap<String, RawType>,
        protocols: &BTreeMap<String, RawProtocol>,
        externals: ExternalRegistry,
        mut type_hash: F,
    ) -> Result<Schema, LoadError>
    where
        F: FnMut(&mut HashEngine<'_>, &str) -> Result<u64, HashError>,
    {
        let raw_types = with_external_sizes(types, &externals)?;
        let payloads = protocols.values().flat_map(|p| p.messages.values().map(|m| m.type_name.as_str()));
        let type_map = TypeMap::resolve_with_roots(&raw_types, payloads)?;

        let mut engine = HashEngine::new(&type_map);
        let mut type_hashes = HashMap::with_capacity(type_map.len());
        for name in type_map.names() {
            let hash = type_hash(&mut engine, name).map_err(load_error)?;
            type_hashes.insert(name.to_string(), hash);
        }
        if let Some((first, second, hash)) =
            find_collision(type_map.names().filter_map(|n| type_hashes.get(n).map(|h| (n, *h))))
        {
            return Err(HashCollisionError { first: first.to_string(), second: second.to_string(), hash }.into());
        }

        let mut planner = LayoutPlanner::new(&type_map, &externals);
        let mut layouts = HashMap::with_capacity(type_map.len());
        let mut field_groups = HashMap::new();
        for def in type_map.iter() {
            layouts.insert(def.name.clone(), planner.layout(&def.name)?);
            if def.type_class() == TypeClass::Struct {
                field_groups.insert(def.name.clone(), planner.field_groups(&def.name)?);
            }
        }

        let mut resolved = BTreeMap::new();
        let mut proto_names: HashMap<u16, String> = HashMap::new();
        let mut proto_hashes = HashMap::new();
        let mut messages = BTreeMap::new();
        let mut message_ids = HashMap::new();
        for (name, raw) in protocols {
            let protocol = Protocol::resolve(name, raw)?;
            if let Some(first) = proto_names.get(&protocol.proto_id) {
                return Err(LoadError::DuplicateProtocolId {
                    first: first.clone(),
                    second: name.clone(),
                    proto_id: protocol.proto_id,
                });
            }
            let mut message_hashes = Vec::with_capacity(protocol.messages.len());
            for message in protocol.messages.values() {
                if !type_map.contains(&message.type_name) {
                    return Err(ResolutionError {
                        missing: message.type_name.clone(),
                        referenced_by: format!("{}/{}", name, message.name),
                    }
                    .into());
                }
                let hash = engine.hash_message(message).map_err(load_error)?;
                message_hashes.push(hash);
                message_ids.insert(
                    (name.clone(), message.name.clone()),
                    (protocol.proto_id, message.message_id),
                );
                messages.insert(
                    (protocol.proto_id, message.message_id),
                    MessageEntry { proto_name: name.clone(), message: message.clone(), hash },
                );
            }
            proto_hashes.insert(protocol.proto_id, crate::hash::combine(message_hashes));
            proto_names.insert(protocol.proto_id, name.clone());
            resolved.insert(name.clone(), protocol);
        }

        let codec = Codec::new(&type_map, &externals);
        Ok(Schema {
            types: type_map,
            type_hashes,
            layouts,
            field_groups,
            protocols: resolved,
            proto_names,
            proto_hashes,
            messages,
            message_ids,
            codec,
            externals,
        })
    }

    /// All types in name order, including intrinsic and synthesized container types.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }

    pub fn type_def(&self, type_name: &str) -> Result<&TypeDef, LookupError> {
        self.types.get(type_name).ok_or_else(|| LookupError::Type(type_name.to_string()))
    }

    pub fn layout(&self, type_name: &str) -> Result<TypeLayout, LookupError> {
        self.layouts
            .get(type_name)
            .copied()
            .ok_or_else(|| LookupError::Type(type_name.to_string()))
    }

    /// Bulk-copy groups of a struct; empty for non-struct types.
    pub fn field_groups(&self, type_name: &str) -> Result<&[FieldGroup], LookupError> {
        self.type_def(type_name)?;
        Ok(self.field_groups.get(type_name).map(Vec::as_slice).unwrap_or(&[]))
    }

    pub fn type_hash(&self, type_name: &str) -> Result<u64, LookupError> {
        self.type_hashes
            .get(type_name)
            .copied()
            .ok_or_else(|| LookupError::Type(type_name.to_string()))
    }

    pub fn type_converter(&self, type_name: &str) -> Result<TypeConverter<'_>, LookupError> {
        let def = self.type_def(type_name)?;
        Ok(TypeConverter::new(
            &self.codec,
            &def.name,
            self.type_hash(type_name)?,
            self.layout(type_name)?,
        ))
    }

    pub fn serialize(&self, type_name: &str, value: &Value) -> Result<Vec<u8>, SchemaError> {
        Ok(self.type_converter(type_name)?.serialize(value)?)
    }

    pub fn deserialize(&self, type_name: &str, bytes: &[u8]) -> Result<Value, SchemaError> {
        Ok(self.type_converter(type_name)?.deserialize(bytes)?)
    }

    pub fn externals(&self) -> &ExternalRegistry {
        &self.externals
    }

    /// Protocols in name order.
    pub fn protocols(&self) -> Result<Vec<ProtocolInfo<'_>>, LookupError> {
        self.protocols.values().map(|p| self.protocol_info(p)).collect()
    }

    pub fn protocol(&self, proto_name: &str) -> Result<&Protocol, LookupError> {
        self.protocols
            .get(proto_name)
            .ok_or_else(|| LookupError::ProtocolName(proto_name.to_string()))
    }

    pub fn protocol_info_by_name(&self, proto_name: &str) -> Result<ProtocolInfo<'_>, LookupError> {
        self.protocol_info(self.protocol(proto_name)?)
    }

    pub fn protocol_info_by_id(&self, proto_id: u16) -> Result<ProtocolInfo<'_>, LookupError> {
        let name = self.proto_names.get(&proto_id).ok_or(LookupError::ProtocolId(proto_id))?;
        self.protocol_info_by_name(name)
    }

    pub fn message_info_by_name(
        &self,
        proto_name: &str,
        message_name: &str,
    ) -> Result<MessageInfo<'_>, LookupError> {
        let key = (proto_name.to_string(), message_name.to_string());
        let ids = self.message_ids.get(&key).ok_or_else(|| LookupError::MessageName {
            proto_name: proto_name.to_string(),
            message_name: message_name.to_string(),
        })?;
        self.message_info_by_id(ids.0, ids.1)
    }

    pub fn message_info_by_id(&self, proto_id: u16, message_id: u16) -> Result<MessageInfo<'_>, LookupError> {
        let entry = self
            .messages
            .get(&(proto_id, message_id))
            .ok_or(LookupError::MessageId { proto_id, message_id })?;
        self.message_info(entry)
    }

    fn message_info<'s>(&'s self, entry: &'s MessageEntry) -> Result<MessageInfo<'s>, LookupError> {
        let message = &entry.message;
        Ok(MessageInfo {
            proto_id: message.proto_id,
            proto_name: &entry.proto_name,
            message_id: message.message_id,
            message_name: &message.name,
            type_name: &message.type_name,
            message_hash: entry.hash,
            type_converter: self.type_converter(&message.type_name)?,
            comment: message.comment.as_deref(),
        })
    }

    fn protocol_info<'s>(&'s self, protocol: &'s Protocol) -> Result<ProtocolInfo<'s>, LookupError> {
        let mut messages = Vec::with_capacity(protocol.messages.len());
        for &message_id in protocol.messages.keys() {
            messages.push(self.message_info_by_id(protocol.proto_id, message_id)?);
        }
        Ok(ProtocolInfo {
            proto_id: protocol.proto_id,
            proto_name: &protocol.name,
            messages,
            proto_hash: self
                .proto_hashes
                .get(&protocol.proto_id)
                .copied()
                .ok_or(LookupError::ProtocolId(protocol.proto_id))?,
            comment: protocol.comment.as_deref(),
        })
    }
}

fn load_error(e: HashError) -> LoadError {
    match e {
        HashError::Unresolved(r) => LoadError::Resolution(r),
        HashError::Cycle(c) => LoadError::Cycle(c),
    }
}

/// Fill external sizes from registered codecs; a declared size must agree.
fn with_external_sizes(
    types: &BTreeMap<String, RawType>,
    externals: &ExternalRegistry,
) -> Result<BTreeMap<String, RawType>, LoadError> {
    let mut out = types.clone();
    for (name, raw) in out.iter_mut() {
        if raw.type_class != TypeClass::External {
            continue;
        }
        let registered = match externals.get(name) {
            Some(codec) => codec.size(),
            None => continue,
        };
        match (raw.size, registered) {
            (Some(declared), Some(actual)) if declared != actual => {
                return Err(LoadError::InvalidType {
                    type_name: name.clone(),
                    reason: format!("declared size {} but registered codec has size {}", declared, actual),
                });
            }
            (None, size) => raw.size = size,
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawField, RawMessage};

    fn raw_types() -> BTreeMap<String, RawType> {
        BTreeMap::from([
            ("a".to_string(), RawType::structure(vec![RawField::new("x", "uint8")])),
            ("b".to_string(), RawType::structure(vec![RawField::new("y", "uint16")])),
        ])
    }

    #[test]
    fn colliding_type_hashes_abort_loading() {
        let err = Schema::load_with_type_hasher(&raw_types(), &BTreeMap::new(), ExternalRegistry::new(), |_, _| Ok(7))
            .unwrap_err();
        match err {
            LoadError::HashCollision(HashCollisionError { first, second, hash }) => {
                assert_eq!((first.as_str(), second.as_str(), hash), ("a", "b", 7));
            }
            other => panic!("expected a hash collision, got {:?}", other),
        }
    }

    #[test]
    fn engine_hasher_matches_plain_load() {
        let plain = Schema::load(&raw_types(), &BTreeMap::new()).unwrap();
        let hooked =
            Schema::load_with_type_hasher(&raw_types(), &BTreeMap::new(), ExternalRegistry::new(), |engine, name| {
                engine.hash_type(name)
            })
            .unwrap();
        assert_eq!(plain.type_hash("a").unwrap(), hooked.type_hash("a").unwrap());
    }

    #[test]
    fn protocols_enumerated_in_name_order() {
        let protocols = BTreeMap::from([
            (
                "z/last".to_string(),
                RawProtocol {
                    proto_id: 1,
                    messages: BTreeMap::from([(0, RawMessage::new("m", "a"))]),
                    comment: None,
                },
            ),
            (
                "a/first".to_string(),
                RawProtocol {
                    proto_id: 2,
                    messages: BTreeMap::from([(3, RawMessage::new("m", "b")), (1, RawMessage::new("n", "a"))]),
                    comment: None,
                },
            ),
        ]);
        let schema = Schema::load(&raw_types(), &protocols).unwrap();
        let infos = schema.protocols().unwrap();
        let names: Vec<&str> = infos.iter().map(|p| p.proto_name).collect();
        assert_eq!(names, vec!["a/first", "z/last"]);
        let ids: Vec<u16> = infos[0].messages.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn schema_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Schema>();
    }
}
