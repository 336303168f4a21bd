//! Load-time error taxonomy. Encode/decode errors live in [`codec`](crate::codec).

use std::path::PathBuf;

/// A referenced type name is absent from the model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("type {missing} referenced by {referenced_by} not found")]
pub struct ResolutionError {
    pub missing: String,
    pub referenced_by: String,
}

/// Two distinct types produce the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("type {second} has the same hash {hash:#018x} as {first}")]
pub struct HashCollisionError {
    pub first: String,
    pub second: String,
    pub hash: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid name part {part:?} in {context}")]
    InvalidName { part: String, context: String },
    #[error("invalid type expression: {0}")]
    InvalidTypeExpr(String),
    #[error("{type_name}: {kind} {name:?} appears multiple times")]
    Duplicate { type_name: String, kind: &'static str, name: String },
    #[error("{type_name}: type_class {type_class} requires `{attribute}`")]
    MissingAttribute { type_name: String, type_class: &'static str, attribute: &'static str },
    #[error("{type_name}: {reason}")]
    InvalidType { type_name: String, reason: String },
    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    HashCollision(#[from] HashCollisionError),
    #[error("message {name} has message_id={declared} but key={key} in protocol {protocol}")]
    MessageIdMismatch { protocol: String, name: String, declared: u16, key: u16 },
    #[error("message {name} appears multiple times in protocol {protocol}")]
    DuplicateMessage { protocol: String, name: String },
    #[error("protocols {first} and {second} share proto_id={proto_id}")]
    DuplicateProtocolId { first: String, second: String, proto_id: u16 },
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("{path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Failed lookup on a loaded schema (unknown type, protocol or message).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("unsupported type_name={0}")]
    Type(String),
    #[error("unsupported proto_name={0}")]
    ProtocolName(String),
    #[error("unsupported proto_id={0}")]
    ProtocolId(u16),
    #[error("unsupported proto_name={proto_name} message_name={message_name}")]
    MessageName { proto_name: String, message_name: String },
    #[error("unsupported proto_id={proto_id} message_id={message_id}")]
    MessageId { proto_id: u16, message_id: u16 },
}
