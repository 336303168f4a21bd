//! # messgen: schema-driven binary messages
//!
//! Declarative type and protocol descriptors are resolved into an immutable model that
//! defines a canonical little-endian wire format, structural fingerprints for schema
//! compatibility checks, and a reference codec that encodes and decodes [`Value`]s.
//!
//! ## Type names
//!
//! - Scalars: `bool`, `int8`, `uint8`, `int16`, `uint16`, `int32`, `uint32`, `int64`,
//!   `uint64`, `float32`, `float64`
//! - `string`, `bytes`, and the 64-bit decimal `dec64`
//! - `T[]` vector, `T[N]` fixed array, `V{K}` map from `K` to `V`
//! - Declared types by namespaced name: `messgen/test/simple_struct`
//!
//! ## Wire format
//!
//! No padding anywhere. Struct fields in declaration order, arrays without a count,
//! vectors, maps, strings and bytes prefixed with a `uint32` count, enums and bitsets as
//! their base integer, decimals as BID64.
//!
//! ## Usage
//!
//! ```
//! use messgen::raw::{RawField, RawMessage, RawProtocol, RawType};
//! use messgen::{Schema, Value};
//! use std::collections::BTreeMap;
//!
//! let mut types = BTreeMap::new();
//! types.insert(
//!     "demo/point".to_string(),
//!     RawType::structure(vec![RawField::new("x", "int32"), RawField::new("y", "int32")]),
//! );
//! let mut protocols = BTreeMap::new();
//! protocols.insert(
//!     "demo/proto".to_string(),
//!     RawProtocol {
//!         proto_id: 1,
//!         messages: BTreeMap::from([(0, RawMessage::new("point", "demo/point"))]),
//!         comment: None,
//!     },
//! );
//!
//! let schema = Schema::load(&types, &protocols).expect("load");
//! let msg = schema.message_info_by_name("demo/proto", "point").expect("message");
//! let value = Value::structure([("x", Value::I32(1)), ("y", Value::I32(-1))]);
//! let bytes = msg.type_converter.serialize(&value).expect("serialize");
//! assert_eq!(bytes.len(), 8);
//! assert_eq!(msg.type_converter.deserialize(&bytes).expect("deserialize"), value);
//! ```

pub mod codec;
pub mod decimal;
pub mod error;
pub mod external;
pub mod hash;
pub mod layout;
pub mod loader;
pub mod manifest;
pub mod model;
pub mod parser;
pub mod protocol;
pub mod raw;
pub mod validation;
pub mod value;

pub use codec::{Codec, CodecError, TypeConverter};
pub use decimal::Decimal64;
pub use error::{HashCollisionError, LoadError, LookupError, ResolutionError};
pub use external::{ExternalCodec, ExternalRegistry};
pub use hash::{hash_type, HashEngine, HashError};
pub use layout::{FieldGroup, LayoutPlanner, TypeLayout};
pub use loader::{load_schema, ProtocolSource};
pub use model::{Message, Protocol, ScalarKind, TypeDef, TypeKind, TypeMap};
pub use protocol::{MessageInfo, ProtocolInfo, Schema, SchemaError};
pub use raw::TypeClass;
pub use value::Value;
