//! Host-provided codecs for `external` types.

use crate::codec::CodecError;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Alignment assumed for an external type without a registered codec.
pub const DEFAULT_EXTERNAL_ALIGNMENT: usize = 8;

/// Encoding of one external type, supplied by the host application.
pub trait ExternalCodec: Send + Sync {
    /// Static encoded size, if fixed.
    fn size(&self) -> Option<usize>;

    fn alignment(&self) -> usize {
        DEFAULT_EXTERNAL_ALIGNMENT
    }

    /// Append the encoding of `value` to `out`.
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decode one value from the start of `input`, returning it and the bytes consumed.
    fn decode(&self, input: &[u8]) -> Result<(Value, usize), CodecError>;

    fn default_value(&self) -> Value;
}

/// External codecs by type name. Passed to [`Schema::load_with_externals`](crate::Schema::load_with_externals).
#[derive(Clone, Default)]
pub struct ExternalRegistry {
    codecs: BTreeMap<String, Arc<dyn ExternalCodec>>,
}

impl ExternalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, type_name: impl Into<String>, codec: Arc<dyn ExternalCodec>) -> &mut Self {
        self.codecs.insert(type_name.into(), codec);
        self
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn ExternalCodec>> {
        self.codecs.get(type_name)
    }

    pub fn alignment(&self, type_name: &str) -> usize {
        self.get(type_name)
            .map(|c| c.alignment())
            .unwrap_or(DEFAULT_EXTERNAL_ALIGNMENT)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }
}

impl fmt::Debug for ExternalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRegistry")
            .field("types", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}
