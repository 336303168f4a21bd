//! Deserialize fuzz target: decode arbitrary bytes as every message of a small protocol.
//! Decoding must return Ok or Err without panicking, and whatever decodes must encode
//! back to the same number of bytes. Decimals are re-encoded canonically, so the bytes
//! themselves may differ.
//! Build with: cargo fuzz run deserialize_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fn schema() -> messgen::Schema {
    use messgen::raw::{RawBit, RawEnumValue, RawField, RawMessage, RawProtocol, RawType};
    use std::collections::BTreeMap;

    let types = BTreeMap::from([
        (
            "fuzz/mode".to_string(),
            RawType::enumeration("uint8", vec![RawEnumValue::new("off", 0), RawEnumValue::new("on", 1)]),
        ),
        (
            "fuzz/flags".to_string(),
            RawType::bitset("uint16", vec![RawBit::new("a", 0), RawBit::new("b", 9)]),
        ),
        (
            "fuzz/record".to_string(),
            RawType::structure(vec![
                RawField::new("id", "uint32"),
                RawField::new("mode", "fuzz/mode"),
                RawField::new("flags", "fuzz/flags"),
                RawField::new("ok", "bool"),
                RawField::new("price", "dec64"),
                RawField::new("name", "string"),
                RawField::new("samples", "float64[]"),
                RawField::new("grid", "int16[3]"),
                RawField::new("index", "bytes{string}"),
            ]),
        ),
    ]);
    let protocols = BTreeMap::from([(
        "fuzz/proto".to_string(),
        RawProtocol {
            proto_id: 1,
            messages: BTreeMap::from([
                (0, RawMessage::new("record", "fuzz/record")),
                (1, RawMessage::new("mode", "fuzz/mode")),
            ]),
            comment: None,
        },
    )]);
    messgen::Schema::load(&types, &protocols).expect("fuzz schema loads")
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    thread_local! {
        static SCHEMA: messgen::Schema = schema();
    }
    SCHEMA.with(|schema| {
        for proto in schema.protocols().expect("protocols resolve") {
            for msg in &proto.messages {
                if let Ok(value) = msg.type_converter.deserialize(data) {
                    let bytes = msg.type_converter.serialize(&value).expect("decoded value encodes");
                    assert_eq!(bytes.len(), data.len());
                }
            }
        }
    });
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run deserialize_fuzz");
}
