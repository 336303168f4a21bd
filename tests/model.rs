//! Type model, layout and hash properties over whole schemas.

use messgen::raw::{RawBit, RawEnumValue, RawField, RawType};
use messgen::{CodecError, Schema, SchemaError, TypeClass, TypeKind, TypeLayout, Value};
use std::collections::BTreeMap;

fn schema(types: Vec<(&str, RawType)>) -> Schema {
    let raw: BTreeMap<String, RawType> = types.into_iter().map(|(n, t)| (n.to_string(), t)).collect();
    Schema::load(&raw, &BTreeMap::new()).expect("load")
}

fn point(fields: &[(&str, &str)]) -> RawType {
    RawType::structure(fields.iter().map(|(n, t)| RawField::new(n, t)).collect())
}

fn color(values: &[(&str, i64)]) -> RawType {
    RawType::enumeration("uint8", values.iter().map(|(n, v)| RawEnumValue::new(n, *v)).collect())
}

fn hash_of(types: Vec<(&str, RawType)>, name: &str) -> u64 {
    schema(types).type_hash(name).expect("hash")
}

#[test]
fn test_dependencies_are_direct_references() {
    let s = schema(vec![
        ("geo/color", color(&[("red", 0)])),
        ("geo/shape", point(&[("c", "geo/color"), ("pts", "float32[2][]"), ("tags", "string{uint16}")])),
    ]);
    let deps: Vec<String> = s.type_def("geo/shape").expect("type").dependencies().into_iter().collect();
    assert_eq!(deps, vec!["float32[2][]", "geo/color", "string{uint16}"]);
    let deps: Vec<String> = s.type_def("geo/color").expect("type").dependencies().into_iter().collect();
    assert_eq!(deps, vec!["uint8"]);
    assert!(matches!(
        s.type_def("float32[2][]").expect("type").kind,
        TypeKind::Vector { ref element_type } if element_type == "float32[2]"
    ));
    assert_eq!(s.type_def("float32[2]").expect("type").type_class(), TypeClass::Array);
}

#[test]
fn test_sizes_propagate() {
    let s = schema(vec![
        ("inner", point(&[("a", "uint16"), ("b", "dec64")])),
        ("outer", point(&[("i", "inner[3]"), ("f", "bool")])),
        ("dynamic", point(&[("o", "outer"), ("s", "bytes")])),
    ]);
    assert_eq!(s.type_def("inner").expect("type").size, Some(10));
    assert_eq!(s.type_def("outer").expect("type").size, Some(31));
    assert_eq!(s.type_def("dynamic").expect("type").size, None);
}

#[test]
fn test_flat_classification() {
    let s = schema(vec![
        ("aligned", point(&[("a", "uint32"), ("b", "uint16"), ("c", "uint16")])),
        ("padded", point(&[("a", "uint8"), ("b", "uint64")])),
        ("flags", RawType::bitset("uint8", vec![RawBit::new("x", 0)])),
        ("holder", point(&[("a", "aligned[4]"), ("f", "flags")])),
        ("dynamic", point(&[("s", "string"), ("v", "uint8[]")])),
    ]);
    assert!(s.layout("aligned").expect("layout").flat);
    assert!(!s.layout("padded").expect("layout").flat);
    assert!(s.layout("aligned[4]").expect("layout").flat);
    assert!(s.layout("flags").expect("layout").flat);
    assert!(s.layout("holder").expect("layout").flat);
    assert!(!s.layout("string").expect("layout").flat);
    assert!(!s.layout("uint8[]").expect("layout").flat);
    assert!(!s.layout("dynamic").expect("layout").flat);
}

#[test]
fn test_array_of_padded_struct_is_flat_when_stride_matches_size() {
    let s = schema(vec![
        ("elem", point(&[("a", "uint8"), ("b", "uint32"), ("c", "uint8[3]")])),
        ("holder", point(&[("e", "elem[2]")])),
    ]);
    assert!(!s.layout("elem").expect("layout").flat);
    assert_eq!(s.layout("elem[2]").expect("layout"), TypeLayout { alignment: 4, size: Some(16), flat: true });
}

#[test]
fn test_zero_size_vector_count_is_limited() {
    let s = schema(vec![("empty", point(&[])), ("holder", point(&[("v", "empty[]")]))]);
    let value = s.deserialize("holder", &2u32.to_le_bytes()).expect("decode");
    assert_eq!(value.as_struct().and_then(|f| f.get("v")).and_then(Value::as_list).map(<[Value]>::len), Some(2));
    assert_eq!(s.serialize("holder", &value).expect("encode"), 2u32.to_le_bytes());
    assert!(matches!(
        s.deserialize("holder", &0x0100_0000u32.to_le_bytes()),
        Err(SchemaError::Codec(CodecError::TooManyElements { count: 0x0100_0000, .. }))
    ));
}

#[test]
fn test_wire_size_ignores_alignment() {
    let s = schema(vec![("padded", point(&[("a", "uint8"), ("b", "uint64"), ("c", "uint8")]))]);
    assert_eq!(s.layout("padded").expect("layout").size, Some(10));
    assert_eq!(s.layout("padded").expect("layout").alignment, 8);
    let groups = s.field_groups("padded").expect("groups");
    let names: Vec<Vec<&str>> = groups.iter().map(|g| g.fields.iter().map(String::as_str).collect()).collect();
    assert_eq!(names, vec![vec!["a"], vec!["b", "c"]]);
}

#[test]
fn test_hash_ignores_comments() {
    let plain = vec![
        ("c", color(&[("red", 0), ("blue", 1)])),
        ("p", point(&[("x", "int32"), ("col", "c")])),
    ];
    let mut commented_color = color(&[("red", 0), ("blue", 1)]);
    commented_color.comment = Some("A color".into());
    if let Some(values) = commented_color.values.as_mut() {
        values[1].comment = Some("The blue one".into());
    }
    let mut commented_point = point(&[("x", "int32"), ("col", "c")]);
    commented_point.comment = Some("A point".into());
    if let Some(fields) = commented_point.fields.as_mut() {
        fields[0].comment = Some("Horizontal".into());
    }
    let commented = vec![("c", commented_color), ("p", commented_point)];

    assert_eq!(hash_of(plain.clone(), "p"), hash_of(commented.clone(), "p"));
    assert_eq!(hash_of(plain, "c"), hash_of(commented, "c"));
}

#[test]
fn test_hash_sensitive_to_structure() {
    let base = hash_of(vec![("p", point(&[("x", "int32"), ("y", "int64")]))], "p");
    assert_ne!(base, hash_of(vec![("p", point(&[("y", "int64"), ("x", "int32")]))], "p"));
    assert_ne!(base, hash_of(vec![("p", point(&[("x", "int32"), ("y", "int32")]))], "p"));
    assert_ne!(base, hash_of(vec![("p", point(&[("x", "int32"), ("z", "int64")]))], "p"));

    let e = hash_of(vec![("c", color(&[("red", 0), ("blue", 1)]))], "c");
    assert_ne!(e, hash_of(vec![("c", color(&[("red", 0), ("blue", 2)]))], "c"));
}

#[test]
fn test_hash_follows_dependencies() {
    let with = |value: i64| {
        hash_of(
            vec![("c", color(&[("red", 0), ("blue", value)])), ("p", point(&[("col", "c[]")]))],
            "p",
        )
    };
    assert_ne!(with(1), with(2));
}

#[test]
fn test_hash_independent_of_schema() {
    let alone = hash_of(vec![("p", point(&[("x", "int32")]))], "p");
    let with_others = hash_of(
        vec![("p", point(&[("x", "int32")])), ("q", point(&[("p", "p"), ("s", "string")]))],
        "p",
    );
    assert_eq!(alone, with_others);
}

#[test]
fn test_invalid_records_rejected() {
    let raw = |t: RawType| -> BTreeMap<String, RawType> { BTreeMap::from([("t".to_string(), t)]) };
    let load = |t: RawType| Schema::load(&raw(t), &BTreeMap::new());

    assert!(load(RawType::enumeration("float32", vec![RawEnumValue::new("a", 0)])).is_err());
    assert!(load(RawType::enumeration("uint8", vec![RawEnumValue::new("a", 256)])).is_err());
    assert!(load(RawType::enumeration("int8", vec![RawEnumValue::new("a", 1), RawEnumValue::new("b", 1)])).is_err());
    assert!(load(RawType::bitset("int8", vec![RawBit::new("a", 0)])).is_err());
    assert!(load(RawType::bitset("uint8", vec![RawBit::new("a", 8)])).is_err());
    assert!(load(RawType::new(TypeClass::String)).is_err());
    assert!(load(point(&[("a", "uint8[04]")])).is_err());
    assert!(load(point(&[("a", "uint8[")])).is_err());

    let mut sized = point(&[("a", "uint8")]);
    sized.size = Some(1);
    assert!(load(sized).is_err());

    let shadow = BTreeMap::from([("uint8".to_string(), point(&[]))]);
    assert!(Schema::load(&shadow, &BTreeMap::new()).is_err());
}

#[test]
fn test_named_container_alias() {
    let mut alias = RawType::new(TypeClass::Vector);
    alias.element_type = Some("int16".into());
    let s = schema(vec![("ids", alias), ("holder", point(&[("v", "ids"), ("w", "int16[]")]))]);
    let bytes = s
        .serialize("holder", &messgen::Value::structure([("v", messgen::Value::List(vec![messgen::Value::I16(-2)]))]))
        .expect("serialize");
    assert_eq!(bytes, vec![1, 0, 0, 0, 0xfe, 0xff, 0, 0, 0, 0]);
    assert_ne!(s.type_hash("ids").expect("hash"), s.type_hash("int16[]").expect("hash"));
}
