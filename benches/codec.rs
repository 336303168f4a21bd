//! Benchmark: serialize and deserialize a flat struct, a variable-size struct and a
//! batch of mixed messages through a loaded schema.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use messgen::raw::{RawEnumValue, RawField, RawMessage, RawProtocol, RawType};
use messgen::{Decimal64, Schema, Value};
use std::collections::BTreeMap;

fn build_schema() -> Schema {
    let mut types = BTreeMap::new();
    types.insert(
        "bench/tick".to_string(),
        RawType::structure(vec![
            RawField::new("ts", "uint64"),
            RawField::new("price", "dec64"),
            RawField::new("qty", "int64"),
            RawField::new("venue", "uint32"),
            RawField::new("flags", "uint16"),
            RawField::new("side", "bench/side"),
            RawField::new("pad", "uint8"),
        ]),
    );
    types.insert(
        "bench/side".to_string(),
        RawType::enumeration("uint8", vec![RawEnumValue::new("buy", 0), RawEnumValue::new("sell", 1)]),
    );
    types.insert(
        "bench/book".to_string(),
        RawType::structure(vec![
            RawField::new("symbol", "string"),
            RawField::new("bids", "bench/tick[]"),
            RawField::new("asks", "bench/tick[]"),
            RawField::new("attrs", "string{string}"),
            RawField::new("raw", "bytes"),
        ]),
    );

    let mut protocols = BTreeMap::new();
    protocols.insert(
        "bench/market".to_string(),
        RawProtocol {
            proto_id: 7,
            messages: BTreeMap::from([
                (0, RawMessage::new("tick", "bench/tick")),
                (1, RawMessage::new("book", "bench/book")),
            ]),
            comment: None,
        },
    );
    Schema::load(&types, &protocols).expect("load schema")
}

fn tick(i: u64) -> Value {
    Value::structure([
        ("ts", Value::U64(1_700_000_000_000 + i)),
        ("price", Value::Decimal(Decimal64::new(false, 12_345 + i as u128, -2))),
        ("qty", Value::I64(100 * i as i64)),
        ("venue", Value::U32(3)),
        ("flags", Value::U16(0x0101)),
        ("side", Value::Enum(if i % 2 == 0 { "buy" } else { "sell" }.into())),
        ("pad", Value::U8(0)),
    ])
}

fn book(levels: u64) -> Value {
    Value::structure([
        ("symbol", Value::from("XBTUSD")),
        ("bids", Value::List((0..levels).map(tick).collect())),
        ("asks", Value::List((levels..2 * levels).map(tick).collect())),
        (
            "attrs",
            Value::Map(vec![
                (Value::from("venue"), Value::from("primary")),
                (Value::from("session"), Value::from("regular")),
            ]),
        ),
        ("raw", Value::Bytes(vec![0xab; 64])),
    ])
}

fn bench_codec(c: &mut Criterion) {
    let schema = build_schema();
    let tick_msg = schema.message_info_by_name("bench/market", "tick").expect("tick");
    let book_msg = schema.message_info_by_name("bench/market", "book").expect("book");

    let tick_value = tick(1);
    let tick_bytes = tick_msg.type_converter.serialize(&tick_value).expect("serialize tick");
    let book_value = book(20);
    let book_bytes = book_msg.type_converter.serialize(&book_value).expect("serialize book");
    eprintln!("codec: tick {} bytes, book {} bytes", tick_bytes.len(), book_bytes.len());

    c.bench_function("serialize_tick", |b| {
        let mut buf = Vec::with_capacity(tick_bytes.len());
        b.iter(|| {
            buf.clear();
            tick_msg.type_converter.serialize_into(black_box(&tick_value), &mut buf).expect("serialize");
            black_box(buf.len())
        });
    });

    c.bench_function("deserialize_tick", |b| {
        b.iter(|| black_box(tick_msg.type_converter.deserialize(black_box(&tick_bytes)).expect("deserialize")));
    });

    c.bench_function("serialize_book_20", |b| {
        b.iter(|| black_box(book_msg.type_converter.serialize(black_box(&book_value)).expect("serialize")));
    });

    c.bench_function("deserialize_book_20", |b| {
        b.iter(|| black_box(book_msg.type_converter.deserialize(black_box(&book_bytes)).expect("deserialize")));
    });

    c.bench_function("round_trip_by_id", |b| {
        b.iter(|| {
            let msg = schema.message_info_by_id(7, black_box(1)).expect("message");
            let bytes = msg.type_converter.serialize(&book_value).expect("serialize");
            black_box(msg.type_converter.deserialize(&bytes).expect("deserialize"))
        });
    });
}

criterion_group!(benches, bench_codec);
criterion_main!(benches);
