//! Codec behavior against a linked schema: round trips, skipping, strictness.

use idlwire::{
    decode, encode, link, parse, Codec, CodecOptions, DecodeErrorKind, EncodeError, EnumValue, StructValue, TypeRegistry,
    TypeSpec, UnionValue, Value, ValueErrorKind,
};
use std::collections::{BTreeMap, BTreeSet};

const SCHEMA: &str = r#"
enum Color { RED = 1, GREEN = 2, BLUE = 3 }
typedef list<string> Tags

struct Point {
  1: required i32 x
  2: required i32 y
}

union Shape {
  1: double circle
  2: Point corner
}

struct Node {
  1: i32 value
  2: list<Node> children
}

struct Item {
  1: required i64 id
  2: optional string name
  3: Color color = Color.GREEN
  4: optional Tags tags
  5: optional set<i16> codes
  6: optional map<string, double> weights
  7: optional binary blob
  8: optional Shape shape
  9: optional bool flag
  10: optional byte small
}
"#;

fn registry() -> TypeRegistry {
    link(vec![parse(SCHEMA, "shop.thrift").unwrap()]).unwrap()
}

fn spec(r: &TypeRegistry, name: &str) -> TypeSpec {
    r.resolve(name).unwrap()
}

fn full_item(r: &TypeRegistry) -> Value {
    let color = spec(r, "shop.Color");
    Value::Struct(
        StructValue::new()
            .with(1, 42i64)
            .with(2, "widget")
            .with(3, EnumValue::named(r, &color, "BLUE").unwrap())
            .with(4, Value::List(vec!["a".into(), "b".into()]))
            .with(5, Value::Set(BTreeSet::from([Value::I16(3), Value::I16(1)])))
            .with(6, Value::Map(BTreeMap::from([(Value::from("w"), Value::Double(1.5))])))
            .with(7, Value::Binary(vec![0, 1, 2, 255]))
            .with(8, UnionValue::new(2, StructValue::new().with(1, 1i32).with(2, 2i32)))
            .with(9, true)
            .with(10, Value::Byte(-3)),
    )
}

#[test]
fn every_kind_round_trips() {
    let r = registry();
    let item = spec(&r, "shop.Item");
    let value = full_item(&r);
    let bytes = encode(&r, &value, &item).unwrap();
    assert_eq!(decode(&r, &bytes, &item).unwrap(), value);
}

#[test]
fn recursive_tree_round_trips() {
    let r = registry();
    let node = spec(&r, "shop.Node");
    let leaf = |v: i32| Value::Struct(StructValue::new().with(1, v).with(2, Value::List(vec![])));
    let tree = Value::Struct(StructValue::new().with(1, 0i32).with(2, Value::List(vec![leaf(1), leaf(2)])));
    let bytes = encode(&r, &tree, &node).unwrap();
    assert_eq!(decode(&r, &bytes, &node).unwrap(), tree);
}

#[test]
fn fields_are_written_in_declaration_order() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    let bytes = encode(&r, &Value::Struct(StructValue::new().with(2, 7i32).with(1, 5i32)), &point).unwrap();
    assert_eq!(bytes, vec![8, 0, 1, 0, 0, 0, 5, 8, 0, 2, 0, 0, 0, 7, 0]);
}

#[test]
fn unknown_field_is_skipped() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    let mut bytes = vec![11, 0, 99, 0, 0, 0, 3, b'x', b'y', b'z'];
    bytes.extend([8, 0, 1, 0, 0, 0, 5, 8, 0, 2, 0, 0, 0, 6, 0]);
    let value = decode(&r, &bytes, &point).unwrap();
    assert_eq!(value, Value::Struct(StructValue::new().with(1, 5i32).with(2, 6i32)));
}

#[test]
fn unknown_nested_struct_field_is_skipped() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    let bytes = vec![
        12, 0, 50, // unknown struct field
        15, 0, 1, 8, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 2, // list<i32> [1, 2]
        0, // end of unknown struct
        8, 0, 1, 0, 0, 0, 1, 8, 0, 2, 0, 0, 0, 2, 0,
    ];
    assert_eq!(decode(&r, &bytes, &point).unwrap().as_struct().unwrap().len(), 2);
}

#[test]
fn encode_rejects_missing_required_field() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    let err = encode(&r, &Value::Struct(StructValue::new().with(1, 1i32)), &point).unwrap_err();
    match err {
        EncodeError::ValueSpecMismatch(e) => {
            assert!(matches!(e.kind, ValueErrorKind::MissingRequiredField { id: 2, .. }))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn encode_rejects_wrong_variant_deep_inside() {
    let r = registry();
    let item = spec(&r, "shop.Item");
    let value = Value::Struct(StructValue::new().with(1, 1i64).with(4, Value::List(vec![Value::I32(3)])));
    match encode(&r, &value, &item).unwrap_err() {
        EncodeError::ValueSpecMismatch(e) => {
            assert!(matches!(e.kind, ValueErrorKind::WrongVariant { .. }));
            assert_eq!(e.path.field_ids(), vec![4]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn encode_rejects_undeclared_field() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    let value = Value::Struct(StructValue::new().with(1, 1i32).with(2, 2i32).with(3, 3i32));
    assert!(matches!(encode(&r, &value, &point), Err(EncodeError::ValueSpecMismatch(_))));
}

#[test]
fn decode_rejects_missing_required_field() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    let err = decode(&r, &[8, 0, 1, 0, 0, 0, 5, 0], &point).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::MissingRequiredField { id: 2, .. }));
}

#[test]
fn union_with_two_fields_on_the_wire_is_rejected() {
    let r = registry();
    let shape = spec(&r, "shop.Shape");
    let mut bytes = vec![4, 0, 1];
    bytes.extend(2.0f64.to_be_bytes());
    bytes.extend([12, 0, 2, 8, 0, 1, 0, 0, 0, 1, 8, 0, 2, 0, 0, 0, 1, 0]);
    bytes.push(0);
    let err = decode(&r, &bytes, &shape).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::InvalidUnionArity { count: 2, .. }));
}

#[test]
fn empty_union_on_the_wire_is_rejected() {
    let r = registry();
    let err = decode(&r, &[0], &spec(&r, "shop.Shape")).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::InvalidUnionArity { count: 0, .. }));
}

#[test]
fn union_value_round_trips() {
    let r = registry();
    let shape = spec(&r, "shop.Shape");
    let v = Value::new_union(&r, &shape, [(1, Value::Double(0.25))]).unwrap();
    let bytes = encode(&r, &v, &shape).unwrap();
    assert_eq!(bytes.len(), 1 + 2 + 8 + 1);
    assert_eq!(decode(&r, &bytes, &shape).unwrap(), v);
    assert!(Value::new_union(&r, &shape, Vec::new()).is_err());
}

#[test]
fn unknown_enum_value_is_kept_raw() {
    let r = registry();
    let color = spec(&r, "shop.Color");
    let v = decode(&r, &[0, 0, 0, 42], &color).unwrap();
    let e = v.as_enum().unwrap();
    assert_eq!(e.value, 42);
    assert_eq!(e.name, None);
    assert_eq!(encode(&r, &v, &color).unwrap(), vec![0, 0, 0, 42]);
}

#[test]
fn known_enum_value_is_tagged() {
    let r = registry();
    let v = decode(&r, &[0, 0, 0, 3], &spec(&r, "shop.Color")).unwrap();
    assert_eq!(v.as_enum().unwrap().name.as_deref(), Some("BLUE"));
}

#[test]
fn truncated_string_is_reported() {
    let r = registry();
    let err = decode(&r, &[0, 0, 0, 10, b'a', b'b', b'c'], &TypeSpec::String).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::TruncatedInput));
}

#[test]
fn truncated_struct_is_reported_with_path() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    let err = decode(&r, &[8, 0, 1, 0, 0], &point).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::TruncatedInput));
    assert_eq!(err.path.field_ids(), vec![1]);
}

#[test]
fn field_tag_must_match_exactly() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    // field 1 sent as i16
    let err = decode(&r, &[6, 0, 1, 0, 5, 0], &point).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::UnexpectedTypeTag { found: 6, .. }));
    assert_eq!(err.offset, 0);
}

#[test]
fn list_element_tag_must_match() {
    let r = registry();
    let list = TypeSpec::list(TypeSpec::I32);
    let err = decode(&r, &[10, 0, 0, 0, 0], &list).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::UnexpectedTypeTag { found: 10, .. }));
}

#[test]
fn set_duplicates_collapse() {
    let r = registry();
    let set = TypeSpec::set(TypeSpec::I16);
    let v = decode(&r, &[6, 0, 0, 0, 3, 0, 1, 0, 2, 0, 1], &set).unwrap();
    assert_eq!(v.as_set().unwrap().len(), 2);
}

#[test]
fn set_is_written_in_value_order() {
    let r = registry();
    let set = TypeSpec::set(TypeSpec::I16);
    let v = Value::Set(BTreeSet::from([Value::I16(9), Value::I16(-1)]));
    assert_eq!(encode(&r, &v, &set).unwrap(), vec![6, 0, 0, 0, 2, 0xff, 0xff, 0, 9]);
}

#[test]
fn repeated_map_key_keeps_last_value() {
    let r = registry();
    let map = TypeSpec::map(TypeSpec::Byte, TypeSpec::Byte);
    let v = decode(&r, &[3, 3, 0, 0, 0, 2, 1, 10, 1, 20], &map).unwrap();
    assert_eq!(v.as_map().unwrap().get(&Value::Byte(1)), Some(&Value::Byte(20)));
}

#[test]
fn repeated_struct_field_keeps_last_value() {
    let r = registry();
    let point = spec(&r, "shop.Point");
    let bytes = [8, 0, 1, 0, 0, 0, 1, 8, 0, 1, 0, 0, 0, 9, 8, 0, 2, 0, 0, 0, 2, 0];
    let v = decode(&r, &bytes, &point).unwrap();
    assert_eq!(v.as_struct().unwrap().get(1), Some(&Value::I32(9)));
}

#[test]
fn invalid_utf8_string_is_rejected_but_binary_accepts_it() {
    let r = registry();
    let bytes = [0, 0, 0, 2, 0xc3, 0x28];
    assert!(matches!(decode(&r, &bytes, &TypeSpec::String).unwrap_err().kind, DecodeErrorKind::InvalidUtf8));
    assert_eq!(decode(&r, &bytes, &TypeSpec::Binary).unwrap(), Value::Binary(vec![0xc3, 0x28]));
}

#[test]
fn typedef_specs_encode_as_their_target() {
    let r = registry();
    let tags = spec(&r, "shop.Tags");
    let v = Value::List(vec!["x".into()]);
    let via_typedef = encode(&r, &v, &tags).unwrap();
    assert_eq!(via_typedef, encode(&r, &v, &TypeSpec::list(TypeSpec::String)).unwrap());
}

#[test]
fn new_struct_fills_defaults() {
    let r = registry();
    let item = spec(&r, "shop.Item");
    let v = Value::new_struct(&r, &item, [(1, Value::I64(5))]).unwrap();
    let s = v.as_struct().unwrap();
    assert_eq!(s.get(3).and_then(Value::as_enum).map(|e| e.value), Some(2));
    assert!(!s.contains(2));
    assert!(Value::new_struct(&r, &item, Vec::new()).is_err());
}

#[test]
fn decode_does_not_fill_defaults() {
    let r = registry();
    let item = spec(&r, "shop.Item");
    let v = decode(&r, &[10, 0, 1, 0, 0, 0, 0, 0, 0, 0, 7, 0], &item).unwrap();
    assert!(!v.as_struct().unwrap().contains(3));
}

#[test]
fn trailing_bytes_are_an_error_for_decode_only() {
    let r = registry();
    let codec = Codec::new(&r, CodecOptions::default());
    let err = codec.decode(&[0, 0, 0, 1, 0xff], &TypeSpec::I32).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::TrailingBytes(1)));

    let mut src = idlwire::SliceSource::new(&[0, 0, 0, 1, 0xff]);
    assert_eq!(codec.read(&TypeSpec::I32, &mut src).unwrap(), Value::I32(1));
    assert_eq!(src.remaining_bytes(), &[0xff]);
}

#[test]
fn container_limit_is_enforced() {
    let r = registry();
    let options = CodecOptions { max_container_length: 2, ..CodecOptions::default() };
    let codec = Codec::new(&r, options);
    let err = codec.decode(&[3, 0, 0, 0, 3, 1, 2, 3], &TypeSpec::list(TypeSpec::Byte)).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::NegativeOrExcessiveLength { length: 3, limit: 2 }));
}

#[test]
fn negative_container_count_is_rejected() {
    let r = registry();
    let err = decode(&r, &[3, 0xff, 0xff, 0xff, 0xff], &TypeSpec::list(TypeSpec::Byte)).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::NegativeOrExcessiveLength { length: -1, .. }));
}

#[test]
fn write_to_a_sink_matches_encode() {
    let r = registry();
    let codec = Codec::new(&r, CodecOptions::default());
    let item = spec(&r, "shop.Item");
    let value = full_item(&r);
    let mut sink = Vec::new();
    let n = codec.write(&value, &item, &mut sink).unwrap();
    assert_eq!(n, sink.len());
    assert_eq!(sink, codec.encode(&value, &item).unwrap());
}

#[test]
fn streamed_decode_matches_slice_decode() {
    let r = registry();
    let codec = Codec::new(&r, CodecOptions::default());
    let item = spec(&r, "shop.Item");
    let bytes = codec.encode(&full_item(&r), &item).unwrap();
    let mut src = idlwire::StreamSource::new(std::io::Cursor::new(bytes.clone()));
    assert_eq!(codec.read(&item, &mut src).unwrap(), codec.decode(&bytes, &item).unwrap());
}

#[test]
fn streamed_oversized_list_header_is_truncated_input() {
    let r = TypeRegistry::default();
    let codec = Codec::new(&r, CodecOptions::default());
    let bytes = [10u8, 0x00, 0xff, 0xff, 0xff];
    let mut src = idlwire::StreamSource::new(&bytes[..]);
    let err = codec.read(&TypeSpec::list(TypeSpec::I64), &mut src).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::TruncatedInput), "{:?}", err);
}

#[test]
fn streamed_oversized_string_header_is_truncated_input() {
    let r = TypeRegistry::default();
    let codec = Codec::new(&r, CodecOptions::default());
    let bytes = [0x03u8, 0xff, 0xff, 0xff, b'a', b'b'];
    let mut src = idlwire::StreamSource::new(&bytes[..]);
    let err = codec.read(&TypeSpec::Binary, &mut src).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::TruncatedInput), "{:?}", err);
    assert_eq!(err.offset, 4);
}

#[test]
fn streamed_string_longer_than_one_chunk_decodes() {
    let r = TypeRegistry::default();
    let codec = Codec::new(&r, CodecOptions::default());
    let text = "x".repeat(10_000);
    let bytes = codec.encode(&Value::from(text.as_str()), &TypeSpec::String).unwrap();
    let mut src = idlwire::StreamSource::new(&bytes[..]);
    assert_eq!(codec.read(&TypeSpec::String, &mut src).unwrap(), Value::String(text));
}
