//! Integration coverage for the PackStream codec: S3/S4 literal scenarios
//! and the round-trip/minimality properties (§8 properties 1-2).

use bolt_core::buffer::Buffer;
use bolt_core::packstream::decode::AcceptAll as DecodeAcceptAll;
use bolt_core::packstream::encode::AcceptAll as EncodeAcceptAll;
use bolt_core::packstream::{decode, encode};
use bolt_core::value::Value;

fn encode_to_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Buffer::new();
    encode(&mut buf, value, &EncodeAcceptAll).unwrap();
    buf.readable_slice().to_vec()
}

fn round_trip(value: &Value) -> Value {
    let bytes = encode_to_bytes(value);
    let mut buf = Buffer::new();
    buf.load_bytes(&bytes);
    decode(&mut buf, &DecodeAcceptAll).unwrap()
}

#[test]
fn s3_integer_encoding_widths() {
    assert_eq!(encode_to_bytes(&Value::Integer(-16)), vec![0xF0]);
    assert_eq!(encode_to_bytes(&Value::Integer(127)), vec![0x7F]);
    assert_eq!(encode_to_bytes(&Value::Integer(128)), vec![0xC8, 0x80]);
    assert_eq!(encode_to_bytes(&Value::Integer(200)), vec![0xC9, 0x00, 0xC8]);
    assert_eq!(
        encode_to_bytes(&Value::Integer(70_000)),
        vec![0xCA, 0x00, 0x01, 0x11, 0x70]
    );
    assert_eq!(
        encode_to_bytes(&Value::Integer(1_000_000_000)),
        vec![0xCB, 0x00, 0x00, 0x00, 0x00, 0x3B, 0x9A, 0xCA, 0x00]
    );
}

#[test]
fn s4_tiny_string_hello() {
    let encoded = encode_to_bytes(&Value::string("hello"));
    assert_eq!(encoded, vec![0x85, b'h', b'e', b'l', b'l', b'o']);

    let decoded = round_trip(&Value::string("hello"));
    assert_eq!(decoded.as_str(), Some("hello"));
    assert_eq!(decoded.logical_size(), 5);
}

#[test]
fn round_trip_law_holds_for_nested_containers() {
    let value = Value::dict(vec![
        ("a".to_string(), Value::Integer(42)),
        (
            "b".to_string(),
            Value::list(vec![Value::Boolean(true), Value::null(), Value::Float(1.5)]),
        ),
        ("c".to_string(), Value::bytes(vec![1, 2, 3, 4, 5])),
    ]);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn round_trip_law_holds_for_a_structure() {
    let value = Value::structure(0x4E, vec![Value::Integer(1), Value::string("n")]);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn minimality_tiny_vs_escalated_containers() {
    let small_list = Value::list((0..15).map(Value::Integer).collect());
    assert_eq!(encode_to_bytes(&small_list)[0] & 0xF0, 0x90);

    let large_list = Value::list((0..16).map(Value::Integer).collect());
    assert_eq!(encode_to_bytes(&large_list)[0], 0xD4);
}

#[test]
fn negative_container_length_decode_is_rejected() {
    // A STRING32 marker whose declared length, read as i32, is negative.
    let mut buf = Buffer::new();
    buf.load_bytes(&[0xD2, 0xFF, 0xFF, 0xFF, 0xFF]);
    assert!(decode(&mut buf, &DecodeAcceptAll).is_err());
}

#[test]
fn unreadable_structure_tag_is_rejected() {
    let value = Value::structure(0x7A, vec![]);
    let bytes = encode_to_bytes(&value);
    let mut buf = Buffer::new();
    buf.load_bytes(&bytes);
    let readable = |tag: i8| tag != 0x7A;
    assert!(decode(&mut buf, &readable).is_err());
}
