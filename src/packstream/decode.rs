//! Decodes [`Value`]s from a [`Buffer`] by dispatching on the marker byte.

use super::marker;
use crate::buffer::Buffer;
use crate::error::{ErrorCode, Result};
use crate::value::Value;

/// A predicate deciding whether a decoded structure tag is one this protocol
/// version understands. Unknown tags fail with "unexpected marker".
pub trait ReadablePredicate {
    fn is_readable(&self, tag: i8) -> bool;
}

impl<F: Fn(i8) -> bool> ReadablePredicate for F {
    fn is_readable(&self, tag: i8) -> bool {
        self(tag)
    }
}

pub struct AcceptAll;

impl ReadablePredicate for AcceptAll {
    fn is_readable(&self, _tag: i8) -> bool {
        true
    }
}

/// A safety cap on decoded container/string/bytes length, independent of the
/// chunking framer's own cap on a single chunk. Nothing in the wire format
/// bounds a structure's total decoded size, so an implementation must pick
/// one; this mirrors the framer's own `MAX_MESSAGE_SIZE`.
pub const MAX_DECODE_SIZE: usize = 1 << 30;

pub fn decode(buf: &mut Buffer, readable: &dyn ReadablePredicate) -> Result<Value> {
    let marker = buf.unload_u8()?;

    if marker::is_tiny_int(marker) {
        return Ok(Value::Integer(marker::tiny_int_value(marker)));
    }

    match marker {
        marker::NULL => Ok(Value::Null),
        marker::TRUE => Ok(Value::Boolean(true)),
        marker::FALSE => Ok(Value::Boolean(false)),
        marker::FLOAT64 => Ok(Value::Float(buf.unload_f64()?)),
        marker::INT8 => Ok(Value::Integer(buf.unload_i8()? as i64)),
        marker::INT16 => Ok(Value::Integer(buf.unload_i16()? as i64)),
        marker::INT32 => Ok(Value::Integer(buf.unload_i32()? as i64)),
        marker::INT64 => Ok(Value::Integer(buf.unload_i64()?)),

        marker::BYTES8 => {
            let len = buf.unload_u8()? as usize;
            Ok(Value::bytes(read_bounded(buf, len)?))
        }
        marker::BYTES16 => {
            let len = buf.unload_u16()? as usize;
            Ok(Value::bytes(read_bounded(buf, len)?))
        }
        marker::BYTES32 => {
            let len = read_i32_length(buf)?;
            Ok(Value::bytes(read_bounded(buf, len)?))
        }

        marker::STRING8 => {
            let len = buf.unload_u8()? as usize;
            decode_string(buf, len)
        }
        marker::STRING16 => {
            let len = buf.unload_u16()? as usize;
            decode_string(buf, len)
        }
        marker::STRING32 => {
            let len = read_i32_length(buf)?;
            decode_string(buf, len)
        }

        marker::LIST8 => {
            let len = buf.unload_u8()? as usize;
            decode_list(buf, len, readable)
        }
        marker::LIST16 => {
            let len = buf.unload_u16()? as usize;
            decode_list(buf, len, readable)
        }
        marker::LIST32 => {
            let len = read_i32_length(buf)?;
            decode_list(buf, len, readable)
        }

        marker::MAP8 => {
            let len = buf.unload_u8()? as usize;
            decode_map(buf, len, readable)
        }
        marker::MAP16 => {
            let len = buf.unload_u16()? as usize;
            decode_map(buf, len, readable)
        }
        marker::MAP32 => {
            let len = read_i32_length(buf)?;
            decode_map(buf, len, readable)
        }

        m if (marker::TINY_STRING_MIN..=marker::TINY_STRING_MAX).contains(&m) => {
            decode_string(buf, (m & 0x0F) as usize)
        }
        m if (marker::TINY_LIST_MIN..=marker::TINY_LIST_MAX).contains(&m) => {
            decode_list(buf, (m & 0x0F) as usize, readable)
        }
        m if (marker::TINY_MAP_MIN..=marker::TINY_MAP_MAX).contains(&m) => {
            decode_map(buf, (m & 0x0F) as usize, readable)
        }
        m if (marker::TINY_STRUCT_MIN..=marker::TINY_STRUCT_MAX).contains(&m) => {
            decode_structure(buf, (m & 0x0F) as usize, readable)
        }

        other => Err(err_protocol!("unexpected marker byte 0x{:02X}", other)),
    }
}

fn read_i32_length(buf: &mut Buffer) -> Result<usize> {
    let len = buf.unload_i32()?;
    if len < 0 {
        return Err(err_protocol!("negative length {} in container header", len));
    }
    let len = len as usize;
    if len > MAX_DECODE_SIZE {
        return Err(err_protocol!(
            "declared length {} exceeds the maximum decodable size of {} bytes",
            len,
            MAX_DECODE_SIZE
        ));
    }
    Ok(len)
}

fn read_bounded<'a>(buf: &'a mut Buffer, len: usize) -> Result<&'a [u8]> {
    if len > MAX_DECODE_SIZE {
        return Err(err_protocol!(
            "declared length {} exceeds the maximum decodable size of {} bytes",
            len,
            MAX_DECODE_SIZE
        ));
    }
    buf.unload_bytes(len)
}

fn decode_string(buf: &mut Buffer, len: usize) -> Result<Value> {
    let bytes = read_bounded(buf, len)?;
    std::str::from_utf8(bytes)
        .map_err(|e| err_protocol!("string payload is not valid utf-8: {}", e))?;
    Ok(Value::bytes(bytes).relabel_as_string())
}

fn decode_list(buf: &mut Buffer, len: usize, readable: &dyn ReadablePredicate) -> Result<Value> {
    if len > MAX_DECODE_SIZE {
        return Err(err_protocol!("declared list length {} is unreasonably large", len));
    }
    let mut items = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        items.push(decode(buf, readable)?);
    }
    Ok(Value::List(items))
}

fn decode_map(buf: &mut Buffer, len: usize, readable: &dyn ReadablePredicate) -> Result<Value> {
    if len > MAX_DECODE_SIZE {
        return Err(err_protocol!("declared map length {} is unreasonably large", len));
    }
    let mut pairs = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        let key = decode(buf, readable)?;
        let key = key
            .as_str()
            .ok_or_else(|| err_protocol!("map key must be a string"))?
            .to_string();
        let value = decode(buf, readable)?;
        pairs.push((key, value));
    }
    Ok(Value::Dictionary(pairs))
}

fn decode_structure(
    buf: &mut Buffer,
    size: usize,
    readable: &dyn ReadablePredicate,
) -> Result<Value> {
    let tag = buf.unload_i8()?;
    if !readable.is_readable(tag) {
        return Err(bolt_err!(
            ErrorCode::ProtocolUnsupportedType,
            "structure tag 0x{:02X} is not readable in this protocol version",
            tag
        ));
    }
    let mut fields = Vec::with_capacity(size);
    for _ in 0..size {
        fields.push(decode(buf, readable)?);
    }
    Ok(Value::Structure { tag, fields })
}

impl Value {
    /// Internal helper: reinterprets a just-decoded `Bytes` payload as the
    /// `String` variant without a second copy.
    fn relabel_as_string(self) -> Value {
        match self {
            Value::Bytes(b) => Value::String(b),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packstream::encode::{encode, AcceptAll as EncodeAcceptAll};

    fn roundtrip(v: &Value) -> Value {
        let mut buf = Buffer::new();
        encode(&mut buf, v, &EncodeAcceptAll).unwrap();
        decode(&mut buf, &AcceptAll).unwrap()
    }

    #[test]
    fn hello_string_decodes_expected_bytes() {
        let mut buf = Buffer::new();
        buf.load_bytes(&[0x85, 0x68, 0x65, 0x6C, 0x6C, 0x6F]);
        let v = decode(&mut buf, &AcceptAll).unwrap();
        assert_eq!(v.as_str(), Some("hello"));
    }

    #[test]
    fn negative_length_is_protocol_violation() {
        let mut buf = Buffer::new();
        buf.load_u8(marker::STRING32);
        buf.load_i32(-1);
        assert!(decode(&mut buf, &AcceptAll).is_err());
    }

    #[test]
    fn unreadable_structure_tag_fails() {
        let mut buf = Buffer::new();
        encode(&mut buf, &Value::structure(0x01, vec![]), &EncodeAcceptAll).unwrap();
        let err = decode(&mut buf, &(|_: i8| false)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProtocolUnsupportedType);
    }

    #[test]
    fn roundtrip_law_holds_for_every_family() {
        let samples = vec![
            Value::Null,
            Value::Boolean(true),
            Value::Integer(-16),
            Value::Integer(127),
            Value::Integer(128),
            Value::Integer(1_000_000_000),
            Value::Float(1.5),
            Value::string("hello"),
            Value::bytes([0u8; 300].to_vec()),
            Value::list(vec![Value::from(1i64), Value::string("x")]),
            Value::dict(vec![("a".into(), Value::from(1i64))]),
            Value::structure(0x01, vec![Value::from(1i64)]),
        ];
        for sample in samples {
            assert_eq!(roundtrip(&sample), sample);
        }
    }
}
