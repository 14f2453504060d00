//! Encodes [`Value`]s into a [`Buffer`] using the smallest marker that fits.

use super::marker;
use crate::buffer::Buffer;
use crate::error::{ErrorCode, Result};
use crate::value::Value;

/// A predicate deciding whether a structure tag may be sent on the wire for
/// the negotiated protocol version. Structures whose tag is rejected fail
/// encoding with a protocol violation.
pub trait WritablePredicate {
    fn is_writable(&self, tag: i8) -> bool;
}

impl<F: Fn(i8) -> bool> WritablePredicate for F {
    fn is_writable(&self, tag: i8) -> bool {
        self(tag)
    }
}

/// Accepts every tag; useful for tests and for the round-trip law in the
/// codec's own unit tests.
pub struct AcceptAll;

impl WritablePredicate for AcceptAll {
    fn is_writable(&self, _tag: i8) -> bool {
        true
    }
}

pub fn encode(buf: &mut Buffer, value: &Value, writable: &dyn WritablePredicate) -> Result<()> {
    match value {
        Value::Null => buf.load_u8(marker::NULL),
        Value::Boolean(b) => buf.load_u8(if *b { marker::TRUE } else { marker::FALSE }),
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Float(f) => {
            buf.load_u8(marker::FLOAT64);
            buf.load_f64(*f);
        }
        Value::String(bytes) => encode_sized(
            buf,
            bytes.len(),
            marker::TINY_STRING_MIN,
            marker::STRING8,
            marker::STRING16,
            marker::STRING32,
            bytes,
        )?,
        Value::Bytes(bytes) => encode_bytes(buf, bytes)?,
        Value::List(items) => {
            encode_container_header(
                buf,
                items.len(),
                marker::TINY_LIST_MIN,
                marker::LIST8,
                marker::LIST16,
                marker::LIST32,
            )?;
            for item in items {
                encode(buf, item, writable)?;
            }
        }
        Value::Dictionary(pairs) => {
            encode_container_header(
                buf,
                pairs.len(),
                marker::TINY_MAP_MIN,
                marker::MAP8,
                marker::MAP16,
                marker::MAP32,
            )?;
            for (key, val) in pairs {
                encode_sized(
                    buf,
                    key.len(),
                    marker::TINY_STRING_MIN,
                    marker::STRING8,
                    marker::STRING16,
                    marker::STRING32,
                    key.as_bytes(),
                )?;
                encode(buf, val, writable)?;
            }
        }
        Value::Structure { tag, fields } => {
            if fields.len() > marker::TINY_CONTAINER_MAX_SIZE {
                return Err(err_protocol!(
                    "structure with {} fields exceeds the maximum of {}",
                    fields.len(),
                    marker::TINY_CONTAINER_MAX_SIZE
                ));
            }
            if !writable.is_writable(*tag) {
                return Err(bolt_err!(
                    ErrorCode::ProtocolUnsupportedType,
                    "structure tag 0x{:02X} is not writable in this protocol version",
                    tag
                ));
            }
            buf.load_u8(marker::TINY_STRUCT_MIN | fields.len() as u8);
            buf.load_i8(*tag);
            for field in fields {
                encode(buf, field, writable)?;
            }
        }
    }
    Ok(())
}

/// Integers: tiny form in `[-16, 127]`, else the smallest signed width that
/// represents the value (1, 2, 4, or 8 bytes).
fn encode_integer(buf: &mut Buffer, value: i64) {
    if (-16..=127).contains(&value) {
        buf.load_i8(value as i8);
    } else if (i8::MIN as i64..=i8::MAX as i64).contains(&value) {
        buf.load_u8(marker::INT8);
        buf.load_i8(value as i8);
    } else if (i16::MIN as i64..=i16::MAX as i64).contains(&value) {
        buf.load_u8(marker::INT16);
        buf.load_i16(value as i16);
    } else if (i32::MIN as i64..=i32::MAX as i64).contains(&value) {
        buf.load_u8(marker::INT32);
        buf.load_i32(value as i32);
    } else {
        buf.load_u8(marker::INT64);
        buf.load_i64(value);
    }
}

/// Bytes escalate at 256 rather than 16 (there is no tiny-bytes marker).
fn encode_bytes(buf: &mut Buffer, bytes: &[u8]) -> Result<()> {
    let len = bytes.len();
    if len < 256 {
        buf.load_u8(marker::BYTES8);
        buf.load_u8(len as u8);
    } else if len < 1 << 16 {
        buf.load_u8(marker::BYTES16);
        buf.load_u16(len as u16);
    } else if len <= i32::MAX as usize {
        buf.load_u8(marker::BYTES32);
        buf.load_i32(len as i32);
    } else {
        return Err(err_protocol!("bytes value of {} bytes is too large to encode", len));
    }
    buf.load_bytes(bytes);
    Ok(())
}

/// Strings: tiny form when `len < 16`, else escalate by size, like lists/maps.
fn encode_sized(
    buf: &mut Buffer,
    len: usize,
    tiny_base: u8,
    m8: u8,
    m16: u8,
    m32: u8,
    payload: &[u8],
) -> Result<()> {
    encode_container_header(buf, len, tiny_base, m8, m16, m32)?;
    buf.load_bytes(payload);
    Ok(())
}

fn encode_container_header(
    buf: &mut Buffer,
    len: usize,
    tiny_base: u8,
    m8: u8,
    m16: u8,
    m32: u8,
) -> Result<()> {
    if len < marker::TINY_CONTAINER_MAX_SIZE + 1 {
        buf.load_u8(tiny_base | len as u8);
    } else if len < 256 {
        buf.load_u8(m8);
        buf.load_u8(len as u8);
    } else if len < 1 << 16 {
        buf.load_u8(m16);
        buf.load_u16(len as u16);
    } else if len <= i32::MAX as usize {
        buf.load_u8(m32);
        buf.load_i32(len as i32);
    } else {
        return Err(err_protocol!("container of {} elements is too large to encode", len));
    }
    Ok(())
}
