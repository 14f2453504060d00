//! PackStream marker byte constants (spec-mandated, not open to change).

pub const NULL: u8 = 0xC0;
pub const FLOAT64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT8: u8 = 0xC8;
pub const INT16: u8 = 0xC9;
pub const INT32: u8 = 0xCA;
pub const INT64: u8 = 0xCB;

pub const BYTES8: u8 = 0xCC;
pub const BYTES16: u8 = 0xCD;
pub const BYTES32: u8 = 0xCE;

pub const STRING8: u8 = 0xD0;
pub const STRING16: u8 = 0xD1;
pub const STRING32: u8 = 0xD2;

pub const LIST8: u8 = 0xD4;
pub const LIST16: u8 = 0xD5;
pub const LIST32: u8 = 0xD6;

pub const MAP8: u8 = 0xD8;
pub const MAP16: u8 = 0xD9;
pub const MAP32: u8 = 0xDA;

pub const TINY_STRING_MIN: u8 = 0x80;
pub const TINY_STRING_MAX: u8 = 0x8F;
pub const TINY_LIST_MIN: u8 = 0x90;
pub const TINY_LIST_MAX: u8 = 0x9F;
pub const TINY_MAP_MIN: u8 = 0xA0;
pub const TINY_MAP_MAX: u8 = 0xAF;
pub const TINY_STRUCT_MIN: u8 = 0xB0;
pub const TINY_STRUCT_MAX: u8 = 0xBF;

pub const TINY_INT_POSITIVE_MAX: u8 = 0x7F;
pub const TINY_INT_NEGATIVE_MIN: u8 = 0xF0;

pub const TINY_CONTAINER_MAX_SIZE: usize = 0x0F;

#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= TINY_INT_POSITIVE_MAX || marker >= TINY_INT_NEGATIVE_MIN
}

#[inline]
pub fn tiny_int_value(marker: u8) -> i64 {
    marker as i8 as i64
}
