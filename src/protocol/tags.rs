//! Structure tags, one table per supported version. Values match seabolt's
//! `bolt/v1.h`/`bolt/v3.h` definitions exactly so a packet capture compares
//! byte-for-byte against other Bolt implementations.

use crate::protocol::Version;

pub const INIT: i8 = 0x01;
pub const HELLO: i8 = 0x01;
pub const GOODBYE: i8 = 0x02;
pub const ACK_FAILURE: i8 = 0x0E;
pub const RESET: i8 = 0x0F;
pub const RUN: i8 = 0x10;
pub const BEGIN: i8 = 0x11;
pub const COMMIT: i8 = 0x12;
pub const ROLLBACK: i8 = 0x13;
pub const DISCARD_ALL: i8 = 0x2F;
pub const PULL_ALL: i8 = 0x3F;

pub const SUCCESS: i8 = 0x70;
pub const RECORD: i8 = 0x71;
pub const IGNORED: i8 = 0x7E;
pub const FAILURE: i8 = 0x7F;

/// True if `tag` is a request this core may *write* on `version`.
pub fn is_writable(version: Version, tag: i8) -> bool {
    match tag {
        INIT | RUN | DISCARD_ALL | PULL_ALL | RESET => true,
        ACK_FAILURE => version == Version::V1 || version == Version::V2,
        BEGIN | COMMIT | ROLLBACK | GOODBYE => version == Version::V3,
        _ => false,
    }
}

/// True if `tag` is a response this core may *read* on `version`.
pub fn is_readable(_version: Version, tag: i8) -> bool {
    matches!(tag, SUCCESS | RECORD | IGNORED | FAILURE)
}

/// True if `tag` classifies as a summary (terminates a response stream)
/// rather than a record.
pub fn is_summary(tag: i8) -> bool {
    matches!(tag, SUCCESS | IGNORED | FAILURE)
}
