//! The PackStream value codec: a byte-oriented self-describing format whose
//! marker byte identifies both a value's type family and, for small
//! payloads, its length.

pub mod decode;
pub mod encode;
pub mod marker;

pub use decode::{decode, ReadablePredicate};
pub use encode::{encode, WritablePredicate};
