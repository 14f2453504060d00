//! An append-then-consume byte buffer with a read cursor.
//!
//! `Buffer` tracks three positions over a single growable backing store:
//! `extent` (how much has been written), `cursor` (how much has been read),
//! and capacity (`bytes.capacity()`). It never shrinks on its own; callers
//! reclaim consumed space with [`Buffer::compact`].

use byteorder::{BigEndian, ByteOrder};
use bytes::BytesMut;

use crate::error::{ErrorCode, Result};

#[derive(Debug, Default)]
pub struct Buffer {
    bytes: BytesMut,
    cursor: usize,
}

impl Buffer {
    pub fn new() -> Self {
        Buffer::with_capacity(4096)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            bytes: BytesMut::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Bytes written so far (the write extent).
    pub fn extent(&self) -> usize {
        self.bytes.len()
    }

    /// Current read position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes available to read: `extent - cursor`.
    pub fn readable(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.readable() == 0
    }

    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Appends raw bytes, growing capacity as needed.
    pub fn load_bytes(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    pub fn load_u8(&mut self, value: u8) {
        self.bytes.extend_from_slice(&[value]);
    }

    pub fn load_i8(&mut self, value: i8) {
        self.load_u8(value as u8);
    }

    pub fn load_u16(&mut self, value: u16) {
        let mut buf = [0u8; 2];
        BigEndian::write_u16(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    pub fn load_i16(&mut self, value: i16) {
        self.load_u16(value as u16);
    }

    pub fn load_u32(&mut self, value: u32) {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    pub fn load_i32(&mut self, value: i32) {
        self.load_u32(value as u32);
    }

    pub fn load_u64(&mut self, value: u64) {
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    pub fn load_i64(&mut self, value: i64) {
        self.load_u64(value as u64);
    }

    pub fn load_f64(&mut self, value: f64) {
        let mut buf = [0u8; 8];
        BigEndian::write_f64(&mut buf, value);
        self.bytes.extend_from_slice(&buf);
    }

    /// Returns the next byte without advancing the cursor.
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.cursor).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.cursor + offset).copied()
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.cursor + n > self.bytes.len() {
            return Err(err_protocol!(
                "buffer underrun: need {} bytes, have {}",
                n,
                self.readable()
            ));
        }
        Ok(())
    }

    /// Consumes `n` bytes from the cursor, returning a view into them.
    pub fn unload_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.require(n)?;
        let start = self.cursor;
        self.cursor += n;
        Ok(&self.bytes[start..self.cursor])
    }

    pub fn unload_u8(&mut self) -> Result<u8> {
        Ok(self.unload_bytes(1)?[0])
    }

    pub fn unload_i8(&mut self) -> Result<i8> {
        Ok(self.unload_u8()? as i8)
    }

    pub fn unload_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.unload_bytes(2)?))
    }

    pub fn unload_i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.unload_bytes(2)?))
    }

    pub fn unload_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.unload_bytes(4)?))
    }

    pub fn unload_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.unload_bytes(4)?))
    }

    pub fn unload_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.unload_bytes(8)?))
    }

    pub fn unload_i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.unload_bytes(8)?))
    }

    pub fn unload_f64(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.unload_bytes(8)?))
    }

    /// Discards bytes in `[0, cursor)`, shifting the tail left and resetting
    /// `cursor` to zero. Called once a message has been fully consumed so
    /// the backing store does not grow unbounded across many messages.
    pub fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let _ = self.bytes.split_to(self.cursor);
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.cursor = 0;
    }

    /// The unread slice, for handing to a `Transport::write_all`-style sink.
    pub fn readable_slice(&self) -> &[u8] {
        &self.bytes[self.cursor..]
    }

    pub fn code_for_underrun() -> ErrorCode {
        ErrorCode::ProtocolViolation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalars() {
        let mut buf = Buffer::new();
        buf.load_u8(0x42);
        buf.load_i16(-7);
        buf.load_u32(0xdead_beef);
        buf.load_i64(-1);
        buf.load_f64(1.5);

        assert_eq!(buf.unload_u8().unwrap(), 0x42);
        assert_eq!(buf.unload_i16().unwrap(), -7);
        assert_eq!(buf.unload_u32().unwrap(), 0xdead_beef);
        assert_eq!(buf.unload_i64().unwrap(), -1);
        assert_eq!(buf.unload_f64().unwrap(), 1.5);
        assert!(buf.is_empty());
    }

    #[test]
    fn unload_past_extent_fails() {
        let mut buf = Buffer::new();
        buf.load_u8(1);
        assert!(buf.unload_u16().is_err());
    }

    #[test]
    fn compact_shifts_tail_and_resets_cursor() {
        let mut buf = Buffer::new();
        buf.load_bytes(&[1, 2, 3, 4]);
        let _ = buf.unload_bytes(2).unwrap();
        buf.compact();
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.readable_slice(), &[3, 4]);
    }

    #[test]
    fn peek_does_not_advance() {
        let mut buf = Buffer::new();
        buf.load_u8(9);
        assert_eq!(buf.peek(), Some(9));
        assert_eq!(buf.cursor(), 0);
        assert_eq!(buf.unload_u8().unwrap(), 9);
    }
}
