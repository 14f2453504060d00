//! Splits a single encoded message into ≤65535-byte chunks for transmission,
//! and reassembles chunks back into a message on receive.
//!
//! Bolt frames every message as a sequence of `u16`-length-prefixed chunks
//! terminated by a zero-length chunk. A message of length `L` is split into
//! `ceil(L / MAX_CHUNK_SIZE)` data chunks followed by the terminator.

use crate::buffer::Buffer;
use crate::error::Result;

pub const MAX_CHUNK_SIZE: usize = 65535;

/// A safety cap on the total assembled message size. The wire format places
/// no bound on how many chunks may precede the terminator; an implementation
/// must pick one to avoid unbounded memory growth from a malicious or
/// desynchronized peer.
pub const MAX_MESSAGE_SIZE: usize = 1 << 30;

/// Writes `message` to `out` as a chunked frame, interleaving chunk-size
/// headers with the message bytes and finishing with `00 00`.
pub fn chunk(out: &mut Buffer, message: &[u8]) {
    if message.is_empty() {
        out.load_u16(0);
        return;
    }
    for piece in message.chunks(MAX_CHUNK_SIZE) {
        out.load_u16(piece.len() as u16);
        out.load_bytes(piece);
    }
    out.load_u16(0);
}

/// Reads chunks from `source` (a closure that reads an exact number of bytes
/// into a caller-provided slice, standing in for a blocking `Transport`)
/// until the zero-length terminator, returning the reassembled payload.
pub fn dechunk<F>(mut read_exact: F) -> Result<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> Result<()>,
{
    let mut message = Vec::new();
    loop {
        let mut header = [0u8; 2];
        read_exact(&mut header)?;
        let len = u16::from_be_bytes(header) as usize;
        if len == 0 {
            break;
        }
        if message.len() + len > MAX_MESSAGE_SIZE {
            return Err(err_protocol!(
                "assembled message of at least {} bytes exceeds the {}-byte safety cap",
                message.len() + len,
                MAX_MESSAGE_SIZE
            ));
        }
        let start = message.len();
        message.resize(start + len, 0);
        read_exact(&mut message[start..])?;
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn chunk_to_vec(message: &[u8]) -> Vec<u8> {
        let mut buf = Buffer::new();
        chunk(&mut buf, message);
        buf.readable_slice().to_vec()
    }

    #[test]
    fn empty_message_is_just_the_terminator() {
        assert_eq!(chunk_to_vec(&[]), vec![0x00, 0x00]);
    }

    #[test]
    fn ends_with_zero_chunk() {
        let framed = chunk_to_vec(b"hello");
        assert_eq!(&framed[framed.len() - 2..], &[0x00, 0x00]);
    }

    #[test]
    fn splits_across_max_chunk_size() {
        let message = vec![0xAB; MAX_CHUNK_SIZE + 10];
        let framed = chunk_to_vec(&message);
        // First header announces a full 65535-byte chunk.
        assert_eq!(&framed[0..2], &(MAX_CHUNK_SIZE as u16).to_be_bytes());
    }

    #[test]
    fn dechunk_reverses_chunk_for_arbitrary_sizes() {
        for len in [0usize, 1, 5, 65535, 65536, 70000, 131072] {
            let message: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let framed = chunk_to_vec(&message);

            let mut cursor = Cursor::new(framed.clone());
            let result = dechunk(|buf| {
                use std::io::Read;
                cursor
                    .read_exact(buf)
                    .map_err(|e| err_protocol!("short read: {}", e))
            })
            .unwrap();

            assert_eq!(result, message);
            assert_eq!(&framed[framed.len() - 2..], &[0x00, 0x00]);
        }
    }

    #[test]
    fn rejects_message_beyond_safety_cap() {
        let mut header_then_huge = Vec::new();
        header_then_huge.extend_from_slice(&(MAX_CHUNK_SIZE as u16).to_be_bytes());
        let mut cursor_data = vec![0u8; MAX_CHUNK_SIZE];
        header_then_huge.append(&mut cursor_data);

        // Repeat enough oversized chunks (without ever sending the
        // terminator) to exceed MAX_MESSAGE_SIZE and confirm dechunk bails
        // instead of growing forever.
        let repeats = MAX_MESSAGE_SIZE / MAX_CHUNK_SIZE + 2;
        let mut stream = Vec::new();
        for _ in 0..repeats {
            stream.extend_from_slice(&header_then_huge);
        }
        let mut cursor = Cursor::new(stream);
        let result = dechunk(|buf| {
            use std::io::Read;
            cursor
                .read_exact(buf)
                .map_err(|e| err_protocol!("short read: {}", e))
        });
        assert!(result.is_err());
    }
}
