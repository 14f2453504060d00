//! Integration coverage for the chunking framer (§4.4, §8 property 3).

use bolt_core::buffer::Buffer;
use bolt_core::chunking::{chunk, dechunk, MAX_CHUNK_SIZE};

fn chunk_to_vec(message: &[u8]) -> Vec<u8> {
    let mut buf = Buffer::new();
    chunk(&mut buf, message);
    buf.readable_slice().to_vec()
}

fn dechunk_vec(framed: &[u8]) -> Vec<u8> {
    let mut cursor = 0usize;
    dechunk(|out| {
        let end = cursor + out.len();
        out.copy_from_slice(&framed[cursor..end]);
        cursor = end;
        Ok(())
    })
    .unwrap()
}

#[test]
fn round_trips_arbitrary_sizes_across_the_public_api() {
    for len in [0usize, 1, 5, 65535, 65536, 70000, 2 * MAX_CHUNK_SIZE + 37] {
        let message: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
        let framed = chunk_to_vec(&message);
        assert_eq!(&framed[framed.len() - 2..], &[0x00, 0x00], "frame must end with the zero terminator");
        assert_eq!(dechunk_vec(&framed), message);
    }
}

#[test]
fn chunk_count_matches_ceil_division_by_max_chunk_size() {
    let message = vec![0u8; MAX_CHUNK_SIZE * 3 + 1];
    let framed = chunk_to_vec(&message);

    let mut offset = 0;
    let mut chunk_count = 0;
    loop {
        let len = u16::from_be_bytes([framed[offset], framed[offset + 1]]) as usize;
        offset += 2;
        if len == 0 {
            break;
        }
        chunk_count += 1;
        offset += len;
    }
    assert_eq!(chunk_count, 4);
}
