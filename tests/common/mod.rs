//! Loopback test server: a minimal scripted Bolt peer for the integration
//! tests, playing the role `sqlx-core`'s own tests play against a live
//! database by instead answering over a local TCP socket with canned bytes.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use bolt_core::buffer::Buffer;
use bolt_core::chunking::chunk;
use bolt_core::packstream::decode::AcceptAll as DecodeAcceptAll;
use bolt_core::packstream::encode::AcceptAll as EncodeAcceptAll;
use bolt_core::packstream::{decode, encode};
use bolt_core::protocol::tags;
use bolt_core::value::Value;
use bolt_core::Address;

/// Encodes one structure message as a chunked frame, the shape every
/// response (and request) takes on the wire.
pub fn framed_structure(tag: i8, fields: Vec<Value>) -> Vec<u8> {
    let value = Value::structure(tag, fields);
    let mut encoded = Buffer::new();
    encode(&mut encoded, &value, &EncodeAcceptAll).expect("encode scripted response");
    let mut framed = Buffer::new();
    chunk(&mut framed, encoded.readable_slice());
    framed.readable_slice().to_vec()
}

pub fn success(metadata: Vec<(String, Value)>) -> Vec<u8> {
    framed_structure(tags::SUCCESS, vec![Value::dict(metadata)])
}

pub fn failure(code: &str, message: &str) -> Vec<u8> {
    framed_structure(
        tags::FAILURE,
        vec![Value::dict(vec![
            ("code".to_string(), Value::string(code)),
            ("message".to_string(), Value::string(message)),
        ])],
    )
}

pub fn ignored() -> Vec<u8> {
    framed_structure(tags::IGNORED, vec![])
}

pub fn record(fields: Vec<Value>) -> Vec<u8> {
    framed_structure(tags::RECORD, vec![Value::list(fields)])
}

/// Spawns a one-shot TCP server on an ephemeral loopback port. On its single
/// accepted connection it performs the 20-byte handshake (replying with
/// `chosen_version`), then for every subsequent framed request it reads,
/// decodes the request's structure tag and writes back whatever `responder`
/// returns for that tag (as a queue: the Nth request of a given tag gets the
/// Nth scripted response for that tag, falling back to the last one).
pub fn spawn_scripted_server(
    chosen_version: u32,
    mut responses: Vec<(i8, Vec<u8>)>,
) -> Address {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        let (mut stream, _) = match listener.accept() {
            Ok(pair) => pair,
            Err(_) => return,
        };

        let mut preamble = [0u8; 20];
        if stream.read_exact(&mut preamble).is_err() {
            return;
        }
        stream
            .write_all(&chosen_version.to_be_bytes())
            .expect("write handshake reply");

        if chosen_version == 0 {
            return;
        }

        loop {
            let mut header = [0u8; 2];
            if stream.read_exact(&mut header).is_err() {
                return;
            }
            let len = u16::from_be_bytes(header) as usize;
            if len == 0 {
                // An empty top-level frame only happens if the client closed
                // out a zero-length message, which this harness never sends;
                // treat it as end-of-script.
                continue;
            }
            let mut payload = vec![0u8; len];
            if stream.read_exact(&mut payload).is_err() {
                return;
            }
            // Drain the terminating zero-length chunk.
            let mut terminator = [0u8; 2];
            if stream.read_exact(&mut terminator).is_err() || terminator != [0, 0] {
                return;
            }

            let mut rx = Buffer::new();
            rx.load_bytes(&payload);
            let decoded = match decode(&mut rx, &DecodeAcceptAll) {
                Ok(v) => v,
                Err(_) => return,
            };
            let tag = decoded.as_structure().map(|(t, _)| t).unwrap_or(0);

            let next_index = responses.iter().position(|(t, _)| *t == tag);
            let response = match next_index {
                Some(i) => responses.remove(i).1,
                None => return,
            };
            if stream.write_all(&response).is_err() {
                return;
            }
        }
    });

    Address::new("127.0.0.1", port.to_string())
}

/// Like `spawn_scripted_server`, but replays a fixed, pre-recorded byte
/// stream of responses for `request_count` requests without decoding
/// anything — used when the scripted order/content of requests doesn't
/// matter, only their count and the canned bytes that follow.
pub fn spawn_server_with_fixed_script(chosen_version: u32, script: Vec<u8>) -> Address {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        let (mut stream, _) = match listener.accept() {
            Ok(pair) => pair,
            Err(_) => return,
        };
        let mut preamble = [0u8; 20];
        if stream.read_exact(&mut preamble).is_err() {
            return;
        }
        if stream.write_all(&chosen_version.to_be_bytes()).is_err() {
            return;
        }
        if chosen_version == 0 {
            return;
        }
        let _ = stream.write_all(&script);
        let mut drain = Vec::new();
        let _ = stream.read_to_end(&mut drain);
    });

    Address::new("127.0.0.1", port.to_string())
}

/// Builds the chunked bytes for an unsolicited RECORD reply used to probe
/// the "RECORD after summary" protocol violation.
pub fn raw_record_then_nothing(fields: Vec<Value>) -> Vec<u8> {
    record(fields)
}
