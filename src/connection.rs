//! Binds a [`Transport`] to a negotiated [`Protocol`], exposing the session
//! operations a pool or application drives directly: handshake, INIT/HELLO,
//! RUN/PULL_ALL/DISCARD_ALL, explicit transactions, RESET, GOODBYE.
//!
//! Every public operation is blocking; there is no internal event loop
//! (§5). State transitions and message tracing log at the granularity
//! `sqlx-core::connection::LogSettings` uses for statement execution: state
//! changes at `debug`, individual messages at `trace`.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Instant;

use crate::address::Address;
use crate::auth::Auth;
use crate::config::{ConnectorConfig, Transport as TransportKind};
use crate::buffer::Buffer;
use crate::chunking::{chunk, dechunk};
use crate::error::{Error, ErrorCode, Result};
use crate::net::{self, write_all_retrying, MaybeTlsStream, Transport};
use crate::packstream::{decode, encode};
use crate::protocol::{self, message, tags, Classified, Protocol, SummaryKind, TxMetadata, Version};
use crate::value::Value;

#[cfg(feature = "rustls")]
use crate::net::{CertificateInput, TlsConfig};

/// The connection's lifecycle state (§4.5/§4.6). Distinct from [`Protocol`],
/// which tracks request/response correlation rather than reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Ready,
    Failed,
    Defunct,
}

/// What one `fetch` call observed.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Record(Vec<Value>),
    Summary(SummaryKind),
}

/// Cumulative byte/message counters, reset only at `open`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
}

/// The connection's status record: state plus the last error observed, if
/// any. Cleared only by a fresh `open`.
#[derive(Debug, Clone, Default)]
pub struct Status {
    pub error_code: Option<ErrorCode>,
    pub error_context: Option<String>,
}

pub type ErrorCallback = dyn Fn(&Address, ErrorCode, Option<&str>) + Send + Sync;

/// A single session with a Bolt server.
pub struct Connection {
    address: Arc<Address>,
    transport: Box<dyn Transport>,
    tx: Buffer,
    rx: Buffer,
    protocol: Protocol,
    version: Version,
    state: ConnectionState,
    status: Status,
    metrics: Metrics,
    opened_at: Instant,
    /// Pool-managed "in use" marker; `None` while idle in a pool slot.
    pub leased: bool,
    on_error: Option<Arc<ErrorCallback>>,
}

impl Connection {
    /// Resolves `address`, opens a TCP (optionally TLS) transport, and
    /// performs the Bolt handshake. Returns a `Connected` connection; call
    /// [`Connection::init`] to reach `Ready`.
    pub fn open(address: Arc<Address>, config: &ConnectorConfig) -> Result<Self> {
        let sockaddrs = address.resolve()?;
        let socket_options = config.socket_options;
        let mut last_err = None;
        let mut tcp = None;
        for sockaddr in sockaddrs {
            match MaybeTlsStream::connect(sockaddr, socket_options) {
                Ok(stream) => {
                    tcp = Some(stream);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let tcp: TcpStream = tcp.ok_or_else(|| {
            last_err.unwrap_or_else(|| {
                bolt_err!(ErrorCode::NoValidAddress, "no address for '{}' could be connected", address)
            })
        })?;

        let transport: Box<dyn Transport> = match config.transport {
            TransportKind::Plaintext => Box::new(MaybeTlsStream::Raw(tcp)),
            #[cfg(feature = "rustls")]
            TransportKind::Encrypted => {
                let root_cert = config.trust.certs.clone().map(CertificateInput::Inline);
                let tls_config = TlsConfig {
                    accept_invalid_certs: config.trust.skip_verify,
                    accept_invalid_hostnames: config.trust.skip_verify_hostname,
                    hostname: address.host(),
                    root_cert: root_cert.as_ref(),
                    client_cert: None,
                    client_key: None,
                };
                Box::new(MaybeTlsStream::upgrade(tcp, &tls_config)?)
            }
            #[cfg(not(feature = "rustls"))]
            TransportKind::Encrypted => {
                return Err(bolt_err!(
                    ErrorCode::TlsError,
                    "encrypted transport requested but the `rustls` feature is disabled"
                ))
            }
        };

        let mut conn = Connection {
            address,
            transport,
            tx: Buffer::new(),
            rx: Buffer::new(),
            protocol: Protocol::new(),
            version: Version::V3,
            state: ConnectionState::Disconnected,
            status: Status::default(),
            metrics: Metrics::default(),
            opened_at: Instant::now(),
            leased: false,
            on_error: None,
        };
        conn.handshake()?;
        Ok(conn)
    }

    /// Builds a connection directly over a caller-supplied transport,
    /// bypassing DNS resolution and the handshake — the seam tests use to
    /// drive a scripted in-memory server.
    pub fn from_transport(address: Arc<Address>, transport: Box<dyn Transport>, version: Version) -> Self {
        Connection {
            address,
            transport,
            tx: Buffer::new(),
            rx: Buffer::new(),
            protocol: Protocol::new(),
            version,
            state: ConnectionState::Connected,
            status: Status::default(),
            metrics: Metrics::default(),
            opened_at: Instant::now(),
            leased: false,
            on_error: None,
        }
    }

    pub fn set_on_error(&mut self, cb: Arc<ErrorCallback>) {
        self.on_error = Some(cb);
    }

    pub fn address(&self) -> &Arc<Address> {
        &self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn protocol_version(&self) -> Version {
        self.version
    }

    pub fn bookmark(&self) -> Option<&str> {
        self.protocol.bookmark.as_deref()
    }

    pub fn fields(&self) -> &[String] {
        &self.protocol.fields
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = ConnectionState::Defunct;
        self.status.error_code = Some(err.code());
        self.status.error_context = Some(err.to_string());
        if let Some(cb) = &self.on_error {
            cb(&self.address, err.code(), self.protocol.failure_data.as_ref().map(|f| f.code.as_str()));
        }
        err
    }

    /// 20-byte magic + version proposal out, 4-byte chosen version in (§6).
    fn handshake(&mut self) -> Result<()> {
        let mut out = Vec::with_capacity(20);
        out.extend_from_slice(&protocol::HANDSHAKE_PREAMBLE);
        for v in Version::PROPOSAL {
            out.extend_from_slice(&v.to_be_bytes());
        }
        write_all_retrying(self.transport.as_mut(), &out).map_err(|e| self.fail(e))?;

        let mut reply = [0u8; 4];
        net::read_exact_retrying(self.transport.as_mut(), &mut reply).map_err(|e| self.fail(e))?;
        let raw = u32::from_be_bytes(reply);
        let version = Version::from_handshake_reply(raw).map_err(|e| {
            self.state = ConnectionState::Disconnected;
            self.status.error_code = Some(e.code());
            self.status.error_context = Some(e.to_string());
            e
        })?;
        self.version = version;
        self.state = ConnectionState::Connected;
        log::debug!("connection to {} negotiated protocol version {}", self.address, version.as_u32());
        Ok(())
    }

    fn writable_predicate(version: Version) -> impl Fn(i8) -> bool {
        move |tag: i8| tags::is_writable(version, tag)
    }

    fn readable_predicate(version: Version) -> impl Fn(i8) -> bool {
        move |tag: i8| tags::is_readable(version, tag)
    }

    /// Encodes and chunks `msg` into the transmit buffer, returning its
    /// assigned request id. Does not write to the transport; call
    /// [`Connection::send`] to flush.
    fn load(&mut self, msg: Value) -> Result<u64> {
        let id = self.protocol.load_request();
        let mut encoded = Buffer::new();
        let predicate = Self::writable_predicate(self.version);
        encode(&mut encoded, &msg, &predicate).map_err(|e| self.fail(e))?;
        chunk(&mut self.tx, encoded.readable_slice());
        log::trace!("C: [{}] {}", id, msg.render());
        Ok(id)
    }

    /// Flushes everything loaded so far to the transport.
    fn send(&mut self) -> Result<()> {
        let bytes = self.tx.readable_slice();
        self.metrics.bytes_sent += bytes.len() as u64;
        write_all_retrying(self.transport.as_mut(), bytes).map_err(|e| self.fail(e))?;
        self.tx.clear();
        Ok(())
    }

    fn load_and_send(&mut self, msg: Value) -> Result<u64> {
        let id = self.load(msg)?;
        self.send()?;
        Ok(id)
    }

    /// Drives the fetch loop (§4.5) until either a record belonging to the
    /// request currently streaming is read, or the summary for `target` is
    /// consumed.
    pub fn fetch(&mut self, target: u64) -> Result<FetchEvent> {
        loop {
            let payload = dechunk(|buf| net::read_exact_retrying(self.transport.as_mut(), buf))
                .map_err(|e| self.fail(e))?;
            self.metrics.bytes_received += payload.len() as u64;
            self.rx.clear();
            self.rx.load_bytes(&payload);

            let readable = Self::readable_predicate(self.version);
            let decoded = decode(&mut self.rx, &readable).map_err(|e| self.fail(e))?;
            let (tag, fields) = decoded
                .as_structure()
                .map(|(t, f)| (t, f.to_vec()))
                .ok_or_else(|| self.fail(err_protocol!("response message is not a structure")))?;

            self.metrics.messages_received += 1;
            let classified = self.protocol.classify(tag, fields).map_err(|e| self.fail(e))?;

            match classified {
                Classified::Record(values) => {
                    let current = self.protocol.response_counter();
                    // A RECORD is only legitimate while some loaded request's
                    // summary hasn't arrived yet (§9: unsolicited RECORD after
                    // a summary for the same request is a protocol violation).
                    let has_pending_request = self.protocol.last_request().is_some_and(|last| current <= last);
                    if !has_pending_request {
                        return Err(self.fail(err_protocol!(
                            "unsolicited RECORD with no request awaiting a summary"
                        )));
                    }
                    if current == target {
                        return Ok(FetchEvent::Record(values));
                    }
                    log::trace!("S: discarding RECORD for in-flight request {}", current);
                    continue;
                }
                Classified::Summary(kind, metadata) => {
                    let completed = self.protocol.response_counter();
                    log::trace!("S: [{}] summary {:?} {}", completed, kind, metadata.render());
                    self.protocol.merge_summary(kind, &metadata).map_err(|e| self.fail(e))?;
                    self.apply_fetch_transition(kind);
                    if completed < target {
                        continue;
                    }
                    return Ok(FetchEvent::Summary(kind));
                }
            }
        }
    }

    /// Generic Ready/Failed transition for ordinary (non-INIT, non-RESET)
    /// summaries: a FAILURE or IGNORED drops the connection to `Failed`; a
    /// SUCCESS leaves the current state untouched.
    fn apply_fetch_transition(&mut self, kind: SummaryKind) {
        match kind {
            SummaryKind::Success => {}
            SummaryKind::Failure | SummaryKind::Ignored => {
                self.state = ConnectionState::Failed;
                if let Some(cb) = &self.on_error {
                    cb(
                        &self.address,
                        ErrorCode::ServerFailure,
                        self.protocol.failure_data.as_ref().map(|f| f.code.as_str()),
                    );
                }
            }
        }
    }

    /// `INIT`/`HELLO`: must be the first message on a `Connected`
    /// connection. Transitions to `Ready` on success, `Defunct` otherwise.
    pub fn init(&mut self, user_agent: &str, auth: &Auth) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(err_protocol!("INIT/HELLO sent outside the Connected state"));
        }
        let msg = message::init(self.version, user_agent, auth);
        let id = self.load_and_send(msg)?;
        match self.fetch(id)? {
            FetchEvent::Summary(SummaryKind::Success) => {
                self.state = ConnectionState::Ready;
                log::debug!("connection to {} is ready (server: {:?})", self.address, self.protocol.server);
                Ok(())
            }
            FetchEvent::Summary(_) => Err(self.fail(bolt_err!(
                ErrorCode::PermissionDenied,
                "authentication rejected by {}",
                self.address
            ))),
            FetchEvent::Record(_) => Err(self.fail(err_protocol!("unexpected RECORD in response to INIT/HELLO"))),
        }
    }

    fn require_ready(&self) -> Result<()> {
        if self.state != ConnectionState::Ready {
            return Err(err_protocol!(
                "operation requires the Ready state, connection is {:?}",
                self.state
            ));
        }
        Ok(())
    }

    /// Loads and sends `RUN`, returning its request id for a later `fetch`.
    pub fn run(&mut self, cypher: &str, parameters: Vec<(String, Value)>, metadata: TxMetadata) -> Result<u64> {
        self.require_ready()?;
        self.load_and_send(message::run(self.version, cypher, parameters, metadata))
    }

    pub fn pull_all(&mut self) -> Result<u64> {
        self.require_ready()?;
        self.load_and_send(message::pull_all())
    }

    pub fn discard_all(&mut self) -> Result<u64> {
        self.require_ready()?;
        self.load_and_send(message::discard_all())
    }

    /// `BEGIN` on v3; v1/v2 callers express the same intent as
    /// `run("BEGIN", {}, ..)` followed by `discard_all()`.
    pub fn begin(&mut self, metadata: TxMetadata) -> Result<u64> {
        self.require_ready()?;
        if !self.version.supports_explicit_transactions() {
            return Err(err_protocol!("BEGIN is only available on protocol version 3"));
        }
        self.load_and_send(message::begin(metadata))
    }

    pub fn commit(&mut self) -> Result<u64> {
        self.require_ready()?;
        if !self.version.supports_explicit_transactions() {
            return Err(err_protocol!("COMMIT is only available on protocol version 3"));
        }
        self.load_and_send(message::commit())
    }

    pub fn rollback(&mut self) -> Result<u64> {
        self.require_ready()?;
        if !self.version.supports_explicit_transactions() {
            return Err(err_protocol!("ROLLBACK is only available on protocol version 3"));
        }
        self.load_and_send(message::rollback())
    }

    /// Clears server-side failure state and rolls back any open
    /// transaction. `Failed --RESET SUCCESS--> Ready`,
    /// `Failed --RESET FAILURE--> Defunct`.
    pub fn reset(&mut self) -> Result<()> {
        if !matches!(self.state, ConnectionState::Failed | ConnectionState::Ready) {
            return Err(err_protocol!("RESET sent outside the Failed/Ready state"));
        }
        let id = self.load_and_send(message::reset())?;
        match self.fetch(id)? {
            FetchEvent::Summary(SummaryKind::Success) => {
                self.protocol.clear_failure();
                self.state = ConnectionState::Ready;
                Ok(())
            }
            FetchEvent::Summary(_) => Err(self.fail(err_protocol!("RESET rejected by server"))),
            FetchEvent::Record(_) => Err(self.fail(err_protocol!("unexpected RECORD in response to RESET"))),
        }
    }

    /// Best-effort GOODBYE on a v3 connection, then a local transport
    /// shutdown. Errors sending GOODBYE are swallowed, matching seabolt's
    /// fire-and-forget close.
    pub fn close(&mut self) {
        if self.version == Version::V3
            && matches!(self.state, ConnectionState::Ready | ConnectionState::Failed)
        {
            if self.load(message::goodbye()).and_then(|_| self.send()).is_err() {
                log::debug!("GOODBYE to {} failed, closing anyway", self.address);
            }
        }
        self.transport.shutdown();
        self.state = ConnectionState::Disconnected;
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Disconnected {
            self.close();
        }
    }
}

/// An in-memory duplex [`Transport`] for tests: reads come from a
/// pre-scripted byte sequence standing in for the server, writes are
/// captured for assertions.
#[cfg(test)]
pub(crate) struct ScriptedTransport {
    pub inbound: std::io::Cursor<Vec<u8>>,
    pub outbound: Vec<u8>,
}

#[cfg(test)]
impl ScriptedTransport {
    pub fn new(server_bytes: Vec<u8>) -> Self {
        ScriptedTransport {
            inbound: std::io::Cursor::new(server_bytes),
            outbound: Vec::new(),
        }
    }
}

#[cfg(test)]
impl std::io::Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        use std::io::Read;
        self.inbound.read(buf)
    }
}

#[cfg(test)]
impl std::io::Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl Transport for ScriptedTransport {
    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packstream::encode::AcceptAll;

    fn encode_to_chunked(msg: &Value) -> Vec<u8> {
        let mut payload = Buffer::new();
        encode(&mut payload, msg, &AcceptAll).unwrap();
        let mut framed = Buffer::new();
        chunk(&mut framed, payload.readable_slice());
        framed.readable_slice().to_vec()
    }

    fn scripted(address: &str, server_messages: Vec<Value>) -> Connection {
        let mut bytes = Vec::new();
        for msg in &server_messages {
            bytes.extend(encode_to_chunked(msg));
        }
        let transport = Box::new(ScriptedTransport::new(bytes));
        Connection::from_transport(Arc::new(Address::new(address, "7687")), transport, Version::V3)
    }

    #[test]
    fn init_success_transitions_to_ready() {
        let success = Value::structure(tags::SUCCESS, vec![Value::dict(vec![(
            "server".to_string(),
            Value::string("Neo4j/5.0"),
        )])]);
        let mut conn = scripted("localhost", vec![success]);
        conn.init("bolt-core/0.1", &Auth::basic("neo4j", "pw")).unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn init_failure_transitions_to_defunct() {
        let failure = Value::structure(
            tags::FAILURE,
            vec![Value::dict(vec![
                ("code".to_string(), Value::string("Neo.ClientError.Security.Unauthorized")),
                ("message".to_string(), Value::string("bad credentials")),
            ])],
        );
        let mut conn = scripted("localhost", vec![failure]);
        assert!(conn.init("bolt-core/0.1", &Auth::basic("neo4j", "wrong")).is_err());
        assert_eq!(conn.state(), ConnectionState::Defunct);
    }

    #[test]
    fn run_pull_sequence_yields_record_then_summaries() {
        let run_success = Value::structure(
            tags::SUCCESS,
            vec![Value::dict(vec![("fields".to_string(), Value::list(vec![Value::string("1")]))])],
        );
        let record = Value::structure(tags::RECORD, vec![Value::list(vec![Value::from(1i64)])]);
        let pull_success = Value::structure(
            tags::SUCCESS,
            vec![Value::dict(vec![("type".to_string(), Value::string("r"))])],
        );
        let mut conn = scripted("localhost", vec![run_success, record, pull_success]);
        conn.state = ConnectionState::Ready;

        let run_id = conn.run("RETURN 1", Vec::new(), TxMetadata::default()).unwrap();
        let pull_id = conn.pull_all().unwrap();

        assert_eq!(conn.fetch(run_id).unwrap(), FetchEvent::Summary(SummaryKind::Success));
        assert_eq!(conn.fetch(pull_id).unwrap(), FetchEvent::Record(vec![Value::from(1i64)]));
        assert_eq!(conn.fetch(pull_id).unwrap(), FetchEvent::Summary(SummaryKind::Success));
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[test]
    fn failure_then_reset_returns_to_ready() {
        let failure = Value::structure(
            tags::FAILURE,
            vec![Value::dict(vec![
                ("code".to_string(), Value::string("Neo.ClientError.Statement.SyntaxError")),
                ("message".to_string(), Value::string("bad cypher")),
            ])],
        );
        let reset_success = Value::structure(tags::SUCCESS, vec![Value::dict(Vec::new())]);
        let mut conn = scripted("localhost", vec![failure, reset_success]);
        conn.state = ConnectionState::Ready;

        let run_id = conn.run("GARBAGE", Vec::new(), TxMetadata::default()).unwrap();
        assert_eq!(conn.fetch(run_id).unwrap(), FetchEvent::Summary(SummaryKind::Failure));
        assert_eq!(conn.state(), ConnectionState::Failed);
        assert!(conn.protocol.failure_data.is_some());

        conn.reset().unwrap();
        assert_eq!(conn.state(), ConnectionState::Ready);
        assert!(conn.protocol.failure_data.is_none());
    }
}
