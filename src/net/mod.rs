//! Abstract blocking byte stream transport: the seam between the protocol
//! layer and the OS sockets/TLS library, kept as a trait so the core never
//! depends on a concrete socket implementation beyond what this module
//! wires up by default.

#[cfg(feature = "rustls")]
mod tls;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::{ErrorCode, Result};

#[cfg(feature = "rustls")]
pub use tls::{CertificateInput, TlsConfig};

/// A blocking, duplex byte stream. `Connection` talks to its server only
/// through this trait, so tests substitute an in-memory pipe and production
/// code substitutes [`MaybeTlsStream`] over a real `TcpStream`.
pub trait Transport: Read + Write + Send {
    /// Best-effort local shutdown; errors are not actionable for the caller.
    fn shutdown(&mut self);
}

/// Connect/recv/send timeouts and the keep-alive flag, applied to a freshly
/// opened socket before the Bolt handshake begins.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketOptions {
    pub connect_timeout: Option<Duration>,
    pub recv_timeout: Option<Duration>,
    pub send_timeout: Option<Duration>,
    pub keep_alive: bool,
}

/// Either a raw TCP stream or one wrapped in a TLS session. Downgrading back
/// to `Raw` is intentionally not supported — a Bolt connection decides
/// encrypted-or-not once, at open time.
pub enum MaybeTlsStream {
    Raw(TcpStream),
    #[cfg(feature = "rustls")]
    Tls(tls::TlsStream),
}

impl MaybeTlsStream {
    pub fn connect(addr: SocketAddr, options: SocketOptions) -> Result<TcpStream> {
        let stream = match options.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_read_timeout(options.recv_timeout)?;
        stream.set_write_timeout(options.send_timeout)?;
        stream.set_nodelay(true)?;
        if options.keep_alive {
            // std's `TcpStream` cannot toggle SO_KEEPALIVE directly; a
            // caller that needs precise tuning swaps in its own `Transport`
            // built on `socket2` instead of going through this constructor.
            log::trace!("keep_alive requested; relying on platform socket defaults");
        }
        Ok(stream)
    }

    #[cfg(feature = "rustls")]
    pub fn upgrade(stream: TcpStream, config: &TlsConfig<'_>) -> Result<Self> {
        Ok(MaybeTlsStream::Tls(tls::connect(stream, config)?))
    }

    pub fn is_tls(&self) -> bool {
        #[cfg(feature = "rustls")]
        {
            matches!(self, MaybeTlsStream::Tls(_))
        }
        #[cfg(not(feature = "rustls"))]
        {
            false
        }
    }
}

impl Read for MaybeTlsStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Raw(s) => s.read(buf),
            #[cfg(feature = "rustls")]
            MaybeTlsStream::Tls(s) => s.read(buf),
        }
    }
}

impl Write for MaybeTlsStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            MaybeTlsStream::Raw(s) => s.write(buf),
            #[cfg(feature = "rustls")]
            MaybeTlsStream::Tls(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            MaybeTlsStream::Raw(s) => s.flush(),
            #[cfg(feature = "rustls")]
            MaybeTlsStream::Tls(s) => s.flush(),
        }
    }
}

impl Transport for MaybeTlsStream {
    fn shutdown(&mut self) {
        let raw = match self {
            MaybeTlsStream::Raw(s) => s,
            #[cfg(feature = "rustls")]
            MaybeTlsStream::Tls(s) => s.get_mut(),
        };
        let _ = raw.shutdown(std::net::Shutdown::Both);
    }
}

/// Writes every byte of `data`, looping on short writes and retrying on
/// `Interrupted`, the way a correct implementation must since a single
/// `write` call is not guaranteed to consume the whole buffer.
pub fn write_all_retrying<T: Write + ?Sized>(transport: &mut T, mut data: &[u8]) -> Result<()> {
    while !data.is_empty() {
        match transport.write(data) {
            Ok(0) => {
                return Err(bolt_err!(
                    ErrorCode::ConnectionReset,
                    "write returned zero bytes with {} remaining",
                    data.len()
                ))
            }
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

pub fn read_exact_retrying<T: Read + ?Sized>(transport: &mut T, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match transport.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(bolt_err!(
                    ErrorCode::EndOfTransmission,
                    "peer closed the connection with {} bytes still expected",
                    buf.len() - filled
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
