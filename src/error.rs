//! The closed error enumeration and result alias used across the crate.
//!
//! Every fallible operation in `bolt-core` returns [`Result<T>`], which pairs
//! a low-level cause with one [`ErrorCode`] drawn from the closed enumeration
//! a caller is expected to match on (log routing, retry policy, and so on
//! all key off the code, never off the message text).

use std::fmt;
use std::io;

use crate::bolt_err;

/// The closed set of error codes a caller can match against.
///
/// This mirrors the status codes seabolt reports through `BoltStatus`; the
/// exact names are kept because callers porting dashboards/alerts from other
/// Bolt drivers expect them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    Success,
    UnknownError,
    Unsupported,
    Interrupted,
    ConnectionReset,
    NoValidAddress,
    TimedOut,
    PermissionDenied,
    OutOfFiles,
    OutOfMemory,
    OutOfPorts,
    ConnectionRefused,
    NetworkUnreachable,
    TlsError,
    EndOfTransmission,
    ServerFailure,
    ProtocolViolation,
    ProtocolUnsupportedType,
    ProtocolUnsupported,
    PoolFull,
    PoolAcquisitionTimedOut,
    AddressNotResolved,
    RoutingUnableToRetrieveTable,
    RoutingNoServersToSelect,
    RoutingUnableToConstructPoolForServer,
    RoutingUnexpectedDiscoveryResponse,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            Success => "success",
            UnknownError => "unknown_error",
            Unsupported => "unsupported",
            Interrupted => "interrupted",
            ConnectionReset => "connection_reset",
            NoValidAddress => "no_valid_address",
            TimedOut => "timed_out",
            PermissionDenied => "permission_denied",
            OutOfFiles => "out_of_files",
            OutOfMemory => "out_of_memory",
            OutOfPorts => "out_of_ports",
            ConnectionRefused => "connection_refused",
            NetworkUnreachable => "network_unreachable",
            TlsError => "tls_error",
            EndOfTransmission => "end_of_transmission",
            ServerFailure => "server_failure",
            ProtocolViolation => "protocol_violation",
            ProtocolUnsupportedType => "protocol_unsupported_type",
            ProtocolUnsupported => "protocol_unsupported",
            PoolFull => "pool_full",
            PoolAcquisitionTimedOut => "pool_acquisition_timed_out",
            AddressNotResolved => "address_not_resolved",
            RoutingUnableToRetrieveTable => "routing_unable_to_retrieve_table",
            RoutingNoServersToSelect => "routing_no_servers_to_select",
            RoutingUnableToConstructPoolForServer => {
                "routing_unable_to_construct_pool_for_server"
            }
            RoutingUnexpectedDiscoveryResponse => "routing_unexpected_discovery_response",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A context string carrying the file/line of the call site plus whatever
/// detail the caller supplied, formatted as `"<file>:<line>: <detail>"`.
#[derive(Debug, Clone)]
pub struct Context(String);

impl Context {
    #[doc(hidden)]
    pub fn new(file: &'static str, line: u32, detail: fmt::Arguments<'_>) -> Self {
        Context(format!("{file}:{line}: {detail}"))
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The crate's error type: an [`ErrorCode`] plus context and, where
/// available, the underlying cause.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {context}")]
pub struct Error {
    pub code: ErrorCode,
    pub context: Context,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    #[doc(hidden)]
    pub fn build(
        code: ErrorCode,
        file: &'static str,
        line: u32,
        detail: fmt::Arguments<'_>,
    ) -> Self {
        Error {
            code,
            context: Context::new(file, line, detail),
            source: None,
        }
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::TimedOut => ErrorCode::TimedOut,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                ErrorCode::ConnectionReset
            }
            io::ErrorKind::ConnectionRefused => ErrorCode::ConnectionRefused,
            io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            io::ErrorKind::UnexpectedEof => ErrorCode::EndOfTransmission,
            io::ErrorKind::Interrupted => ErrorCode::Interrupted,
            _ => ErrorCode::UnknownError,
        };
        bolt_err!(code, "io error: {}", err).with_source(err)
    }
}

#[cfg(feature = "rustls")]
impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        bolt_err!(ErrorCode::TlsError, "tls error: {}", err).with_source(err)
    }
}

/// Builds an [`Error`] with file/line captured at the call site, in the style
/// of sqlx-core's `err_protocol!`.
#[macro_export]
macro_rules! bolt_err {
    ($code:expr, $($fmt_args:tt)*) => {
        $crate::error::Error::build($code, file!(), line!(), format_args!($($fmt_args)*))
    };
}

/// Shorthand for [`bolt_err!`]`(`[`ErrorCode::ProtocolViolation`]`, ...)`,
/// used pervasively by the codec and the fetch loop.
#[macro_export]
macro_rules! err_protocol {
    ($($fmt_args:tt)*) => {
        $crate::bolt_err!($crate::error::ErrorCode::ProtocolViolation, $($fmt_args)*)
    };
}

pub type Result<T> = std::result::Result<T, Error>;
