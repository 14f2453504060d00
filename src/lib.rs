//! `bolt-core`, a minimal client driver core for graph databases speaking
//! the Bolt protocol (versions 1 through 3). Covers the PackStream value
//! codec, the chunked message framer, the protocol state machine, and
//! single-server/cluster connection pooling. Not intended to be used
//! directly by applications — it is the foundation a higher-level driver
//! builds a query API on top of.
#![warn(future_incompatible, rust_2018_idioms)]
#![allow(clippy::type_complexity, clippy::large_enum_variant)]
#![deny(clippy::disallowed_methods)]
#![forbid(unsafe_code)]

#[macro_use]
pub mod error;

pub mod buffer;
pub mod value;

pub mod packstream;

pub mod chunking;

pub mod address;
pub mod net;

pub mod auth;
pub mod config;
pub mod protocol;

pub mod connection;
pub mod pool;

pub mod stats;

pub use address::Address;
pub use auth::Auth;
pub use config::{ConnectorConfig, Scheme, Transport, Trust};
pub use connection::{Connection, ConnectionState, FetchEvent};
pub use error::{Error, ErrorCode, Result};
pub use pool::{AccessMode, Pool};
pub use protocol::Version;
pub use value::Value;
