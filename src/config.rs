//! Connector configuration: everything needed to open and pool connections
//! to a server or cluster, parsed from a `bolt://`/`neo4j://` URL the same
//! way `sqlx-core`'s `ConnectOptions` parses a database URL.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::address::Address;
use crate::error::{Error, ErrorCode, Result};
use crate::net::SocketOptions;
use crate::value::Value;

/// Selects which pooling strategy a connector uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Single-server pool, no routing table.
    Direct,
    /// Cluster routing: acquisitions consult a refreshed routing table.
    Neo4j,
    /// One-shot connections bypassing both pool types entirely.
    DirectUnpooled,
}

/// Whether the transport is wrapped in TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plaintext,
    Encrypted,
}

/// Certificate trust policy for an encrypted transport.
#[derive(Debug, Clone, Default)]
pub struct Trust {
    pub skip_verify: bool,
    pub skip_verify_hostname: bool,
    pub certs: Option<Vec<u8>>,
}

/// Resolves an [`Address`] to a sequence of addresses to try, in order.
/// Defaults to the identity resolver (the seed address itself).
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, seed: &Address) -> Vec<Address>;
}

struct IdentityResolver;

impl AddressResolver for IdentityResolver {
    fn resolve(&self, seed: &Address) -> Vec<Address> {
        vec![Address::new(seed.host(), seed.service())]
    }
}

/// Every connector option enumerated in the wire-interface section:
/// scheme, transport, trust, user agent, routing context, address resolver,
/// pool sizing/lifetime/acquisition timeouts, and socket options.
#[derive(Clone)]
pub struct ConnectorConfig {
    pub scheme: Scheme,
    pub address: Arc<Address>,
    pub transport: Transport,
    pub trust: Trust,
    pub user_agent: String,
    pub routing_context: Vec<(String, Value)>,
    pub address_resolver: Arc<dyn AddressResolver>,
    pub max_pool_size: usize,
    pub max_connection_lifetime_ms: u64,
    pub max_connection_acquisition_time_ms: u64,
    pub socket_options: SocketOptions,
}

impl ConnectorConfig {
    pub fn new(scheme: Scheme, address: Address) -> Self {
        ConnectorConfig {
            scheme,
            address: Arc::new(address),
            transport: Transport::Plaintext,
            trust: Trust::default(),
            user_agent: format!("bolt-core/{}", env!("CARGO_PKG_VERSION")),
            routing_context: Vec::new(),
            address_resolver: Arc::new(IdentityResolver),
            max_pool_size: 100,
            max_connection_lifetime_ms: 0,
            max_connection_acquisition_time_ms: 0,
            socket_options: SocketOptions::default(),
        }
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        if self.max_connection_lifetime_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.max_connection_lifetime_ms))
        }
    }

    pub fn max_acquisition_wait(&self) -> Option<Duration> {
        if self.max_connection_acquisition_time_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.max_connection_acquisition_time_ms))
        }
    }
}

impl FromStr for ConnectorConfig {
    type Err = Error;

    /// Parses `bolt://host:port`, `bolt+s://host:port`, `neo4j://host:port`,
    /// or `neo4j+s://host:port`. A `+s` suffix selects an encrypted
    /// transport; a bare `bolt://` scheme with query parameter
    /// `unpooled=true` selects `direct_unpooled`.
    fn from_str(s: &str) -> Result<Self> {
        let url = Url::parse(s)
            .map_err(|e| bolt_err!(ErrorCode::Unsupported, "invalid connector url '{}': {}", s, e))?;

        let (base_scheme, encrypted) = match url.scheme() {
            "bolt" => (Scheme::Direct, false),
            "bolt+s" | "bolt+ssc" => (Scheme::Direct, true),
            "neo4j" => (Scheme::Neo4j, false),
            "neo4j+s" | "neo4j+ssc" => (Scheme::Neo4j, true),
            other => {
                return Err(bolt_err!(
                    ErrorCode::Unsupported,
                    "unrecognized connector scheme '{}'",
                    other
                ))
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| bolt_err!(ErrorCode::Unsupported, "connector url '{}' has no host", s))?;
        let port = url.port().unwrap_or(7687);
        let address = Address::new(host, port.to_string());

        let unpooled = url
            .query_pairs()
            .any(|(k, v)| k == "unpooled" && v == "true");
        let scheme = if unpooled { Scheme::DirectUnpooled } else { base_scheme };

        let mut trust = Trust::default();
        if url.scheme().ends_with("+ssc") {
            trust.skip_verify = true;
        }

        let mut config = ConnectorConfig::new(scheme, address);
        config.transport = if encrypted { Transport::Encrypted } else { Transport::Plaintext };
        config.trust = trust;
        Ok(config)
    }
}
