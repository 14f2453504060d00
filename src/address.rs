//! Host/service pairs and the sockaddrs they resolve to.
//!
//! Resolution is cached per-[`Address`] behind its own mutex (rather than one
//! global lock) so concurrent clients targeting different servers never
//! serialize on each other's `getaddrinfo` call; clients targeting the *same*
//! address still share a single resolution.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Mutex;

use crate::error::{ErrorCode, Result};

#[derive(Debug, Default)]
struct ResolutionCache {
    resolved: Vec<SocketAddr>,
}

/// A host/service pair plus its cached resolution.
///
/// `PartialEq`/`Hash`/`Eq`/`Ord` compare only `host`/`service` — two
/// `Address`es naming the same server are equal regardless of whether either
/// has resolved yet, so they can key pool maps and routing-table sets.
#[derive(Debug)]
pub struct Address {
    host: String,
    service: String,
    cache: Mutex<ResolutionCache>,
}

impl Address {
    pub fn new(host: impl Into<String>, service: impl Into<String>) -> Self {
        Address {
            host: host.into(),
            service: service.into(),
            cache: Mutex::new(ResolutionCache::default()),
        }
    }

    /// Parses a `host:port` pair, as found in a routing table's server list.
    pub fn parse(host_port: &str) -> Result<Self> {
        let (host, port) = host_port.rsplit_once(':').ok_or_else(|| {
            bolt_err!(
                ErrorCode::AddressNotResolved,
                "'{}' is not a host:port pair",
                host_port
            )
        })?;
        Ok(Address::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Resolves (or returns the cached resolution of) this address's
    /// sockaddrs. A single mutex serializes resolution attempts for this
    /// address so concurrent callers share one `getaddrinfo` call.
    pub fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let mut cache = self.cache.lock().expect("address resolution lock poisoned");
        if !cache.resolved.is_empty() {
            return Ok(cache.resolved.clone());
        }
        let query = format!("{}:{}", self.host, self.service);
        let resolved: Vec<SocketAddr> = query
            .to_socket_addrs()
            .map_err(|e| {
                bolt_err!(
                    ErrorCode::AddressNotResolved,
                    "failed to resolve '{}': {}",
                    query,
                    e
                )
                .with_source(e)
            })?
            .collect();
        if resolved.is_empty() {
            return Err(bolt_err!(
                ErrorCode::NoValidAddress,
                "'{}' resolved to no addresses",
                query
            ));
        }
        cache.resolved = resolved.clone();
        Ok(resolved)
    }

    /// Drops any cached resolution, forcing the next `resolve()` to re-query.
    /// Used before reopening a connection, since DNS may have changed.
    pub fn invalidate(&self) {
        self.cache.lock().expect("address resolution lock poisoned").resolved.clear();
    }
}

impl Clone for Address {
    fn clone(&self) -> Self {
        Address {
            host: self.host.clone(),
            service: self.service.clone(),
            cache: Mutex::new(ResolutionCache {
                resolved: self
                    .cache
                    .lock()
                    .expect("address resolution lock poisoned")
                    .resolved
                    .clone(),
            }),
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.service == other.service
    }
}

impl Eq for Address {}

impl std::hash::Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.service.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.host, &self.service).cmp(&(&other.host, &other.service))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.service)
    }
}
