//! Connection pooling: a single-server [`direct::DirectPool`] and a
//! cluster-aware [`routing::RoutingPool`] built on top of it, plus the
//! unpooled one-shot path the `direct_unpooled` scheme selects.

pub mod direct;
pub mod routing;

use std::sync::Arc;

use crate::address::Address;
use crate::auth::Auth;
use crate::config::{ConnectorConfig, Scheme};
use crate::connection::Connection;
use crate::error::Result;

pub use direct::{DirectPool, Leased};
pub use routing::{AccessMode, RoutingPool};

/// The handle an application holds to talk to a server or cluster, chosen by
/// [`ConnectorConfig::scheme`] (§4.7/§4.8): pooled single-server, pooled
/// cluster-routed, or bare unpooled connections.
pub enum Pool {
    Direct(DirectPool),
    Routing(RoutingPool),
    Unpooled { address: Arc<Address>, config: Arc<ConnectorConfig>, auth: Auth },
}

impl Pool {
    pub fn new(config: Arc<ConnectorConfig>, auth: Auth) -> Self {
        match config.scheme {
            Scheme::Direct => Pool::Direct(DirectPool::new(Arc::clone(&config.address), config, auth)),
            Scheme::Neo4j => Pool::Routing(RoutingPool::new(Arc::clone(&config.address), config, auth)),
            Scheme::DirectUnpooled => Pool::Unpooled {
                address: Arc::clone(&config.address),
                config,
                auth,
            },
        }
    }

    /// Acquires a connection for `mode`. `Direct` pools ignore `mode` (a
    /// direct pool has no read/write distinction); `Unpooled` opens and
    /// initializes a fresh connection every call.
    pub fn acquire(&self, mode: AccessMode) -> Result<Acquired> {
        match self {
            Pool::Direct(pool) => {
                let _ = mode;
                Ok(Acquired::Leased(pool.acquire()?))
            }
            Pool::Routing(pool) => Ok(Acquired::Leased(pool.acquire(mode)?)),
            Pool::Unpooled { address, config, auth } => {
                let mut conn = Connection::open(Arc::clone(address), config)?;
                conn.init(&config.user_agent, auth)?;
                Ok(Acquired::Owned(conn))
            }
        }
    }
}

/// A connection obtained from a [`Pool`]: either leased from a [`DirectPool`]
/// (released back to the pool when dropped) or owned outright (closed when
/// dropped), for the unpooled scheme.
pub enum Acquired {
    Leased(Leased),
    Owned(Connection),
}

impl Acquired {
    pub fn with<R>(&mut self, f: impl FnOnce(&mut Connection) -> R) -> R {
        match self {
            Acquired::Leased(leased) => leased.with(f),
            Acquired::Owned(conn) => f(conn),
        }
    }
}
