//! Cluster-aware pooling: a refreshed routing table plus one [`DirectPool`]
//! per server it names.
//!
//! Grounded on seabolt's `routing-pool.c`: a read-write-locked table that is
//! re-checked for staleness under a read lock and refreshed under a write
//! lock, least-connected server selection with a round-robin starting
//! offset, and a cleanup pass that tears down pools for servers no longer in
//! the table and currently idle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::address::Address;
use crate::auth::Auth;
use crate::config::ConnectorConfig;
use crate::connection::ConnectionState;
use crate::error::{ErrorCode, Result};
use crate::pool::direct::{DirectPool, Leased};
use crate::protocol::TxMetadata;
use crate::value::Value;

/// Which half of a cluster an acquisition targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// A routing table as returned by `dbms.cluster.routing.getRoutingTable`:
/// router/reader/writer sets plus the instant it expires.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    pub routers: Vec<Arc<Address>>,
    pub readers: Vec<Arc<Address>>,
    pub writers: Vec<Arc<Address>>,
    expires_at: Option<Instant>,
}

impl RoutingTable {
    fn is_expired(&self, mode: AccessMode) -> bool {
        let servers_empty = match mode {
            AccessMode::Read => self.readers.is_empty(),
            AccessMode::Write => self.writers.is_empty(),
        };
        servers_empty || self.expires_at.is_none_or(|at| Instant::now() >= at)
    }

    /// Builds a table from a discovery record: `{ttl, servers: [{role,
    /// addresses}, ...]}`.
    fn from_discovery_record(record: &Value) -> Result<Self> {
        let ttl_seconds = record
            .dictionary_lookup("ttl")
            .and_then(Value::as_int)
            .ok_or_else(|| bolt_err!(ErrorCode::RoutingUnexpectedDiscoveryResponse, "discovery record missing 'ttl'"))?;
        let servers = record
            .dictionary_lookup("servers")
            .and_then(Value::as_list)
            .ok_or_else(|| bolt_err!(ErrorCode::RoutingUnexpectedDiscoveryResponse, "discovery record missing 'servers'"))?;

        let mut table = RoutingTable {
            expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds.max(0) as u64)),
            ..RoutingTable::default()
        };

        for entry in servers {
            let role = entry
                .dictionary_lookup("role")
                .and_then(Value::as_str)
                .ok_or_else(|| bolt_err!(ErrorCode::RoutingUnexpectedDiscoveryResponse, "server entry missing 'role'"))?;
            let addresses = entry
                .dictionary_lookup("addresses")
                .and_then(Value::as_list)
                .ok_or_else(|| bolt_err!(ErrorCode::RoutingUnexpectedDiscoveryResponse, "server entry missing 'addresses'"))?;
            let parsed: Result<Vec<Arc<Address>>> = addresses
                .iter()
                .map(|v| {
                    let s = v
                        .as_str()
                        .ok_or_else(|| bolt_err!(ErrorCode::RoutingUnexpectedDiscoveryResponse, "address entry is not a string"))?;
                    Address::parse(s).map(Arc::new)
                })
                .collect();
            let parsed = parsed?;

            match role {
                "ROUTE" => table.routers.extend(parsed),
                "READ" => table.readers.extend(parsed),
                "WRITE" => table.writers.extend(parsed),
                other => {
                    log::debug!("ignoring discovery server entry with unknown role '{}'", other);
                }
            }
        }

        // §4.8: readers (and routers, to have somewhere to re-discover from)
        // must be non-empty; a writer-less topology (read-only / mid
        // leader-election) is valid and must not be rejected.
        if table.routers.is_empty() || table.readers.is_empty() {
            return Err(bolt_err!(
                ErrorCode::RoutingUnexpectedDiscoveryResponse,
                "discovery response names no routers or no readers"
            ));
        }

        Ok(table)
    }
}

struct Inner {
    table: RoutingTable,
    servers: HashMap<Arc<Address>, Arc<DirectPool>>,
}

/// A cluster-routed connection pool: the shared routing table plus the
/// per-server direct pools it names.
pub struct RoutingPool {
    seed: Arc<Address>,
    config: Arc<ConnectorConfig>,
    auth: Auth,
    inner: Arc<RwLock<Inner>>,
    readers_offset: AtomicUsize,
    writers_offset: AtomicUsize,
}

/// Forgets `server` from both read/write roles and tears down its pool once
/// idle, per the error handler in §4.8. Free function so it can be called
/// from a `DirectPool` error callback given only a borrowed `&RwLock<Inner>`
/// (the callback itself holds a `Weak` back-reference, not an `Arc`).
fn forget_server_in(inner: &RwLock<Inner>, server: &Address) {
    let mut inner = inner.write().expect("routing pool lock poisoned");
    inner.table.routers.retain(|a| a.as_ref() != server);
    inner.table.readers.retain(|a| a.as_ref() != server);
    inner.table.writers.retain(|a| a.as_ref() != server);
    // No longer a selection candidate; dropping the pool's Arc here (once
    // idle) runs `DirectPool`'s `Drop`, closing every slot.
    if inner.servers.get(server).is_some_and(|p| p.in_use() == 0) {
        inner.servers.remove(server);
    }
    log::debug!("forgot server {} from the routing table", server);
}

fn forget_writer_in(inner: &RwLock<Inner>, server: &Address) {
    inner.write().expect("routing pool lock poisoned").table.writers.retain(|a| a.as_ref() != server);
}

/// Maps a server failure's Neo4j status code to the forget action §4.8
/// prescribes, if any.
fn handle_server_error_in(inner: &RwLock<Inner>, server: &Address, neo4j_code: &str) {
    match neo4j_code {
        "Neo.ClientError.Cluster.NotALeader" | "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase" => {
            forget_writer_in(inner, server);
        }
        "Neo.TransientError.General.DatabaseUnavailable" => {
            forget_server_in(inner, server);
        }
        _ => {}
    }
}

impl RoutingPool {
    pub fn new(seed: Arc<Address>, config: Arc<ConnectorConfig>, auth: Auth) -> Self {
        RoutingPool {
            seed,
            config,
            auth,
            inner: Arc::new(RwLock::new(Inner {
                table: RoutingTable::default(),
                servers: HashMap::new(),
            })),
            readers_offset: AtomicUsize::new(0),
            writers_offset: AtomicUsize::new(0),
        }
    }

    /// Acquires a connection for `mode`, refreshing the routing table first
    /// if it is stale or empty for that mode (§4.8).
    pub fn acquire(&self, mode: AccessMode) -> Result<Leased> {
        self.ensure_routing_table(mode)?;

        let target = {
            let inner = self.inner.read().expect("routing pool lock poisoned");
            self.select_least_connected(&inner, mode)?
        };

        self.ensure_server_pool(&target)?;
        // Clone the pool handle and release the lock before calling into it:
        // `DirectPool::acquire` may open a connection whose failure invokes
        // the error callback, which re-locks `inner` to forget a server.
        let pool = {
            let inner = self.inner.read().expect("routing pool lock poisoned");
            Arc::clone(inner.servers.get(&target).expect("server pool just ensured"))
        };
        pool.acquire()
    }

    /// Takes the already-locked `Inner` rather than re-locking: callers hold
    /// a read guard across this (see `acquire`), and `std::sync::RwLock`
    /// read locks are not guaranteed reentrant — a second `read()` on this
    /// thread can deadlock under writer contention.
    fn select_least_connected(&self, inner: &Inner, mode: AccessMode) -> Result<Arc<Address>> {
        let (servers, offset) = match mode {
            AccessMode::Read => (&inner.table.readers, &self.readers_offset),
            AccessMode::Write => (&inner.table.writers, &self.writers_offset),
        };
        if servers.is_empty() {
            return Err(bolt_err!(ErrorCode::RoutingNoServersToSelect, "routing table has no {:?} servers", mode));
        }

        let start = offset.fetch_add(1, Ordering::Relaxed) % servers.len();
        let mut best: Option<(&Arc<Address>, usize)> = None;
        for i in 0..servers.len() {
            let candidate = &servers[(start + i) % servers.len()];
            let in_use = inner.servers.get(candidate).map_or(0, |p| p.in_use());
            if best.is_none_or(|(_, least)| in_use < least) {
                best = Some((candidate, in_use));
            }
        }
        Ok(Arc::clone(best.expect("non-empty server list yields a candidate").0))
    }

    fn ensure_server_pool(&self, address: &Arc<Address>) -> Result<()> {
        if self.inner.read().expect("routing pool lock poisoned").servers.contains_key(address) {
            return Ok(());
        }
        let mut inner = self.inner.write().expect("routing pool lock poisoned");
        inner.servers.entry(Arc::clone(address)).or_insert_with(|| {
            let mut pool = DirectPool::new(Arc::clone(address), Arc::clone(&self.config), self.auth.clone());
            // Weak, not Arc: a strong back-reference here would keep `Inner`
            // (which owns this very `DirectPool` in its `servers` map) alive
            // forever, since the callback outlives any single `acquire` call.
            let weak_inner = Arc::downgrade(&self.inner);
            pool.set_on_error(Arc::new(move |server: &Address, _code, neo4j_code: Option<&str>| {
                if let (Some(inner), Some(neo4j_code)) = (weak_inner.upgrade(), neo4j_code) {
                    handle_server_error_in(&inner, server, neo4j_code);
                }
            }));
            Arc::new(pool)
        });
        Ok(())
    }

    /// Re-checks staleness under a read lock, then refreshes under a write
    /// lock (re-checking once more in case another thread already won the
    /// race), mirroring `BoltRoutingPool_ensure_routing_table`.
    fn ensure_routing_table(&self, mode: AccessMode) -> Result<()> {
        loop {
            let stale = self.inner.read().expect("routing pool lock poisoned").table.is_expired(mode);
            if !stale {
                return Ok(());
            }

            let mut inner = self.inner.write().expect("routing pool lock poisoned");
            if !inner.table.is_expired(mode) {
                return Ok(());
            }
            log::debug!("routing table is stale for {:?}, refreshing", mode);
            let existing_routers = inner.table.routers.clone();
            let new_table = self.discover(existing_routers)?;
            inner.table = new_table;
            self.cleanup(&mut inner);
            return Ok(());
        }
    }

    /// Candidate routers = `existing_routers` (the table's current routers,
    /// read by the caller before it took the write lock this runs under),
    /// union the address resolver's output for the seed address (falling
    /// back to the seed itself). Tries each in turn until one answers.
    fn discover(&self, existing_routers: Vec<Arc<Address>>) -> Result<RoutingTable> {
        let mut candidates: Vec<Arc<Address>> = self
            .config
            .address_resolver
            .resolve(&self.seed)
            .into_iter()
            .map(Arc::new)
            .collect();
        if candidates.is_empty() {
            candidates.push(Arc::clone(&self.seed));
        }
        candidates.extend(existing_routers);

        let mut last_err = None;
        for router in &candidates {
            log::debug!("trying routing table update from server '{}'", router);
            match self.discover_from(router) {
                Ok(table) => return Ok(table),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            bolt_err!(ErrorCode::RoutingUnableToRetrieveTable, "no router address available to discover from")
        }))
    }

    fn discover_from(&self, router: &Arc<Address>) -> Result<RoutingTable> {
        let mut conn = crate::connection::Connection::open(Arc::clone(router), &self.config)?;
        conn.init(&self.config.user_agent, &self.auth)?;

        let params = vec![("context".to_string(), Value::dict(self.config.routing_context.clone()))];
        conn.run(
            "CALL dbms.cluster.routing.getRoutingTable($context)",
            params,
            TxMetadata::default(),
        )?;
        let pull_id = conn.pull_all()?;

        use crate::connection::FetchEvent;
        let mut record = None;
        loop {
            match conn.fetch(pull_id)? {
                FetchEvent::Record(values) => {
                    if record.is_some() {
                        return Err(bolt_err!(
                            ErrorCode::RoutingUnexpectedDiscoveryResponse,
                            "discovery procedure returned more than one record"
                        ));
                    }
                    record = Some(values);
                }
                FetchEvent::Summary(_) => break,
            }
        }
        // RUN's own summary is never returned to us: `fetch(pull_id)` already
        // drains and discards it internally (its id is always below
        // `pull_id`), so there is nothing left on the wire to fetch for it.

        let fields = conn.fields().to_vec();
        let values = record.ok_or_else(|| {
            bolt_err!(ErrorCode::RoutingUnexpectedDiscoveryResponse, "discovery procedure returned no records")
        })?;
        let pairs: Vec<(String, Value)> = fields.into_iter().zip(values).collect();
        let dict = Value::dict(pairs);
        conn.close();

        RoutingTable::from_discovery_record(&dict)
    }

    /// Destroys direct pools for servers absent from the current table and
    /// idle, mirroring `BoltRoutingPool_cleanup`.
    fn cleanup(&self, inner: &mut Inner) {
        let active: std::collections::HashSet<&Arc<Address>> = inner
            .table
            .routers
            .iter()
            .chain(inner.table.readers.iter())
            .chain(inner.table.writers.iter())
            .collect();

        let stale: Vec<Arc<Address>> = inner
            .servers
            .iter()
            .filter(|(addr, pool)| !active.contains(addr) && pool.in_use() == 0)
            .map(|(addr, _)| Arc::clone(addr))
            .collect();

        for addr in stale {
            if inner.servers.remove(&addr).is_some() {
                log::debug!("cleaning up idle pool for server {} no longer in the routing table", addr);
            }
        }
    }

    /// Drops `server` from every role in the routing table and destroys its
    /// pool, forcing rediscovery on the next acquisition. Installed as the
    /// error callback so a `Neo.ClientError.Cluster.NotALeader` or similar
    /// routing error removes the offending server immediately rather than
    /// waiting for the table to expire naturally.
    pub fn forget_server(&self, server: &Address) {
        forget_server_in(&self.inner, server);
    }

    /// Drops `server` from the writer role only, used for
    /// `Neo.ClientError.Cluster.NotALeader` /
    /// `Neo.ClientError.General.ForbiddenOnReadOnlyDatabase`, where the
    /// server remains valid for reads.
    pub fn forget_writer(&self, server: &Address) {
        forget_writer_in(&self.inner, server);
    }

    /// Maps a server failure's Neo4j status code to the forget action §4.8
    /// prescribes, if any.
    pub fn handle_server_error(&self, server: &Address, neo4j_code: &str) {
        handle_server_error_in(&self.inner, server, neo4j_code);
    }

    /// True if a leased connection is in a state the application should not
    /// keep using (mirrors `apply_fetch_transition`'s Failed/Defunct, plus
    /// connections that never reached Ready).
    pub fn is_healthy(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Ready)
    }

    /// A snapshot of the current routing table, for topology introspection.
    pub fn routing_table(&self) -> RoutingTable {
        self.inner.read().expect("routing pool lock poisoned").table.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(host: &str) -> Arc<Address> {
        Arc::new(Address::new(host, "7687"))
    }

    #[test]
    fn routing_table_without_ttl_is_always_expired() {
        let table = RoutingTable::default();
        assert!(table.is_expired(AccessMode::Read));
        assert!(table.is_expired(AccessMode::Write));
    }

    #[test]
    fn discovery_record_parses_roles_into_sets() {
        let record = Value::dict(vec![
            ("ttl".to_string(), Value::from(300i64)),
            (
                "servers".to_string(),
                Value::list(vec![
                    Value::dict(vec![
                        ("role".to_string(), Value::string("ROUTE")),
                        ("addresses".to_string(), Value::list(vec![Value::string("a:7687")])),
                    ]),
                    Value::dict(vec![
                        ("role".to_string(), Value::string("WRITE")),
                        ("addresses".to_string(), Value::list(vec![Value::string("b:7687")])),
                    ]),
                    Value::dict(vec![
                        ("role".to_string(), Value::string("READ")),
                        ("addresses".to_string(), Value::list(vec![Value::string("c:7687"), Value::string("d:7687")])),
                    ]),
                ]),
            ),
        ]);
        let table = RoutingTable::from_discovery_record(&record).unwrap();
        assert_eq!(table.routers.len(), 1);
        assert_eq!(table.writers.len(), 1);
        assert_eq!(table.readers.len(), 2);
        assert!(!table.is_expired(AccessMode::Read));
    }

    #[test]
    fn discovery_record_without_readers_is_rejected() {
        let record = Value::dict(vec![
            ("ttl".to_string(), Value::from(300i64)),
            (
                "servers".to_string(),
                Value::list(vec![Value::dict(vec![
                    ("role".to_string(), Value::string("ROUTE")),
                    ("addresses".to_string(), Value::list(vec![Value::string("a:7687")])),
                ])]),
            ),
        ]);
        assert!(RoutingTable::from_discovery_record(&record).is_err());
    }

    #[test]
    fn discovery_record_without_writer_is_accepted() {
        // A read-only topology (or one mid leader-election) has no writer
        // yet; §4.8 only requires routers and readers to be non-empty.
        let record = Value::dict(vec![
            ("ttl".to_string(), Value::from(300i64)),
            (
                "servers".to_string(),
                Value::list(vec![
                    Value::dict(vec![
                        ("role".to_string(), Value::string("ROUTE")),
                        ("addresses".to_string(), Value::list(vec![Value::string("a:7687")])),
                    ]),
                    Value::dict(vec![
                        ("role".to_string(), Value::string("READ")),
                        ("addresses".to_string(), Value::list(vec![Value::string("b:7687")])),
                    ]),
                ]),
            ),
        ]);
        let table = RoutingTable::from_discovery_record(&record).unwrap();
        assert!(table.writers.is_empty());
        assert_eq!(table.readers.len(), 1);
    }

    #[test]
    fn forget_writer_removes_only_from_writer_role() {
        let pool = RoutingPool::new(addr("seed"), Arc::new(ConnectorConfig::new(
            crate::config::Scheme::Neo4j,
            Address::new("seed", "7687"),
        )), Auth::None);
        {
            let mut inner = pool.inner.write().unwrap();
            inner.table.writers.push(addr("writer1"));
            inner.table.readers.push(addr("writer1"));
        }
        pool.forget_writer(&Address::new("writer1", "7687"));
        let inner = pool.inner.read().unwrap();
        assert!(inner.table.writers.is_empty());
        assert_eq!(inner.table.readers.len(), 1);
    }
}
