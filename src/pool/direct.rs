//! A fixed-capacity pool of connections to one server.
//!
//! Grounded on seabolt's `direct-pool.c`: a connection array, an
//! "unused" scan on acquire that reopens/reinitializes a slot as needed, and
//! a max-lifetime check that force-closes and reopens a stale `Ready`
//! connection rather than handing it out as-is.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::address::Address;
use crate::auth::Auth;
use crate::config::ConnectorConfig;
use crate::connection::{Connection, ConnectionState, ErrorCallback};
use crate::error::{ErrorCode, Result};
use crate::stats;

struct Slot {
    connection: Option<Connection>,
}

struct Shared {
    slots: Mutex<Vec<Slot>>,
    not_full: Condvar,
}

/// Per-server connection pool: a mutex-guarded array of slots plus a
/// condition variable acquirers block on when every slot is leased.
pub struct DirectPool {
    address: Arc<Address>,
    config: Arc<ConnectorConfig>,
    auth: Auth,
    shared: Arc<Shared>,
    on_error: Option<Arc<ErrorCallback>>,
}

/// Bytes attributed per pooled connection for the allocation-instrumentation
/// counter — the transmit/receive buffers' starting capacity.
const CONNECTION_FOOTPRINT_BYTES: usize = 4096 * 2;

impl DirectPool {
    pub fn new(address: Arc<Address>, config: Arc<ConnectorConfig>, auth: Auth) -> Self {
        let size = config.max_pool_size;
        let slots = (0..size).map(|_| Slot { connection: None }).collect();
        DirectPool {
            address,
            config,
            auth,
            shared: Arc::new(Shared {
                slots: Mutex::new(slots),
                not_full: Condvar::new(),
            }),
            on_error: None,
        }
    }

    /// Installs a callback invoked whenever a connection this pool opens
    /// fails, so a `RoutingPool` can react to server-level errors (forget a
    /// server, demote a writer) without polling connection status directly.
    pub fn set_on_error(&mut self, cb: Arc<ErrorCallback>) {
        self.on_error = Some(cb);
    }

    pub fn address(&self) -> &Arc<Address> {
        &self.address
    }

    /// Number of slots currently leased.
    pub fn in_use(&self) -> usize {
        self.shared
            .slots
            .lock()
            .expect("direct pool lock poisoned")
            .iter()
            .filter(|s| s.connection.as_ref().is_some_and(|c| c.leased))
            .count()
    }

    /// Acquire: scan for a free slot, opening/reinitializing it as required
    /// by its current state (§4.7). Blocks up to
    /// `max_connection_acquisition_time_ms` if every slot is leased.
    pub fn acquire(&self) -> Result<Leased> {
        let deadline = self.config.max_acquisition_wait();
        let started = Instant::now();
        let mut slots = self.shared.slots.lock().expect("direct pool lock poisoned");

        loop {
            if let Some(index) = self.find_usable_slot(&mut slots)? {
                slots[index]
                    .connection
                    .as_mut()
                    .expect("slot marked usable but empty")
                    .leased = true;
                log::debug!("acquired connection to {} (slot {})", self.address, index);
                return Ok(Leased {
                    shared: Arc::clone(&self.shared),
                    index: Some(index),
                });
            }

            match deadline {
                None => {
                    return Err(bolt_err!(
                        ErrorCode::PoolFull,
                        "pool for {} is at capacity ({} connections)",
                        self.address,
                        slots.len()
                    ))
                }
                Some(budget) => {
                    let elapsed = started.elapsed();
                    if elapsed >= budget {
                        log::warn!("acquisition of a connection to {} timed out after {:?}", self.address, elapsed);
                        return Err(bolt_err!(
                            ErrorCode::PoolAcquisitionTimedOut,
                            "timed out after {:?} acquiring a connection to {}",
                            elapsed,
                            self.address
                        ));
                    }
                    let (guard, timeout_result) = self
                        .shared
                        .not_full
                        .wait_timeout(slots, budget - elapsed)
                        .expect("direct pool lock poisoned");
                    slots = guard;
                    let _ = timeout_result;
                }
            }
        }
    }

    /// Finds (and brings to a usable state) the first free slot, per the
    /// per-state handling in §4.7. Returns `Ok(None)` if every slot is
    /// leased.
    fn find_usable_slot(&self, slots: &mut [Slot]) -> Result<Option<usize>> {
        for (index, slot) in slots.iter_mut().enumerate() {
            let leased = slot.connection.as_ref().is_some_and(|c| c.leased);
            if leased {
                continue;
            }

            match &slot.connection {
                None => {
                    slot.connection = Some(self.open_and_init()?);
                    return Ok(Some(index));
                }
                Some(c) => match c.state() {
                    ConnectionState::Disconnected | ConnectionState::Defunct => {
                        slot.connection = Some(self.open_and_init()?);
                        return Ok(Some(index));
                    }
                    ConnectionState::Connected => {
                        let conn = slot.connection.as_mut().unwrap();
                        conn.init(&self.config.user_agent, &self.auth)?;
                        return Ok(Some(index));
                    }
                    ConnectionState::Failed => {
                        let conn = slot.connection.as_mut().unwrap();
                        if conn.reset().is_err() {
                            slot.connection = Some(self.open_and_init()?);
                        }
                        return Ok(Some(index));
                    }
                    ConnectionState::Ready => {
                        if let Some(max_lifetime) = self.config.max_lifetime() {
                            if conn_age(c) > max_lifetime {
                                log::debug!("connection to {} reached its max lifetime, reopening", self.address);
                                slot.connection = Some(self.open_and_init()?);
                            }
                        }
                        return Ok(Some(index));
                    }
                },
            }
        }
        Ok(None)
    }

    fn open_and_init(&self) -> Result<Connection> {
        let mut conn = Connection::open(Arc::clone(&self.address), &self.config)?;
        if let Some(cb) = &self.on_error {
            conn.set_on_error(Arc::clone(cb));
        }
        conn.init(&self.config.user_agent, &self.auth)?;
        stats::track_alloc(CONNECTION_FOOTPRINT_BYTES);
        Ok(conn)
    }

}

impl Drop for DirectPool {
    /// Closes every slot. After this runs the allocation counter reflects no
    /// connections from this pool.
    fn drop(&mut self) {
        let mut slots = self.shared.slots.lock().expect("direct pool lock poisoned");
        for slot in slots.iter_mut() {
            if let Some(mut conn) = slot.connection.take() {
                conn.close();
                stats::track_dealloc(CONNECTION_FOOTPRINT_BYTES);
            }
        }
        log::debug!("destroyed pool for {}", self.address);
    }
}

fn conn_age(conn: &Connection) -> Duration {
    conn.opened_at().elapsed()
}

/// An acquired slot. Dropping it releases the connection back to the pool
/// (§4.7 Release): clears the agent tag, RESETs, and closes the slot if
/// RESET fails.
pub struct Leased {
    shared: Arc<Shared>,
    index: Option<usize>,
}

impl Leased {
    /// Runs `f` with exclusive access to the leased connection.
    pub fn with<R>(&mut self, f: impl FnOnce(&mut Connection) -> R) -> R {
        let mut slots = self.shared.slots.lock().expect("direct pool lock poisoned");
        let index = self.index.expect("leased slot already released");
        let conn = slots[index].connection.as_mut().expect("leased slot is empty");
        f(conn)
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let Some(index) = self.index.take() else { return };
        let mut slots = self.shared.slots.lock().expect("direct pool lock poisoned");
        if let Some(conn) = slots[index].connection.as_mut() {
            conn.leased = false;
            if conn.state() == ConnectionState::Ready || conn.state() == ConnectionState::Failed {
                if conn.reset().is_err() {
                    conn.close();
                }
            }
        }
        drop(slots);
        self.shared.not_full.notify_one();
    }
}

impl Drop for Leased {
    fn drop(&mut self) {
        self.release_inner();
    }
}
