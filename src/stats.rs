//! Allocation instrumentation for leak tests: an atomic counter the pools
//! nudge around connection open/close, read back by tests asserting a pool's
//! footprint returns to baseline after `destroy`.
//!
//! This is not a custom global allocator; it only tracks the bytes the pool
//! layer explicitly attributes to a `Connection` (transmit/receive buffer
//! capacity at minimum), mirroring seabolt's manual allocation counter
//! rather than reimplementing a `GlobalAlloc`.

use std::sync::atomic::{AtomicIsize, Ordering};

static ALLOCATED_BYTES: AtomicIsize = AtomicIsize::new(0);

/// Bytes currently attributed to live connections.
pub fn allocated_bytes() -> isize {
    ALLOCATED_BYTES.load(Ordering::SeqCst)
}

/// Call when a tracked allocation of `n` bytes is made.
pub fn track_alloc(n: usize) {
    ALLOCATED_BYTES.fetch_add(n as isize, Ordering::SeqCst);
}

/// Call when a tracked allocation of `n` bytes is released.
pub fn track_dealloc(n: usize) {
    ALLOCATED_BYTES.fetch_sub(n as isize, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serializes tests against the process-wide counter.
    static LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn alloc_dealloc_returns_to_baseline() {
        let _guard = LOCK.lock().unwrap();
        let before = allocated_bytes();
        track_alloc(4096);
        assert_eq!(allocated_bytes(), before + 4096);
        track_dealloc(4096);
        assert_eq!(allocated_bytes(), before);
    }
}
