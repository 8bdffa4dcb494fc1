//! Bounded free-list for reusable allocations.
//!
//! The router keeps parameter buffers here so hot paths with wildcards do not
//! allocate a fresh `Vec` per request. Nothing depends on a value actually
//! coming from the pool: an empty pool just builds a new one.

use parking_lot::Mutex;

/// A thread-safe stack of idle values, holding at most `capacity` of them.
///
/// # Examples
///
/// ```
/// use pathwise::pool::Pool;
///
/// let pool: Pool<Vec<u8>> = Pool::new(2);
/// let buf = pool.acquire_with(|| Vec::with_capacity(16));
/// assert!(buf.capacity() >= 16);
///
/// pool.release(buf);
/// assert_eq!(pool.idle(), 1);
/// ```
#[derive(Debug)]
pub struct Pool<T> {
    slots: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Pops an idle value, or builds one with `make` when none is idle.
    pub fn acquire_with(&self, make: impl FnOnce() -> T) -> T {
        let idle = self.slots.lock().pop();
        idle.unwrap_or_else(make)
    }

    /// Returns a value to the pool. Dropped when the pool is full.
    pub fn release(&self, value: T) {
        let mut slots = self.slots.lock();
        if slots.len() < self.capacity {
            slots.push(value);
        }
    }

    /// Number of values currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
