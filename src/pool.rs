// ABOUTME: Process-wide LIFO pool of reusable I/O operation descriptors for send/receive buffers
// ABOUTME: Amortizes per-operation heap allocation under high connection churn; safe for concurrent use

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::PoolError;

/// A reusable buffer descriptor rented from an [`IOOpPool`] for exactly one asynchronous
/// receive or send, then returned.
///
/// There is no completion-callback or one-shot-promise plumbing here, unlike the IOCP-style
/// descriptor this is modeled on: `async`/`await` already gives the caller a future to await,
/// so the descriptor's only remaining job is to carry a reusable buffer.
#[derive(Debug)]
pub struct IOOp {
    buf: Vec<u8>,
}

impl IOOp {
    fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Returns a slice of exactly `len` bytes for a receive call, reusing the backing
    /// allocation when it is already large enough.
    pub(crate) fn prepare_recv(&mut self, len: usize) -> &mut [u8] {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        } else {
            self.buf.truncate(len);
        }
        &mut self.buf[..len]
    }

    /// Copies `payload` into the descriptor's buffer ahead of a send call.
    pub(crate) fn load_send(&mut self, payload: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(payload);
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// A thread-safe LIFO pool of idle [`IOOp`] descriptors.
///
/// `get`/`put` fail once [`dispose`](IOOpPool::dispose) has been called; descriptors already
/// rented at that point remain valid for their single outstanding operation, since disposal
/// only releases the *idle* descriptors held by the pool itself.
#[derive(Debug)]
pub struct IOOpPool {
    idle: Mutex<Vec<IOOp>>,
    disposed: AtomicBool,
    default_capacity: usize,
}

impl IOOpPool {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
            default_capacity,
        }
    }

    /// Returns an idle descriptor, allocating a fresh one if the pool is empty.
    pub fn get(&self) -> Result<IOOp, PoolError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(PoolError::Disposed);
        }
        let mut idle = self.idle.lock().unwrap();
        Ok(idle.pop().unwrap_or_else(|| IOOp::new(self.default_capacity)))
    }

    /// Returns a descriptor to the pool. Returning the same descriptor twice is a caller bug;
    /// this pool does not detect it.
    pub fn put(&self, op: IOOp) -> Result<(), PoolError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(PoolError::Disposed);
        }
        self.idle.lock().unwrap().push(op);
        Ok(())
    }

    /// Snapshot of idle descriptors currently held.
    pub fn count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    /// Marks the pool disposed and drops every idle descriptor. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.idle.lock().unwrap().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_allocates_when_empty() {
        let pool = IOOpPool::new(64);
        assert_eq!(pool.count(), 0);
        let op = pool.get().unwrap();
        assert_eq!(pool.count(), 0);
        pool.put(op).unwrap();
        assert_eq!(pool.count(), 1);
    }

    #[test]
    fn reuses_at_most_warmup_instances() {
        // Paired get/put cycles with W=2 warmup should never grow the idle count past 2,
        // and a single-threaded caller should observe at most 2 distinct buffers cycling.
        let pool = IOOpPool::new(16);
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        pool.put(a).unwrap();
        pool.put(b).unwrap();
        assert_eq!(pool.count(), 2);

        for _ in 0..50 {
            let x = pool.get().unwrap();
            let y = pool.get().unwrap();
            pool.put(x).unwrap();
            pool.put(y).unwrap();
        }
        assert_eq!(pool.count(), 2);
    }

    #[test]
    fn disposal_rejects_get_and_put() {
        let pool = IOOpPool::new(16);
        let op = pool.get().unwrap();
        pool.dispose();
        assert!(pool.is_disposed());
        assert_eq!(pool.get().unwrap_err(), PoolError::Disposed);
        assert_eq!(pool.put(op).unwrap_err(), PoolError::Disposed);
    }

    #[test]
    fn dispose_is_idempotent() {
        let pool = IOOpPool::new(16);
        pool.dispose();
        pool.dispose();
        assert!(pool.is_disposed());
    }

    #[test]
    fn prepare_recv_reuses_allocation() {
        let mut op = IOOp::new(8);
        {
            let buf = op.prepare_recv(8);
            buf.copy_from_slice(b"abcdefgh");
        }
        assert_eq!(op.as_slice(), b"abcdefgh");
        {
            let buf = op.prepare_recv(4);
            buf.copy_from_slice(b"wxyz");
        }
        assert_eq!(op.as_slice(), b"wxyz");
    }

    #[test]
    fn load_send_overwrites_previous_payload() {
        let mut op = IOOp::new(4);
        op.load_send(b"hello world");
        assert_eq!(op.as_slice(), b"hello world");
        op.load_send(b"hi");
        assert_eq!(op.as_slice(), b"hi");
    }
}
