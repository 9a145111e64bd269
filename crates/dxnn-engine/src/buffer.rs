//! Bounded output buffer pool
//!
//! The pool holds exactly `buffer_count` fixed-size buffers. A buffer is
//! held from job submission until the result is consumed, so acquisition
//! doubles as the engine's backpressure point: when every buffer is out,
//! `acquire` blocks the submitting thread instead of failing.

use crate::error::{EngineError, Result};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};

pub(crate) struct BufferPool {
    inner: Mutex<PoolInner>,
    available: Condvar,
    buffer_size: usize,
    capacity: usize,
}

struct PoolInner {
    free: Vec<Vec<u8>>,
    closed: bool,
}

impl BufferPool {
    /// Preallocate `capacity` buffers of `buffer_size` bytes each.
    pub(crate) fn new(capacity: usize, buffer_size: usize) -> Result<Arc<Self>> {
        if capacity == 0 {
            return Err(EngineError::memory_allocation(
                "buffer count must be at least 1",
            ));
        }

        let free = (0..capacity).map(|_| vec![0u8; buffer_size]).collect();
        tracing::debug!("Allocated buffer pool: {capacity} x {buffer_size} bytes");

        Ok(Arc::new(Self {
            inner: Mutex::new(PoolInner {
                free,
                closed: false,
            }),
            available: Condvar::new(),
            buffer_size,
            capacity,
        }))
    }

    /// Take a buffer, blocking until one is free (backpressure).
    ///
    /// # Errors
    ///
    /// Returns `EngineClosed` once the pool has been closed, or
    /// `MemoryAllocation` if the pool state is internally inconsistent.
    pub(crate) fn acquire(self: &Arc<Self>) -> Result<PooledBuffer> {
        let mut inner = self.inner.lock().expect("buffer pool lock poisoned");
        loop {
            if inner.closed {
                return Err(EngineError::EngineClosed);
            }
            if let Some(mut data) = inner.free.pop() {
                if data.len() != self.buffer_size {
                    // A consumer resized a recycled buffer; the pool no
                    // longer matches the model's output size.
                    return Err(EngineError::memory_allocation(format!(
                        "recycled buffer has {} bytes, pool expects {}",
                        data.len(),
                        self.buffer_size
                    )));
                }
                data.fill(0);
                return Ok(PooledBuffer {
                    data: Some(data),
                    pool: Arc::clone(self),
                });
            }
            inner = self
                .available
                .wait(inner)
                .expect("buffer pool lock poisoned");
        }
    }

    /// Return a buffer to the free set and wake one blocked submitter.
    fn release(&self, data: Vec<u8>) {
        let mut inner = self.inner.lock().expect("buffer pool lock poisoned");
        if inner.free.len() >= self.capacity {
            tracing::error!(
                "Buffer released into a full pool ({} buffers); dropping it",
                self.capacity
            );
            return;
        }
        inner.free.push(data);
        drop(inner);
        self.available.notify_one();
    }

    /// Close the pool: fail current and future `acquire` calls.
    /// Outstanding buffers may still be released back.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock().expect("buffer pool lock poisoned");
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn free_count(&self) -> usize {
        self.inner.lock().expect("buffer pool lock poisoned").free.len()
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}

/// A buffer on loan from the pool.
///
/// Dropping the guard returns the buffer to the free set, which is what
/// releases one unit of backpressure.
pub struct PooledBuffer {
    data: Option<Vec<u8>>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.release(data);
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.as_ref().map_or(0, Vec::len))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            BufferPool::new(0, 16),
            Err(EngineError::MemoryAllocation { .. })
        ));
    }

    #[test]
    fn drop_returns_buffer_to_pool() {
        let pool = BufferPool::new(2, 8).unwrap();
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.free_count(), 0);
        drop(a);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn acquire_blocks_until_release() {
        let pool = BufferPool::new(1, 8).unwrap();
        let held = pool.acquire().unwrap();

        let pool2 = Arc::clone(&pool);
        let waiter = std::thread::spawn(move || {
            let _buf = pool2.acquire().unwrap();
        });

        // Still parked while the only buffer is out.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        drop(held);
        waiter.join().unwrap();
    }

    #[test]
    fn close_fails_blocked_acquirers() {
        let pool = BufferPool::new(1, 8).unwrap();
        let _held = pool.acquire().unwrap();

        let pool2 = Arc::clone(&pool);
        let waiter = std::thread::spawn(move || pool2.acquire().map(|_| ()));

        std::thread::sleep(Duration::from_millis(20));
        pool.close();

        assert!(matches!(
            waiter.join().unwrap(),
            Err(EngineError::EngineClosed)
        ));
    }

    #[test]
    fn buffers_are_zeroed_on_reuse() {
        let pool = BufferPool::new(1, 4).unwrap();
        let mut buf = pool.acquire().unwrap();
        buf.copy_from_slice(&[0xFF; 4]);
        drop(buf);

        let buf = pool.acquire().unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0]);
    }
}
