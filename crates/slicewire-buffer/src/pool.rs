use std::sync::{Mutex, PoisonError};

use bytes::BytesMut;
use tracing::debug;

use crate::buffer::ByteBuffer;

/// Source of [`ByteBuffer`] storage for streams.
///
/// Implementations must be safe to share between streams on different
/// threads.
pub trait BufferPool: Send + Sync {
    /// Hand out a zero-filled buffer of at least `capacity` bytes.
    fn allocate(&self, capacity: usize) -> ByteBuffer;

    /// Grow `buffer` to `new_capacity`, keeping its contents and position.
    fn reallocate(&self, buffer: ByteBuffer, new_capacity: usize) -> ByteBuffer;

    /// Give `buffer` back to the pool.
    fn reclaim(&self, buffer: ByteBuffer);
}

/// Controls how many buffers a [`PooledBufferPool`] retains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of reclaimed buffers kept for reuse.
    pub max_pooled_buffers: usize,
    /// Reclaimed buffers larger than this are dropped instead of pooled.
    pub max_pooled_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pooled_buffers: 64,
            max_pooled_capacity: 1024 * 1024,
        }
    }
}

/// Free-list backed [`BufferPool`].
///
/// Reclaimed storage is kept in a mutex-guarded list and handed back out by
/// [`allocate`](BufferPool::allocate) whenever a retained buffer is large
/// enough, so a stream that is reset and reused between messages stops
/// allocating once it has seen its largest message.
pub struct PooledBufferPool {
    free: Mutex<Vec<BytesMut>>,
    config: PoolConfig,
}

impl PooledBufferPool {
    /// Create an empty pool with default config.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Create an empty pool with explicit config.
    pub fn with_config(config: PoolConfig) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Number of buffers currently waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Get pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn take_free(&self, capacity: usize) -> Option<BytesMut> {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = free.iter().position(|bytes| bytes.capacity() >= capacity)?;
        Some(free.swap_remove(slot))
    }
}

impl Default for PooledBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool for PooledBufferPool {
    fn allocate(&self, capacity: usize) -> ByteBuffer {
        match self.take_free(capacity) {
            Some(storage) => ByteBuffer::from_storage(storage, capacity),
            None => ByteBuffer::with_capacity(capacity),
        }
    }

    fn reallocate(&self, mut buffer: ByteBuffer, new_capacity: usize) -> ByteBuffer {
        debug!(
            old_capacity = buffer.capacity(),
            new_capacity, "reallocating buffer"
        );
        buffer.grow(new_capacity);
        buffer
    }

    fn reclaim(&self, buffer: ByteBuffer) {
        if buffer.capacity() > self.config.max_pooled_capacity {
            return;
        }
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.config.max_pooled_buffers {
            free.push(buffer.into_storage());
        }
    }
}

impl std::fmt::Debug for PooledBufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBufferPool")
            .field("pooled", &self.pooled())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn allocate_gives_requested_capacity() {
        let pool = PooledBufferPool::new();
        let buf = pool.allocate(1500);
        assert_eq!(buf.capacity(), 1500);
        assert_eq!(buf.limit(), 1500);
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn reclaimed_buffer_is_reused_and_zeroed() {
        let pool = PooledBufferPool::new();
        let mut buf = pool.allocate(64);
        buf.put_slice(&[0xEE; 64]).unwrap();
        pool.reclaim(buf);
        assert_eq!(pool.pooled(), 1);

        let buf = pool.allocate(32);
        assert_eq!(pool.pooled(), 0);
        assert_eq!(buf.capacity(), 32);
        assert!(buf.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn reallocate_preserves_content() {
        let pool = PooledBufferPool::new();
        let mut buf = pool.allocate(4);
        buf.put_i32(77).unwrap();
        let mut buf = pool.reallocate(buf, 64);
        assert_eq!(buf.capacity(), 64);
        assert_eq!(buf.position(), 4);
        buf.set_position(0).unwrap();
        assert_eq!(buf.get_i32().unwrap(), 77);
    }

    #[test]
    fn oversized_and_surplus_buffers_are_dropped() {
        let pool = PooledBufferPool::with_config(PoolConfig {
            max_pooled_buffers: 1,
            max_pooled_capacity: 128,
        });
        pool.reclaim(ByteBuffer::with_capacity(256));
        assert_eq!(pool.pooled(), 0);

        pool.reclaim(ByteBuffer::with_capacity(16));
        pool.reclaim(ByteBuffer::with_capacity(16));
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn shared_across_threads() {
        let pool = Arc::new(PooledBufferPool::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..32 {
                        let buf = pool.allocate(256);
                        pool.reclaim(buf);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert!(pool.pooled() <= 4);
    }
}
