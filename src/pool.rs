//! Buffer pool capability and a fixed-block reference pool

use crate::core::Buffer;
use crate::error::PoolError;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Source of preallocated buffers
///
/// Both operations must be non-blocking: the dispatcher calls them on the
/// receive path while holding its lock.
pub trait BufferPool: Send + Sync {
    /// Size of every block handed out by this pool
    fn block_size(&self) -> usize;

    /// Take a free block able to hold `len` bytes
    fn acquire(&self, len: usize) -> Result<Buffer, PoolError>;

    /// Return a block to the pool
    fn release(&self, buffer: Buffer);
}

/// Pool of equally sized blocks allocated once at construction
///
/// Free blocks live in a lock-free [`ArrayQueue`]; acquiring and releasing
/// only moves block ownership and never allocates.
#[derive(Debug)]
pub struct FixedBlockPool {
    /// Free list
    free: ArrayQueue<Box<[u8]>>,
    /// Size of one block
    block_size: usize,
    /// Number of blocks allocated at construction
    blocks: usize,
    /// Times a request found the free list empty
    exhausted_count: AtomicU64,
}

impl FixedBlockPool {
    /// Create a pool of `blocks` blocks of `block_size` bytes each
    ///
    /// A pool without blocks is allowed; every acquire then reports
    /// exhaustion.
    pub fn new(blocks: usize, block_size: usize) -> Self {
        // ArrayQueue rejects a zero capacity
        let free = ArrayQueue::new(blocks.max(1));
        for _ in 0..blocks {
            // Cannot fail, the queue was sized for exactly this many blocks
            let _ = free.push(vec![0u8; block_size].into_boxed_slice());
        }

        FixedBlockPool {
            free,
            block_size,
            blocks,
            exhausted_count: AtomicU64::new(0),
        }
    }

    /// Total number of blocks the pool can hold
    pub fn capacity(&self) -> usize {
        self.blocks
    }

    /// Number of blocks currently free
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of acquire calls that found no free block
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted_count.load(Ordering::Relaxed)
    }
}

impl BufferPool for FixedBlockPool {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn acquire(&self, len: usize) -> Result<Buffer, PoolError> {
        if len > self.block_size {
            return Err(PoolError::TooLarge {
                requested: len,
                block_size: self.block_size,
            });
        }

        match self.free.pop() {
            Some(block) => Ok(Buffer::from_block(block)),
            None => {
                self.exhausted_count.fetch_add(1, Ordering::Relaxed);
                Err(PoolError::Exhausted)
            }
        }
    }

    fn release(&self, buffer: Buffer) {
        let block = buffer.into_block();
        if block.len() != self.block_size {
            warn!(
                block_len = block.len(),
                block_size = self.block_size,
                "Discarding foreign block released into pool"
            );
            return;
        }

        // Never hold more blocks than were allocated
        if self.free.len() >= self.blocks || self.free.push(block).is_err() {
            warn!(
                capacity = self.blocks,
                "Discarding block released into a full pool"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_creation() {
        let pool = FixedBlockPool::new(4, 64);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.block_size(), 64);
    }

    #[test]
    fn test_acquire_release() {
        let pool = FixedBlockPool::new(2, 32);

        let a = pool.acquire(10).unwrap();
        let b = pool.acquire(32).unwrap();
        assert_eq!(a.capacity(), 32);
        assert!(a.is_empty());
        assert_eq!(pool.available(), 0);

        pool.release(a);
        assert_eq!(pool.available(), 1);
        pool.release(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = FixedBlockPool::new(1, 16);
        let _held = pool.acquire(1).unwrap();

        assert_eq!(pool.acquire(1).unwrap_err(), PoolError::Exhausted);
        assert_eq!(pool.exhausted_count(), 1);
    }

    #[test]
    fn test_acquire_too_large() {
        let pool = FixedBlockPool::new(1, 16);
        let err = pool.acquire(20).unwrap_err();
        assert_eq!(err.overflow(), 4);
        // Oversized requests do not consume a block
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.exhausted_count(), 0);
    }

    #[test]
    fn test_empty_pool() {
        let pool = FixedBlockPool::new(0, 16);
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.acquire(1).unwrap_err(), PoolError::Exhausted);

        // A correctly sized block from elsewhere must not grow the pool
        pool.release(Buffer::from_block(vec![0u8; 16].into_boxed_slice()));
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.acquire(1).unwrap_err(), PoolError::Exhausted);
    }

    #[test]
    fn test_release_into_full_pool() {
        let pool = FixedBlockPool::new(2, 16);
        pool.release(Buffer::from_block(vec![0u8; 16].into_boxed_slice()));
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_release_foreign_block() {
        let pool = FixedBlockPool::new(1, 16);
        let _held = pool.acquire(1).unwrap();

        pool.release(Buffer::from_block(vec![0u8; 8].into_boxed_slice()));
        assert_eq!(pool.available(), 0);
    }
}
