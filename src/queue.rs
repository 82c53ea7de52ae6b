//! Buffer queue capability and a bounded reference queue

use crate::core::Buffer;
use crossbeam::queue::ArrayQueue;

/// Bounded FIFO of buffer handles between the dispatcher and a consumer
pub trait BufferQueue: Send + Sync {
    /// Append without blocking
    ///
    /// A full queue hands the buffer back so the caller can release it.
    fn try_send(&self, buffer: Buffer) -> Result<(), Buffer>;

    /// Pop the oldest buffer without blocking
    fn try_receive(&self) -> Option<Buffer>;
}

/// Lock-free bounded queue backed by an [`ArrayQueue`]
#[derive(Debug)]
pub struct BoundedQueue {
    slots: ArrayQueue<Buffer>,
}

impl BoundedQueue {
    /// Create a queue holding at most `capacity` buffers (minimum one)
    pub fn new(capacity: usize) -> Self {
        BoundedQueue {
            slots: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Maximum number of queued buffers
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Number of queued buffers
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check whether no buffer is waiting
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Check whether the next send would be refused
    pub fn is_full(&self) -> bool {
        self.slots.is_full()
    }
}

impl BufferQueue for BoundedQueue {
    fn try_send(&self, buffer: Buffer) -> Result<(), Buffer> {
        self.slots.push(buffer)
    }

    fn try_receive(&self) -> Option<Buffer> {
        self.slots.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(bytes: &[u8]) -> Buffer {
        let mut buffer = Buffer::from_block(vec![0u8; 16].into_boxed_slice());
        buffer.fill_from(bytes).unwrap();
        buffer
    }

    #[test]
    fn test_fifo_order() {
        let queue = BoundedQueue::new(4);
        queue.try_send(buffer_with(&[1])).unwrap();
        queue.try_send(buffer_with(&[2])).unwrap();
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.try_receive().unwrap().as_slice(), &[1]);
        assert_eq!(queue.try_receive().unwrap().as_slice(), &[2]);
        assert!(queue.try_receive().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_returns_buffer() {
        let queue = BoundedQueue::new(1);
        queue.try_send(buffer_with(&[1])).unwrap();
        assert!(queue.is_full());

        let rejected = queue.try_send(buffer_with(&[7, 7])).unwrap_err();
        assert_eq!(rejected.as_slice(), &[7, 7]);
        assert_eq!(queue.len(), 1);
    }
}
