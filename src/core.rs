//! Core types shared by the dispatcher and its buffer collaborators

use crate::error::PoolError;
use std::ops::Deref;
use zerocopy::FromBytes;

/// Fixed-width routing key embedded in every frame
///
/// The identifier is copied out of the frame byte for byte and compared with
/// `==`. No byte swapping is performed, so registered identifiers must already
/// be in the byte order the frame producer writes.
///
/// Implemented for every plain-old-data type with total equality, e.g. `u8`,
/// `u16`, `u32`, `u64` and `[u8; N]`.
pub trait ProtocolId:
    FromBytes + Copy + Eq + std::fmt::Debug + Send + Sync + 'static
{
    /// Width of the identifier field in bytes
    const WIDTH: usize = std::mem::size_of::<Self>();

    /// Read the identifier located at `offset`
    ///
    /// Returns `None` when the frame ends before the identifier does.
    fn read_at(frame: &[u8], offset: usize) -> Option<Self> {
        let end = offset.checked_add(Self::WIDTH)?;
        let field = frame.get(offset..end)?;
        Self::read_from_bytes(field).ok()
    }
}

impl<T> ProtocolId for T where
    T: FromBytes + Copy + Eq + std::fmt::Debug + Send + Sync + 'static
{
}

/// Exclusively owned handle to one pool block
///
/// A buffer is held by exactly one stage at a time: the dispatcher while
/// copying, a queue while enqueued, a consumer after dequeue and the pool once
/// released. It cannot be cloned; handing it on moves it.
#[derive(Debug)]
pub struct Buffer {
    /// Preallocated storage
    block: Box<[u8]>,
    /// Number of valid bytes at the start of `block`
    len: usize,
}

impl Buffer {
    /// Wrap a preallocated block, initially holding no data
    pub fn from_block(block: Box<[u8]>) -> Self {
        Buffer { block, len: 0 }
    }

    /// Give the underlying block back, discarding the fill length
    pub fn into_block(self) -> Box<[u8]> {
        self.block
    }

    /// Size of the underlying block
    pub fn capacity(&self) -> usize {
        self.block.len()
    }

    /// Number of valid bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer holds no data
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.block[..self.len]
    }

    /// Replace the contents with `bytes`
    ///
    /// Fails without touching the buffer if `bytes` does not fit the block.
    pub fn fill_from(&mut self, bytes: &[u8]) -> Result<(), PoolError> {
        let block_size = self.block.len();
        let target = self
            .block
            .get_mut(..bytes.len())
            .ok_or(PoolError::TooLarge {
                requested: bytes.len(),
                block_size,
            })?;
        target.copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }

    /// Forget the current contents
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_id_at_offset() {
        let frame = [0xAA, 0xBB, 0x12, 0x34, 0x56];
        assert_eq!(u8::read_at(&frame, 0), Some(0xAA));
        assert_eq!(<[u8; 2]>::read_at(&frame, 2), Some([0x12, 0x34]));
        // Native byte order, no swapping
        assert_eq!(
            u16::read_at(&frame, 2),
            Some(u16::from_ne_bytes([0x12, 0x34]))
        );
    }

    #[test]
    fn test_read_id_short_frame() {
        let frame = [0x01, 0x02, 0x03];
        assert_eq!(u32::read_at(&frame, 0), None);
        assert_eq!(u16::read_at(&frame, 2), None);
        assert_eq!(u8::read_at(&frame, 3), None);
        assert_eq!(u8::read_at(&frame, usize::MAX), None);
        assert_eq!(u16::read_at(&frame, 1), Some(u16::from_ne_bytes([0x02, 0x03])));
    }

    #[test]
    fn test_id_width() {
        assert_eq!(<u8 as ProtocolId>::WIDTH, 1);
        assert_eq!(<u32 as ProtocolId>::WIDTH, 4);
        assert_eq!(<[u8; 3] as ProtocolId>::WIDTH, 3);
    }

    #[test]
    fn test_buffer_fill() {
        let mut buffer = Buffer::from_block(vec![0u8; 8].into_boxed_slice());
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 8);

        buffer.fill_from(&[1, 2, 3]).unwrap();
        assert_eq!(buffer.as_slice(), &[1, 2, 3]);
        assert_eq!(buffer.len(), 3);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 8);
    }

    #[test]
    fn test_buffer_fill_too_large() {
        let mut buffer = Buffer::from_block(vec![0u8; 4].into_boxed_slice());
        buffer.fill_from(&[9, 9]).unwrap();

        let err = buffer.fill_from(&[0; 6]).unwrap_err();
        assert_eq!(
            err,
            PoolError::TooLarge {
                requested: 6,
                block_size: 4
            }
        );
        // Previous contents survive a failed fill
        assert_eq!(&*buffer, &[9, 9]);
    }
}
