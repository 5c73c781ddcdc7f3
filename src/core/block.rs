//! Block descriptors and aligned transfer buffers
//!
//! A block is the unit of transfer: a byte offset, a sequence index used to
//! pair its read completion with the follow-on write, and an owned buffer.
//! The buffer moves with the block — from the read enqueue, through the
//! source backend's pending table, back out in the read completion, into the
//! write enqueue — and is dropped exactly once, after the write completes.

use crate::error::{RawCopyError, Result};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// A unit of transfer: offset, correlation index and an owned buffer
#[derive(Debug)]
pub struct BlockDescriptor {
    /// Byte offset into both source and destination
    pub offset: u64,
    /// Sequence index (offset / block size); pairs a read with its write
    pub index: u64,
    /// Owned buffer sized to this block's transfer length
    pub buffer: BlockBuffer,
}

impl BlockDescriptor {
    /// Transfer length of this block in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether this block carries no data
    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }
}

/// An owned, alignment-constrained I/O buffer
///
/// Capacity is rounded up to the alignment so the allocation stays suitable
/// for direct I/O even for a short tail block; the logical length is the
/// transfer length. The data address is heap-allocated and never changes
/// when the owning value moves, which lets an in-flight kernel operation
/// hold the raw pointer while the owner sits in a pending-operation table.
#[derive(Debug)]
pub struct BlockBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    len: usize,
}

// The buffer is uniquely owned and carries no thread affinity.
unsafe impl Send for BlockBuffer {}

impl BlockBuffer {
    /// Allocate a zeroed buffer of `len` bytes aligned to `align`
    ///
    /// `align` must be a power of two. Fails with
    /// [`RawCopyError::Allocation`] if the allocator refuses.
    pub fn zeroed(len: usize, align: usize) -> Result<Self> {
        if len == 0 || !align.is_power_of_two() {
            return Err(RawCopyError::Allocation { bytes: len });
        }
        let capacity = len
            .checked_add(align - 1)
            .map(|n| n & !(align - 1))
            .ok_or(RawCopyError::Allocation { bytes: len })?;
        let layout = Layout::from_size_align(capacity, align)
            .map_err(|_| RawCopyError::Allocation { bytes: len })?;
        // Safety: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(RawCopyError::Allocation { bytes: len })?;
        Ok(Self { ptr, layout, len })
    }

    /// Raw pointer to the buffer data
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Mutable raw pointer to the buffer data
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Logical length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the logical length is zero
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for BlockBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // Safety: ptr is valid for len bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for BlockBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // Safety: ptr is valid for len bytes and uniquely owned.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for BlockBuffer {
    fn drop(&mut self) {
        // Safety: ptr was allocated with exactly this layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_aligned_and_zeroed() {
        let buf = BlockBuffer::zeroed(4096, 4096).unwrap();
        assert_eq!(buf.as_ptr() as usize % 4096, 0);
        assert_eq!(buf.len(), 4096);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tail_buffer_keeps_logical_len() {
        let mut buf = BlockBuffer::zeroed(1808, 4096).unwrap();
        assert_eq!(buf.len(), 1808);
        assert_eq!(buf.as_ptr() as usize % 4096, 0);
        buf[..4].copy_from_slice(b"tail");
        assert_eq!(&buf[..4], b"tail");
    }

    #[test]
    fn test_zero_length_is_rejected() {
        assert!(BlockBuffer::zeroed(0, 4096).is_err());
    }

    #[test]
    fn test_descriptor_len_tracks_buffer() {
        let block = BlockDescriptor {
            offset: 8192,
            index: 2,
            buffer: BlockBuffer::zeroed(4096, 4096).unwrap(),
        };
        assert_eq!(block.len(), 4096);
        assert!(!block.is_empty());
    }
}
