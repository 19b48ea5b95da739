//! # Slab Allocator
//!
//! Hands out fixed-size, cache-line aligned payload buffers for archetype
//! blocks. A returned buffer is zeroed and parked on a free list; the next
//! allocation reuses it instead of going back to the system allocator.

use bytemuck::{Pod, Zeroable};

/// Cache line size in bytes; every payload buffer is aligned to it.
pub const CACHE_LINE: usize = 64;

/// One 64-byte aligned chunk of payload memory.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, align(64))]
pub struct CacheLine(pub [u8; CACHE_LINE]);

/// A payload buffer owned by exactly one block.
pub struct SlabBuffer {
    lines: Box<[CacheLine]>,
}

impl SlabBuffer {
    fn zeroed(bytes: usize) -> Self {
        let lines = vec![CacheLine([0; CACHE_LINE]); bytes / CACHE_LINE].into_boxed_slice();
        Self { lines }
    }

    /// Buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len() * CACHE_LINE
    }

    /// Whether the buffer has zero length.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Byte view of the buffer.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.lines)
    }

    /// Mutable byte view of the buffer.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.lines)
    }
}

/// Fixed-capacity allocator of equally sized payload buffers.
///
/// # Example
///
/// ```rust,ignore
/// let mut slab = SlabAllocator::new(32 * 1024, 4096);
/// let buffer = slab.allocate().expect("slab exhausted");
/// slab.free(buffer);
/// ```
pub struct SlabAllocator {
    /// Bytes per buffer.
    buffer_bytes: usize,
    /// Maximum buffers outstanding at once.
    capacity: usize,
    /// Buffers currently owned by blocks.
    outstanding: usize,
    /// Zeroed buffers ready for reuse.
    free: Vec<SlabBuffer>,
}

impl SlabAllocator {
    /// Creates an allocator of `capacity` buffers of `buffer_bytes` each.
    ///
    /// Buffers are created lazily; the free list is reserved up front.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_bytes` is zero or not a multiple of [`CACHE_LINE`].
    #[must_use]
    pub fn new(buffer_bytes: usize, capacity: usize) -> Self {
        assert!(
            buffer_bytes > 0 && buffer_bytes % CACHE_LINE == 0,
            "Buffer size must be a non-zero multiple of {CACHE_LINE}"
        );
        Self {
            buffer_bytes,
            capacity,
            outstanding: 0,
            free: Vec::with_capacity(capacity.min(64)),
        }
    }

    /// Bytes per buffer.
    #[inline]
    #[must_use]
    pub const fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    /// Maximum number of outstanding buffers.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers currently handed out.
    #[inline]
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Buffers parked on the free list.
    #[inline]
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    /// Hands out a zeroed buffer, or `None` when `capacity` are outstanding.
    ///
    /// O(1) amortized: a pooled buffer is reused before a new one is created.
    pub fn allocate(&mut self) -> Option<SlabBuffer> {
        if self.outstanding >= self.capacity {
            return None;
        }
        let buffer = self
            .free
            .pop()
            .unwrap_or_else(|| SlabBuffer::zeroed(self.buffer_bytes));
        self.outstanding += 1;
        Some(buffer)
    }

    /// Returns a buffer. It is zeroed before going back on the free list.
    pub fn free(&mut self, mut buffer: SlabBuffer) {
        debug_assert_eq!(buffer.len(), self.buffer_bytes, "Foreign slab buffer");
        debug_assert!(self.outstanding > 0, "Slab free without allocation");
        buffer.as_bytes_mut().fill(0);
        self.outstanding -= 1;
        self.free.push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_are_aligned_and_zeroed() {
        let mut slab = SlabAllocator::new(1024, 4);
        let buffer = slab.allocate().unwrap();
        assert_eq!(buffer.len(), 1024);
        assert_eq!(buffer.as_bytes().as_ptr() as usize % CACHE_LINE, 0);
        assert!(buffer.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_cache_line_is_padding_free() {
        assert_eq!(std::mem::size_of::<CacheLine>(), CACHE_LINE);
        assert_eq!(std::mem::align_of::<CacheLine>(), CACHE_LINE);
        let lines = [CacheLine::zeroed(); 2];
        assert_eq!(bytemuck::cast_slice::<CacheLine, u8>(&lines).len(), 2 * CACHE_LINE);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut slab = SlabAllocator::new(128, 2);
        let a = slab.allocate().unwrap();
        let _b = slab.allocate().unwrap();
        assert!(slab.allocate().is_none());

        slab.free(a);
        assert_eq!(slab.outstanding(), 1);
        assert!(slab.allocate().is_some());
    }

    #[test]
    fn test_freed_buffer_is_reused_zeroed() {
        let mut slab = SlabAllocator::new(128, 2);
        let mut buffer = slab.allocate().unwrap();
        buffer.as_bytes_mut()[5] = 0xAB;
        let ptr = buffer.as_bytes().as_ptr();
        slab.free(buffer);
        assert_eq!(slab.pooled(), 1);

        let reused = slab.allocate().unwrap();
        assert_eq!(reused.as_bytes().as_ptr(), ptr);
        assert_eq!(reused.as_bytes()[5], 0);
        assert_eq!(slab.pooled(), 0);
    }
}
