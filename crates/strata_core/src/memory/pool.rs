//! # Pool Allocator
//!
//! Fixed-capacity slot pool for block headers. Handles are plain slot
//! indices; a freed slot is handed out again by a later allocation.

/// A pool allocator for fixed-size objects.
///
/// Objects can be allocated and freed individually. Slot storage and the
/// free list are allocated once, up front.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. The scene owning it is single-writer.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: PoolAllocator<EntityBlock> = PoolAllocator::new(4096);
///
/// // Allocate - O(1), no heap allocation
/// let handle = pool.allocate(block)?;
///
/// // Free - O(1), no heap deallocation
/// pool.free(handle);
/// ```
pub struct PoolAllocator<T> {
    /// The storage array.
    storage: Box<[Option<T>]>,
    /// Free list - indices of available slots, next allocation on top.
    free_list: Vec<usize>,
    /// Number of allocated objects.
    allocated_count: usize,
}

/// Handle to an allocated object in a pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolHandle {
    /// Index into the pool.
    index: usize,
}

impl PoolHandle {
    /// Returns the slot index behind this handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }
}

impl<T> PoolAllocator<T> {
    /// Creates a new pool with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than zero");

        let storage: Vec<Option<T>> = (0..capacity).map(|_| None).collect();
        let free_list: Vec<usize> = (0..capacity).rev().collect();

        Self {
            storage: storage.into_boxed_slice(),
            free_list,
            allocated_count: 0,
        }
    }

    /// Returns the total capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns the number of currently allocated objects.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Stores `value` in a free slot.
    ///
    /// Returns `Err(value)` when the pool is full so the caller can release
    /// whatever the value owns.
    pub fn allocate(&mut self, value: T) -> Result<PoolHandle, T> {
        let Some(index) = self.free_list.pop() else {
            return Err(value);
        };

        self.storage[index] = Some(value);
        self.allocated_count += 1;

        Ok(PoolHandle { index })
    }

    /// Returns the handle the next [`allocate`](Self::allocate) will use.
    #[must_use]
    pub fn next_handle(&self) -> Option<PoolHandle> {
        self.free_list.last().map(|&index| PoolHandle { index })
    }

    /// Frees an allocated object, returning it.
    pub fn free(&mut self, handle: PoolHandle) -> Option<T> {
        let value = self.storage.get_mut(handle.index)?.take()?;
        self.free_list.push(handle.index);
        self.allocated_count -= 1;

        Some(value)
    }

    /// Gets a reference to an allocated object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.storage.get(handle.index)?.as_ref()
    }

    /// Gets a mutable reference to an allocated object.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.storage.get_mut(handle.index)?.as_mut()
    }

    /// Gets mutable references to two distinct allocated objects.
    pub fn get2_mut(&mut self, a: PoolHandle, b: PoolHandle) -> Option<(&mut T, &mut T)> {
        if a.index == b.index || a.index >= self.storage.len() || b.index >= self.storage.len() {
            return None;
        }
        let (low, high, swapped) = if a.index < b.index {
            (a.index, b.index, false)
        } else {
            (b.index, a.index, true)
        };
        let (head, tail) = self.storage.split_at_mut(high);
        let first = head[low].as_mut()?;
        let second = tail[0].as_mut()?;
        Some(if swapped { (second, first) } else { (first, second) })
    }

    /// Raw slot view, in handle order.
    #[inline]
    #[must_use]
    pub fn slots(&self) -> &[Option<T>] {
        &self.storage
    }

    /// Raw mutable slot view, in handle order.
    #[inline]
    pub fn slots_mut(&mut self) -> &mut [Option<T>] {
        &mut self.storage
    }

    /// Removes every object, returning them in handle order.
    ///
    /// No memory is freed - the slot array is reused.
    pub fn drain(&mut self) -> Vec<T> {
        let drained: Vec<T> = self.storage.iter_mut().filter_map(Option::take).collect();
        self.free_list.clear();
        self.free_list.extend((0..self.storage.len()).rev());
        self.allocated_count = 0;
        drained
    }

    /// Iterates over all allocated objects.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.storage
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|v| (PoolHandle { index }, v)))
    }

    /// Iterates mutably over all allocated objects.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolHandle, &mut T)> {
        self.storage
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|v| (PoolHandle { index }, v)))
    }
}
