// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw heap storage: a [`StorageHeader`] followed by a tail of element slots.
//!
//! A [`StorageBlock`] is a non-owning pointer to such an allocation. Ownership and lifetime are
//! managed by [`OwnerHandle`], which is the only safe way to reach the contents of a block.
//!
//! [`OwnerHandle`]: crate::owner::OwnerHandle

use crate::{Error, capacity_overflow};
use alloc::alloc::{Allocator, Layout, LayoutError, handle_alloc_error};
use core::{
    fmt,
    marker::PhantomData,
    mem,
    ptr::{self, NonNull},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use log::trace;

/// The reference count stored in the shared empty block. It is never modified.
pub(crate) const IMMORTAL_REF_COUNT: usize = usize::MAX;

/// The bookkeeping placed at the start of every storage allocation.
///
/// `count` is the number of initialized element slots, which always form the prefix
/// `[0, count)` of the element region. `capacity` is fixed when the block is allocated.
#[repr(C)]
pub struct StorageHeader {
    pub(crate) ref_count: AtomicUsize,
    pub(crate) pinned: AtomicBool,
    count: AtomicUsize,
    capacity: usize,
}

static EMPTY_STORAGE: StorageHeader = StorageHeader {
    ref_count: AtomicUsize::new(IMMORTAL_REF_COUNT),
    pinned: AtomicBool::new(false),
    count: AtomicUsize::new(0),
    capacity: 0,
};

impl StorageHeader {
    #[must_use]
    #[inline]
    const fn new(capacity: usize) -> Self {
        Self {
            ref_count: AtomicUsize::new(1),
            pinned: AtomicBool::new(false),
            count: AtomicUsize::new(0),
            capacity,
        }
    }

    /// The number of initialized elements.
    #[must_use]
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// The number of element slots in the block.
    #[must_use]
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for StorageHeader {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmtr.debug_struct("StorageHeader")
            .field("ref_count", &self.ref_count.load(Ordering::Relaxed))
            .field("pinned", &self.pinned.load(Ordering::Relaxed))
            .field("count", &self.count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// The layout of a block with `capacity` slots for `T`, and the offset of the first slot.
#[inline]
fn storage_layout<T>(capacity: usize) -> Result<(Layout, usize), LayoutError> {
    Layout::new::<StorageHeader>().extend(Layout::array::<T>(capacity)?)
}

#[must_use]
#[inline]
const fn elements_offset<T>() -> usize {
    mem::size_of::<StorageHeader>().next_multiple_of(mem::align_of::<T>())
}

/// A pointer to a storage allocation for elements of type `T`.
///
/// A block is either a live heap allocation, or the shared empty block which has a capacity of
/// zero and is never written to. The empty block is never allocated or freed.
///
/// `StorageBlock` does not track whether the allocation it points to is still live. Accessing
/// a block after it has been passed to [`StorageBlock::destroy_in`] is undefined behaviour,
/// which is why the accessors are `unsafe`.
pub struct StorageBlock<T> {
    header: NonNull<StorageHeader>,
    _boo: PhantomData<*mut T>,
}

impl<T> Clone for StorageBlock<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StorageBlock<T> {}

impl<T> StorageBlock<T> {
    /// Returns the shared empty block.
    #[must_use]
    #[inline]
    pub fn empty() -> Self {
        Self {
            header: NonNull::from(&EMPTY_STORAGE),
            _boo: PhantomData,
        }
    }

    /// Allocates a block with room for at least `minimum_capacity` elements.
    ///
    /// The capacity of the new block is derived from the size of the memory actually returned
    /// by `alloc`, so it may exceed `minimum_capacity`. Requesting a capacity of zero returns
    /// the empty block without touching the allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout of the block cannot be computed, or the allocator fails.
    pub fn try_allocate_in<A: Allocator>(minimum_capacity: usize, alloc: &A) -> Result<Self, Error> {
        if minimum_capacity == 0 {
            return Ok(Self::empty());
        }

        let (layout, offset) = storage_layout::<T>(minimum_capacity)?;
        let raw = alloc.allocate(layout).map_err(|_| Error::Alloc(layout))?;

        let capacity = match mem::size_of::<T>() {
            0 => minimum_capacity,
            element_size => (raw.len() - offset) / element_size,
        };

        let header = raw.cast::<StorageHeader>();
        // SAFETY: `raw` is a fresh allocation which fits and is aligned for the header.
        unsafe {
            header.write(StorageHeader::new(capacity));
        }

        trace!(
            "allocated storage for {capacity} elements ({minimum_capacity} requested, {} bytes)",
            raw.len()
        );

        Ok(Self {
            header,
            _boo: PhantomData,
        })
    }

    /// Allocates a block with room for at least `minimum_capacity` elements.
    ///
    /// # Panics
    ///
    /// Panics if the requested capacity overflows, and calls [`handle_alloc_error`] if the
    /// allocator fails.
    #[must_use]
    #[track_caller]
    pub fn allocate_in<A: Allocator>(minimum_capacity: usize, alloc: &A) -> Self {
        match Self::try_allocate_in(minimum_capacity, alloc) {
            Ok(block) => block,
            Err(Error::Alloc(layout)) => handle_alloc_error(layout),
            Err(_) => capacity_overflow(),
        }
    }

    /// Destroys the initialized elements `[0, count)` in order, then frees the block.
    ///
    /// If an element destructor panics, the remaining elements are still dropped and the
    /// memory is still freed.
    ///
    /// # Safety
    ///
    /// The block must have been allocated by `alloc` through [`StorageBlock::allocate_in`] or
    /// [`StorageBlock::try_allocate_in`], must not be the empty block, and must not be used
    /// again afterwards.
    pub unsafe fn destroy_in<A: Allocator>(self, alloc: &A) {
        struct Deallocate<'a, A: Allocator> {
            ptr: NonNull<u8>,
            layout: Layout,
            alloc: &'a A,
        }

        impl<A: Allocator> Drop for Deallocate<'_, A> {
            fn drop(&mut self) {
                // SAFETY: `ptr` was allocated by `alloc` with a layout that `layout` fits.
                unsafe {
                    self.alloc.deallocate(self.ptr, self.layout);
                }
            }
        }

        debug_assert!(
            !self.is_empty_singleton(),
            "the empty storage block cannot be destroyed"
        );

        // SAFETY: The caller guarantees the block is live.
        let (count, capacity) = unsafe { (self.count(), self.capacity()) };
        let Ok((layout, _)) = storage_layout::<T>(capacity) else {
            unreachable!("the layout of a live storage block was valid when it was allocated");
        };

        let _deallocate = Deallocate {
            ptr: self.header.cast(),
            layout,
            alloc,
        };

        trace!("destroying storage with {count} of {capacity} slots initialized");

        // SAFETY: The first `count` slots are initialized.
        unsafe {
            let elements = self.first_element_ptr().as_ptr();
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(elements, count));
        }
    }

    /// Returns `true` if this is the shared empty block.
    #[must_use]
    #[inline]
    pub fn is_empty_singleton(self) -> bool {
        ptr::eq(self.header.as_ptr(), &EMPTY_STORAGE)
    }

    /// Returns a pointer to the header of the block.
    #[must_use]
    #[inline]
    pub const fn header_ptr(self) -> NonNull<StorageHeader> {
        self.header
    }

    /// Returns a reference to the header of the block.
    ///
    /// # Safety
    ///
    /// The block must be live for `'a`.
    #[must_use]
    #[inline]
    pub unsafe fn header<'a>(self) -> &'a StorageHeader {
        // SAFETY: The header is initialized for as long as the block is live.
        unsafe { self.header.as_ref() }
    }

    /// Returns the number of initialized elements.
    ///
    /// # Safety
    ///
    /// The block must be live.
    #[must_use]
    #[inline]
    pub unsafe fn count(self) -> usize {
        unsafe { self.header().count() }
    }

    /// Returns the number of element slots.
    ///
    /// # Safety
    ///
    /// The block must be live.
    #[must_use]
    #[inline]
    pub unsafe fn capacity(self) -> usize {
        unsafe { self.header().capacity() }
    }

    /// Sets the number of initialized elements.
    ///
    /// # Safety
    ///
    /// The block must be live, `count` must not exceed the capacity, and the slots
    /// `[0, count)` must be initialized. No other thread may be accessing the block.
    #[inline]
    pub unsafe fn set_count(self, count: usize) {
        if self.is_empty_singleton() {
            debug_assert_eq!(count, 0, "the empty storage block cannot hold elements");
            return;
        }

        // SAFETY: The caller guarantees the block is live.
        let header = unsafe { self.header() };
        debug_assert!(count <= header.capacity(), "count exceeds capacity");
        header.count.store(count, Ordering::Relaxed);
    }

    /// Returns a pointer to the first element slot.
    ///
    /// The empty block returns a dangling, well-aligned pointer.
    ///
    /// # Safety
    ///
    /// The block must be live.
    #[must_use]
    #[inline]
    pub unsafe fn first_element_ptr(self) -> NonNull<T> {
        if self.is_empty_singleton() {
            return NonNull::dangling();
        }

        // SAFETY: The element region starts `elements_offset` bytes into the allocation.
        unsafe { self.header.byte_add(elements_offset::<T>()).cast::<T>() }
    }
}

impl<T> fmt::Debug for StorageBlock<T> {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmtr.debug_tuple("StorageBlock")
            .field(&self.header)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::alloc::Global;

    #[test]
    fn test_zero_capacity_is_empty_singleton() {
        let block = StorageBlock::<u64>::allocate_in(0, &Global);
        assert!(block.is_empty_singleton());
        assert!(StorageBlock::<u8>::empty().is_empty_singleton());
        unsafe {
            assert_eq!(block.count(), 0);
            assert_eq!(block.capacity(), 0);
        }
    }

    #[test]
    fn test_allocate_reports_actual_capacity() {
        let block = StorageBlock::<u32>::allocate_in(7, &Global);
        assert!(!block.is_empty_singleton());
        unsafe {
            assert!(block.capacity() >= 7);
            assert_eq!(block.count(), 0);
            assert_eq!(block.header().ref_count.load(Ordering::Relaxed), 1);

            let first = block.first_element_ptr();
            assert_eq!(first.as_ptr() as usize % mem::align_of::<u32>(), 0);

            block.destroy_in(&Global);
        }
    }

    #[test]
    fn test_overaligned_elements() {
        #[repr(align(64))]
        struct Wide(#[allow(dead_code)] u8);

        let block = StorageBlock::<Wide>::allocate_in(3, &Global);
        unsafe {
            assert_eq!(block.first_element_ptr().as_ptr() as usize % 64, 0);
            block.destroy_in(&Global);
        }
    }

    #[test]
    fn test_layout_overflow_is_an_error() {
        let result = StorageBlock::<u64>::try_allocate_in(usize::MAX, &Global);
        assert!(matches!(result, Err(Error::Layout(_))));
    }

    #[test]
    fn test_zero_sized_capacity() {
        let block = StorageBlock::<()>::allocate_in(1000, &Global);
        unsafe {
            assert_eq!(block.capacity(), 1000);
            block.destroy_in(&Global);
        }
    }
}
