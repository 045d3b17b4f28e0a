// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference-counted ownership of a [`StorageBlock`].
//!
//! [`StorageBlock`]: crate::storage::StorageBlock

use crate::storage::{IMMORTAL_REF_COUNT, StorageBlock, StorageHeader};
use alloc::alloc::{Allocator, Global};
use core::{
    fmt,
    marker::PhantomData,
    ptr::NonNull,
    sync::atomic::{self, Ordering},
};
use log::trace;

/// Counts above this are treated as a leak of handles rather than legitimate use.
const MAX_REF_COUNT: usize = isize::MAX as usize;

/// A counted reference to a [`StorageBlock`].
///
/// Cloning an `OwnerHandle` increments the count of the shared block, and dropping the last
/// handle destroys the block's elements and frees it. The empty block is never counted, so
/// handles to it are free to create, clone and drop.
///
/// The uniqueness queries take `&mut Self`. A handle which is known to be the only reference to
/// its block can hand out mutable access to the elements, and requiring exclusive access to the
/// handle itself stops a second reference from being created through it while that access is
/// live.
///
/// The methods of this type are associated functions, called as `OwnerHandle::ref_count(&handle)`.
///
/// [`StorageBlock`]: crate::storage::StorageBlock
pub struct OwnerHandle<T, A: Allocator = Global> {
    block: StorageBlock<T>,
    alloc: A,
    _boo: PhantomData<T>,
}

// SAFETY: The block is shared between threads exactly like an `Arc<[T]>`.
unsafe impl<T: Send + Sync, A: Allocator + Send> Send for OwnerHandle<T, A> {}

// SAFETY: As above.
unsafe impl<T: Send + Sync, A: Allocator + Sync> Sync for OwnerHandle<T, A> {}

impl<T> OwnerHandle<T, Global> {
    /// Creates a handle to the empty block.
    #[must_use]
    #[inline]
    pub fn empty() -> Self {
        Self::empty_in(Global)
    }

    /// Creates a handle to a freshly allocated block with room for at least `minimum_capacity`
    /// elements.
    #[must_use]
    #[track_caller]
    #[inline]
    pub fn with_capacity(minimum_capacity: usize) -> Self {
        Self::with_capacity_in(minimum_capacity, Global)
    }
}

impl<T, A: Allocator> OwnerHandle<T, A> {
    /// Creates a handle to the empty block, using `alloc` for any later allocation.
    #[must_use]
    #[inline]
    pub fn empty_in(alloc: A) -> Self {
        Self {
            block: StorageBlock::empty(),
            alloc,
            _boo: PhantomData,
        }
    }

    /// Creates a handle to a freshly allocated block from `alloc`.
    #[must_use]
    #[track_caller]
    #[inline]
    pub fn with_capacity_in(minimum_capacity: usize, alloc: A) -> Self {
        let block = StorageBlock::allocate_in(minimum_capacity, &alloc);
        // SAFETY: The block was just allocated by `alloc`.
        unsafe { Self::from_block_in(block, alloc) }
    }

    /// Takes ownership of `block`.
    ///
    /// # Safety
    ///
    /// `block` must be the empty block, or a block allocated by `alloc` whose reference count
    /// has not yet been claimed by another handle.
    #[must_use]
    #[inline]
    pub unsafe fn from_block_in(block: StorageBlock<T>, alloc: A) -> Self {
        Self {
            block,
            alloc,
            _boo: PhantomData,
        }
    }

    /// Returns the underlying storage block.
    #[must_use]
    #[inline]
    pub fn block(this: &Self) -> StorageBlock<T> {
        this.block
    }

    /// Returns the allocator which owns the storage.
    #[must_use]
    #[inline]
    pub fn allocator(this: &Self) -> &A {
        &this.alloc
    }

    #[must_use]
    #[inline]
    fn header(this: &Self) -> &StorageHeader {
        // SAFETY: The block is live for as long as any handle to it exists.
        unsafe { this.block.header() }
    }

    /// Returns the number of handles sharing the block.
    ///
    /// The empty block reports `usize::MAX`, as it is never uniquely owned.
    #[must_use]
    #[inline]
    pub fn ref_count(this: &Self) -> usize {
        Self::header(this).ref_count.load(Ordering::Acquire)
    }

    /// Returns the number of initialized elements in the block.
    #[must_use]
    #[inline]
    pub fn count(this: &Self) -> usize {
        Self::header(this).count()
    }

    /// Returns the number of element slots in the block.
    #[must_use]
    #[inline]
    pub fn capacity(this: &Self) -> usize {
        Self::header(this).capacity()
    }

    /// Returns a pointer to the first element slot.
    #[must_use]
    #[inline]
    pub fn first_element_ptr(this: &Self) -> NonNull<T> {
        // SAFETY: The block is live.
        unsafe { this.block.first_element_ptr() }
    }

    /// Sets the number of initialized elements.
    ///
    /// # Safety
    ///
    /// The handle must be the only reference to its block, `count` must not exceed the
    /// capacity, and the slots `[0, count)` must be initialized.
    #[inline]
    pub unsafe fn set_count(this: &mut Self, count: usize) {
        // SAFETY: Upheld by the caller.
        unsafe { this.block.set_count(count) }
    }

    /// Returns `true` if the handle refers to the shared empty block.
    #[must_use]
    #[inline]
    pub fn is_empty_singleton(this: &Self) -> bool {
        this.block.is_empty_singleton()
    }

    /// Returns an address which identifies the block. Handles sharing a block have equal
    /// identities.
    #[must_use]
    #[inline]
    pub fn identity(this: &Self) -> *const () {
        this.block.header_ptr().as_ptr().cast_const().cast()
    }

    /// Returns `true` if both handles refer to the same block.
    #[must_use]
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Self::identity(this) == Self::identity(other)
    }

    /// Returns `true` if this handle is the only reference to its block.
    ///
    /// The empty block is never uniquely referenced.
    #[must_use]
    #[inline]
    pub fn is_uniquely_referenced(this: &mut Self) -> bool {
        // Pairs with the release decrement in `drop`.
        Self::header(this).ref_count.load(Ordering::Acquire) == 1
    }

    /// Returns `true` if this handle is the only reference to its block, or if the only other
    /// reference is the block's live [`PinnedOwner`].
    #[must_use]
    #[inline]
    pub fn is_uniquely_referenced_or_pinned(this: &mut Self) -> bool {
        let header = Self::header(this);
        match header.ref_count.load(Ordering::Acquire) {
            1 => true,
            2 => header.pinned.load(Ordering::Acquire),
            _ => false,
        }
    }

    /// Returns `true` if a [`PinnedOwner`] for the block is live.
    #[must_use]
    #[inline]
    pub fn is_pinned(this: &Self) -> bool {
        Self::header(this).pinned.load(Ordering::Acquire)
    }

    /// Pins the block.
    ///
    /// A block can only be pinned while this handle is its only reference, and only once at a
    /// time. The returned [`PinnedOwner`] keeps the block alive and marks it as pinned until it
    /// is dropped. Returns `None` for the empty block, for shared blocks, and for blocks which
    /// are already pinned.
    #[must_use]
    pub fn pin(this: &mut Self) -> Option<PinnedOwner<T, A>>
    where
        A: Clone,
    {
        if !Self::is_uniquely_referenced(this) {
            return None;
        }

        Self::header(this)
            .pinned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        Some(PinnedOwner {
            owner: this.clone(),
        })
    }
}

impl<T, A: Allocator + Clone> Clone for OwnerHandle<T, A> {
    #[inline]
    fn clone(&self) -> Self {
        if !Self::is_empty_singleton(self) {
            // Relaxed is enough here: a new reference can only be made from an existing one.
            let old_count = Self::header(self)
                .ref_count
                .fetch_add(1, Ordering::Relaxed);
            if old_count > MAX_REF_COUNT {
                modify_refcount_failed("Too many handles to a single storage block");
            }
        }

        Self {
            block: self.block,
            alloc: self.alloc.clone(),
            _boo: PhantomData,
        }
    }
}

impl<T, A: Allocator> Drop for OwnerHandle<T, A> {
    fn drop(&mut self) {
        if Self::is_empty_singleton(self) {
            return;
        }

        let header = Self::header(self);
        debug_assert_ne!(header.ref_count.load(Ordering::Relaxed), IMMORTAL_REF_COUNT);
        if header.ref_count.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }

        atomic::fence(Ordering::Acquire);
        trace!("releasing the last handle to storage block {:p}", Self::identity(self));

        // SAFETY: This was the last handle, and the block was allocated by `self.alloc`.
        unsafe {
            self.block.destroy_in(&self.alloc);
        }
    }
}

impl<T, A: Allocator> fmt::Debug for OwnerHandle<T, A> {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmtr.debug_struct("OwnerHandle")
            .field("block", &Self::identity(self))
            .field("header", Self::header(self))
            .finish()
    }
}

impl<T> Default for OwnerHandle<T, Global> {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

#[cold]
#[track_caller]
const fn modify_refcount_failed(message: &str) -> ! {
    panic!("{}", message);
}

/// A pin on a uniquely owned storage block, created by [`OwnerHandle::pin`].
///
/// While a pin is live, [`OwnerHandle::is_uniquely_referenced_or_pinned`] reports `true` for
/// every handle to the block. The pin only affects that query: the mutation gate of
/// [`ArrayBuffer`] still requires true uniqueness.
///
/// [`ArrayBuffer`]: crate::buffer::ArrayBuffer
pub struct PinnedOwner<T, A: Allocator = Global> {
    owner: OwnerHandle<T, A>,
}

impl<T, A: Allocator> PinnedOwner<T, A> {
    /// Returns an address identifying the pinned block.
    #[must_use]
    #[inline]
    pub fn identity(&self) -> *const () {
        OwnerHandle::identity(&self.owner)
    }
}

impl<T, A: Allocator> Drop for PinnedOwner<T, A> {
    fn drop(&mut self) {
        OwnerHandle::header(&self.owner)
            .pinned
            .store(false, Ordering::Release);
    }
}

impl<T, A: Allocator> fmt::Debug for PinnedOwner<T, A> {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmtr.debug_tuple("PinnedOwner")
            .field(&self.identity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_handles_are_shared_and_never_unique() {
        let mut a = OwnerHandle::<u32>::empty();
        let b = a.clone();
        assert!(OwnerHandle::ptr_eq(&a, &b));
        assert!(OwnerHandle::is_empty_singleton(&a));
        assert!(!OwnerHandle::is_uniquely_referenced(&mut a));
        assert_eq!(OwnerHandle::ref_count(&a), usize::MAX);
    }

    #[test]
    fn test_clone_and_drop_adjust_ref_count() {
        let mut a = OwnerHandle::<u32>::with_capacity(4);
        assert!(OwnerHandle::is_uniquely_referenced(&mut a));

        let b = a.clone();
        assert_eq!(OwnerHandle::ref_count(&a), 2);
        assert!(!OwnerHandle::is_uniquely_referenced(&mut a));

        drop(b);
        assert_eq!(OwnerHandle::ref_count(&a), 1);
        assert!(OwnerHandle::is_uniquely_referenced(&mut a));
    }

    #[test]
    fn test_pin() {
        let mut a = OwnerHandle::<u32>::with_capacity(4);
        let pin = OwnerHandle::pin(&mut a).expect("unique block can be pinned");
        assert_eq!(pin.identity(), OwnerHandle::identity(&a));
        assert!(OwnerHandle::is_pinned(&a));
        assert!(!OwnerHandle::is_uniquely_referenced(&mut a));
        assert!(OwnerHandle::is_uniquely_referenced_or_pinned(&mut a));

        drop(pin);
        assert!(!OwnerHandle::is_pinned(&a));
        assert!(OwnerHandle::is_uniquely_referenced(&mut a));

        let mut empty = OwnerHandle::<u32>::empty();
        assert!(OwnerHandle::pin(&mut empty).is_none());

        let _shared = a.clone();
        assert!(OwnerHandle::pin(&mut a).is_none());
    }

    #[test]
    fn test_clone_of_pinned_handle_is_not_unique_or_pinned() {
        let mut a = OwnerHandle::<u32>::with_capacity(4);
        let pin = OwnerHandle::pin(&mut a).expect("unique block can be pinned");
        let mut b = a.clone();

        assert_eq!(OwnerHandle::ref_count(&a), 3);
        assert!(OwnerHandle::is_pinned(&b));
        assert!(!OwnerHandle::is_uniquely_referenced_or_pinned(&mut a));
        assert!(!OwnerHandle::is_uniquely_referenced_or_pinned(&mut b));

        drop(b);
        assert!(OwnerHandle::is_uniquely_referenced_or_pinned(&mut a));
        drop(pin);
        assert!(OwnerHandle::is_uniquely_referenced_or_pinned(&mut a));
    }
}
