#![allow(missing_docs, clippy::missing_safety_doc)]

//! The value-semantic [`ArrayBuffer`], and [`UniqueBuffer`], the token which grants mutable
//! access to its storage.
//!
//! An `ArrayBuffer` behaves like an immutable value which happens to be cheap to copy: cloning
//! shares the storage, and the storage is only written to while a [`UniqueBuffer`] borrowed from
//! the buffer is live. A `UniqueBuffer` can only be obtained through
//! [`ArrayBuffer::request_unique_mutable_backing_buffer`] or [`ArrayBuffer::make_unique`], both
//! of which check that no other handle shares the storage at the time of the call.
//!
//! ```
//! use cistern::ArrayBuffer;
//!
//! let mut a: ArrayBuffer<u32> = [1, 2, 3].into_iter().collect();
//! let b = a.clone();
//!
//! // `a` shares its storage with `b`, so it cannot be mutated in place.
//! assert!(a.request_unique_mutable_backing_buffer(0).is_none());
//!
//! // Replacing a range copies the elements into fresh storage first.
//! a.replace_subrange(1..2, 2, [7, 8]);
//! assert_eq!(a, [1, 7, 8, 3]);
//! assert_eq!(b, [1, 2, 3]);
//! ```

use crate::{
    Error,
    builder::copy_sequence_to_buffer_in,
    capacity_overflow, check_subrange, index_out_of_bounds,
    owner::{OwnerHandle, PinnedOwner},
    replace, resolve_range,
    slice::SliceBuffer,
    slots,
    storage::StorageBlock,
};
use alloc::alloc::{Allocator, Global};
use core::{
    borrow::Borrow,
    fmt,
    hash::{Hash, Hasher},
    iter,
    mem::MaybeUninit,
    ops::{Deref, DerefMut, Index, Range, RangeBounds},
    ptr,
    slice::{self, SliceIndex},
};
#[cfg(feature = "serde")]
use serde_core::{Serialize, Serializer};

/// A contiguous buffer of `T`s with copy-on-write storage.
///
/// See the [module documentation] for more information.
///
/// [module documentation]: ./index.html
pub struct ArrayBuffer<T, A: Allocator = Global> {
    owner: OwnerHandle<T, A>,
}

impl<T> ArrayBuffer<T> {
    /// Creates an empty buffer. This does not allocate.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates an empty buffer with room for at least `minimum_capacity` elements.
    #[must_use]
    #[track_caller]
    #[inline]
    pub fn with_capacity(minimum_capacity: usize) -> Self {
        Self::with_capacity_in(minimum_capacity, Global)
    }
}

impl<T, A: Allocator> ArrayBuffer<T, A> {
    #[must_use]
    #[inline]
    pub fn new_in(alloc: A) -> Self {
        Self {
            owner: OwnerHandle::empty_in(alloc),
        }
    }

    #[must_use]
    #[track_caller]
    #[inline]
    pub fn with_capacity_in(minimum_capacity: usize, alloc: A) -> Self {
        Self {
            owner: OwnerHandle::with_capacity_in(minimum_capacity, alloc),
        }
    }

    /// Creates an empty buffer with room for at least `minimum_capacity` elements, returning an
    /// error instead of aborting if the storage cannot be allocated.
    #[inline]
    pub fn try_with_capacity_in(minimum_capacity: usize, alloc: A) -> Result<Self, Error> {
        let block = StorageBlock::try_allocate_in(minimum_capacity, &alloc)?;
        // SAFETY: The block was just allocated by `alloc`.
        let owner = unsafe { OwnerHandle::from_block_in(block, alloc) };
        Ok(Self { owner })
    }

    #[must_use]
    #[inline]
    pub const fn from_owner(owner: OwnerHandle<T, A>) -> Self {
        Self { owner }
    }

    #[must_use]
    #[inline]
    pub const fn owner(&self) -> &OwnerHandle<T, A> {
        &self.owner
    }

    #[must_use]
    #[inline]
    pub fn into_owner(self) -> OwnerHandle<T, A> {
        self.owner
    }

    #[must_use]
    #[inline]
    pub(crate) fn owner_mut(&mut self) -> &mut OwnerHandle<T, A> {
        &mut self.owner
    }

    /// The number of elements in the buffer.
    #[must_use]
    #[inline]
    pub fn count(&self) -> usize {
        OwnerHandle::count(&self.owner)
    }

    /// The number of elements the storage can hold without reallocating.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        OwnerHandle::capacity(&self.owner)
    }

    #[must_use]
    #[inline]
    pub fn allocator(&self) -> &A {
        OwnerHandle::allocator(&self.owner)
    }

    /// An address identifying the storage. Buffers sharing storage have the same identity.
    #[must_use]
    #[inline]
    pub fn identity(&self) -> *const () {
        OwnerHandle::identity(&self.owner)
    }

    #[must_use]
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        OwnerHandle::ptr_eq(&self.owner, &other.owner)
    }

    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        OwnerHandle::first_element_ptr(&self.owner)
            .as_ptr()
            .cast_const()
    }

    /// Provides read access to the elements of the buffer.
    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: The first `count` slots are initialized, and are not written to while this
        // buffer is borrowed.
        unsafe { slice::from_raw_parts(self.as_ptr(), self.count()) }
    }

    /// Returns the element at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[must_use]
    #[track_caller]
    #[inline]
    pub fn element(&self, index: usize) -> &T {
        match self.as_slice().get(index) {
            Some(value) => value,
            None => index_out_of_bounds(index, self.count()),
        }
    }

    /// Clones the elements in `range` into the start of `target`, returning how many were
    /// written.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds, or `target` is too short to hold it.
    #[track_caller]
    pub fn copy_contents<R>(&self, range: R, target: &mut [MaybeUninit<T>]) -> usize
    where
        R: RangeBounds<usize>,
        T: Clone,
    {
        let range = resolve_range(range, self.count());
        copy_into_uninit(&self.as_slice()[range], target)
    }

    #[must_use]
    #[inline]
    pub fn is_uniquely_referenced(&mut self) -> bool {
        OwnerHandle::is_uniquely_referenced(&mut self.owner)
    }

    #[must_use]
    #[inline]
    pub fn is_uniquely_referenced_or_pinned(&mut self) -> bool {
        OwnerHandle::is_uniquely_referenced_or_pinned(&mut self.owner)
    }

    /// Returns `true` if the buffer may be written to in place.
    ///
    /// Storage created by this crate is always mutable, so this is the same as
    /// [`ArrayBuffer::is_uniquely_referenced`].
    #[must_use]
    #[inline]
    pub fn is_mutable_and_uniquely_referenced(&mut self) -> bool {
        self.is_uniquely_referenced()
    }

    #[must_use]
    #[inline]
    pub fn is_mutable_and_uniquely_referenced_or_pinned(&mut self) -> bool {
        self.is_uniquely_referenced_or_pinned()
    }

    /// Returns a [`UniqueBuffer`] if the storage is not shared and can hold at least
    /// `minimum_capacity` elements.
    ///
    /// This is the only route to mutating storage in place, and the check is made again on
    /// every call. The empty storage is never returned.
    #[must_use]
    #[inline]
    pub fn request_unique_mutable_backing_buffer(
        &mut self,
        minimum_capacity: usize,
    ) -> Option<UniqueBuffer<'_, T, A>> {
        if self.capacity() >= minimum_capacity && self.is_uniquely_referenced() {
            Some(UniqueBuffer { buffer: self })
        } else {
            None
        }
    }

    /// Pins the storage. See [`OwnerHandle::pin`].
    #[must_use]
    #[inline]
    pub fn pin(&mut self) -> Option<PinnedOwner<T, A>>
    where
        A: Clone,
    {
        OwnerHandle::pin(&mut self.owner)
    }
}

impl<T, A: Allocator + Clone> ArrayBuffer<T, A> {
    /// Returns a view of `range` which shares this buffer's storage.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    #[must_use]
    #[track_caller]
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> SliceBuffer<T, A> {
        let range = resolve_range(range, self.count());
        SliceBuffer::from_owner(self.owner.clone(), range)
    }

    /// Converts the buffer into a view of all of its elements.
    #[must_use]
    #[inline]
    pub fn into_slice_buffer(self) -> SliceBuffer<T, A> {
        let count = self.count();
        SliceBuffer::from_owner(self.owner, 0..count)
    }
}

impl<T: Clone, A: Allocator + Clone> ArrayBuffer<T, A> {
    /// Returns a [`UniqueBuffer`] with at least `minimum_capacity` slots, copying the elements
    /// into new storage first if the current storage is shared or too small.
    ///
    /// If the buffer is empty and `minimum_capacity` is zero, the returned token refers to the
    /// empty storage, which has no slots to write to.
    #[track_caller]
    pub fn make_unique(&mut self, minimum_capacity: usize) -> UniqueBuffer<'_, T, A> {
        if !(self.capacity() >= minimum_capacity && self.is_uniquely_referenced()) {
            let count = self.count();
            let minimum_capacity = minimum_capacity.max(count);
            replace::replace_relocating(self, count..count, 0, iter::empty(), minimum_capacity);
        }

        UniqueBuffer { buffer: self }
    }

    /// Replaces the elements in `subrange` with the `new_count` elements of `new_values`.
    ///
    /// The replacement happens in place if the storage is unique and large enough. Otherwise
    /// the result is assembled in new storage, moving the surviving elements if the old storage
    /// was unique and cloning them if it was shared.
    ///
    /// # Panics
    ///
    /// Panics if `subrange` is out of bounds, or if `new_values` does not yield exactly
    /// `new_count` elements.
    #[track_caller]
    pub fn replace_subrange<I>(&mut self, subrange: Range<usize>, new_count: usize, new_values: I)
    where
        I: IntoIterator<Item = T>,
    {
        let old_count = self.count();
        check_subrange(&subrange, old_count);
        let final_count = (old_count - subrange.len())
            .checked_add(new_count)
            .unwrap_or_else(|| capacity_overflow());

        match self.request_unique_mutable_backing_buffer(final_count) {
            Some(mut unique) => unique.replace_subrange(subrange, new_count, new_values),
            None => replace::replace_relocating(
                self,
                subrange,
                new_count,
                new_values.into_iter(),
                final_count,
            ),
        }
    }

    /// Appends every element of `new_values` to the end of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `new_values` yields a different number of elements than its reported length.
    #[track_caller]
    pub fn append_contents<I>(&mut self, new_values: I)
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let new_values = new_values.into_iter();
        let new_count = new_values.len();
        let count = self.count();
        self.replace_subrange(count..count, new_count, new_values);
    }
}

pub(crate) fn copy_into_uninit<T: Clone>(src: &[T], target: &mut [MaybeUninit<T>]) -> usize {
    assert!(
        target.len() >= src.len(),
        "target holds {} elements, but {} are being copied",
        target.len(),
        src.len()
    );

    for (slot, value) in target.iter_mut().zip(src) {
        slot.write(value.clone());
    }

    src.len()
}

/// Exclusive, mutable access to the storage of an [`ArrayBuffer`].
///
/// While this token is live, the buffer it was borrowed from is the sole owner of its storage,
/// and the storage cannot become shared.
pub struct UniqueBuffer<'b, T, A: Allocator = Global> {
    buffer: &'b mut ArrayBuffer<T, A>,
}

impl<'b, T, A: Allocator> UniqueBuffer<'b, T, A> {
    #[must_use]
    #[inline]
    pub fn count(&self) -> usize {
        self.buffer.count()
    }

    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// A pointer to the first element slot, valid for writes to `capacity` slots.
    #[must_use]
    #[inline]
    pub fn first_element_ptr(&mut self) -> *mut T {
        OwnerHandle::first_element_ptr(&self.buffer.owner).as_ptr()
    }

    /// Sets the number of initialized elements.
    ///
    /// # Safety
    ///
    /// `count` must not exceed the capacity, and the slots `[0, count)` must be initialized.
    #[inline]
    pub unsafe fn set_count(&mut self, count: usize) {
        debug_assert!(count <= self.capacity(), "count exceeds capacity");
        // SAFETY: The storage is uniquely owned, the rest is upheld by the caller.
        unsafe { OwnerHandle::set_count(&mut self.buffer.owner, count) }
    }

    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.buffer.as_slice()
    }

    /// Provides mutable access to the elements of the buffer.
    #[must_use]
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let count = self.count();
        // SAFETY: The first `count` slots are initialized, and the storage is not shared.
        unsafe { slice::from_raw_parts_mut(self.first_element_ptr(), count) }
    }

    #[must_use]
    #[inline]
    pub fn into_mut_slice(mut self) -> &'b mut [T] {
        let count = self.count();
        // SAFETY: As for `as_mut_slice`, for the lifetime of the original borrow.
        unsafe { slice::from_raw_parts_mut(self.first_element_ptr(), count) }
    }

    /// Returns the uninitialized slots after the last element.
    #[must_use]
    #[inline]
    pub fn spare_capacity_mut(&mut self) -> &mut [MaybeUninit<T>] {
        let (count, capacity) = (self.count(), self.capacity());
        // SAFETY: The slots `[count, capacity)` are in bounds, and `MaybeUninit` needs no
        // initialization.
        unsafe {
            let spare = self.first_element_ptr().add(count).cast::<MaybeUninit<T>>();
            slice::from_raw_parts_mut(spare, capacity - count)
        }
    }

    /// Appends `value` if there is a spare slot, and hands it back otherwise.
    #[inline]
    pub fn push_within_capacity(&mut self, value: T) -> Result<(), T> {
        let count = self.count();
        if count == self.capacity() {
            return Err(value);
        }

        // SAFETY: The slot at `count` is in bounds and uninitialized.
        unsafe {
            slots::initialize(self.first_element_ptr().add(count), value);
            self.set_count(count + 1);
        }

        Ok(())
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let count = self.count().checked_sub(1)?;
        // SAFETY: The last slot is initialized, and is forgotten before it is read.
        unsafe {
            self.set_count(count);
            Some(ptr::read(self.first_element_ptr().add(count)))
        }
    }

    /// Removes the element at `index`, shifting the elements after it down.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[track_caller]
    pub fn remove(&mut self, index: usize) -> T {
        let count = self.count();
        if index >= count {
            index_out_of_bounds(index, count);
        }

        // SAFETY: `index` is in bounds. Moving the tail down cannot panic.
        unsafe {
            let base = self.first_element_ptr();
            let value = ptr::read(base.add(index));
            slots::move_initialize_forward(base.add(index), base.add(index + 1), count - index - 1);
            self.set_count(count - 1);
            value
        }
    }

    /// Drops every element from `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        let count = self.count();
        if len < count {
            // SAFETY: The count is lowered first, so a panicking destructor leaks the rest of
            // the tail instead of exposing dropped elements.
            unsafe {
                self.set_count(len);
                slots::destroy(self.first_element_ptr().add(len), count - len);
            }
        }
    }

    /// Replaces the elements in `subrange` with `new_count` elements of `new_values`, without
    /// reallocating.
    ///
    /// # Panics
    ///
    /// Panics if `subrange` is out of bounds, if the result would not fit in the capacity, or
    /// if `new_values` does not yield exactly `new_count` elements.
    #[track_caller]
    pub fn replace_subrange<I>(&mut self, subrange: Range<usize>, new_count: usize, new_values: I)
    where
        I: IntoIterator<Item = T>,
    {
        replace::replace_in_place(self, subrange, new_count, new_values.into_iter());
    }

    /// Makes the elements equal to `src`, cloning over existing elements where possible.
    ///
    /// # Panics
    ///
    /// Panics if `src` is longer than the capacity.
    #[track_caller]
    pub fn assign_from_slice(&mut self, src: &[T])
    where
        T: Clone,
    {
        assert!(
            src.len() <= self.capacity(),
            "source of length {} does not fit in a capacity of {}",
            src.len(),
            self.capacity()
        );

        self.truncate(src.len());
        let count = self.count();
        let (overlap, rest) = src.split_at(count);
        let base = self.first_element_ptr();

        // SAFETY: The first `count` slots are initialized, and `rest` fits in the spare slots.
        unsafe {
            for (i, value) in overlap.iter().enumerate() {
                slots::copy_assign(base.add(i), value);
            }
        }

        for value in rest {
            if self.push_within_capacity(value.clone()).is_err() {
                unreachable!("the capacity was checked above");
            }
        }
    }
}

impl<'b, T, A: Allocator> Deref for UniqueBuffer<'b, T, A> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<'b, T, A: Allocator> DerefMut for UniqueBuffer<'b, T, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<'b, T: fmt::Debug, A: Allocator> fmt::Debug for UniqueBuffer<'b, T, A> {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_slice(), fmtr)
    }
}

impl<T, A: Allocator + Clone> Clone for ArrayBuffer<T, A> {
    /// Returns a buffer sharing this buffer's storage. This does not copy any elements.
    #[inline]
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
        }
    }
}

impl<T> Default for ArrayBuffer<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for ArrayBuffer<T, A> {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_slice(), fmtr)
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<ArrayBuffer<T, B>> for ArrayBuffer<T, A> {
    #[inline]
    fn eq(&self, other: &ArrayBuffer<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: PartialEq<U>, U, A: Allocator> PartialEq<[U]> for ArrayBuffer<T, A> {
    #[inline]
    fn eq(&self, other: &[U]) -> bool {
        self.as_slice() == other
    }
}

impl<'s, T: PartialEq<U>, U, A: Allocator> PartialEq<&'s [U]> for ArrayBuffer<T, A> {
    #[inline]
    fn eq(&self, other: &&'s [U]) -> bool {
        self.as_slice() == *other
    }
}

impl<T: PartialEq<U>, U, A: Allocator, const N: usize> PartialEq<[U; N]> for ArrayBuffer<T, A> {
    #[inline]
    fn eq(&self, other: &[U; N]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Eq, A: Allocator> Eq for ArrayBuffer<T, A> {}

impl<T: Hash, A: Allocator> Hash for ArrayBuffer<T, A> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl<T, A: Allocator> AsRef<[T]> for ArrayBuffer<T, A> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> Borrow<[T]> for ArrayBuffer<T, A> {
    #[inline]
    fn borrow(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> Deref for ArrayBuffer<T, A> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T, A: Allocator, I: SliceIndex<[T]>> Index<I> for ArrayBuffer<T, A> {
    type Output = I::Output;

    #[track_caller]
    #[inline]
    fn index(&self, index: I) -> &Self::Output {
        Index::index(self.as_slice(), index)
    }
}

impl<'s, T, A: Allocator> IntoIterator for &'s ArrayBuffer<T, A> {
    type Item = &'s T;
    type IntoIter = slice::Iter<'s, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<T> FromIterator<T> for ArrayBuffer<T> {
    #[inline]
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        copy_sequence_to_buffer_in(iter, Global)
    }
}

impl<T: Clone> From<&[T]> for ArrayBuffer<T> {
    #[inline]
    fn from(value: &[T]) -> Self {
        crate::builder::copy_collection_to_buffer(value.iter().cloned())
    }
}

impl<T, const N: usize> From<[T; N]> for ArrayBuffer<T> {
    #[inline]
    fn from(value: [T; N]) -> Self {
        crate::builder::copy_collection_to_buffer(value)
    }
}

#[cfg(feature = "serde")]
impl<T: Serialize, A: Allocator> Serialize for ArrayBuffer<T, A> {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}
