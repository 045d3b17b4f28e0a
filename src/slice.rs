// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(missing_docs)]

//! Views of a sub-range of shared storage.

use crate::{
    buffer::{ArrayBuffer, copy_into_uninit},
    builder::copy_collection_to_buffer_in,
    owner::OwnerHandle,
    resolve_range,
};
use alloc::alloc::{Allocator, Global};
use core::{
    fmt,
    hash::{Hash, Hasher},
    mem::MaybeUninit,
    ops::{Deref, Index, Range, RangeBounds},
    slice::{self, SliceIndex},
};
#[cfg(feature = "serde")]
use serde_core::{Serialize, Serializer};

/// A read-only view of the elements `start..end` of some storage.
///
/// Creating a `SliceBuffer` does not copy any elements: the view holds its own reference to the
/// storage, which keeps the elements alive and stops the storage from being mutated in place for
/// as long as the view exists.
///
/// ```
/// use cistern::ArrayBuffer;
///
/// let buffer: ArrayBuffer<char> = "hello".chars().collect();
/// let view = buffer.slice(1..4);
///
/// assert_eq!(&*view, &['e', 'l', 'l']);
/// assert_eq!(view.identity(), buffer.identity());
/// ```
pub struct SliceBuffer<T, A: Allocator = Global> {
    owner: OwnerHandle<T, A>,
    start: usize,
    end: usize,
}

impl<T, A: Allocator> SliceBuffer<T, A> {
    #[must_use]
    #[inline]
    pub(crate) fn from_owner(owner: OwnerHandle<T, A>, range: Range<usize>) -> Self {
        debug_assert!(range.start <= range.end && range.end <= OwnerHandle::count(&owner));
        Self {
            owner,
            start: range.start,
            end: range.end,
        }
    }

    /// The number of elements in the view.
    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The index of the first element of the view within its storage.
    #[must_use]
    #[inline]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// The index one past the last element of the view within its storage.
    #[must_use]
    #[inline]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[must_use]
    #[inline]
    pub fn identity(&self) -> *const () {
        OwnerHandle::identity(&self.owner)
    }

    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `start..end` was in bounds of the initialized elements when the view was
        // created, and shared storage is never written to.
        unsafe {
            let first = OwnerHandle::first_element_ptr(&self.owner).as_ptr();
            slice::from_raw_parts(first.add(self.start), self.len())
        }
    }

    #[must_use]
    #[inline]
    pub fn is_uniquely_referenced(&mut self) -> bool {
        OwnerHandle::is_uniquely_referenced(&mut self.owner)
    }

    /// Clones the elements in `range` of the view into the start of `target`, returning how
    /// many were written.
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
        let range = resolve_range(range, self.len());
        copy_into_uninit(&self.as_slice()[range], target)
    }
}

impl<T, A: Allocator + Clone> SliceBuffer<T, A> {
    /// Returns a view of `range`, relative to the start of this view. This does not copy.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    #[must_use]
    #[track_caller]
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> Self {
        let range = resolve_range(range, self.len());
        Self {
            owner: self.owner.clone(),
            start: self.start + range.start,
            end: self.start + range.end,
        }
    }

    /// Returns the backing buffer if this view covers all of it.
    #[must_use]
    #[inline]
    pub fn request_native_buffer(&self) -> Option<ArrayBuffer<T, A>> {
        if self.start == 0 && self.end == OwnerHandle::count(&self.owner) {
            Some(ArrayBuffer::from_owner(self.owner.clone()))
        } else {
            None
        }
    }

    /// Copies the elements of the view into a new buffer.
    #[must_use]
    pub fn to_buffer(&self) -> ArrayBuffer<T, A>
    where
        T: Clone,
    {
        copy_collection_to_buffer_in(
            self.as_slice().iter().cloned(),
            OwnerHandle::allocator(&self.owner).clone(),
        )
    }

    /// Converts the view into a buffer, copying only if the view does not cover all of its
    /// storage.
    #[must_use]
    pub fn into_buffer(self) -> ArrayBuffer<T, A>
    where
        T: Clone,
    {
        match self.request_native_buffer() {
            Some(buffer) => buffer,
            None => self.to_buffer(),
        }
    }
}

impl<T, A: Allocator + Clone> Clone for SliceBuffer<T, A> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            start: self.start,
            end: self.end,
        }
    }
}

impl<T> Default for SliceBuffer<T> {
    #[inline]
    fn default() -> Self {
        Self {
            owner: OwnerHandle::empty(),
            start: 0,
            end: 0,
        }
    }
}

impl<T, A: Allocator> Deref for SliceBuffer<T, A> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T, A: Allocator, I: SliceIndex<[T]>> Index<I> for SliceBuffer<T, A> {
    type Output = I::Output;

    #[track_caller]
    #[inline]
    fn index(&self, index: I) -> &Self::Output {
        Index::index(self.as_slice(), index)
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for SliceBuffer<T, A> {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_slice(), fmtr)
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<SliceBuffer<T, B>> for SliceBuffer<T, A> {
    #[inline]
    fn eq(&self, other: &SliceBuffer<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: PartialEq<U>, U, A: Allocator> PartialEq<[U]> for SliceBuffer<T, A> {
    #[inline]
    fn eq(&self, other: &[U]) -> bool {
        self.as_slice() == other
    }
}

impl<T: PartialEq<U>, U, A: Allocator, const N: usize> PartialEq<[U; N]> for SliceBuffer<T, A> {
    #[inline]
    fn eq(&self, other: &[U; N]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Eq, A: Allocator> Eq for SliceBuffer<T, A> {}

impl<T: Hash, A: Allocator> Hash for SliceBuffer<T, A> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl<'s, T, A: Allocator> IntoIterator for &'s SliceBuffer<T, A> {
    type Item = &'s T;
    type IntoIter = slice::Iter<'s, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<T, A: Allocator + Clone> From<ArrayBuffer<T, A>> for SliceBuffer<T, A> {
    #[inline]
    fn from(value: ArrayBuffer<T, A>) -> Self {
        value.into_slice_buffer()
    }
}

#[cfg(feature = "serde")]
impl<T: Serialize, A: Allocator> Serialize for SliceBuffer<T, A> {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}
