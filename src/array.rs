// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(missing_docs)]

//! A growable, copy-on-write array.

use crate::{
    Error,
    buffer::ArrayBuffer,
    builder::{copy_collection_to_buffer_in, copy_sequence_to_buffer_in},
    capacity_overflow, grow_capacity, replace, resolve_range,
    slice::SliceBuffer,
};
use alloc::alloc::{Allocator, Global, handle_alloc_error};
use core::{
    borrow::Borrow,
    fmt,
    hash::{Hash, Hasher},
    iter,
    ops::{Deref, DerefMut, Index, IndexMut, RangeBounds},
    slice::{self, SliceIndex},
};
#[cfg(feature = "serde")]
use serde_core::{Serialize, Serializer};

/// A growable array with value semantics.
///
/// Cloning a `ContiguousArray` is `O(1)`: both arrays share the same storage until one of them
/// is mutated, at which point the mutated array copies the elements into storage of its own.
/// Every mutating method checks whether the storage is shared at the time it is called, so
/// copies never observe each other's changes.
///
/// ```
/// use cistern::ContiguousArray;
///
/// let mut xs = ContiguousArray::new();
/// xs.push(1);
/// xs.push(2);
///
/// let ys = xs.clone();
/// xs.push(3);
///
/// assert_eq!(xs, [1, 2, 3]);
/// assert_eq!(ys, [1, 2]);
/// ```
pub struct ContiguousArray<T, A: Allocator = Global> {
    buffer: ArrayBuffer<T, A>,
}

impl<T> ContiguousArray<T> {
    /// Creates an empty array. This does not allocate.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    #[must_use]
    #[track_caller]
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<T, A: Allocator> ContiguousArray<T, A> {
    #[must_use]
    #[inline]
    pub fn new_in(alloc: A) -> Self {
        Self {
            buffer: ArrayBuffer::new_in(alloc),
        }
    }

    #[must_use]
    #[track_caller]
    #[inline]
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        Self {
            buffer: ArrayBuffer::with_capacity_in(capacity, alloc),
        }
    }

    #[must_use]
    #[inline]
    pub const fn from_buffer(buffer: ArrayBuffer<T, A>) -> Self {
        Self { buffer }
    }

    /// Returns the underlying buffer.
    #[must_use]
    #[inline]
    pub const fn buffer(&self) -> &ArrayBuffer<T, A> {
        &self.buffer
    }

    #[must_use]
    #[inline]
    pub fn into_buffer(self) -> ArrayBuffer<T, A> {
        self.buffer
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.count()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.buffer.as_slice()
    }

    #[must_use]
    #[inline]
    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T, A: Allocator + Clone> ContiguousArray<T, A> {
    /// Returns a view of `range` which shares this array's storage.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds.
    #[must_use]
    #[track_caller]
    #[inline]
    pub fn slice<R: RangeBounds<usize>>(&self, range: R) -> SliceBuffer<T, A> {
        self.buffer.slice(range)
    }
}

impl<T: Clone, A: Allocator + Clone> ContiguousArray<T, A> {
    /// Makes sure the array owns storage of its own with room for `additional` more elements.
    ///
    /// # Errors
    ///
    /// Returns an error if the new capacity overflows or cannot be allocated. The array is
    /// unchanged in that case.
    pub fn try_reserve(&mut self, additional: usize) -> Result<(), Error> {
        let count = self.len();
        let required = count
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;

        if self
            .buffer
            .request_unique_mutable_backing_buffer(required)
            .is_some()
        {
            return Ok(());
        }

        let capacity = grow_capacity(self.capacity(), required);
        let fresh = ArrayBuffer::try_with_capacity_in(capacity, self.buffer.allocator().clone())?;
        replace::relocate_into(&mut self.buffer, fresh, count..count, 0, iter::empty());
        Ok(())
    }

    /// Like [`ContiguousArray::try_reserve`], but aborts on failure.
    #[track_caller]
    pub fn reserve(&mut self, additional: usize) {
        match self.try_reserve(additional) {
            Ok(()) => (),
            Err(Error::Alloc(layout)) => handle_alloc_error(layout),
            Err(_) => capacity_overflow(),
        }
    }

    #[track_caller]
    #[inline]
    pub fn push(&mut self, value: T) {
        let count = self.len();
        self.buffer
            .replace_subrange(count..count, 1, iter::once(value));
    }

    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        self.buffer.make_unique(0).pop()
    }

    /// Inserts `value` at `index`, shifting the elements after it up.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    #[track_caller]
    pub fn insert(&mut self, index: usize, value: T) {
        let len = self.len();
        if index > len {
            panic!("insertion index (is {index}) should be <= len (is {len})");
        }

        self.buffer
            .replace_subrange(index..index, 1, iter::once(value));
    }

    /// Removes and returns the element at `index`, shifting the elements after it down.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[track_caller]
    pub fn remove(&mut self, index: usize) -> T {
        let len = self.len();
        if index >= len {
            panic!("removal index (is {index}) should be < len (is {len})");
        }

        self.buffer.make_unique(0).remove(index)
    }

    /// Replaces the elements in `range` with `values`.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds, or `values` yields a different number of elements
    /// than its reported length.
    #[track_caller]
    pub fn replace_range<R, I>(&mut self, range: R, values: I)
    where
        R: RangeBounds<usize>,
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let range = resolve_range(range, self.len());
        let values = values.into_iter();
        let new_count = values.len();
        self.buffer.replace_subrange(range, new_count, values);
    }

    #[track_caller]
    pub fn truncate(&mut self, len: usize) {
        let count = self.len();
        if len < count {
            self.buffer.replace_subrange(len..count, 0, iter::empty());
        }
    }

    /// Removes every element. Storage which is not shared keeps its capacity, shared storage
    /// is released.
    pub fn clear(&mut self) {
        match self.buffer.request_unique_mutable_backing_buffer(0) {
            Some(mut unique) => unique.truncate(0),
            None => self.buffer = ArrayBuffer::new_in(self.buffer.allocator().clone()),
        }
    }

    #[track_caller]
    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.buffer.append_contents(values.iter().cloned());
    }

    /// Makes the contents equal to `values`, cloning over existing elements where possible.
    #[track_caller]
    pub fn assign_from_slice(&mut self, values: &[T]) {
        match self
            .buffer
            .request_unique_mutable_backing_buffer(values.len())
        {
            Some(mut unique) => unique.assign_from_slice(values),
            None => {
                self.buffer = copy_collection_to_buffer_in(
                    values.iter().cloned(),
                    self.buffer.allocator().clone(),
                )
            }
        }
    }

    /// Provides mutable access to the elements, first copying them if the storage is shared.
    #[must_use]
    #[track_caller]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.buffer.make_unique(0).into_mut_slice()
    }

    #[must_use]
    #[track_caller]
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.len() {
            self.as_mut_slice().get_mut(index)
        } else {
            None
        }
    }

    #[must_use]
    #[inline]
    pub fn iter_mut(&mut self) -> slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }
}

impl<T, A: Allocator + Clone> Clone for ContiguousArray<T, A> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
        }
    }
}

impl<T> Default for ContiguousArray<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, A: Allocator> fmt::Debug for ContiguousArray<T, A> {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_slice(), fmtr)
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<ContiguousArray<T, B>>
    for ContiguousArray<T, A>
{
    #[inline]
    fn eq(&self, other: &ContiguousArray<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: PartialEq<U>, U, A: Allocator> PartialEq<[U]> for ContiguousArray<T, A> {
    #[inline]
    fn eq(&self, other: &[U]) -> bool {
        self.as_slice() == other
    }
}

impl<'s, T: PartialEq<U>, U, A: Allocator> PartialEq<&'s [U]> for ContiguousArray<T, A> {
    #[inline]
    fn eq(&self, other: &&'s [U]) -> bool {
        self.as_slice() == *other
    }
}

impl<T: PartialEq<U>, U, A: Allocator, const N: usize> PartialEq<[U; N]> for ContiguousArray<T, A> {
    #[inline]
    fn eq(&self, other: &[U; N]) -> bool {
        self.as_slice() == other
    }
}

impl<T: Eq, A: Allocator> Eq for ContiguousArray<T, A> {}

impl<T: Hash, A: Allocator> Hash for ContiguousArray<T, A> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl<T, A: Allocator> AsRef<[T]> for ContiguousArray<T, A> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> Borrow<[T]> for ContiguousArray<T, A> {
    #[inline]
    fn borrow(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> Deref for ContiguousArray<T, A> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: Clone, A: Allocator + Clone> DerefMut for ContiguousArray<T, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T, A: Allocator, I: SliceIndex<[T]>> Index<I> for ContiguousArray<T, A> {
    type Output = I::Output;

    #[track_caller]
    #[inline]
    fn index(&self, index: I) -> &Self::Output {
        Index::index(self.as_slice(), index)
    }
}

impl<T: Clone, A: Allocator + Clone, I: SliceIndex<[T]>> IndexMut<I> for ContiguousArray<T, A> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        IndexMut::index_mut(self.as_mut_slice(), index)
    }
}

impl<'s, T, A: Allocator> IntoIterator for &'s ContiguousArray<T, A> {
    type Item = &'s T;
    type IntoIter = slice::Iter<'s, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'s, T: Clone, A: Allocator + Clone> IntoIterator for &'s mut ContiguousArray<T, A> {
    type Item = &'s mut T;
    type IntoIter = slice::IterMut<'s, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<T> FromIterator<T> for ContiguousArray<T> {
    #[inline]
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_buffer(copy_sequence_to_buffer_in(iter, Global))
    }
}

impl<T: Clone, A: Allocator + Clone> Extend<T> for ContiguousArray<T, A> {
    #[track_caller]
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower_bound, _) = iter.size_hint();
        if lower_bound > 0 {
            self.reserve(lower_bound);
        }

        for value in iter {
            self.push(value);
        }
    }
}

impl<T, A: Allocator> From<ArrayBuffer<T, A>> for ContiguousArray<T, A> {
    #[inline]
    fn from(value: ArrayBuffer<T, A>) -> Self {
        Self::from_buffer(value)
    }
}

impl<T, A: Allocator> From<ContiguousArray<T, A>> for ArrayBuffer<T, A> {
    #[inline]
    fn from(value: ContiguousArray<T, A>) -> Self {
        value.into_buffer()
    }
}

impl<T: Clone> From<&[T]> for ContiguousArray<T> {
    #[inline]
    fn from(value: &[T]) -> Self {
        Self::from_buffer(ArrayBuffer::from(value))
    }
}

impl<T, const N: usize> From<[T; N]> for ContiguousArray<T> {
    #[inline]
    fn from(value: [T; N]) -> Self {
        Self::from_buffer(ArrayBuffer::from(value))
    }
}

#[cfg(feature = "serde")]
impl<T: Serialize, A: Allocator> Serialize for ContiguousArray<T, A> {
    #[inline]
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}
