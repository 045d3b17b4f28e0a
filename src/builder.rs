// SPDX-License-Identifier: MIT OR Apache-2.0

//! Building an [`ArrayBuffer`] one element at a time.
//!
//! [`BufferBuilder`] writes each element straight into the slot after the last one, and only
//! looks at the capacity when the remaining slots run out. When the number of elements is known
//! up front, [`BufferBuilder::add_with_existing_capacity`] skips even that check.
//!
//! ```
//! use cistern::BufferBuilder;
//!
//! let mut builder = BufferBuilder::new(2);
//! builder.add_with_existing_capacity("a");
//! builder.add_with_existing_capacity("b");
//! builder.add("c");
//!
//! let buffer = builder.finish();
//! assert_eq!(buffer, ["a", "b", "c"]);
//! ```

use crate::{
    buffer::ArrayBuffer, expect_end, grow_capacity, owner::OwnerHandle, sequence_too_short,
    slots,
};
use alloc::alloc::{Allocator, Global};
use core::{fmt, mem, ptr::NonNull};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    /// Nothing has been appended yet.
    Empty,
    Appending,
    Finished,
}

/// Appends elements to a new [`ArrayBuffer`] with as little per-element work as possible.
///
/// While the builder is appending, the storage's own element count stays at zero, and the
/// number of appended elements is `capacity - remaining_capacity`. The count is only written
/// when the builder finishes. Dropping an unfinished builder drops the appended elements.
///
/// [`ArrayBuffer`]: crate::buffer::ArrayBuffer
pub struct BufferBuilder<T, A: Allocator + Clone = Global> {
    result: ArrayBuffer<T, A>,
    cursor: NonNull<T>,
    remaining_capacity: usize,
    initial_capacity: usize,
    state: BuilderState,
}

// SAFETY: The builder owns its storage uniquely. `cursor` only points into it.
unsafe impl<T: Send, A: Allocator + Clone + Send> Send for BufferBuilder<T, A> {}

// SAFETY: As above. Shared access only reads the counters.
unsafe impl<T: Sync, A: Allocator + Clone + Sync> Sync for BufferBuilder<T, A> {}

impl<T> BufferBuilder<T, Global> {
    /// Creates a builder with room for `initial_capacity` elements.
    #[must_use]
    #[track_caller]
    #[inline]
    pub fn new(initial_capacity: usize) -> Self {
        Self::new_in(initial_capacity, Global)
    }
}

impl<T, A: Allocator + Clone> BufferBuilder<T, A> {
    /// Creates a builder with room for `initial_capacity` elements, allocated from `alloc`.
    #[must_use]
    #[track_caller]
    pub fn new_in(initial_capacity: usize, alloc: A) -> Self {
        let result = ArrayBuffer::with_capacity_in(initial_capacity, alloc);
        let cursor = OwnerHandle::first_element_ptr(result.owner());
        let remaining_capacity = result.capacity();

        Self {
            result,
            cursor,
            remaining_capacity,
            initial_capacity,
            state: BuilderState::Empty,
        }
    }

    /// The number of elements appended so far.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.result.capacity() - self.remaining_capacity
    }

    /// Returns `true` if nothing has been appended yet.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of elements which can be appended before the builder reallocates.
    #[must_use]
    #[inline]
    pub const fn remaining_capacity(&self) -> usize {
        self.remaining_capacity
    }

    /// Appends `value`, growing the storage if it is full.
    ///
    /// # Panics
    ///
    /// Panics if the builder has already finished.
    #[track_caller]
    #[inline]
    pub fn add(&mut self, value: T) {
        self.check_not_finished();
        if self.remaining_capacity == 0 {
            self.grow();
        }

        // SAFETY: There is at least one remaining slot.
        unsafe { self.add_unchecked(value) }
    }

    /// Appends `value` into capacity which is already known to be available.
    ///
    /// # Panics
    ///
    /// Panics if there is no remaining capacity, or the builder has already finished.
    #[track_caller]
    #[inline]
    pub fn add_with_existing_capacity(&mut self, value: T) {
        self.check_not_finished();
        assert!(
            self.remaining_capacity > 0,
            "builder has no remaining capacity"
        );

        // SAFETY: There is at least one remaining slot.
        unsafe { self.add_unchecked(value) }
    }

    #[inline]
    unsafe fn add_unchecked(&mut self, value: T) {
        debug_assert!(self.remaining_capacity > 0);
        // SAFETY: `cursor` points at the first unwritten slot, which is in bounds.
        unsafe {
            slots::initialize(self.cursor.as_ptr(), value);
            self.cursor = self.cursor.add(1);
        }
        self.remaining_capacity -= 1;
        self.state = BuilderState::Appending;
    }

    /// Moves the appended elements into storage with at least double the capacity.
    #[track_caller]
    #[cold]
    fn grow(&mut self) {
        let appended = self.len();
        let capacity = grow_capacity(self.result.capacity(), appended + 1).max(1);
        let fresh = ArrayBuffer::with_capacity_in(capacity, self.result.allocator().clone());

        trace!(
            "builder growing from {} to {} slots",
            self.result.capacity(),
            fresh.capacity()
        );

        let dst = OwnerHandle::first_element_ptr(fresh.owner());
        // SAFETY: The old storage holds `appended` initialized elements, but its own count is
        // zero, so dropping it after the move only frees the memory.
        unsafe {
            slots::move_initialize_forward(dst.as_ptr(), self.result.as_ptr(), appended);
            self.cursor = dst.add(appended);
        }

        self.remaining_capacity = fresh.capacity() - appended;
        self.result = fresh;
    }

    #[track_caller]
    #[inline]
    fn check_not_finished(&self) {
        if self.state == BuilderState::Finished {
            panic!("builder already finished");
        }
    }

    /// Finishes building, and returns the buffer holding every appended element.
    ///
    /// # Panics
    ///
    /// Panics if the builder has already finished.
    #[must_use]
    #[track_caller]
    pub fn finish(&mut self) -> ArrayBuffer<T, A> {
        self.check_not_finished();
        let appended = self.len();

        // SAFETY: The builder is the only owner of `result`, and the first `appended` slots are
        // initialized.
        unsafe {
            OwnerHandle::set_count(self.result.owner_mut(), appended);
        }

        self.state = BuilderState::Finished;
        self.remaining_capacity = 0;
        let empty = ArrayBuffer::new_in(self.result.allocator().clone());
        self.cursor = OwnerHandle::first_element_ptr(empty.owner());
        mem::replace(&mut self.result, empty)
    }

    /// Finishes building, checking that exactly the initial capacity was appended.
    ///
    /// # Panics
    ///
    /// Panics if the number of appended elements differs from the capacity the builder was
    /// created with, or the builder has already finished.
    #[must_use]
    #[track_caller]
    pub fn finish_with_original_count(&mut self) -> ArrayBuffer<T, A> {
        self.check_not_finished();
        assert_eq!(
            self.len(),
            self.initial_capacity,
            "builder was not filled to its initial capacity"
        );
        self.finish()
    }
}

impl<T, A: Allocator + Clone> Drop for BufferBuilder<T, A> {
    fn drop(&mut self) {
        if self.state == BuilderState::Appending {
            let appended = self.len();
            // SAFETY: As in `finish`. Dropping `result` then drops the appended elements.
            unsafe {
                OwnerHandle::set_count(self.result.owner_mut(), appended);
            }
        }
    }
}

impl<T, A: Allocator + Clone> fmt::Debug for BufferBuilder<T, A> {
    fn fmt(&self, fmtr: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmtr.debug_struct("BufferBuilder")
            .field("len", &self.len())
            .field("remaining_capacity", &self.remaining_capacity)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Copies every element of `iter` into a new buffer.
///
/// Storage for the lower bound of the iterator's size hint is allocated up front and filled
/// without capacity checks, then the rest of the elements are appended with growth.
pub fn copy_sequence_to_buffer<I: IntoIterator>(iter: I) -> ArrayBuffer<I::Item> {
    copy_sequence_to_buffer_in(iter, Global)
}

/// Like [`copy_sequence_to_buffer`], allocating from `alloc`.
pub fn copy_sequence_to_buffer_in<I, A>(iter: I, alloc: A) -> ArrayBuffer<I::Item, A>
where
    I: IntoIterator,
    A: Allocator + Clone,
{
    let mut iter = iter.into_iter();
    let (lower_bound, _) = iter.size_hint();
    let mut builder = BufferBuilder::new_in(lower_bound, alloc);

    for _ in 0..lower_bound {
        match iter.next() {
            Some(value) => builder.add_with_existing_capacity(value),
            None => break,
        }
    }

    for value in iter {
        builder.add(value);
    }

    builder.finish()
}

/// Copies every element of an iterator with an exact length into a new buffer.
///
/// # Panics
///
/// Panics if the iterator yields a different number of elements than its reported length.
#[track_caller]
pub fn copy_collection_to_buffer<I>(collection: I) -> ArrayBuffer<I::Item>
where
    I: IntoIterator,
    I::IntoIter: ExactSizeIterator,
{
    copy_collection_to_buffer_in(collection, Global)
}

/// Like [`copy_collection_to_buffer`], allocating from `alloc`.
#[track_caller]
pub fn copy_collection_to_buffer_in<I, A>(collection: I, alloc: A) -> ArrayBuffer<I::Item, A>
where
    I: IntoIterator,
    I::IntoIter: ExactSizeIterator,
    A: Allocator + Clone,
{
    let mut iter = collection.into_iter();
    let count = iter.len();
    let mut builder = BufferBuilder::new_in(count, alloc);

    for _ in 0..count {
        match iter.next() {
            Some(value) => builder.add_with_existing_capacity(value),
            None => sequence_too_short(),
        }
    }

    expect_end(&mut iter);
    builder.finish_with_original_count()
}
