// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_std]
#![cfg_attr(feature = "nightly", feature(allocator_api))]
#![warn(
    missing_docs,
    clippy::empty_line_after_doc_comments,
    clippy::missing_safety_doc
)]
#![deny(unsafe_attr_outside_unsafe, unsafe_op_in_unsafe_fn)]

//! Copy-on-write contiguous buffers backed by shared, reference-counted storage.
//!
//! The building blocks, from the bottom up:
//!
//! * [`StorageBlock`]: a single heap allocation holding a header and a tail of element slots.
//! * [`OwnerHandle`]: a counted reference to a storage block, which decides when the block is
//!   uniquely owned.
//! * [`ArrayBuffer`]: the value-semantic buffer. All mutation goes through
//!   [`ArrayBuffer::request_unique_mutable_backing_buffer`], which only hands out a
//!   [`UniqueBuffer`] when the storage is not shared.
//! * [`SliceBuffer`]: a window onto a sub-range of shared storage.
//! * [`BufferBuilder`]: appends elements one at a time without per-element capacity checks.
//! * [`ContiguousArray`]: a growable array built on top of the above.
//!
#![doc = include_str!("../Readme.md")]
//!
//! [`StorageBlock`]: ./storage/struct.StorageBlock.html
//! [`OwnerHandle`]: ./owner/struct.OwnerHandle.html
//! [`ArrayBuffer`]: ./buffer/struct.ArrayBuffer.html
//! [`ArrayBuffer::request_unique_mutable_backing_buffer`]: ./buffer/struct.ArrayBuffer.html#method.request_unique_mutable_backing_buffer
//! [`UniqueBuffer`]: ./buffer/struct.UniqueBuffer.html
//! [`SliceBuffer`]: ./slice/struct.SliceBuffer.html
//! [`BufferBuilder`]: ./builder/struct.BufferBuilder.html
//! [`ContiguousArray`]: ./array/struct.ContiguousArray.html

#[cfg(not(any(feature = "allocator-api2", feature = "nightly")))]
compile_error!("An allocator must be provided, either through `nightly` or `allocator-api2`");

#[cfg(feature = "nightly")]
extern crate alloc;

#[cfg(all(feature = "allocator-api2", not(feature = "nightly")))]
extern crate allocator_api2 as alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

use alloc::alloc::{Layout, LayoutError};
use core::ops::{Bound, Range, RangeBounds};

pub mod array;
pub mod buffer;
pub mod builder;
pub mod owner;
pub mod slice;
pub mod storage;

mod replace;
mod slots;

#[cfg(test)]
mod tests;

pub use crate::{
    array::ContiguousArray,
    buffer::{ArrayBuffer, UniqueBuffer},
    builder::{
        BufferBuilder, copy_collection_to_buffer, copy_collection_to_buffer_in,
        copy_sequence_to_buffer, copy_sequence_to_buffer_in,
    },
    owner::{OwnerHandle, PinnedOwner},
    slice::SliceBuffer,
    storage::{StorageBlock, StorageHeader},
};

/// Represents the errors which may be returned by the fallible allocation paths.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A `Layout` could not be constructed for the requested capacity.
    #[error("{0}")]
    Layout(LayoutError),
    /// The allocator could not service a request for the given `Layout`.
    #[error(
        "the allocator could not provide {} bytes with alignment {}",
        .0.size(),
        .0.align()
    )]
    Alloc(Layout),
    /// The requested capacity cannot be represented.
    #[error("requested capacity exceeds the maximum buffer size")]
    CapacityOverflow,
}

impl From<LayoutError> for Error {
    #[inline]
    fn from(value: LayoutError) -> Self {
        Self::Layout(value)
    }
}

/// Computes the capacity to allocate when a buffer with `capacity` slots must hold at least
/// `minimum_capacity` elements.
///
/// Growing at least doubles the capacity, which keeps repeated appends amortized `O(1)`. If the
/// current capacity is already sufficient it is returned unchanged.
///
/// ```
/// # use cistern::grow_capacity;
/// assert_eq!(grow_capacity(4, 5), 8);
/// assert_eq!(grow_capacity(4, 20), 20);
/// assert_eq!(grow_capacity(4, 3), 4);
/// assert_eq!(grow_capacity(0, 1), 1);
/// ```
#[must_use]
#[inline]
pub const fn grow_capacity(capacity: usize, minimum_capacity: usize) -> usize {
    if minimum_capacity > capacity {
        let doubled = capacity.saturating_mul(2);
        if doubled > minimum_capacity {
            doubled
        } else {
            minimum_capacity
        }
    } else {
        capacity
    }
}

/// Resolves `range` against a sequence of `len` elements.
#[track_caller]
pub(crate) fn resolve_range<R: RangeBounds<usize>>(range: R, len: usize) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&start) => start,
        Bound::Excluded(&start) => start
            .checked_add(1)
            .unwrap_or_else(|| range_out_of_bounds()),
        Bound::Unbounded => 0,
    };

    let end = match range.end_bound() {
        Bound::Included(&end) => end.checked_add(1).unwrap_or_else(|| range_out_of_bounds()),
        Bound::Excluded(&end) => end,
        Bound::Unbounded => len,
    };

    check_subrange(&(start..end), len);
    start..end
}

/// Asserts that `subrange` lies within `0..len`.
#[track_caller]
#[inline]
pub(crate) fn check_subrange(subrange: &Range<usize>, len: usize) {
    if subrange.start > subrange.end || subrange.end > len {
        range_out_of_bounds();
    }
}

#[cold]
#[track_caller]
pub(crate) fn range_out_of_bounds() -> ! {
    panic!("range out of bounds");
}

#[cold]
#[track_caller]
pub(crate) fn index_out_of_bounds(index: usize, len: usize) -> ! {
    panic!("index out of range: the len is {len} but the index is {index}");
}

#[cold]
#[track_caller]
pub(crate) fn capacity_overflow() -> ! {
    panic!("capacity overflow");
}

#[cold]
#[track_caller]
pub(crate) fn sequence_too_short() -> ! {
    panic!("sequence yielded fewer elements than its declared count");
}

#[cold]
#[track_caller]
pub(crate) fn sequence_too_long() -> ! {
    panic!("sequence yielded more elements than its declared count");
}

/// Panics if `values` has anything left to yield.
#[track_caller]
#[inline]
pub(crate) fn expect_end<I: Iterator>(values: &mut I) {
    if values.next().is_some() {
        sequence_too_long();
    }
}
