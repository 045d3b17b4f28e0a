// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replacing a sub-range of a buffer, either in place or while moving to new storage.

use crate::{
    buffer::{ArrayBuffer, UniqueBuffer},
    capacity_overflow, check_subrange, expect_end, grow_capacity,
    owner::OwnerHandle,
    sequence_too_short,
    slots::{self, InitializedRun},
};
use alloc::alloc::Allocator;
use core::{mem, ops::Range, ptr};
use log::trace;

#[track_caller]
#[inline]
fn next_value<I: Iterator>(values: &mut I) -> I::Item {
    match values.next() {
        Some(value) => value,
        None => sequence_too_short(),
    }
}

#[track_caller]
#[inline]
fn final_count(old_count: usize, subrange: &Range<usize>, new_count: usize) -> usize {
    check_subrange(subrange, old_count);
    (old_count - subrange.len())
        .checked_add(new_count)
        .unwrap_or_else(|| capacity_overflow())
}

/// Replaces `subrange` of a uniquely owned buffer with `new_count` elements from `new_values`.
///
/// While elements are being moved, the count of the buffer is held at `subrange.start`, so a
/// panic from `new_values` or a destructor leaks the elements past that point instead of
/// dropping them twice.
#[track_caller]
pub(crate) fn replace_in_place<T, A, I>(
    buffer: &mut UniqueBuffer<'_, T, A>,
    subrange: Range<usize>,
    new_count: usize,
    mut new_values: I,
) where
    A: Allocator,
    I: Iterator<Item = T>,
{
    let old_count = buffer.count();
    let final_count = final_count(old_count, &subrange, new_count);
    assert!(
        final_count <= buffer.capacity(),
        "replacement needs {} slots, but the capacity is {}",
        final_count,
        buffer.capacity()
    );

    let Range { start: lo, end: hi } = subrange;
    let erase_count = hi - lo;
    let tail_count = old_count - hi;
    let base = buffer.first_element_ptr();

    // SAFETY: Every slot touched below is within `[0, max(old_count, final_count))`, which fits
    // in the capacity. Slots are only read once, and only initialized slots are assigned over.
    unsafe {
        buffer.set_count(lo);

        if new_count > erase_count {
            let growth = new_count - erase_count;

            // Open a hole of `growth` slots after the erased range, last element first.
            slots::move_initialize_backward(base.add(hi + growth), base.add(hi), tail_count);

            for i in lo..hi {
                slots::move_assign(base.add(i), next_value(&mut new_values));
            }

            for i in hi..hi + growth {
                slots::initialize(base.add(i), next_value(&mut new_values));
            }
        } else {
            for i in lo..lo + new_count {
                slots::move_assign(base.add(i), next_value(&mut new_values));
            }

            let shrinkage = erase_count - new_count;
            let hole = lo + new_count;
            if shrinkage > 0 {
                if tail_count > shrinkage {
                    // The first `shrinkage` tail elements land on erased elements, the rest on
                    // slots the tail has already vacated.
                    slots::move_assign_forward(base.add(hole), base.add(hi), shrinkage);
                    slots::move_initialize_forward(
                        base.add(hi),
                        base.add(hi + shrinkage),
                        tail_count - shrinkage,
                    );
                } else {
                    slots::move_assign_forward(base.add(hole), base.add(hi), tail_count);
                    slots::destroy(base.add(hole + tail_count), shrinkage - tail_count);
                }
            }
        }

        buffer.set_count(final_count);
    }

    expect_end(&mut new_values);
}

/// Replaces `subrange` by assembling the result in new storage with room for at least
/// `minimum_capacity` elements.
#[track_caller]
pub(crate) fn replace_relocating<T, A, I>(
    buffer: &mut ArrayBuffer<T, A>,
    subrange: Range<usize>,
    new_count: usize,
    new_values: I,
    minimum_capacity: usize,
) where
    T: Clone,
    A: Allocator + Clone,
    I: Iterator<Item = T>,
{
    let capacity = grow_capacity(buffer.capacity(), minimum_capacity);
    let fresh = ArrayBuffer::with_capacity_in(capacity, buffer.allocator().clone());
    relocate_into(buffer, fresh, subrange, new_count, new_values);
}

/// Replaces `subrange` by assembling the result in the empty, uniquely owned `fresh` buffer,
/// which then takes the place of `buffer`.
///
/// If the old storage is uniquely owned, the surviving elements are moved out of it. Otherwise
/// they are cloned, and the old storage is left as it was for its other owners.
///
/// The new elements are written first, so a panic from `new_values` leaves `buffer` unchanged.
#[track_caller]
pub(crate) fn relocate_into<T, A, I>(
    buffer: &mut ArrayBuffer<T, A>,
    mut fresh: ArrayBuffer<T, A>,
    subrange: Range<usize>,
    new_count: usize,
    mut new_values: I,
) where
    T: Clone,
    A: Allocator,
    I: Iterator<Item = T>,
{
    let old_count = buffer.count();
    let final_count = final_count(old_count, &subrange, new_count);
    assert!(
        fresh.count() == 0 && fresh.capacity() >= final_count,
        "relocation target cannot hold {final_count} elements"
    );

    let Range { start: lo, end: hi } = subrange;
    let tail_count = old_count - hi;
    let moving = buffer.is_uniquely_referenced();

    trace!(
        "relocating {old_count} elements (capacity {}) to storage with capacity {}, {} survivors",
        buffer.capacity(),
        fresh.capacity(),
        if moving { "moving" } else { "cloning" }
    );

    let src = buffer.as_ptr();
    let dst = OwnerHandle::first_element_ptr(fresh.owner()).as_ptr();

    if moving {
        // SAFETY: `fresh` has room for `final_count` elements, and `buffer` is the only owner of
        // its storage, so its elements can be moved out once its count is cleared.
        unsafe {
            let mut middle = InitializedRun::new(dst.add(lo));
            for _ in 0..new_count {
                middle.push(next_value(&mut new_values));
            }
            middle.finish();

            OwnerHandle::set_count(buffer.owner_mut(), 0);
            ptr::copy_nonoverlapping(src, dst, lo);
            ptr::copy_nonoverlapping(src.add(hi), dst.add(lo + new_count), tail_count);
            OwnerHandle::set_count(fresh.owner_mut(), final_count);

            let retired = mem::replace(buffer, fresh);
            // The erased elements were not moved, and the retired storage no longer counts them.
            slots::destroy(src.cast_mut().add(lo), hi - lo);
            drop(retired);
        }
    } else {
        let old = buffer.as_slice();
        // SAFETY: `fresh` has room for `final_count` elements.
        unsafe {
            let mut run = InitializedRun::new(dst);
            run.push_cloned(&old[..lo]);
            for _ in 0..new_count {
                run.push(next_value(&mut new_values));
            }
            run.push_cloned(&old[hi..]);
            let written = run.finish();
            debug_assert_eq!(written, final_count);

            OwnerHandle::set_count(fresh.owner_mut(), final_count);
        }

        *buffer = fresh;
    }

    expect_end(&mut new_values);
}
