// SPDX-License-Identifier: MIT OR Apache-2.0

//! Element slot primitives.
//!
//! Every function here works on raw slots, and distinguishes between initializing an empty slot
//! and assigning over an initialized one. Assignment drops the previous occupant of the slot.

use core::ptr;

/// Writes `value` into the uninitialized slot `dst`.
#[inline]
pub(crate) unsafe fn initialize<T>(dst: *mut T, value: T) {
    unsafe { ptr::write(dst, value) }
}

/// Moves `count` elements from `src` into uninitialized slots at `dst`, lowest index first.
///
/// The source slots are left logically uninitialized. The ranges may overlap if `dst` is below
/// `src`.
#[inline]
pub(crate) unsafe fn move_initialize_forward<T>(dst: *mut T, src: *const T, count: usize) {
    for i in 0..count {
        unsafe { ptr::write(dst.add(i), ptr::read(src.add(i))) }
    }
}

/// Moves `count` elements from `src` into uninitialized slots at `dst`, highest index first.
///
/// The ranges may overlap if `dst` is above `src`.
#[inline]
pub(crate) unsafe fn move_initialize_backward<T>(dst: *mut T, src: *const T, count: usize) {
    for i in (0..count).rev() {
        unsafe { ptr::write(dst.add(i), ptr::read(src.add(i))) }
    }
}

/// Moves `value` over the initialized slot `dst`, dropping its previous occupant.
#[inline]
pub(crate) unsafe fn move_assign<T>(dst: *mut T, value: T) {
    unsafe { *dst = value }
}

/// Moves `count` elements from `src` over the initialized slots at `dst`, lowest index first.
///
/// `dst` must be below `src`, and the source slots are left logically uninitialized.
#[inline]
pub(crate) unsafe fn move_assign_forward<T>(dst: *mut T, src: *const T, count: usize) {
    for i in 0..count {
        unsafe { move_assign(dst.add(i), ptr::read(src.add(i))) }
    }
}

/// Clones `src` over the initialized slot `dst`.
#[inline]
pub(crate) unsafe fn copy_assign<T: Clone>(dst: *mut T, src: &T) {
    unsafe { (*dst).clone_from(src) }
}

/// Drops `count` initialized elements starting at `start`.
#[inline]
pub(crate) unsafe fn destroy<T>(start: *mut T, count: usize) {
    unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(start, count)) }
}

/// Tracks a run of slots which is being initialized front to back.
///
/// If the guard is dropped before [`InitializedRun::finish`], the slots written so far are
/// dropped, so a panic part way through filling a buffer does not leak or double-drop.
pub(crate) struct InitializedRun<T> {
    start: *mut T,
    len: usize,
}

impl<T> InitializedRun<T> {
    #[must_use]
    #[inline]
    pub(crate) const fn new(start: *mut T) -> Self {
        Self { start, len: 0 }
    }

    /// Writes `value` into the next slot.
    ///
    /// # Safety
    ///
    /// The next slot must be in bounds and uninitialized.
    #[inline]
    pub(crate) unsafe fn push(&mut self, value: T) {
        unsafe { initialize(self.start.add(self.len), value) };
        self.len += 1;
    }

    /// Clones every element of `src` into the following slots.
    ///
    /// # Safety
    ///
    /// There must be `src.len()` uninitialized slots left in bounds.
    #[inline]
    pub(crate) unsafe fn push_cloned(&mut self, src: &[T])
    where
        T: Clone,
    {
        for value in src {
            unsafe { self.push(value.clone()) };
        }
    }

    /// Releases the slots written so far to the caller, returning how many there were.
    #[inline]
    pub(crate) fn finish(self) -> usize {
        let len = self.len;
        core::mem::forget(self);
        len
    }
}

impl<T> Drop for InitializedRun<T> {
    fn drop(&mut self) {
        unsafe { destroy(self.start, self.len) }
    }
}
