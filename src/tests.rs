use crate::{
    ArrayBuffer, BufferBuilder, ContiguousArray, Error, OwnerHandle, SliceBuffer,
    copy_collection_to_buffer, copy_sequence_to_buffer, grow_capacity,
};
use alloc::alloc::{AllocError, Allocator, Global, Layout};
use core::{
    cell::Cell,
    mem::MaybeUninit,
    panic::AssertUnwindSafe,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering as AtomicOrdering},
};
use std::{
    iter, panic,
    rc::Rc,
    string::{String, ToString},
    thread,
    vec::Vec,
};

#[derive(Clone, Default)]
struct CountingAlloc {
    allocations: Rc<Cell<usize>>,
    deallocations: Rc<Cell<usize>>,
}

impl CountingAlloc {
    fn live(&self) -> usize {
        self.allocations.get() - self.deallocations.get()
    }
}

unsafe impl Allocator for CountingAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        self.allocations.set(self.allocations.get() + 1);
        Global.allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocations.set(self.deallocations.get() + 1);
        unsafe { Global.deallocate(ptr, layout) }
    }
}

/// Hands out blocks which are larger than requested.
#[derive(Clone, Copy, Default)]
struct RoundingAlloc;

const ROUND_TO: usize = 256;

unsafe impl Allocator for RoundingAlloc {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        let size = layout.size().next_multiple_of(ROUND_TO);
        let rounded = Layout::from_size_align(size, layout.align()).map_err(|_| AllocError)?;
        let block = Global.allocate(rounded)?;
        Ok(NonNull::slice_from_raw_parts(block.cast(), size))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        let size = layout.size().next_multiple_of(ROUND_TO);
        unsafe {
            Global.deallocate(ptr, Layout::from_size_align_unchecked(size, layout.align()));
        }
    }
}

#[derive(Clone, Copy, Default)]
struct FailingAlloc;

unsafe impl Allocator for FailingAlloc {
    fn allocate(&self, _layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        Err(AllocError)
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        unreachable!("nothing was allocated");
    }
}

fn buffer_of<T: Clone>(values: &[T]) -> ArrayBuffer<T> {
    copy_collection_to_buffer(values.iter().cloned())
}

#[test]
fn test_empty_buffers_share_the_empty_storage() {
    let alloc = CountingAlloc::default();

    let a = ArrayBuffer::<u64, _>::new_in(alloc.clone());
    let b = ArrayBuffer::<u64, _>::with_capacity_in(0, alloc.clone());
    let c = ArrayBuffer::<String>::new();

    assert_eq!(a.identity(), b.identity());
    assert_eq!(a.identity(), c.identity());
    assert_eq!(a.count(), 0);
    assert_eq!(a.capacity(), 0);
    assert!(OwnerHandle::is_empty_singleton(a.owner()));

    drop((a, b, c));
    assert_eq!(alloc.allocations.get(), 0);
    assert_eq!(alloc.deallocations.get(), 0);
}

#[test]
fn test_empty_storage_is_never_unique() {
    let mut a = ArrayBuffer::<u32>::new();
    assert!(!a.is_uniquely_referenced());
    assert!(!a.is_mutable_and_uniquely_referenced());
    assert!(a.request_unique_mutable_backing_buffer(0).is_none());
}

#[test]
fn test_with_capacity() {
    let mut a = ArrayBuffer::<u32>::with_capacity(10);
    assert_eq!(a.count(), 0);
    assert!(a.capacity() >= 10);
    assert!(a.is_uniquely_referenced());
}

#[test]
fn test_capacity_follows_allocator_rounding() {
    let a = ArrayBuffer::<u64, _>::with_capacity_in(1, RoundingAlloc);
    assert!(a.capacity() > 1);
    assert!(a.capacity() * 8 <= ROUND_TO);

    let mut builder = BufferBuilder::new_in(1, RoundingAlloc);
    assert_eq!(builder.remaining_capacity(), a.capacity());
    builder.add(1u64);
    drop(builder);
}

#[test]
fn test_try_with_capacity_reports_failure() {
    let result = ArrayBuffer::<u32, _>::try_with_capacity_in(4, FailingAlloc);
    assert!(matches!(result, Err(Error::Alloc(_))));

    let result = ArrayBuffer::<u32, _>::try_with_capacity_in(0, FailingAlloc);
    assert!(result.is_ok());

    let result = ArrayBuffer::<u64>::try_with_capacity_in(usize::MAX, Global);
    assert!(matches!(result, Err(Error::Layout(_))));
}

#[test]
fn test_copies_share_storage_until_mutated() {
    let mut a = buffer_of(&[1, 2, 3]);
    assert!(a.is_uniquely_referenced());

    let mut b = a.clone();
    assert_eq!(a.identity(), b.identity());
    assert!(!a.is_uniquely_referenced());
    assert!(!b.is_uniquely_referenced());

    b.replace_subrange(0..1, 1, [9]);
    assert_eq!(a, [1, 2, 3]);
    assert_eq!(b, [9, 2, 3]);
    assert_ne!(a.identity(), b.identity());

    assert!(a.is_uniquely_referenced());
    assert!(b.is_uniquely_referenced());
}

#[test]
fn test_dropping_a_copy_restores_uniqueness() {
    let mut a = buffer_of(&[1, 2, 3]);
    let b = a.clone();
    assert!(a.request_unique_mutable_backing_buffer(0).is_none());

    drop(b);
    let mut unique = a
        .request_unique_mutable_backing_buffer(0)
        .expect("buffer is unique again");
    unique.as_mut_slice()[1] = 20;
    assert_eq!(a, [1, 20, 3]);
}

#[test]
fn test_request_unique_checks_capacity() {
    let mut a = ArrayBuffer::<u8>::with_capacity(4);
    let capacity = a.capacity();
    assert!(a.request_unique_mutable_backing_buffer(capacity).is_some());
    assert!(a.request_unique_mutable_backing_buffer(capacity + 1).is_none());
}

#[test]
fn test_unique_buffer_in_place_mutation() {
    let mut a = ArrayBuffer::<u32>::with_capacity(4);
    let identity = a.identity();

    {
        let mut unique = a.request_unique_mutable_backing_buffer(4).expect("unique");
        for i in 0..4 {
            unique.push_within_capacity(i).expect("has capacity");
        }

        let capacity = unique.capacity();
        for i in 4..capacity {
            unique.push_within_capacity(i as u32).expect("has capacity");
        }

        assert_eq!(unique.push_within_capacity(100), Err(100));
        unique.truncate(4);
        assert_eq!(unique.pop(), Some(3));
        assert_eq!(unique.remove(0), 0);
        assert_eq!(&*unique, &[1, 2]);
    }

    assert_eq!(a, [1, 2]);
    assert_eq!(a.identity(), identity);
}

#[test]
fn test_unique_buffer_spare_capacity() {
    let mut a = ArrayBuffer::<u32>::with_capacity(3);
    let mut unique = a.request_unique_mutable_backing_buffer(3).expect("unique");
    let spare = unique.spare_capacity_mut();
    assert!(spare.len() >= 3);
    spare[0].write(7);
    spare[1].write(8);

    unsafe {
        unique.set_count(2);
    }

    assert_eq!(unique.as_slice(), &[7, 8]);
}

#[test]
fn test_element_access() {
    let a = buffer_of(&["a", "b", "c"]);
    assert_eq!(*a.element(1), "b");
    assert_eq!(a[2], "c");
    assert_eq!(&a[..2], &["a", "b"]);
    assert_eq!(a.get(3), None);
}

#[test]
#[should_panic(expected = "index out of range")]
fn test_element_out_of_range() {
    let a = buffer_of(&[1, 2, 3]);
    let _ = a.element(3);
}

#[test]
fn test_replace_growth_in_place() {
    let mut a = ArrayBuffer::with_capacity(8);
    a.append_contents(["A", "B", "C", "D"]);
    let identity = a.identity();

    a.replace_subrange(1..3, 3, ["X", "Y", "Z"]);
    assert_eq!(a, ["A", "X", "Y", "Z", "D"]);
    assert_eq!(a.count(), 5);
    assert_eq!(a.identity(), identity);
}

#[test]
fn test_replace_shrink_in_place() {
    let mut a = ArrayBuffer::with_capacity(8);
    a.append_contents(["A", "B", "C", "D", "E"]);
    let identity = a.identity();

    a.replace_subrange(1..4, 1, ["X"]);
    assert_eq!(a, ["A", "X", "E"]);
    assert_eq!(a.identity(), identity);
}

#[test]
fn test_replace_shrink_with_long_tail() {
    let mut a = buffer_of(&[0, 1, 2, 3, 4, 5, 6, 7]);
    a.replace_subrange(1..3, 0, iter::empty());
    assert_eq!(a, [0, 3, 4, 5, 6, 7]);

    a.replace_subrange(0..1, 0, iter::empty());
    assert_eq!(a, [3, 4, 5, 6, 7]);

    a.replace_subrange(4..5, 0, iter::empty());
    assert_eq!(a, [3, 4, 5, 6]);
}

#[test]
fn test_replace_same_length() {
    let mut a = buffer_of(&[1, 2, 3, 4]);
    a.replace_subrange(1..3, 2, [20, 30]);
    assert_eq!(a, [1, 20, 30, 4]);

    a.replace_subrange(2..2, 0, iter::empty());
    assert_eq!(a, [1, 20, 30, 4]);
}

#[test]
fn test_replace_relocates_when_full() {
    let mut a = buffer_of(&[1, 2, 3]);
    let old_capacity = a.capacity();
    let identity = a.identity();

    a.replace_subrange(3..3, old_capacity + 1, 0..(old_capacity as i32 + 1));
    assert_ne!(a.identity(), identity);
    assert!(a.capacity() >= grow_capacity(old_capacity, 3 + old_capacity + 1));
    assert_eq!(&a[..3], &[1, 2, 3]);
    assert_eq!(a.count(), 3 + old_capacity + 1);
}

#[test]
fn test_replace_then_restore() {
    let original = buffer_of(&[1, 2, 3, 4, 5, 6]);
    let mut a = original.clone();

    let removed: Vec<i32> = a[2..4].to_vec();
    a.replace_subrange(2..4, 3, [7, 8, 9]);
    assert_eq!(a, [1, 2, 7, 8, 9, 5, 6]);

    a.replace_subrange(2..5, removed.len(), removed);
    assert_eq!(a, original);
}

#[test]
fn test_relocation_moves_unique_elements() {
    static CLONES: AtomicUsize = AtomicUsize::new(0);
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, PartialEq)]
    struct Tracked(u32);

    impl Clone for Tracked {
        fn clone(&self) -> Self {
            CLONES.fetch_add(1, AtomicOrdering::SeqCst);
            Self(self.0)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    let mut a = copy_collection_to_buffer((0..4).map(Tracked));
    let capacity = a.capacity();

    // Erase one element, and add enough to force new storage.
    let added = capacity;
    a.replace_subrange(1..2, added, (10..10 + added as u32).map(Tracked));
    assert_eq!(CLONES.load(AtomicOrdering::SeqCst), 0);
    assert_eq!(DROPS.load(AtomicOrdering::SeqCst), 1);
    assert_eq!(a.count(), 3 + added);
    assert_eq!(a[0].0, 0);
    assert_eq!(a[1].0, 10);
    assert_eq!(a[a.count() - 1].0, 3);

    let count = a.count();
    drop(a);
    assert_eq!(DROPS.load(AtomicOrdering::SeqCst), 1 + count);
}

#[test]
fn test_relocation_clones_shared_elements() {
    static CLONES: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, PartialEq)]
    struct Tracked(u32);

    impl Clone for Tracked {
        fn clone(&self) -> Self {
            CLONES.fetch_add(1, AtomicOrdering::SeqCst);
            Self(self.0)
        }
    }

    let mut a = copy_collection_to_buffer((0..4).map(Tracked));
    let b = a.clone();

    a.replace_subrange(1..3, 1, [Tracked(9)]);
    assert_eq!(CLONES.load(AtomicOrdering::SeqCst), 2);
    assert_eq!(a, [Tracked(0), Tracked(9), Tracked(3)]);
    assert_eq!(b, [Tracked(0), Tracked(1), Tracked(2), Tracked(3)]);
}

#[test]
fn test_shrink_to_empty_drops_every_element_once() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone)]
    struct CountDrops(#[allow(unused)] u8);

    impl Drop for CountDrops {
        fn drop(&mut self) {
            DROPS.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    let mut a = copy_collection_to_buffer((0..5).map(CountDrops));
    a.replace_subrange(0..5, 0, iter::empty());
    assert_eq!(a.count(), 0);
    assert_eq!(DROPS.load(AtomicOrdering::SeqCst), 5);

    drop(a);
    assert_eq!(DROPS.load(AtomicOrdering::SeqCst), 5);
}

#[test]
#[should_panic(expected = "fewer elements")]
fn test_replace_with_short_sequence() {
    let mut a = buffer_of(&[1, 2, 3]);
    a.replace_subrange(0..1, 3, [7, 8]);
}

#[test]
#[should_panic(expected = "more elements")]
fn test_replace_with_long_sequence() {
    let mut a = buffer_of(&[1, 2, 3]);
    a.replace_subrange(0..1, 1, [7, 8]);
}

#[test]
#[should_panic(expected = "range out of bounds")]
fn test_replace_out_of_bounds() {
    let mut a = buffer_of(&[1, 2, 3]);
    a.replace_subrange(2..4, 0, iter::empty());
}

#[test]
fn test_short_sequence_leaves_a_consistent_buffer() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone)]
    struct CountDrops(#[allow(unused)] u8);

    impl Drop for CountDrops {
        fn drop(&mut self) {
            DROPS.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    let mut a = ArrayBuffer::with_capacity(8);
    a.append_contents((0..4).map(CountDrops));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        a.replace_subrange(1..2, 3, [CountDrops(10)]);
    }));
    assert!(result.is_err());

    // Whatever survived is still readable, and nothing was dropped twice.
    let survivors = a.count();
    assert!(survivors <= 4);
    drop(a);
    assert!(DROPS.load(AtomicOrdering::SeqCst) <= 5);
}

#[test]
fn test_panicking_input_leaves_shared_buffer_untouched() {
    let mut a = buffer_of(&[1, 2, 3]);
    let b = a.clone();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let values = (0..3).map(|i| if i == 2 { panic!("boom") } else { i });
        a.replace_subrange(0..0, 3, values);
    }));

    assert!(result.is_err());
    assert_eq!(a, [1, 2, 3]);
    assert_eq!(a.identity(), b.identity());
}

#[test]
fn test_append_contents_grows_geometrically() {
    let mut a = ArrayBuffer::<usize>::new();
    let mut reallocations = 0;
    let mut identity = a.identity();

    for i in 0..1000 {
        a.append_contents([i]);
        if a.identity() != identity {
            identity = a.identity();
            reallocations += 1;
        }
    }

    assert_eq!(a.count(), 1000);
    assert!(a.iter().copied().eq(0..1000));
    assert!(reallocations <= 11);
}

#[test]
#[should_panic(expected = "more elements")]
fn test_append_contents_with_lying_length() {
    struct Liar(u32);

    impl Iterator for Liar {
        type Item = u32;

        fn next(&mut self) -> Option<u32> {
            self.0 += 1;
            (self.0 <= 3).then_some(self.0)
        }
    }

    impl ExactSizeIterator for Liar {
        fn len(&self) -> usize {
            2
        }
    }

    let mut a = ArrayBuffer::new();
    a.append_contents(Liar(0));
}

#[test]
fn test_make_unique() {
    let mut a = buffer_of(&[1, 2, 3]);
    let b = a.clone();

    a.make_unique(0).as_mut_slice()[0] = 5;
    assert_eq!(a, [5, 2, 3]);
    assert_eq!(b, [1, 2, 3]);

    let capacity = a.capacity();
    let unique = a.make_unique(capacity + 1);
    assert!(unique.capacity() > capacity);
    assert_eq!(unique.as_slice(), &[5, 2, 3]);

    let mut empty = ArrayBuffer::<u8>::new();
    assert_eq!(empty.make_unique(0).count(), 0);
}

#[test]
fn test_copy_contents() {
    let a = buffer_of(&[String::from("a"), String::from("b"), String::from("c")]);
    let mut target = [const { MaybeUninit::<String>::uninit() }; 4];

    let written = a.copy_contents(1.., &mut target);
    assert_eq!(written, 2);

    let copied: Vec<String> = target[..written]
        .iter_mut()
        .map(|slot| unsafe { slot.assume_init_read() })
        .collect();
    assert_eq!(copied, ["b", "c"]);
}

#[test]
fn test_pinning() {
    let mut a = buffer_of(&[1, 2, 3]);
    let pin = a.pin().expect("unique buffers can be pinned");

    assert!(!a.is_uniquely_referenced());
    assert!(a.is_uniquely_referenced_or_pinned());
    assert!(a.is_mutable_and_uniquely_referenced_or_pinned());
    assert!(a.request_unique_mutable_backing_buffer(0).is_none());
    assert!(a.pin().is_none());

    let mut b = a.clone();
    assert!(!a.is_uniquely_referenced_or_pinned());
    assert!(!b.is_mutable_and_uniquely_referenced_or_pinned());
    drop(b);
    assert!(a.is_mutable_and_uniquely_referenced_or_pinned());

    drop(pin);
    assert!(a.is_uniquely_referenced());
    assert!(!OwnerHandle::is_pinned(a.owner()));
}

#[test]
fn test_slice_shares_storage() {
    let alloc = CountingAlloc::default();
    let a = copy_collection_to_buffer_in_counting(&alloc, &[1, 2, 3, 4, 5]);
    assert_eq!(alloc.allocations.get(), 1);

    let view = a.slice(1..4);
    assert_eq!(view, [2, 3, 4]);
    assert_eq!(view.identity(), a.identity());
    assert_eq!((view.start(), view.end()), (1, 4));
    assert_eq!(alloc.allocations.get(), 1);

    let inner = view.slice(1..);
    assert_eq!(inner, [3, 4]);
    assert_eq!((inner.start(), inner.end()), (2, 4));
    assert!(inner.request_native_buffer().is_none());

    let copy = inner.to_buffer();
    assert_eq!(copy, [3, 4]);
    assert_ne!(copy.identity(), a.identity());
    assert_eq!(alloc.allocations.get(), 2);

    drop((a, view, inner, copy));
    assert_eq!(alloc.live(), 0);
}

fn copy_collection_to_buffer_in_counting(
    alloc: &CountingAlloc,
    values: &[i32],
) -> ArrayBuffer<i32, CountingAlloc> {
    crate::copy_collection_to_buffer_in(values.iter().copied(), alloc.clone())
}

#[test]
fn test_slice_blocks_in_place_mutation() {
    let mut a = buffer_of(&[1, 2, 3]);
    let mut view = a.slice(..);
    assert!(!view.is_uniquely_referenced());

    a.replace_subrange(0..1, 1, [10]);
    assert_eq!(view, [1, 2, 3]);
    assert_eq!(a, [10, 2, 3]);
    assert!(view.is_uniquely_referenced());

    let native = view.request_native_buffer().expect("view covers its storage");
    assert_eq!(native, [1, 2, 3]);
    assert_eq!(native.identity(), view.identity());
}

#[test]
fn test_slice_into_buffer() {
    let a = buffer_of(&[1, 2, 3]);
    let identity = a.identity();

    let whole: SliceBuffer<i32> = a.clone().into();
    assert_eq!(whole.into_buffer().identity(), identity);

    let part = a.slice(..2).into_buffer();
    assert_eq!(part, [1, 2]);
    assert_ne!(part.identity(), identity);

    let mut target = [MaybeUninit::uninit(); 1];
    assert_eq!(a.slice(1..).copy_contents(1.., &mut target), 1);
    assert_eq!(unsafe { target[0].assume_init() }, 3);
}

#[test]
#[should_panic(expected = "range out of bounds")]
fn test_slice_out_of_bounds() {
    let a = buffer_of(&[1, 2, 3]);
    let _ = a.slice(2..5);
}

#[test]
fn test_builder_appends_in_order() {
    let mut builder = BufferBuilder::new(4);
    assert_eq!(builder.remaining_capacity(), 4);

    for i in 0..10 {
        builder.add(i);
        assert_eq!(builder.len(), i + 1);
    }

    let buffer = builder.finish();
    assert!(buffer.iter().copied().eq(0..10));
    assert!(buffer.capacity() >= 10);
}

#[test]
fn test_builder_with_zero_capacity() {
    let mut builder = BufferBuilder::new(0);
    assert_eq!(builder.remaining_capacity(), 0);
    assert!(builder.is_empty());

    builder.add('x');
    assert_eq!(builder.len(), 1);
    assert_eq!(builder.finish(), ['x']);
}

#[test]
fn test_builder_finish_with_original_count() {
    let mut builder = BufferBuilder::new(3);
    for value in ["a", "b", "c"] {
        builder.add_with_existing_capacity(value);
    }

    assert_eq!(builder.remaining_capacity(), 0);
    assert_eq!(builder.finish_with_original_count(), ["a", "b", "c"]);
}

#[test]
#[should_panic(expected = "builder already finished")]
fn test_builder_finish_twice() {
    let mut builder = BufferBuilder::new(1);
    builder.add(1);
    let _first = builder.finish();
    let _second = builder.finish();
}

#[test]
#[should_panic(expected = "builder already finished")]
fn test_builder_add_after_finish() {
    let mut builder = BufferBuilder::new(1);
    let _buffer = builder.finish();
    builder.add(1);
}

#[test]
#[should_panic(expected = "no remaining capacity")]
fn test_builder_add_without_capacity() {
    let mut builder = BufferBuilder::new(0);
    builder.add_with_existing_capacity(1);
}

#[test]
#[should_panic(expected = "initial capacity")]
fn test_builder_underfilled() {
    let mut builder = BufferBuilder::new(3);
    builder.add(1);
    let _buffer = builder.finish_with_original_count();
}

#[test]
fn test_unfinished_builder_drops_appended_elements() {
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct CountDrops(#[allow(unused)] u8);

    impl Drop for CountDrops {
        fn drop(&mut self) {
            DROPS.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    let alloc = CountingAlloc::default();
    let mut builder = BufferBuilder::new_in(2, alloc.clone());
    for i in 0..5 {
        builder.add(CountDrops(i));
    }

    drop(builder);
    assert_eq!(DROPS.load(AtomicOrdering::SeqCst), 5);
    assert_eq!(alloc.live(), 0);
}

#[test]
fn test_copy_sequence_to_buffer() {
    let from_filter = copy_sequence_to_buffer((0..20).filter(|i| i % 3 == 0));
    assert_eq!(from_filter, [0, 3, 6, 9, 12, 15, 18]);

    let from_exact = copy_sequence_to_buffer(["x".to_string(), "y".to_string()]);
    assert_eq!(from_exact, ["x", "y"]);

    let empty = copy_sequence_to_buffer(iter::empty::<u8>());
    assert!(OwnerHandle::is_empty_singleton(empty.owner()));
}

#[test]
fn test_copy_sequence_with_overestimated_size_hint() {
    struct Overestimate(u32);

    impl Iterator for Overestimate {
        type Item = u32;

        fn next(&mut self) -> Option<u32> {
            self.0 += 1;
            (self.0 <= 2).then_some(self.0)
        }

        fn size_hint(&self) -> (usize, Option<usize>) {
            (5, None)
        }
    }

    assert_eq!(copy_sequence_to_buffer(Overestimate(0)), [1, 2]);
}

#[test]
#[should_panic(expected = "fewer elements")]
fn test_copy_collection_with_lying_length() {
    struct Liar(u32);

    impl Iterator for Liar {
        type Item = u32;

        fn next(&mut self) -> Option<u32> {
            self.0 += 1;
            (self.0 <= 1).then_some(self.0)
        }
    }

    impl ExactSizeIterator for Liar {
        fn len(&self) -> usize {
            3
        }
    }

    let _ = copy_collection_to_buffer(Liar(0));
}

#[test]
fn test_zero_sized_elements() {
    let mut a = ContiguousArray::new();
    for _ in 0..100 {
        a.push(());
    }

    assert_eq!(a.len(), 100);
    assert_eq!(a.pop(), Some(()));
    a.truncate(10);
    assert_eq!(a.len(), 10);

    let b = a.clone();
    a.clear();
    assert_eq!(b.len(), 10);
    assert!(a.is_empty());
}

#[test]
fn test_array_push_pop() {
    let mut xs = ContiguousArray::new();
    assert_eq!(xs.pop(), None);

    for i in 0..100 {
        xs.push(i);
    }

    assert_eq!(xs.len(), 100);
    assert_eq!(xs.pop(), Some(99));
    assert_eq!(xs.len(), 99);
    assert!(xs.iter().copied().eq(0..99));
}

#[test]
fn test_array_value_semantics() {
    let mut xs: ContiguousArray<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    let ys = xs.clone();
    assert_eq!(xs.buffer().identity(), ys.buffer().identity());

    xs[1].push('!');
    xs.insert(0, "z".to_string());
    assert_eq!(xs, ["z", "a", "b!", "c"]);
    assert_eq!(ys, ["a", "b", "c"]);

    let mut zs = ys.clone();
    assert_eq!(zs.remove(2), "c");
    assert_eq!(zs, ["a", "b"]);
    assert_eq!(ys.len(), 3);

    let mut ws = ys.clone();
    *ws.get_mut(0).expect("in range") = "w".to_string();
    assert!(ws.get_mut(3).is_none());
    assert_eq!(ws, ["w", "b", "c"]);
    assert_eq!(ys, ["a", "b", "c"]);
}

#[test]
fn test_array_pop_from_shared() {
    let mut xs = ContiguousArray::from([1, 2, 3]);
    let ys = xs.clone();

    assert_eq!(xs.pop(), Some(3));
    assert_eq!(xs, [1, 2]);
    assert_eq!(ys, [1, 2, 3]);
}

#[test]
fn test_array_mutation_in_place_keeps_storage() {
    let mut xs = ContiguousArray::with_capacity(16);
    xs.extend_from_slice(&[1, 2, 3]);
    let identity = xs.buffer().identity();

    xs.push(4);
    xs.insert(0, 0);
    xs[2] = 20;
    xs.remove(1);
    xs.replace_range(1..3, [7, 8, 9]);
    xs.truncate(3);

    assert_eq!(xs, [0, 7, 8]);
    assert_eq!(xs.buffer().identity(), identity);
}

#[test]
#[should_panic(expected = "insertion index (is 4) should be <= len (is 3)")]
fn test_array_insert_out_of_bounds() {
    let mut xs = ContiguousArray::from([1, 2, 3]);
    xs.insert(4, 4);
}

#[test]
#[should_panic(expected = "removal index (is 3) should be < len (is 3)")]
fn test_array_remove_out_of_bounds() {
    let mut xs = ContiguousArray::from([1, 2, 3]);
    xs.remove(3);
}

#[test]
fn test_array_clear() {
    let mut xs = ContiguousArray::from([1, 2, 3]);
    let capacity = xs.capacity();
    xs.clear();
    assert!(xs.is_empty());
    assert_eq!(xs.capacity(), capacity);

    let mut ys = ContiguousArray::from([1, 2, 3]);
    let zs = ys.clone();
    ys.clear();
    assert!(ys.is_empty());
    assert_eq!(ys.capacity(), 0);
    assert_eq!(zs, [1, 2, 3]);
}

#[test]
fn test_array_reserve() {
    let mut xs = ContiguousArray::<u32>::new();
    xs.reserve(10);
    assert!(xs.capacity() >= 10);
    let identity = xs.buffer().identity();

    for i in 0..10 {
        xs.push(i);
    }
    assert_eq!(xs.buffer().identity(), identity);

    let ys = xs.clone();
    xs.reserve(0);
    assert_ne!(xs.buffer().identity(), ys.buffer().identity());
    assert_eq!(xs, ys);

    assert!(matches!(
        xs.try_reserve(usize::MAX),
        Err(Error::CapacityOverflow)
    ));
    assert_eq!(xs.len(), 10);

    let mut failing = ContiguousArray::<u32, _>::new_in(FailingAlloc);
    assert!(matches!(failing.try_reserve(1), Err(Error::Alloc(_))));
    assert!(failing.try_reserve(0).is_ok());
}

#[test]
fn test_array_assign_from_slice() {
    static CLONES: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, PartialEq)]
    struct Tracked(u32);

    impl Clone for Tracked {
        fn clone(&self) -> Self {
            CLONES.fetch_add(1, AtomicOrdering::SeqCst);
            Self(self.0)
        }

        fn clone_from(&mut self, source: &Self) {
            self.0 = source.0;
        }
    }

    let mut xs = ContiguousArray::with_capacity(8);
    xs.push(Tracked(1));
    xs.push(Tracked(2));
    let identity = xs.buffer().identity();

    let source = [Tracked(5), Tracked(6), Tracked(7)];
    let before = CLONES.load(AtomicOrdering::SeqCst);
    xs.assign_from_slice(&source);
    assert_eq!(xs, source);
    assert_eq!(xs.buffer().identity(), identity);
    // Two existing elements were assigned over, only the third was cloned.
    assert_eq!(CLONES.load(AtomicOrdering::SeqCst) - before, 1);

    let ys = xs.clone();
    xs.assign_from_slice(&source[..1]);
    assert_eq!(xs, [Tracked(5)]);
    assert_eq!(ys, source);
}

#[test]
fn test_array_collect_and_extend() {
    let mut xs: ContiguousArray<u32> = (1..=3).collect();
    xs.extend([4, 5]);
    xs.extend((6..=8).filter(|_| true));
    assert!(xs.iter().copied().eq(1..=8));

    for x in &mut xs {
        *x *= 2;
    }

    let doubled: Vec<u32> = (&xs).into_iter().copied().collect();
    assert_eq!(doubled, [2, 4, 6, 8, 10, 12, 14, 16]);
}

#[test]
fn test_array_hash_and_eq() {
    use core::hash::{BuildHasher, Hash, Hasher};
    use std::collections::hash_map::RandomState;

    fn hash_of<H: Hash + ?Sized>(state: &RandomState, value: &H) -> u64 {
        let mut hasher = state.build_hasher();
        value.hash(&mut hasher);
        hasher.finish()
    }

    let state = RandomState::new();
    let xs = ContiguousArray::from([1, 2, 3]);
    let ys = ContiguousArray::from(&[1, 2, 3][..]);

    assert_eq!(xs, ys);
    assert_eq!(hash_of(&state, &xs), hash_of(&state, &ys));
    assert_eq!(hash_of(&state, &xs), hash_of(&state, &[1, 2, 3][..]));
    assert_eq!(std::format!("{xs:?}"), "[1, 2, 3]");
    assert_eq!(ContiguousArray::<u8>::default(), [0u8; 0]);
}

#[test]
fn test_array_slice_view() {
    let xs = ContiguousArray::from([1, 2, 3, 4]);
    let view = xs.slice(2..);
    assert_eq!(view, [3, 4]);
    assert_eq!(view.identity(), xs.buffer().identity());
}

#[test]
fn test_storage_is_released() {
    let alloc = CountingAlloc::default();

    {
        let mut xs = ContiguousArray::new_in(alloc.clone());
        for i in 0..100 {
            xs.push(i);
        }

        let ys = xs.clone();
        xs.push(100);
        let view = ys.slice(10..20);
        drop(ys);
        assert_eq!(view.len(), 10);
        assert_eq!(alloc.live(), 2);
    }

    assert_eq!(alloc.live(), 0);
}

#[test]
fn test_buffers_across_threads() {
    let a: ArrayBuffer<u64> = (0..1000).collect();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mut copy = a.clone();
            thread::spawn(move || {
                copy.replace_subrange(0..1, 1, [i]);
                copy.iter().sum::<u64>()
            })
        })
        .collect();

    let expected: u64 = (1..1000).sum();
    for (i, handle) in handles.into_iter().enumerate() {
        let sum = handle.join().expect("thread panicked");
        assert_eq!(sum, expected + i as u64);
    }

    assert_eq!(a[0], 0);
}

#[cfg(feature = "serde")]
#[test]
fn test_serialize() {
    let xs = ContiguousArray::from([1, 2, 3]);
    assert_eq!(serde_json::to_string(&xs).expect("serializes"), "[1,2,3]");
    assert_eq!(serde_json::to_string(xs.buffer()).expect("serializes"), "[1,2,3]");
    assert_eq!(serde_json::to_string(&xs.slice(1..)).expect("serializes"), "[2,3]");
}
