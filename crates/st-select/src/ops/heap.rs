// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Binary max-heap primitives over plain slices.
//!
//! `less(a, b)` defines the order; the root holds the greatest element. The
//! functions never allocate, so a heap can live in a fixed scratch buffer
//! whose filled prefix is tracked by the caller.

fn sift_up<E>(heap: &mut [E], mut child: usize, less: &impl Fn(&E, &E) -> bool) {
    while child > 0 {
        let parent = (child - 1) / 2;
        if !less(&heap[parent], &heap[child]) {
            break;
        }
        heap.swap(parent, child);
        child = parent;
    }
}

fn sift_down<E>(heap: &mut [E], mut parent: usize, less: &impl Fn(&E, &E) -> bool) {
    let len = heap.len();
    loop {
        let left = 2 * parent + 1;
        if left >= len {
            break;
        }
        let right = left + 1;
        let child = if right < len && less(&heap[left], &heap[right]) {
            right
        } else {
            left
        };
        if !less(&heap[parent], &heap[child]) {
            break;
        }
        heap.swap(parent, child);
        parent = child;
    }
}

/// Restores the heap after the caller appended an element at the end of `heap`.
pub fn push_heap<E>(heap: &mut [E], less: impl Fn(&E, &E) -> bool) {
    if heap.len() > 1 {
        let last = heap.len() - 1;
        sift_up(heap, last, &less);
    }
}

/// Moves the greatest element to the end and re-heapifies the rest.
pub fn pop_heap<E>(heap: &mut [E], less: impl Fn(&E, &E) -> bool) {
    let len = heap.len();
    if len > 1 {
        heap.swap(0, len - 1);
        sift_down(&mut heap[..len - 1], 0, &less);
    }
}

pub fn make_heap<E>(heap: &mut [E], less: impl Fn(&E, &E) -> bool) {
    let len = heap.len();
    for parent in (0..len / 2).rev() {
        sift_down(heap, parent, &less);
    }
}

/// Sorts a valid heap ascending in place.
pub fn sort_heap<E>(heap: &mut [E], less: impl Fn(&E, &E) -> bool) {
    let mut end = heap.len();
    while end > 1 {
        heap.swap(0, end - 1);
        end -= 1;
        sift_down(&mut heap[..end], 0, &less);
    }
}

/// Overwrites the root with `item` and sifts it into place.
pub fn replace_top<E>(heap: &mut [E], item: E, less: impl Fn(&E, &E) -> bool) {
    if heap.is_empty() {
        return;
    }
    heap[0] = item;
    sift_down(heap, 0, &less);
}
