// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Medium `k`: one bounded max-heap per row.
//!
//! Lanes stream their strided columns through small private buffers. Writers
//! to the shared heap take turns: the group reduces the ids of lanes with a
//! pending buffer, the smallest id drains into the heap, and the round repeats
//! until every buffer is empty. The root is always the worst retained key, so
//! a candidate either fills a free slot or replaces the root when it beats it.

use crate::backend::device_caps::MAX_LANES;
use crate::backend::group::SubGroup;
use crate::backend::queue::ComputeQueue;
use crate::dtype::{key_lt, SelectFloat};
use crate::ops::heap::{push_heap, replace_top, sort_heap};
use crate::ops::view::RowSource;

use super::drive_rows;

/// Candidates each lane buffers before a drain round.
const LANE_BUFFER: usize = 4;

fn less<T: SelectFloat>(a: &(T, i32), b: &(T, i32)) -> bool {
    key_lt(*a, *b)
}

/// Row-private heap storage of capacity `k` plus its filled length.
pub(crate) struct RowHeap<T> {
    slots: Vec<(T, i32)>,
    len: usize,
}

impl<T: SelectFloat> RowHeap<T> {
    pub(crate) fn with_capacity(k: usize) -> Self {
        Self {
            slots: vec![(T::INFINITY, i32::MIN); k],
            len: 0,
        }
    }

    /// Empties the heap, refilling every slot with the `(+inf, i32::MIN)`
    /// sentinel.
    fn reset(&mut self) {
        self.slots.fill((T::INFINITY, i32::MIN));
        self.len = 0;
    }

    fn offer(&mut self, cand: (T, i32)) {
        if self.len < self.slots.len() {
            self.slots[self.len] = cand;
            self.len += 1;
            push_heap(&mut self.slots[..self.len], less);
        } else if key_lt(cand, self.slots[0]) {
            replace_top(&mut self.slots, cand, less);
        }
    }
}

pub(crate) fn select_row<T: SelectFloat, S: RowSource<T>>(
    group: &SubGroup,
    heap: &mut RowHeap<T>,
    src: &S,
    row: usize,
    out_vals: &mut [T],
    out_idx: &mut [i32],
) {
    let width = group.width();
    let cols = src.cols();
    heap.reset();

    let mut buffers = [[(T::default(), 0i32); LANE_BUFFER]; MAX_LANES];
    let mut filled = [0usize; MAX_LANES];
    let block = width * LANE_BUFFER;
    let mut base = 0;
    while base < cols {
        for lane in 0..width {
            filled[lane] = 0;
            for j in 0..LANE_BUFFER {
                let col = base + j * width + lane;
                if col < cols {
                    buffers[lane][filled[lane]] = (src.value(row, col), col as i32);
                    filled[lane] += 1;
                }
            }
        }
        let mut pending = [usize::MAX; MAX_LANES];
        for lane in 0..width {
            pending[lane] = if filled[lane] > 0 { lane } else { usize::MAX };
        }
        loop {
            let writer = group.reduce(&pending[..width], usize::MAX, usize::min);
            if writer == usize::MAX {
                break;
            }
            for &cand in &buffers[writer][..filled[writer]] {
                heap.offer(cand);
            }
            pending[writer] = usize::MAX;
        }
        base += block;
    }

    let len = heap.len;
    sort_heap(&mut heap.slots[..len], less);
    for (slot, (value, col)) in heap.slots[..len].iter().enumerate() {
        out_vals[slot] = *value;
        out_idx[slot] = *col;
    }
}

pub(crate) fn select_rows<T: SelectFloat, S: RowSource<T>>(
    queue: &ComputeQueue,
    src: &S,
    k: usize,
    values: &mut [T],
    indices: &mut [i32],
) {
    let group = queue.group();
    drive_rows(
        queue,
        src.rows() * src.cols(),
        k,
        values,
        indices,
        || RowHeap::with_capacity(k),
        |heap, row, v, i| select_row(&group, heap, src, row, v, i),
    );
}
