// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Small `k`: private sorted insertion lists merged by group election.
//!
//! The group is `width` lanes wide with `width >= k`. Each lane owns a list
//! of its `k` best `(value, column)` keys from the columns it strides over.
//! The global top-k is contained in the union of the lists, so `k` elections
//! over the list heads emit it in ascending key order.

use crate::backend::device_caps::MAX_LANES;
use crate::backend::group::SubGroup;
use crate::backend::queue::ComputeQueue;
use crate::dtype::{key_lt, SelectFloat};
use crate::ops::view::RowSource;

use super::drive_rows;

/// Lane-private storage for one row: `width` lists of capacity `k`.
pub(crate) struct InsertionLists<T> {
    k: usize,
    keys: Vec<(T, i32)>,
    lens: Vec<usize>,
}

impl<T: SelectFloat> InsertionLists<T> {
    pub(crate) fn new(width: usize, k: usize) -> Self {
        Self {
            k,
            keys: vec![(T::default(), 0); width * k],
            lens: vec![0; width],
        }
    }

    fn clear(&mut self) {
        self.lens.fill(0);
    }

    /// Inserts into the lane's ascending list by linear shift, dropping the
    /// worst entry once the list is full.
    fn insert(&mut self, lane: usize, cand: (T, i32)) {
        let k = self.k;
        let list = &mut self.keys[lane * k..(lane + 1) * k];
        let len = self.lens[lane];
        if len == k && !key_lt(cand, list[k - 1]) {
            return;
        }
        let mut pos = len.min(k - 1);
        while pos > 0 && key_lt(cand, list[pos - 1]) {
            list[pos] = list[pos - 1];
            pos -= 1;
        }
        list[pos] = cand;
        self.lens[lane] = (len + 1).min(k);
    }

    fn head(&self, lane: usize, bias: usize) -> Option<(T, i32)> {
        (bias < self.lens[lane]).then(|| self.keys[lane * self.k + bias])
    }
}

/// Selects the `k` smallest keys of `row` into `out_vals` / `out_idx`.
pub(crate) fn select_row<T: SelectFloat, S: RowSource<T>>(
    group: &SubGroup,
    lists: &mut InsertionLists<T>,
    src: &S,
    row: usize,
    out_vals: &mut [T],
    out_idx: &mut [i32],
) {
    let width = group.width();
    let cols = src.cols();
    lists.clear();
    for lane in 0..width.min(cols) {
        let mut col = lane;
        while col < cols {
            lists.insert(lane, (src.value(row, col), col as i32));
            col += width;
        }
    }

    let mut bias = [0usize; MAX_LANES];
    let mut heads: [Option<(T, i32)>; MAX_LANES] = [None; MAX_LANES];
    for slot in 0..out_vals.len() {
        for lane in 0..width {
            heads[lane] = lists.head(lane, bias[lane]);
        }
        let Some(owner) = group.elect_min(&heads[..width]) else {
            break;
        };
        if let Some((value, col)) = heads[owner] {
            out_vals[slot] = value;
            out_idx[slot] = col;
        }
        bias[owner] += 1;
    }
}

pub(crate) fn select_rows<T: SelectFloat, S: RowSource<T>>(
    queue: &ComputeQueue,
    src: &S,
    k: usize,
    width: usize,
    values: &mut [T],
    indices: &mut [i32],
) {
    debug_assert!(k <= width, "insertion lists of width {width} cannot hold k = {k}");
    let group = SubGroup::new(width);
    drive_rows(
        queue,
        src.rows() * src.cols(),
        k,
        values,
        indices,
        || InsertionLists::new(group.width(), k),
        |lists, row, v, i| select_row(&group, lists, src, row, v, i),
    );
}
