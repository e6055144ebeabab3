// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! `k == 1`: one strided reduction pass per row.

use crate::backend::device_caps::MAX_LANES;
use crate::backend::group::SubGroup;
use crate::backend::queue::ComputeQueue;
use crate::dtype::SelectFloat;
use crate::ops::view::RowSource;

use super::drive_rows;

/// Row minimum and its column. Every lane walks columns `lane, lane + W, ...`
/// keeping the first strict minimum it meets, so within a lane the smallest
/// column wins; the election settles ties across lanes.
pub(crate) fn row_min<T: SelectFloat, S: RowSource<T>>(
    group: &SubGroup,
    src: &S,
    row: usize,
) -> Option<(T, i32)> {
    let width = group.width();
    let cols = src.cols();
    let lanes = width.min(cols);
    let mut best: [Option<(T, i32)>; MAX_LANES] = [None; MAX_LANES];
    for (lane, slot) in best.iter_mut().enumerate().take(lanes) {
        let mut col = lane;
        while col < cols {
            let v = src.value(row, col);
            match slot {
                Some((b, _)) if !v.total_lt(b) => {}
                _ => *slot = Some((v, col as i32)),
            }
            col += width;
        }
    }
    let owner = group.elect_min(&best[..lanes])?;
    best[owner]
}

pub(crate) fn select_rows<T: SelectFloat, S: RowSource<T>>(
    queue: &ComputeQueue,
    src: &S,
    values: &mut [T],
    indices: &mut [i32],
) {
    let group = queue.group();
    drive_rows(queue, src.rows() * src.cols(), 1, values, indices, || (), |_, row, v, i| {
        if let Some((value, col)) = row_min(&group, src, row) {
            v[0] = value;
            i[0] = col;
        }
    });
}
