// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Cooperative in-place row partitioning.
//!
//! The segment is consumed in chunks of one group width. Every lane loads one
//! element of the chunk and classifies it; two exclusive scans over the
//! classification flags give each lane its destination in the small zone and
//! in the large zone. Small elements land at the running split point, which
//! may overwrite large elements parked there by earlier chunks; those are
//! staged before any write and re-emitted behind the small zone. After the
//! chunk at `pos` is consumed the segment reads
//! `[start, split) small | [split, pos + n) large | [pos + n, end) pending`.

use crate::backend::device_caps::MAX_LANES;
use crate::backend::group::SubGroup;
use crate::dtype::{key_cmp, SelectFloat};

/// Partitions `values[start..end)` around `pivot` and permutes `indices` in
/// tandem. Elements strictly below the pivot (total order) move to the front,
/// pivot-equal and larger elements to the back. Returns the absolute split
/// position.
pub fn kernel_row_partitioning<T: SelectFloat>(
    group: &SubGroup,
    values: &mut [T],
    indices: &mut [i32],
    start: usize,
    end: usize,
    pivot: T,
) -> usize {
    partition_with(group, values, indices, start, end, |v, _| v.total_lt(&pivot))
}

/// Partitions by `(value, column)` key. With `inclusive` the pivot key itself
/// joins the small side.
pub(crate) fn partition_by_key<T: SelectFloat>(
    group: &SubGroup,
    values: &mut [T],
    indices: &mut [i32],
    start: usize,
    end: usize,
    pivot: (T, i32),
    inclusive: bool,
) -> usize {
    partition_with(group, values, indices, start, end, |v, i| {
        let ord = key_cmp((v, i), pivot);
        ord.is_lt() || (inclusive && ord.is_eq())
    })
}

fn partition_with<T: SelectFloat>(
    group: &SubGroup,
    values: &mut [T],
    indices: &mut [i32],
    start: usize,
    end: usize,
    is_small: impl Fn(T, i32) -> bool,
) -> usize {
    assert!(start <= end && end <= values.len(), "segment out of bounds");
    assert_eq!(values.len(), indices.len(), "values and indices differ in length");

    let width = group.width();
    let mut lane_val = [T::default(); MAX_LANES];
    let mut lane_idx = [0i32; MAX_LANES];
    let mut small = [0u32; MAX_LANES];
    let mut large = [0u32; MAX_LANES];
    let mut small_rank = [0u32; MAX_LANES];
    let mut large_rank = [0u32; MAX_LANES];
    let mut staged_val = [T::default(); MAX_LANES];
    let mut staged_idx = [0i32; MAX_LANES];

    let mut split = start;
    let mut pos = start;
    while pos < end {
        let n = width.min(end - pos);

        for lane in 0..n {
            lane_val[lane] = values[pos + lane];
            lane_idx[lane] = indices[pos + lane];
            let is_low = is_small(lane_val[lane], lane_idx[lane]);
            small[lane] = is_low as u32;
            large[lane] = (!is_low) as u32;
        }
        let small_total = group.exclusive_scan_add(&small[..n], &mut small_rank[..n]) as usize;
        group.exclusive_scan_add(&large[..n], &mut large_rank[..n]);

        // Larges parked where the incoming smalls will land.
        let evicted = small_total.min(pos - split);
        staged_val[..evicted].copy_from_slice(&values[split..split + evicted]);
        staged_idx[..evicted].copy_from_slice(&indices[split..split + evicted]);

        let free_base = (split + small_total).max(pos);
        for lane in 0..n {
            let dst = if small[lane] == 1 {
                split + small_rank[lane] as usize
            } else {
                free_base + evicted + large_rank[lane] as usize
            };
            values[dst] = lane_val[lane];
            indices[dst] = lane_idx[lane];
        }
        values[free_base..free_base + evicted].copy_from_slice(&staged_val[..evicted]);
        indices[free_base..free_base + evicted].copy_from_slice(&staged_idx[..evicted]);

        split += small_total;
        pos += n;
    }
    split
}
