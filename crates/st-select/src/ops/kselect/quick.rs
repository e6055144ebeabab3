// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Large `k`: randomized row Quick-Select over a reusable scratch copy.
//!
//! Each row is copied with its column indices into scratch and narrowed with
//! cooperative partitions until the split lands on `k` or the active window
//! fits one group. A fitting window is finalised by `k - start` elections,
//! which leaves `[start, k)` sorted; the resolved prefix `[0, start)` holds
//! strictly smaller keys and is ordered by the pair radix sort.

use rand::Rng;
use rayon::prelude::*;
use tracing::trace;

use crate::backend::device_caps::MAX_LANES;
use crate::backend::group::SubGroup;
use crate::backend::queue::ComputeQueue;
use crate::dtype::SelectFloat;
use crate::ops::partition::partition_by_key;
use crate::ops::radix::sort_pairs;
use crate::ops::view::RowSource;

const PIVOT_STREAM: &str = "st-select/kselect/pivots";

/// Pivot positions drawn from a precomputed uniform `[0, 1)` sequence that is
/// reused cyclically.
struct PivotStream<'a> {
    sequence: &'a [f32],
    cursor: usize,
}

impl PivotStream<'_> {
    fn pick(&mut self, start: usize, end: usize) -> usize {
        let u = self.sequence[self.cursor % self.sequence.len()];
        self.cursor = self.cursor.wrapping_add(1);
        let len = end - start;
        start + ((u * len as f32) as usize).min(len - 1)
    }
}

pub(crate) struct QuickSelect<T> {
    rows: usize,
    cols: usize,
    scratch_values: Vec<T>,
    scratch_indices: Vec<i32>,
    pivots: Vec<f32>,
    stride: usize,
    calls: usize,
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Step between the pivot offsets of consecutive rows: near the golden
/// fraction of `len` and coprime to it, so row offsets cover the whole
/// sequence before repeating.
fn row_stride(len: usize) -> usize {
    if len <= 2 {
        return 1;
    }
    let mut stride = ((len as f64 * 0.618_033_988_75) as usize).max(2);
    while gcd(stride, len) != 1 {
        stride += 1;
    }
    stride
}

impl<T: SelectFloat> QuickSelect<T> {
    /// Sizes the scratch for a `rows x cols` matrix and draws the pivot sequence.
    pub(crate) fn new(queue: &ComputeQueue, rows: usize, cols: usize) -> Self {
        let cfg = queue.config();
        let mut rng = cfg.rng_for(PIVOT_STREAM);
        let len = cfg.pivot_sequence_len.max(1);
        let pivots = (0..len).map(|_| rng.gen::<f32>()).collect();
        Self {
            rows,
            cols,
            scratch_values: vec![T::default(); rows * cols],
            scratch_indices: vec![0; rows * cols],
            pivots,
            stride: row_stride(len),
            calls: 0,
        }
    }

    /// Runs every row. `&mut self` keeps calls on one instance from
    /// overlapping on the shared scratch.
    pub(crate) fn select_rows<S: RowSource<T>>(
        &mut self,
        queue: &ComputeQueue,
        src: &S,
        k: usize,
        values: &mut [T],
        indices: &mut [i32],
    ) {
        debug_assert_eq!((src.rows(), src.cols()), (self.rows, self.cols));
        let cols = self.cols;
        if cols == 0 {
            return;
        }
        let group = queue.group();
        let base = self.calls;
        let stride = self.stride;
        let pivots = self.pivots.as_slice();
        let parallel = queue.should_parallelize(self.rows * cols);
        trace!(target: "st_select::kselect", rows = self.rows, cols, k, parallel, "quick-select pass");

        let run = |row: usize, sv: &mut [T], si: &mut [i32], ov: &mut [T], oi: &mut [i32]| {
            let mut stream = PivotStream {
                sequence: pivots,
                cursor: row_offset(base, row, stride, pivots.len()),
            };
            select_row(&group, &mut stream, src, row, k, sv, si, ov, oi);
        };

        if parallel {
            let scratch_values = &mut self.scratch_values;
            let scratch_indices = &mut self.scratch_indices;
            queue.install(|| {
                scratch_values
                    .par_chunks_mut(cols)
                    .zip(scratch_indices.par_chunks_mut(cols))
                    .zip(values.par_chunks_mut(k))
                    .zip(indices.par_chunks_mut(k))
                    .enumerate()
                    .for_each(|(row, (((sv, si), ov), oi))| run(row, sv, si, ov, oi));
            });
        } else {
            let rows = self
                .scratch_values
                .chunks_mut(cols)
                .zip(self.scratch_indices.chunks_mut(cols))
                .zip(values.chunks_mut(k))
                .zip(indices.chunks_mut(k));
            for (row, (((sv, si), ov), oi)) in rows.enumerate() {
                run(row, sv, si, ov, oi);
            }
        }
        self.calls = self.calls.wrapping_add(self.rows.max(1));
    }
}

/// First pivot slot read by `row` in the call numbered from `base`.
fn row_offset(base: usize, row: usize, stride: usize, len: usize) -> usize {
    (base.wrapping_add(row) % len) * stride % len
}

#[allow(clippy::too_many_arguments)]
fn select_row<T: SelectFloat, S: RowSource<T>>(
    group: &SubGroup,
    stream: &mut PivotStream<'_>,
    src: &S,
    row: usize,
    k: usize,
    values: &mut [T],
    indices: &mut [i32],
    out_vals: &mut [T],
    out_idx: &mut [i32],
) {
    let cols = values.len();
    for (col, (v, i)) in values.iter_mut().zip(indices.iter_mut()).enumerate() {
        *v = src.value(row, col);
        *i = col as i32;
    }

    let mut start = 0;
    let mut end = cols;
    let mut sorted_from = k;
    for _ in 0..cols {
        if end - start <= group.width() {
            finalize(group, values, indices, start, end, k);
            sorted_from = start;
            break;
        }
        let at = stream.pick(start, end);
        let pivot = (values[at], indices[at]);
        let mut split = partition_by_key(group, values, indices, start, end, pivot, false);
        if split == start {
            // The pivot is the smallest key of the window.
            split = partition_by_key(group, values, indices, start, end, pivot, true);
        }
        if split == k {
            break;
        }
        if split > k {
            end = split;
        } else {
            start = split;
        }
    }

    if sorted_from > 1 {
        sort_pairs(&mut values[..sorted_from], &mut indices[..sorted_from]);
    }
    out_vals.copy_from_slice(&values[..k]);
    out_idx.copy_from_slice(&indices[..k]);
}

/// Extracts the `k - start` smallest keys of a window that fits one group and
/// writes them in ascending order at `start`, followed by the rest.
fn finalize<T: SelectFloat>(
    group: &SubGroup,
    values: &mut [T],
    indices: &mut [i32],
    start: usize,
    end: usize,
    k: usize,
) {
    let lanes = end - start;
    let mut heads: [Option<(T, i32)>; MAX_LANES] = [None; MAX_LANES];
    for lane in 0..lanes {
        heads[lane] = Some((values[start + lane], indices[start + lane]));
    }
    let held = heads;

    let remainder = k - start;
    let mut taken = [false; MAX_LANES];
    let mut pos = start;
    for _ in 0..remainder {
        let Some(owner) = group.elect_min(&heads[..lanes]) else {
            break;
        };
        if let Some((v, i)) = heads[owner] {
            values[pos] = v;
            indices[pos] = i;
            pos += 1;
        }
        heads[owner] = None;
        taken[owner] = true;
    }
    for lane in 0..lanes {
        if !taken[lane] {
            if let Some((v, i)) = held[lane] {
                values[pos] = v;
                indices[pos] = i;
                pos += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::device_caps::DeviceCaps;
    use crate::config::SelectConfig;
    use crate::dtype::key_cmp;
    use crate::ops::view::DenseRows;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn oracle(data: &Array2<f32>, row: usize, k: usize) -> Vec<(f32, i32)> {
        let mut keys: Vec<(f32, i32)> =
            data.row(row).iter().enumerate().map(|(c, v)| (*v, c as i32)).collect();
        keys.sort_by(|a, b| key_cmp(*a, *b));
        keys.truncate(k);
        keys
    }

    fn queue(parallel_threshold: usize) -> ComputeQueue {
        let cfg = SelectConfig {
            seed: Some(1234),
            parallel_threshold,
            ..SelectConfig::default()
        };
        ComputeQueue::with_config(DeviceCaps::cpu(), cfg).unwrap()
    }

    #[test]
    fn finalize_sorts_window_prefix() {
        let group = SubGroup::new(8);
        let mut values = [0.0_f32, 6.0, 2.0, 5.0, 2.0, 9.0];
        let mut indices = [0, 1, 2, 3, 4, 5];
        finalize(&group, &mut values, &mut indices, 1, 6, 4);
        assert_eq!(&values[1..4], &[2.0, 2.0, 5.0]);
        assert_eq!(&indices[1..4], &[2, 4, 3]);
        let mut rest = values[4..].to_vec();
        rest.sort_by(f32::total_cmp);
        assert_eq!(rest, vec![6.0, 9.0]);
    }

    #[test]
    fn rows_match_oracle_with_duplicates() {
        let mut rng = StdRng::seed_from_u64(99);
        let (rows, cols) = (6, 300);
        let data = Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0..25) as f32);
        let src = DenseRows::new(data.view());
        for (k, threshold) in [(1, usize::MAX), (150, 0), (300, usize::MAX), (257, 0)] {
            let q = queue(threshold);
            let mut qs = QuickSelect::new(&q, rows, cols);
            let mut vals = vec![0.0_f32; rows * k];
            let mut idx = vec![0i32; rows * k];
            for _ in 0..2 {
                qs.select_rows(&q, &src, k, &mut vals, &mut idx);
                for row in 0..rows {
                    let got: Vec<(f32, i32)> = vals[row * k..(row + 1) * k]
                        .iter()
                        .copied()
                        .zip(idx[row * k..(row + 1) * k].iter().copied())
                        .collect();
                    assert_eq!(got, oracle(&data, row, k), "k = {k}, row = {row}");
                }
            }
        }
    }

    #[test]
    fn constant_rows_terminate() {
        let data = Array2::from_elem((2, 97), 1.5_f32);
        let src = DenseRows::new(data.view());
        let q = queue(usize::MAX);
        let mut qs = QuickSelect::new(&q, 2, 97);
        let k = 40;
        let mut vals = vec![0.0_f32; 2 * k];
        let mut idx = vec![0i32; 2 * k];
        qs.select_rows(&q, &src, k, &mut vals, &mut idx);
        assert!(vals.iter().all(|v| *v == 1.5));
        assert_eq!(&idx[..k], &(0..k as i32).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn adjacent_rows_start_far_apart_in_the_pivot_sequence() {
        for len in [1usize, 2, 3, 10, 64, 1000, 4096] {
            let stride = row_stride(len);
            assert_eq!(gcd(stride, len), 1, "len = {len}");
            let mut seen: Vec<usize> = (0..len).map(|row| row_offset(0, row, stride, len)).collect();
            if len > 3 {
                let gap = row_offset(0, 1, stride, len);
                assert!(gap > 1 && gap < len - 1, "len = {len}, gap = {gap}");
            }
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), len);
        }
    }
}
