// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Stable LSD radix sort keyed on values, permuting an index array in tandem.

use ndarray::{ArrayViewMut1, ArrayViewMut2};
use rayon::prelude::*;
use tracing::trace;

use crate::backend::queue::ComputeQueue;
use crate::dtype::SelectFloat;
use crate::error::{shape as shape_err, Result};

const RADIX_BITS: u32 = 8;
const BUCKETS: usize = 1 << RADIX_BITS;

#[derive(Clone, Copy, Default)]
struct Entry<T> {
    key: u64,
    value: T,
    index: i32,
}

/// Reusable buffers for the scatter passes.
#[derive(Default)]
struct RadixScratch<T> {
    entries: Vec<Entry<T>>,
    swap: Vec<Entry<T>>,
}

impl<T: SelectFloat> RadixScratch<T> {
    fn load(&mut self, values: &[T], indices: &[i32]) {
        self.entries.clear();
        self.entries.extend(values.iter().zip(indices).map(|(&value, &index)| Entry {
            key: 0,
            value,
            index,
        }));
        self.swap.resize(self.entries.len(), Entry::default());
    }

    fn store(&self, values: &mut [T], indices: &mut [i32]) {
        for ((v, i), e) in values.iter_mut().zip(indices.iter_mut()).zip(&self.entries) {
            *v = e.value;
            *i = e.index;
        }
    }

    /// Runs `bytes` stable counting passes over the current keys.
    fn passes(&mut self, bytes: usize) {
        let mut counts = [0usize; BUCKETS];
        for pass in 0..bytes {
            let shift = pass as u32 * RADIX_BITS;
            counts.fill(0);
            for e in &self.entries {
                counts[((e.key >> shift) as usize) & (BUCKETS - 1)] += 1;
            }
            // A pass whose digit is shared by every key keeps the order.
            if counts.iter().any(|&c| c == self.entries.len()) {
                continue;
            }
            let mut offset = 0;
            for c in counts.iter_mut() {
                let n = *c;
                *c = offset;
                offset += n;
            }
            for e in &self.entries {
                let bucket = ((e.key >> shift) as usize) & (BUCKETS - 1);
                self.swap[counts[bucket]] = *e;
                counts[bucket] += 1;
            }
            std::mem::swap(&mut self.entries, &mut self.swap);
        }
    }

    fn sort_by_value(&mut self) {
        for e in self.entries.iter_mut() {
            e.key = e.value.radix_bits();
        }
        self.passes(T::RADIX_BYTES);
    }

    fn sort_by_index(&mut self) {
        for e in self.entries.iter_mut() {
            e.key = (e.index as u32 ^ 0x8000_0000) as u64;
        }
        self.passes(4);
    }
}

fn check_pair_len(values: usize, indices: usize) -> Result<()> {
    if values != indices {
        return Err(shape_err(&format!(
            "values ({values}) and indices ({indices}) differ in length"
        )));
    }
    Ok(())
}

/// Sorts `values` ascending (total order), applying the same permutation to
/// `indices`. Equal values keep their relative order.
pub fn radix_sort_by_key<T: SelectFloat>(
    queue: &ComputeQueue,
    values: &mut [T],
    indices: &mut [i32],
) -> Result<()> {
    check_pair_len(values.len(), indices.len())?;
    trace!(target: "st_select::radix", len = values.len(), "radix sort");
    queue.install(|| {
        let mut scratch = RadixScratch::default();
        scratch.load(values, indices);
        scratch.sort_by_value();
        scratch.store(values, indices);
    });
    Ok(())
}

/// Sorts every row of `values` independently, permuting the matching row of
/// `indices`.
pub fn radix_sort_rows_by_key<T: SelectFloat>(
    queue: &ComputeQueue,
    mut values: ArrayViewMut2<'_, T>,
    mut indices: ArrayViewMut2<'_, i32>,
) -> Result<()> {
    if values.dim() != indices.dim() {
        return Err(shape_err(&format!(
            "values {:?} and indices {:?} differ in shape",
            values.dim(),
            indices.dim()
        )));
    }
    let (rows, cols) = values.dim();
    let parallel = queue.should_parallelize(rows * cols);
    trace!(target: "st_select::radix", rows, cols, parallel, "row radix sort");

    let sort_row = |scratch: &mut (RadixScratch<T>, Vec<T>, Vec<i32>),
                    (mut v, mut i): (ArrayViewMut1<'_, T>, ArrayViewMut1<'_, i32>)| {
        let (radix, row_vals, row_idx) = scratch;
        row_vals.clear();
        row_vals.extend(v.iter().copied());
        row_idx.clear();
        row_idx.extend(i.iter().copied());
        radix.load(row_vals, row_idx);
        radix.sort_by_value();
        radix.store(row_vals, row_idx);
        v.iter_mut().zip(row_vals.iter()).for_each(|(d, s)| *d = *s);
        i.iter_mut().zip(row_idx.iter()).for_each(|(d, s)| *d = *s);
    };

    let pairs: Vec<_> = values.rows_mut().into_iter().zip(indices.rows_mut()).collect();
    if parallel {
        queue.install(|| {
            pairs
                .into_par_iter()
                .for_each_init(|| (RadixScratch::default(), Vec::new(), Vec::new()), sort_row)
        });
    } else {
        let mut scratch = (RadixScratch::default(), Vec::new(), Vec::new());
        for pair in pairs {
            sort_row(&mut scratch, pair);
        }
    }
    Ok(())
}

/// Sorts pairs by `(value, index)`: an index pass first, then the stable
/// value passes on top of it.
pub fn sort_pairs_by_key<T: SelectFloat>(values: &mut [T], indices: &mut [i32]) -> Result<()> {
    check_pair_len(values.len(), indices.len())?;
    sort_pairs(values, indices);
    Ok(())
}

pub(crate) fn sort_pairs<T: SelectFloat>(values: &mut [T], indices: &mut [i32]) {
    debug_assert_eq!(values.len(), indices.len());
    let mut scratch = RadixScratch::default();
    scratch.load(values, indices);
    scratch.sort_by_index();
    scratch.sort_by_value();
    scratch.store(values, indices);
}
