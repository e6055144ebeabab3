// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Order-preserving stream compaction.
//!
//! The input is split into `P` contiguous slices, one per work group, with
//! `P` capped so the offsets fit a single prefix-sum group:
//!
//! 1. every group counts the kept elements of its slice;
//! 2. one group scans the `P` counts into `P + 1` boundary offsets, the last
//!    being the total;
//! 3. every group re-scans its slice and writes each kept element to its
//!    boundary offset plus its exclusive rank inside the slice.
//!
//! Counting uses `u32`, so inputs are limited to `i32::MAX` elements.

use std::ops::Range;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::backend::device_caps::MAX_LANES;
use crate::backend::group::SubGroup;
use crate::backend::queue::ComputeQueue;
use crate::error::{domain, shape as shape_err, Result};

/// Largest number of work groups the prefix-sum phase accepts.
pub const MAX_COMPACTION_GROUPS: usize = 256;

/// Largest element count the counting type represents.
pub const MAX_COMPACTION_LEN: usize = i32::MAX as usize;

/// Mask element. Non-zero values are truthy.
pub trait Flag: Copy + Send + Sync {
    fn is_set(self) -> bool;
}

impl Flag for bool {
    #[inline]
    fn is_set(self) -> bool {
        self
    }
}

macro_rules! int_flag {
    ($($ty:ty),*) => {
        $(impl Flag for $ty {
            #[inline]
            fn is_set(self) -> bool {
                self != 0
            }
        })*
    };
}

int_flag!(u8, u32, i32, i64);

impl Flag for f32 {
    #[inline]
    fn is_set(self) -> bool {
        self != 0.0
    }
}

/// Reusable compaction plan. Partial counts and offsets are resized only when
/// the element count changes between calls.
#[derive(Debug, Clone)]
pub struct SelectFlagged {
    group_size: usize,
    max_groups: usize,
    count_limit: usize,
    len: Option<usize>,
    partials: Vec<u32>,
    offsets: Vec<u32>,
}

impl SelectFlagged {
    pub fn new(queue: &ComputeQueue) -> Self {
        Self {
            group_size: queue.caps().compaction_group().max(1),
            max_groups: queue
                .config()
                .compaction_max_groups
                .clamp(1, MAX_COMPACTION_GROUPS),
            count_limit: MAX_COMPACTION_LEN,
            len: None,
            partials: Vec::new(),
            offsets: Vec::new(),
        }
    }

    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups.clamp(1, MAX_COMPACTION_GROUPS);
        self.len = None;
        self
    }

    /// Lowers the accepted element count; values above `i32::MAX` are capped.
    pub fn with_count_limit(mut self, limit: usize) -> Self {
        self.count_limit = limit.min(MAX_COMPACTION_LEN);
        self
    }

    #[inline]
    pub fn group_size(&self) -> usize {
        self.group_size
    }

    /// Number of work groups used for `n` elements.
    pub fn num_groups(&self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            n.div_ceil(self.group_size).min(self.max_groups)
        }
    }

    /// Writes `input[i]` for every truthy `mask[i]` to the front of `out`,
    /// keeping their relative order, and returns how many were written.
    pub fn select_flagged<M: Flag, V: Copy + Send + Sync>(
        &mut self,
        queue: &ComputeQueue,
        mask: &[M],
        input: &[V],
        out: &mut [V],
    ) -> Result<usize> {
        self.check_len(input.len())?;
        if mask.len() != input.len() {
            return Err(shape_err(&format!(
                "mask has {} flags for {} elements",
                mask.len(),
                input.len()
            )));
        }
        self.compact(queue, input, out, |i| mask[i].is_set())
    }

    /// Keeps `input[i]` when `mask[input[i]]` is truthy.
    pub fn select_flagged_index<M: Flag>(
        &mut self,
        queue: &ComputeQueue,
        mask: &[M],
        input: &[i32],
        out: &mut [i32],
    ) -> Result<usize> {
        self.check_len(input.len())?;
        if let Some((pos, bad)) = input
            .iter()
            .enumerate()
            .find(|(_, target)| **target < 0 || **target as usize >= mask.len())
        {
            return Err(shape_err(&format!(
                "index {bad} at position {pos} is outside the mask of {} flags",
                mask.len()
            )));
        }
        self.compact(queue, input, out, |i| mask[input[i] as usize].is_set())
    }

    fn check_len(&self, n: usize) -> Result<()> {
        if n > self.count_limit {
            return Err(domain(&format!(
                "{n} elements exceed the compaction limit of {}",
                self.count_limit
            )));
        }
        Ok(())
    }

    fn compact<V, K>(&mut self, queue: &ComputeQueue, input: &[V], out: &mut [V], keep: K) -> Result<usize>
    where
        V: Copy + Send + Sync,
        K: Fn(usize) -> bool + Sync,
    {
        let n = input.len();
        let groups = self.num_groups(n);
        if self.len != Some(n) {
            self.partials.resize(groups, 0);
            self.offsets.resize(groups + 1, 0);
            self.len = Some(n);
        }
        let lanes = queue.group();
        let parallel = queue.should_parallelize(n);
        trace!(target: "st_select::compact", n, groups, parallel, "compaction plan");

        // Phase 1: per-group counts.
        let count = |g: usize| count_slice(&lanes, group_slice(n, groups, g), &keep);
        let partials = &mut self.partials;
        if parallel {
            queue.install(|| {
                partials
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(g, slot)| *slot = count(g))
            });
        } else {
            partials.iter_mut().enumerate().for_each(|(g, slot)| *slot = count(g));
        }

        // Phase 2: boundary offsets in one group.
        let total = scan_offsets(&lanes, &self.partials, &mut self.offsets) as usize;
        debug!(target: "st_select::compact", n, kept = total, "compaction count");
        if out.len() < total {
            return Err(shape_err(&format!(
                "output holds {} elements, {total} selected",
                out.len()
            )));
        }

        // Phase 3: reorder into disjoint output windows.
        let mut windows: Vec<(usize, &mut [V])> = Vec::with_capacity(groups);
        let mut rest = &mut out[..total];
        for (g, bounds) in self.offsets.windows(2).enumerate() {
            let len = (bounds[1] - bounds[0]) as usize;
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
            windows.push((g, head));
            rest = tail;
        }
        let reorder = |(g, window): (usize, &mut [V])| {
            reorder_slice(&lanes, group_slice(n, groups, g), &keep, input, window)
        };
        if parallel {
            queue.install(|| windows.into_par_iter().for_each(reorder));
        } else {
            windows.into_iter().for_each(reorder);
        }
        Ok(total)
    }
}

/// Contiguous slice of `n` elements served by group `g` of `groups`.
fn group_slice(n: usize, groups: usize, g: usize) -> Range<usize> {
    let per_group = n.div_ceil(groups);
    let start = (g * per_group).min(n);
    start..((g + 1) * per_group).min(n)
}

fn count_slice(group: &SubGroup, range: Range<usize>, keep: &impl Fn(usize) -> bool) -> u32 {
    let width = group.width();
    let mut flags = [0u32; MAX_LANES];
    let mut total = 0u32;
    let mut pos = range.start;
    while pos < range.end {
        let n = width.min(range.end - pos);
        for lane in 0..n {
            flags[lane] = keep(pos + lane) as u32;
        }
        total += group.reduce(&flags[..n], 0u32, |acc, f| acc + f);
        pos += n;
    }
    total
}

/// Exclusive scan of `partials` into `offsets[..=P]`, one lane block at a time
/// with a running carry. Returns the grand total.
fn scan_offsets(group: &SubGroup, partials: &[u32], offsets: &mut [u32]) -> u32 {
    let width = group.width();
    let mut carry = 0u32;
    for (block, chunk) in partials.chunks(width).enumerate() {
        let base = block * width;
        let out = &mut offsets[base..base + chunk.len()];
        let sum = group.exclusive_scan_add(chunk, out);
        out.iter_mut().for_each(|o| *o += carry);
        carry += sum;
    }
    offsets[partials.len()] = carry;
    carry
}

fn reorder_slice<V: Copy>(
    group: &SubGroup,
    range: Range<usize>,
    keep: &impl Fn(usize) -> bool,
    input: &[V],
    window: &mut [V],
) {
    let width = group.width();
    let mut flags = [0u32; MAX_LANES];
    let mut ranks = [0u32; MAX_LANES];
    let mut written = 0usize;
    let mut pos = range.start;
    while pos < range.end {
        let n = width.min(range.end - pos);
        for lane in 0..n {
            flags[lane] = keep(pos + lane) as u32;
        }
        let kept = group.exclusive_scan_add(&flags[..n], &mut ranks[..n]);
        for lane in 0..n {
            if flags[lane] == 1 {
                window[written + ranks[lane] as usize] = input[pos + lane];
            }
        }
        written += kept as usize;
        pos += n;
    }
}

/// One-shot [`SelectFlagged::select_flagged`].
pub fn select_flagged<M: Flag, V: Copy + Send + Sync>(
    queue: &ComputeQueue,
    mask: &[M],
    input: &[V],
    out: &mut [V],
) -> Result<usize> {
    SelectFlagged::new(queue).select_flagged(queue, mask, input, out)
}

/// One-shot [`SelectFlagged::select_flagged_index`].
pub fn select_flagged_index<M: Flag>(
    queue: &ComputeQueue,
    mask: &[M],
    input: &[i32],
    out: &mut [i32],
) -> Result<usize> {
    SelectFlagged::new(queue).select_flagged_index(queue, mask, input, out)
}
