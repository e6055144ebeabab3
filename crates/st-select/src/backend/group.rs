// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Group collectives over a fixed set of cooperating lanes.
//!
//! Kernels in `ops` are written lane-by-lane: every lane keeps its private
//! registers in a small array indexed by lane id and the lanes meet at the
//! collectives below. On the CPU the collectives are sequential loops, which
//! keeps the lane arithmetic (strides, ranks, elections) identical to the
//! device kernels while every row still runs on a single worker. Lane arrays
//! are written in full before a collective reads them, so no explicit barrier
//! is needed.

use std::cmp::Ordering;

use crate::backend::device_caps::MAX_LANES;
use crate::dtype::SelectFloat;

/// A fixed-width execution group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubGroup {
    width: usize,
}

impl SubGroup {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.clamp(1, MAX_LANES),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Folds the lane values with `op`, starting from `identity`.
    #[inline]
    pub fn reduce<L: Copy, A>(&self, lanes: &[L], identity: A, op: impl Fn(A, L) -> A) -> A {
        debug_assert!(lanes.len() <= self.width);
        lanes.iter().fold(identity, |acc, &v| op(acc, v))
    }

    /// Writes the exclusive scan of `lanes` into `out` and returns the total.
    #[inline]
    pub fn exclusive_scan<T: Copy>(
        &self,
        lanes: &[T],
        identity: T,
        op: impl Fn(T, T) -> T,
        out: &mut [T],
    ) -> T {
        debug_assert!(lanes.len() <= self.width);
        debug_assert!(out.len() >= lanes.len());
        let mut acc = identity;
        for (slot, &v) in out.iter_mut().zip(lanes) {
            *slot = acc;
            acc = op(acc, v);
        }
        acc
    }

    #[inline]
    pub fn exclusive_scan_add(&self, flags: &[u32], out: &mut [u32]) -> u32 {
        self.exclusive_scan(flags, 0, |a, b| a + b, out)
    }

    /// Elects the lane holding the smallest `(value, index)` head.
    ///
    /// The group first reduces the minimum value across present lanes, then
    /// the minimum column index among lanes holding exactly that value. The
    /// owner is the first lane (exclusive-scan rank zero) whose head matches
    /// both. Returns `None` when no lane holds a candidate.
    pub fn elect_min<T: SelectFloat>(&self, heads: &[Option<(T, i32)>]) -> Option<usize> {
        debug_assert!(heads.len() <= self.width);
        let best_val = self.reduce(heads, None, |acc: Option<T>, head| match (acc, head) {
            (None, Some((v, _))) => Some(v),
            (Some(a), Some((v, _))) if v.total_cmp(&a) == Ordering::Less => Some(v),
            (acc, _) => acc,
        })?;

        let best_idx = self.reduce(heads, i32::MAX, |acc, head| match head {
            Some((v, i)) if v.total_cmp(&best_val) == Ordering::Equal => acc.min(i),
            _ => acc,
        });

        let mut matches = [0u32; MAX_LANES];
        for (flag, head) in matches.iter_mut().zip(heads) {
            *flag = matches!(head, Some((v, i)) if *i == best_idx
                && v.total_cmp(&best_val) == Ordering::Equal) as u32;
        }
        let mut ranks = [0u32; MAX_LANES];
        self.exclusive_scan_add(&matches[..heads.len()], &mut ranks[..heads.len()]);
        (0..heads.len()).find(|&lane| matches[lane] == 1 && ranks[lane] == 0)
    }
}
