// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Element types accepted by the selection kernels.
//!
//! Every comparison in this crate goes through [`SelectFloat::total_cmp`], the
//! IEEE-754 total order. NaNs and signed zeros therefore land in the same slot
//! regardless of which strategy served the call.

use std::cmp::Ordering;
use std::fmt::Debug;
use std::ops::{Add, Neg};

/// Floating point element usable by k-selection, compaction and radix sort.
pub trait SelectFloat:
    Copy + Default + Debug + PartialOrd + Send + Sync + Add<Output = Self> + Neg<Output = Self> + 'static
{
    /// Number of bytes consumed by the radix passes.
    const RADIX_BYTES: usize;
    /// Positive infinity, the value half of empty heap slots.
    const INFINITY: Self;

    fn total_cmp(&self, other: &Self) -> Ordering;

    /// Maps the value to an unsigned integer whose natural order matches
    /// [`SelectFloat::total_cmp`].
    fn radix_bits(self) -> u64;

    #[inline]
    fn total_lt(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Less
    }
}

impl SelectFloat for f32 {
    const RADIX_BYTES: usize = 4;
    const INFINITY: Self = f32::INFINITY;

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(self, other)
    }

    #[inline]
    fn radix_bits(self) -> u64 {
        let bits = self.to_bits();
        let flipped = if bits & 0x8000_0000 != 0 {
            !bits
        } else {
            bits | 0x8000_0000
        };
        flipped as u64
    }
}

impl SelectFloat for f64 {
    const RADIX_BYTES: usize = 8;
    const INFINITY: Self = f64::INFINITY;

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }

    #[inline]
    fn radix_bits(self) -> u64 {
        let bits = self.to_bits();
        if bits & 0x8000_0000_0000_0000 != 0 {
            !bits
        } else {
            bits | 0x8000_0000_0000_0000
        }
    }
}

/// Orders `(value, column)` keys: value first, smaller column on ties.
#[inline]
pub fn key_cmp<T: SelectFloat>(a: (T, i32), b: (T, i32)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

#[inline]
pub fn key_lt<T: SelectFloat>(a: (T, i32), b: (T, i32)) -> bool {
    key_cmp(a, b) == Ordering::Less
}
