// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Row-wise k-selection.
//!
//! [`KSelect`] plans once per `(rows, cols, k)` and binds one strategy for
//! its lifetime:
//!
//! | condition                              | strategy                      |
//! |----------------------------------------|-------------------------------|
//! | `k == 1`                               | [`StrategyKind::SingleColumn`] |
//! | a supported SIMD width holds `k`       | [`StrategyKind::Simd`]        |
//! | `heap_min_k < k < heap_max_k`          | [`StrategyKind::Heap`]        |
//! | otherwise                              | [`StrategyKind::QuickSelect`] |
//!
//! Every strategy emits rows in ascending `(value, column)` order, so equal
//! values resolve to the smallest column and results do not depend on the
//! strategy, the pivot stream or the worker count.

mod heap;
mod quick;
mod simd;
mod single_col;

use std::fmt;
use std::mem::size_of;

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut2};
use rayon::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::backend::device_caps::DeviceCaps;
use crate::backend::queue::ComputeQueue;
use crate::dtype::SelectFloat;
use crate::error::{config as config_err, domain, shape as shape_err, Error, Result};
use crate::ops::view::{DenseRows, Negated, RowSource, SqL2Rows};

use quick::QuickSelect;

/// Concrete k-selection strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    SingleColumn,
    Simd,
    Heap,
    QuickSelect,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::SingleColumn => "single_column",
            StrategyKind::Simd => "simd",
            StrategyKind::Heap => "heap",
            StrategyKind::QuickSelect => "quick_select",
        }
    }

    /// Parses the names accepted by `SPIRAL_SELECT_STRATEGY`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_column" | "single" => Some(StrategyKind::SingleColumn),
            "simd" => Some(StrategyKind::Simd),
            "heap" => Some(StrategyKind::Heap),
            "quick_select" | "quickselect" | "quick" => Some(StrategyKind::QuickSelect),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which end of each row is selected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectOrder {
    #[default]
    Smallest,
    Largest,
}

fn check_problem(cols: usize, k: usize) -> Result<()> {
    if cols > i32::MAX as usize {
        return Err(domain(&format!(
            "{cols} columns exceed the i32 index range"
        )));
    }
    if k == 0 || k > cols {
        return Err(Error::InvalidK { k, cols });
    }
    Ok(())
}

/// The capacity decision tree. `element_size` is the byte width of one value.
pub fn choose_strategy(caps: &DeviceCaps, cols: usize, k: usize, element_size: usize) -> Result<StrategyKind> {
    check_problem(cols, k)?;
    let k32 = k as u32;
    let kind = if k == 1 {
        StrategyKind::SingleColumn
    } else if caps.simd_width_for(k32).is_some() {
        StrategyKind::Simd
    } else if caps.heap_min_k() < k32 && k32 < caps.heap_max_k(element_size) {
        StrategyKind::Heap
    } else {
        StrategyKind::QuickSelect
    };
    Ok(kind)
}

fn supports(caps: &DeviceCaps, kind: StrategyKind, k: usize, element_size: usize) -> bool {
    match kind {
        StrategyKind::SingleColumn => k == 1,
        StrategyKind::Simd => caps.simd_width_for(k as u32).is_some(),
        StrategyKind::Heap => (k as u64) < caps.heap_max_k(element_size) as u64,
        StrategyKind::QuickSelect => true,
    }
}

/// Runs `op` on every row of contiguous `rows x k` output buffers, in
/// parallel when the queue asks for it. `init` builds per-worker scratch.
pub(crate) fn drive_rows<T, W, I, F>(
    queue: &ComputeQueue,
    elements: usize,
    k: usize,
    values: &mut [T],
    indices: &mut [i32],
    init: I,
    op: F,
) where
    T: SelectFloat,
    I: Fn() -> W + Send + Sync,
    F: Fn(&mut W, usize, &mut [T], &mut [i32]) + Send + Sync,
{
    if queue.should_parallelize(elements) {
        queue.install(|| {
            values
                .par_chunks_mut(k)
                .zip(indices.par_chunks_mut(k))
                .enumerate()
                .for_each_init(&init, |scratch, (row, (v, i))| op(scratch, row, v, i));
        });
    } else {
        let mut scratch = init();
        for (row, (v, i)) in values.chunks_mut(k).zip(indices.chunks_mut(k)).enumerate() {
            op(&mut scratch, row, v, i);
        }
    }
}

enum Strategy<T> {
    SingleColumn,
    Simd { width: usize },
    Heap,
    QuickSelect(QuickSelect<T>),
}

impl<T> Strategy<T> {
    fn kind(&self) -> StrategyKind {
        match self {
            Strategy::SingleColumn => StrategyKind::SingleColumn,
            Strategy::Simd { .. } => StrategyKind::Simd,
            Strategy::Heap => StrategyKind::Heap,
            Strategy::QuickSelect(_) => StrategyKind::QuickSelect,
        }
    }
}

/// A planned k-selection for one matrix shape.
///
/// Scratch (output staging and, for Quick-Select, a full copy of the matrix)
/// is sized at construction and reused by every [`KSelect::select`] call.
pub struct KSelect<T: SelectFloat> {
    rows: usize,
    cols: usize,
    k: usize,
    order: SelectOrder,
    strategy: Strategy<T>,
    values: Vec<T>,
    indices: Vec<i32>,
}

impl<T: SelectFloat> fmt::Debug for KSelect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KSelect")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("k", &self.k)
            .field("order", &self.order)
            .field("strategy", &self.strategy.kind())
            .finish()
    }
}

impl<T: SelectFloat> KSelect<T> {
    /// Plans a selection of `k` per row on a `rows x cols` matrix. A strategy
    /// forced through the queue configuration overrides the decision tree.
    pub fn new(queue: &ComputeQueue, rows: usize, cols: usize, k: usize) -> Result<Self> {
        let kind = match queue.config().force_strategy {
            Some(forced) => forced,
            None => choose_strategy(queue.caps(), cols, k, size_of::<T>())?,
        };
        Self::with_strategy(queue, rows, cols, k, kind)
    }

    /// Plans with an explicit strategy.
    pub fn with_strategy(
        queue: &ComputeQueue,
        rows: usize,
        cols: usize,
        k: usize,
        kind: StrategyKind,
    ) -> Result<Self> {
        check_problem(cols, k)?;
        let caps = queue.caps();
        if !supports(caps, kind, k, size_of::<T>()) {
            return Err(config_err(&format!(
                "strategy {kind} cannot select k = {k} on {:?}",
                caps.backend
            )));
        }
        let strategy = match kind {
            StrategyKind::SingleColumn => Strategy::SingleColumn,
            StrategyKind::Simd => {
                let width = caps
                    .simd_width_for(k as u32)
                    .ok_or_else(|| config_err(&format!("no SIMD width holds k = {k}")))?;
                Strategy::Simd {
                    width: width as usize,
                }
            }
            StrategyKind::Heap => Strategy::Heap,
            StrategyKind::QuickSelect => Strategy::QuickSelect(QuickSelect::new(queue, rows, cols)),
        };
        debug!(
            target: "st_select::kselect",
            rows,
            cols,
            k,
            strategy = %kind,
            "planned k-selection"
        );
        Ok(Self {
            rows,
            cols,
            k,
            order: SelectOrder::Smallest,
            strategy,
            values: vec![T::default(); rows * k],
            indices: vec![0; rows * k],
        })
    }

    pub fn with_order(mut self, order: SelectOrder) -> Self {
        self.order = order;
        self
    }

    #[inline]
    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn order(&self) -> SelectOrder {
        self.order
    }

    /// Lane count of the SIMD insertion lists, when that strategy is bound.
    pub fn simd_width(&self) -> Option<usize> {
        match self.strategy {
            Strategy::Simd { width } => Some(width),
            _ => None,
        }
    }

    /// Selects `k` entries of every row of `data`. At least one of
    /// `selection` / `indices` must be given; both are `rows x k`.
    pub fn select(
        &mut self,
        queue: &ComputeQueue,
        data: ArrayView2<'_, T>,
        selection: Option<ArrayViewMut2<'_, T>>,
        indices: Option<ArrayViewMut2<'_, i32>>,
    ) -> Result<()> {
        self.check_outputs(&selection, &indices)?;
        if data.dim() != (self.rows, self.cols) {
            return Err(shape_err(&format!(
                "data is {:?}, planned for {:?}",
                data.dim(),
                self.shape()
            )));
        }
        let src = DenseRows::new(data);
        self.run(queue, &src, selection, indices)
    }

    /// Like [`KSelect::select`] on the squared L2 distances
    /// `norms1[row] + norms2[col] + inner_products[row, col]`, evaluated on
    /// the fly.
    pub fn select_sq_l2(
        &mut self,
        queue: &ComputeQueue,
        norms1: ArrayView1<'_, T>,
        norms2: ArrayView1<'_, T>,
        inner_products: ArrayView2<'_, T>,
        selection: Option<ArrayViewMut2<'_, T>>,
        indices: Option<ArrayViewMut2<'_, i32>>,
    ) -> Result<()> {
        self.check_outputs(&selection, &indices)?;
        if inner_products.dim() != (self.rows, self.cols) {
            return Err(shape_err(&format!(
                "inner products are {:?}, planned for {:?}",
                inner_products.dim(),
                self.shape()
            )));
        }
        let src = SqL2Rows::new(norms1.view(), norms2.view(), inner_products.view())?;
        self.run(queue, &src, selection, indices)
    }

    fn check_outputs(
        &self,
        selection: &Option<ArrayViewMut2<'_, T>>,
        indices: &Option<ArrayViewMut2<'_, i32>>,
    ) -> Result<()> {
        if selection.is_none() && indices.is_none() {
            return Err(Error::MissingOutput);
        }
        let want = (self.rows, self.k);
        if let Some(sel) = selection {
            if sel.dim() != want {
                return Err(shape_err(&format!("selection is {:?}, expected {want:?}", sel.dim())));
            }
        }
        if let Some(idx) = indices {
            if idx.dim() != want {
                return Err(shape_err(&format!("indices are {:?}, expected {want:?}", idx.dim())));
            }
        }
        Ok(())
    }

    fn run<S: RowSource<T>>(
        &mut self,
        queue: &ComputeQueue,
        src: &S,
        selection: Option<ArrayViewMut2<'_, T>>,
        indices: Option<ArrayViewMut2<'_, i32>>,
    ) -> Result<()> {
        debug!(
            target: "st_select::kselect",
            rows = self.rows,
            cols = self.cols,
            k = self.k,
            strategy = %self.kind(),
            order = ?self.order,
            "select"
        );
        match self.order {
            SelectOrder::Smallest => self.dispatch(queue, src),
            SelectOrder::Largest => {
                self.dispatch(queue, &Negated(src));
                self.values.iter_mut().for_each(|v| *v = -*v);
            }
        }

        let shape = (self.rows, self.k);
        if let Some(mut sel) = selection {
            let staged = ArrayView2::from_shape(shape, &self.values)
                .map_err(|e| shape_err(&format!("selection staging: {e}")))?;
            sel.assign(&staged);
        }
        if let Some(mut idx) = indices {
            let staged = ArrayView2::from_shape(shape, &self.indices)
                .map_err(|e| shape_err(&format!("index staging: {e}")))?;
            idx.assign(&staged);
        }
        Ok(())
    }

    fn dispatch<S: RowSource<T>>(&mut self, queue: &ComputeQueue, src: &S) {
        let k = self.k;
        let (values, indices) = (&mut self.values, &mut self.indices);
        match &mut self.strategy {
            Strategy::SingleColumn => single_col::select_rows(queue, src, values, indices),
            Strategy::Simd { width } => simd::select_rows(queue, src, k, *width, values, indices),
            Strategy::Heap => heap::select_rows(queue, src, k, values, indices),
            Strategy::QuickSelect(qs) => qs.select_rows(queue, src, k, values, indices),
        }
    }
}

/// Plans, runs and drops a [`KSelect`]; returns the strategy that served it.
pub fn kselect<T: SelectFloat>(
    queue: &ComputeQueue,
    data: ArrayView2<'_, T>,
    k: usize,
    selection: Option<ArrayViewMut2<'_, T>>,
    indices: Option<ArrayViewMut2<'_, i32>>,
) -> Result<StrategyKind> {
    let (rows, cols) = data.dim();
    let mut plan = KSelect::new(queue, rows, cols, k)?;
    plan.select(queue, data, selection, indices)?;
    Ok(plan.kind())
}

/// One-shot squared L2 variant of [`kselect`].
pub fn kselect_sq_l2<T: SelectFloat>(
    queue: &ComputeQueue,
    norms1: ArrayView1<'_, T>,
    norms2: ArrayView1<'_, T>,
    inner_products: ArrayView2<'_, T>,
    k: usize,
    selection: Option<ArrayViewMut2<'_, T>>,
    indices: Option<ArrayViewMut2<'_, i32>>,
) -> Result<StrategyKind> {
    let (rows, cols) = inner_products.dim();
    let mut plan = KSelect::new(queue, rows, cols, k)?;
    plan.select_sq_l2(queue, norms1, norms2, inner_products, selection, indices)?;
    Ok(plan.kind())
}
