// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Row-major views over caller storage and the row sources read by the
//! selection strategies.

use ndarray::{ArrayView1, ArrayView2, ArrayViewMut2, ShapeBuilder};

use crate::dtype::SelectFloat;
use crate::error::{shape as shape_err, Result};

fn check_padded(len: usize, rows: usize, cols: usize, ld: usize) -> Result<()> {
    if ld < cols {
        return Err(shape_err(&format!(
            "leading stride {ld} is smaller than column count {cols}"
        )));
    }
    let required = if rows == 0 || cols == 0 {
        0
    } else {
        (rows - 1) * ld + cols
    };
    if len < required {
        return Err(shape_err(&format!(
            "backing storage holds {len} elements, {rows}x{cols} with stride {ld} needs {required}"
        )));
    }
    Ok(())
}

/// Views `rows x cols` elements of `data` whose rows start every `ld` elements.
pub fn row_major_view<T>(data: &[T], rows: usize, cols: usize, ld: usize) -> Result<ArrayView2<'_, T>> {
    check_padded(data.len(), rows, cols, ld)?;
    let end = if rows == 0 { 0 } else { (rows - 1) * ld + cols };
    ArrayView2::from_shape((rows, cols).strides((ld, 1)), &data[..end])
        .map_err(|e| shape_err(&format!("row-major view: {e}")))
}

/// Mutable counterpart of [`row_major_view`].
pub fn row_major_view_mut<T>(
    data: &mut [T],
    rows: usize,
    cols: usize,
    ld: usize,
) -> Result<ArrayViewMut2<'_, T>> {
    check_padded(data.len(), rows, cols, ld)?;
    let end = if rows == 0 { 0 } else { (rows - 1) * ld + cols };
    ArrayViewMut2::from_shape((rows, cols).strides((ld, 1)), &mut data[..end])
        .map_err(|e| shape_err(&format!("row-major view: {e}")))
}

/// Read access to a logical `rows x cols` score matrix.
pub trait RowSource<T: SelectFloat>: Sync {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    fn value(&self, row: usize, col: usize) -> T;
}

impl<T: SelectFloat, S: RowSource<T> + ?Sized> RowSource<T> for &S {
    #[inline]
    fn rows(&self) -> usize {
        (**self).rows()
    }

    #[inline]
    fn cols(&self) -> usize {
        (**self).cols()
    }

    #[inline]
    fn value(&self, row: usize, col: usize) -> T {
        (**self).value(row, col)
    }
}

/// Scores materialised in a dense (possibly strided) matrix.
pub struct DenseRows<'a, T> {
    data: ArrayView2<'a, T>,
}

impl<'a, T> DenseRows<'a, T> {
    pub fn new(data: ArrayView2<'a, T>) -> Self {
        Self { data }
    }
}

impl<T: SelectFloat> RowSource<T> for DenseRows<'_, T> {
    #[inline]
    fn rows(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    fn cols(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    fn value(&self, row: usize, col: usize) -> T {
        self.data[[row, col]]
    }
}

/// Squared L2 distances `norms1[row] + norms2[col] + inner_products[row, col]`
/// evaluated on demand. The inner products are expected to carry the `-2`
/// factor already.
pub struct SqL2Rows<'a, T> {
    norms1: ArrayView1<'a, T>,
    norms2: ArrayView1<'a, T>,
    inner_products: ArrayView2<'a, T>,
}

impl<'a, T> SqL2Rows<'a, T> {
    pub fn new(
        norms1: ArrayView1<'a, T>,
        norms2: ArrayView1<'a, T>,
        inner_products: ArrayView2<'a, T>,
    ) -> Result<Self> {
        let (rows, cols) = inner_products.dim();
        if norms1.len() != rows {
            return Err(shape_err(&format!(
                "norms1 length {} does not match {rows} rows",
                norms1.len()
            )));
        }
        if norms2.len() != cols {
            return Err(shape_err(&format!(
                "norms2 length {} does not match {cols} columns",
                norms2.len()
            )));
        }
        Ok(Self {
            norms1,
            norms2,
            inner_products,
        })
    }
}

impl<T: SelectFloat> RowSource<T> for SqL2Rows<'_, T> {
    #[inline]
    fn rows(&self) -> usize {
        self.inner_products.nrows()
    }

    #[inline]
    fn cols(&self) -> usize {
        self.inner_products.ncols()
    }

    #[inline]
    fn value(&self, row: usize, col: usize) -> T {
        self.norms1[row] + self.norms2[col] + self.inner_products[[row, col]]
    }
}

/// Negates another source; selecting its smallest values selects the
/// largest values of the wrapped scores.
pub struct Negated<S>(pub S);

impl<T: SelectFloat, S: RowSource<T>> RowSource<T> for Negated<S> {
    #[inline]
    fn rows(&self) -> usize {
        self.0.rows()
    }

    #[inline]
    fn cols(&self) -> usize {
        self.0.cols()
    }

    #[inline]
    fn value(&self, row: usize, col: usize) -> T {
        -self.0.value(row, col)
    }
}
