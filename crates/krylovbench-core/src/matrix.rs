//! Compressed sparse row (CSR) matrix storage and its assembly builder.
//!
//! Matrices are staged in a [`SparseMatrixBuilder`] one entry (or one row) at a
//! time, in any order, and then finalized by [`SparseMatrixBuilder::assemble`].
//! Assembly sorts the staged entries by `(row, col)`, applies the configured
//! [`DuplicatePolicy`], and produces an immutable [`SparseMatrix`].
//!
//! # Example
//!
//! ```
//! use krylovbench_core::SparseMatrixBuilder;
//!
//! let mut builder = SparseMatrixBuilder::new(2, 2);
//! builder.add_entry(1, 1, 3.0).unwrap();
//! builder.add_entry(0, 0, 4.0).unwrap();
//! builder.add_entry(0, 1, 1.0).unwrap();
//! let matrix = builder.assemble().unwrap();
//!
//! assert_eq!(matrix.nnz(), 3);
//! assert_eq!(matrix.row_offsets(), &[0, 2, 3]);
//! ```

use nalgebra::DVector;

use crate::error::{Error, Result};

/// What assembly does when the same `(row, col)` position is staged twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Fail assembly with [`Error::DuplicateEntry`].
    #[default]
    Reject,
    /// Sum the duplicate values into a single entry.
    Sum,
}

/// Staging area for a [`SparseMatrix`].
///
/// Entries may be added in any order. Exact zeros are dropped on entry so the
/// assembled `nnz` only counts stored non-zeros.
#[derive(Debug, Clone)]
pub struct SparseMatrixBuilder {
    rows: usize,
    cols: usize,
    entries: Vec<(usize, usize, f64)>,
    policy: DuplicatePolicy,
    dropped_zeros: usize,
}

impl SparseMatrixBuilder {
    /// Create a builder for a `rows x cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::with_capacity(rows, cols, 0)
    }

    /// Create a builder with room for `nnz_hint` entries.
    pub fn with_capacity(rows: usize, cols: usize, nnz_hint: usize) -> Self {
        Self {
            rows,
            cols,
            entries: Vec::with_capacity(nnz_hint),
            policy: DuplicatePolicy::default(),
            dropped_zeros: 0,
        }
    }

    /// Set the duplicate-entry policy used at assembly.
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stage a single entry.
    pub fn add_entry(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        if !value.is_finite() {
            return Err(Error::NonFiniteValue { row, col });
        }
        if value == 0.0 {
            self.dropped_zeros += 1;
            return Ok(());
        }
        self.entries.push((row, col, value));
        Ok(())
    }

    /// Stage a whole row given parallel column-index and value slices.
    pub fn add_row(&mut self, row: usize, cols: &[usize], values: &[f64]) -> Result<()> {
        if cols.len() != values.len() {
            return Err(Error::DimensionMismatch {
                expected: cols.len(),
                actual: values.len(),
            });
        }
        for (&col, &value) in cols.iter().zip(values) {
            self.add_entry(row, col, value)?;
        }
        Ok(())
    }

    /// Stage every `(row, col, value)` triplet from an iterator.
    pub fn extend_triplets<I>(&mut self, triplets: I) -> Result<()>
    where
        I: IntoIterator<Item = (usize, usize, f64)>,
    {
        for (row, col, value) in triplets {
            self.add_entry(row, col, value)?;
        }
        Ok(())
    }

    /// Number of entries currently staged (zeros excluded).
    pub fn staged_len(&self) -> usize {
        self.entries.len()
    }

    /// Number of zero-valued entries dropped so far.
    pub fn dropped_zeros(&self) -> usize {
        self.dropped_zeros
    }

    /// Finalize into an immutable CSR matrix.
    pub fn assemble(mut self) -> Result<SparseMatrix> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::EmptyMatrix {
                rows: self.rows,
                cols: self.cols,
            });
        }

        self.entries.sort_by_key(|&(r, c, _)| (r, c));

        let mut row_offsets = vec![0usize; self.rows + 1];
        let mut col_indices = Vec::with_capacity(self.entries.len());
        let mut values: Vec<f64> = Vec::with_capacity(self.entries.len());
        let mut last: Option<(usize, usize)> = None;

        for &(row, col, value) in &self.entries {
            if last == Some((row, col)) {
                match self.policy {
                    DuplicatePolicy::Reject => return Err(Error::DuplicateEntry { row, col }),
                    DuplicatePolicy::Sum => {
                        if let Some(v) = values.last_mut() {
                            *v += value;
                        }
                        continue;
                    }
                }
            }
            row_offsets[row + 1] += 1;
            col_indices.push(col);
            values.push(value);
            last = Some((row, col));
        }

        if self.policy == DuplicatePolicy::Sum {
            drop_cancelled(&mut row_offsets, &mut col_indices, &mut values, self.rows);
        }

        for i in 0..self.rows {
            row_offsets[i + 1] += row_offsets[i];
        }

        log::trace!(
            "assembled {}x{} matrix: nnz={}, dropped zeros={}",
            self.rows,
            self.cols,
            values.len(),
            self.dropped_zeros
        );

        Ok(SparseMatrix {
            rows: self.rows,
            cols: self.cols,
            row_offsets,
            col_indices,
            values,
        })
    }
}

/// Remove entries that summed to exactly zero. `row_offsets` still holds
/// per-row counts (not yet prefix-summed) when this runs.
fn drop_cancelled(
    row_counts: &mut [usize],
    col_indices: &mut Vec<usize>,
    values: &mut Vec<f64>,
    rows: usize,
) {
    if !values.iter().any(|&v| v == 0.0) {
        return;
    }
    let mut keep_cols = Vec::with_capacity(values.len());
    let mut keep_vals = Vec::with_capacity(values.len());
    let mut idx = 0;
    for row in 0..rows {
        let count = row_counts[row + 1];
        let mut kept = 0;
        for _ in 0..count {
            if values[idx] != 0.0 {
                keep_cols.push(col_indices[idx]);
                keep_vals.push(values[idx]);
                kept += 1;
            }
            idx += 1;
        }
        row_counts[row + 1] = kept;
    }
    *col_indices = keep_cols;
    *values = keep_vals;
}

/// Immutable sparse matrix in compressed sparse row layout.
///
/// Invariants, established by [`SparseMatrixBuilder::assemble`]:
/// - `row_offsets.len() == rows + 1`, `row_offsets[0] == 0`, non-decreasing,
///   `row_offsets[rows] == nnz`
/// - column indices are strictly increasing within each row and `< cols`
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    row_offsets: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<f64>,
}

impl SparseMatrix {
    /// Assemble from `(row, col, value)` triplets, rejecting duplicates.
    pub fn from_triplets(rows: usize, cols: usize, triplets: &[(usize, usize, f64)]) -> Result<Self> {
        let mut builder = SparseMatrixBuilder::with_capacity(rows, cols, triplets.len());
        builder.extend_triplets(triplets.iter().copied())?;
        builder.assemble()
    }

    /// The `n x n` identity matrix.
    pub fn identity(n: usize) -> Result<Self> {
        Self::from_diagonal(&vec![1.0; n])
    }

    /// Square matrix with `diag` on the diagonal.
    pub fn from_diagonal(diag: &[f64]) -> Result<Self> {
        let n = diag.len();
        let mut builder = SparseMatrixBuilder::with_capacity(n, n, n);
        for (i, &d) in diag.iter().enumerate() {
            builder.add_entry(i, i, d)?;
        }
        builder.assemble()
    }

    /// Number of rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of stored non-zeros.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Stored `(col, value)` pairs of one row, in column order.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.row_offsets[row];
        let end = self.row_offsets[row + 1];
        self.col_indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Value at `(row, col)`; `Some(0.0)` for an unstored position, `None` if out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let start = self.row_offsets[row];
        let end = self.row_offsets[row + 1];
        match self.col_indices[start..end].binary_search(&col) {
            Ok(pos) => Some(self.values[start + pos]),
            Err(_) => Some(0.0),
        }
    }

    /// All stored entries as `(row, col, value)`, sorted by row then column.
    pub fn triplets(&self) -> Vec<(usize, usize, f64)> {
        let mut out = Vec::with_capacity(self.nnz());
        for row in 0..self.rows {
            out.extend(self.row(row).map(|(col, value)| (row, col, value)));
        }
        out
    }

    /// Main diagonal (length `min(rows, cols)`), zero where unstored.
    pub fn diagonal(&self) -> Vec<f64> {
        (0..self.rows.min(self.cols))
            .map(|i| self.get(i, i).unwrap_or(0.0))
            .collect()
    }

    /// Sparse matrix-vector product `y = A * x`.
    pub fn spmv(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.cols);
        assert_eq!(y.len(), self.rows);

        for (i, yi) in y.iter_mut().enumerate() {
            let start = self.row_offsets[i];
            let end = self.row_offsets[i + 1];
            let mut sum = 0.0;
            for idx in start..end {
                sum += self.values[idx] * x[self.col_indices[idx]];
            }
            *yi = sum;
        }
    }

    /// `A * x` as a new vector.
    pub fn mul_vector(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.rows);
        self.spmv(x.as_slice(), y.as_mut_slice());
        y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_reorders_unsorted_entries() {
        let mut builder = SparseMatrixBuilder::new(3, 3);
        builder.add_entry(2, 0, 7.0).unwrap();
        builder.add_entry(0, 2, 3.0).unwrap();
        builder.add_entry(1, 1, 5.0).unwrap();
        builder.add_entry(0, 0, 1.0).unwrap();
        let m = builder.assemble().unwrap();

        assert_eq!(m.row_offsets(), &[0, 2, 3, 4]);
        assert_eq!(m.col_indices(), &[0, 2, 1, 0]);
        assert_eq!(m.values(), &[1.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn triplets_round_trip() {
        let triplets = vec![
            (0, 0, 2.0),
            (0, 1, -1.0),
            (1, 0, -1.0),
            (1, 1, 2.0),
            (1, 2, -1.0),
            (2, 1, -1.0),
            (2, 2, 2.0),
        ];
        let m = SparseMatrix::from_triplets(3, 3, &triplets).unwrap();
        assert_eq!(m.triplets(), triplets);
        assert_eq!(m.nnz(), 7);
    }

    #[test]
    fn duplicate_rejected_by_default() {
        let err = SparseMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 1.0), (0, 0, 2.0)])
            .unwrap_err();
        assert_eq!(err, Error::DuplicateEntry { row: 0, col: 0 });
    }

    #[test]
    fn duplicate_summed_when_requested() {
        let mut builder =
            SparseMatrixBuilder::new(2, 2).with_duplicate_policy(DuplicatePolicy::Sum);
        builder.add_entry(0, 0, 1.0).unwrap();
        builder.add_entry(0, 0, 2.5).unwrap();
        builder.add_entry(1, 1, 4.0).unwrap();
        let m = builder.assemble().unwrap();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 0), Some(3.5));
    }

    #[test]
    fn summed_to_zero_is_dropped() {
        let mut builder =
            SparseMatrixBuilder::new(2, 2).with_duplicate_policy(DuplicatePolicy::Sum);
        builder.add_entry(0, 1, 1.0).unwrap();
        builder.add_entry(0, 1, -1.0).unwrap();
        builder.add_entry(0, 0, 2.0).unwrap();
        builder.add_entry(1, 1, 2.0).unwrap();
        let m = builder.assemble().unwrap();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.row_offsets(), &[0, 1, 2]);
        assert_eq!(m.get(0, 1), Some(0.0));
    }

    #[test]
    fn zeros_are_dropped() {
        let mut builder = SparseMatrixBuilder::new(2, 2);
        builder.add_row(0, &[0, 1], &[3.0, 0.0]).unwrap();
        builder.add_row(1, &[0, 1], &[0.0, 4.0]).unwrap();
        assert_eq!(builder.dropped_zeros(), 2);
        let m = builder.assemble().unwrap();
        assert_eq!(m.nnz(), 2);
    }

    #[test]
    fn out_of_bounds_entry_rejected() {
        let mut builder = SparseMatrixBuilder::new(2, 3);
        let err = builder.add_entry(2, 0, 1.0).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfBounds { row: 2, .. }));
        let err = builder.add_entry(0, 3, 1.0).unwrap_err();
        assert!(matches!(err, Error::IndexOutOfBounds { col: 3, .. }));
    }

    #[test]
    fn non_finite_entry_rejected() {
        let mut builder = SparseMatrixBuilder::new(2, 2);
        assert_eq!(
            builder.add_entry(1, 0, f64::NAN),
            Err(Error::NonFiniteValue { row: 1, col: 0 })
        );
    }

    #[test]
    fn empty_shape_fails_assembly() {
        assert_eq!(
            SparseMatrixBuilder::new(0, 4).assemble().unwrap_err(),
            Error::EmptyMatrix { rows: 0, cols: 4 }
        );
        assert!(SparseMatrix::identity(0).is_err());
    }

    #[test]
    fn add_row_length_mismatch() {
        let mut builder = SparseMatrixBuilder::new(2, 2);
        let err = builder.add_row(0, &[0, 1], &[1.0]).unwrap_err();
        assert_eq!(err, Error::DimensionMismatch { expected: 2, actual: 1 });
    }

    #[test]
    fn empty_rows_keep_offsets_consistent() {
        let m = SparseMatrix::from_triplets(4, 4, &[(0, 0, 1.0), (3, 3, 1.0)]).unwrap();
        assert_eq!(m.row_offsets(), &[0, 1, 1, 1, 2]);
        assert_eq!(m.row(1).count(), 0);
    }

    #[test]
    fn spmv_tridiagonal() {
        // [ 2 -1  0]
        // [-1  2 -1]
        // [ 0 -1  2]
        let m = SparseMatrix::from_triplets(
            3,
            3,
            &[
                (0, 0, 2.0),
                (0, 1, -1.0),
                (1, 0, -1.0),
                (1, 1, 2.0),
                (1, 2, -1.0),
                (2, 1, -1.0),
                (2, 2, 2.0),
            ],
        )
        .unwrap();

        let x = vec![1.0, 2.0, 3.0];
        let mut y = vec![0.0; 3];
        m.spmv(&x, &mut y);

        assert!((y[0] - 0.0).abs() < 1e-15);
        assert!((y[1] - 0.0).abs() < 1e-15);
        assert!((y[2] - 4.0).abs() < 1e-15);
    }

    #[test]
    fn spmv_rectangular() {
        let m = SparseMatrix::from_triplets(2, 3, &[(0, 2, 1.0), (1, 0, 2.0), (1, 1, 3.0)])
            .unwrap();
        let y = m.mul_vector(&DVector::from_vec(vec![1.0, 1.0, 5.0]));
        assert_eq!(y.as_slice(), &[5.0, 5.0]);
    }

    #[test]
    fn get_and_diagonal() {
        let m = SparseMatrix::from_triplets(3, 3, &[(0, 0, 4.0), (1, 2, 1.0), (2, 2, 3.0)])
            .unwrap();
        assert_eq!(m.get(1, 2), Some(1.0));
        assert_eq!(m.get(1, 1), Some(0.0));
        assert_eq!(m.get(3, 0), None);
        assert_eq!(m.diagonal(), vec![4.0, 0.0, 3.0]);
    }

    #[test]
    fn identity_matrix() {
        let m = SparseMatrix::identity(3).unwrap();
        assert!(m.is_square());
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.triplets(), vec![(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0)]);
    }
}
