//! Error types for matrix assembly and system construction.

use thiserror::Error;

/// Errors raised while assembling a matrix or building a linear system.
///
/// All of these are construction errors: they are returned synchronously by the
/// call that violates an invariant and never occur once an object exists.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Vector length does not match the matrix dimension it is paired with.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Matrix has zero rows or zero columns.
    #[error("empty matrix: {rows}x{cols}")]
    EmptyMatrix { rows: usize, cols: usize },

    /// Entry lies outside the declared matrix shape.
    #[error("entry ({row}, {col}) out of bounds for {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// The same (row, col) position was supplied more than once.
    #[error("duplicate entry at ({row}, {col})")]
    DuplicateEntry { row: usize, col: usize },

    /// Entry value is NaN or infinite.
    #[error("non-finite value at ({row}, {col})")]
    NonFiniteValue { row: usize, col: usize },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
