//! Core data types for krylovbench.
//!
//! This crate holds the pieces every solver run shares:
//!
//! - [`SparseMatrix`] - immutable compressed sparse row (CSR) storage
//! - [`SparseMatrixBuilder`] - staging area that validates and assembles a [`SparseMatrix`]
//! - [`LinearSystem`] - a matrix paired with a right-hand side of matching length
//!
//! Both [`SparseMatrix`] and [`LinearSystem`] expose no mutation once built, so a
//! single instance can be shared by reference across every solver variant in a
//! benchmark.

pub mod error;
pub mod matrix;
pub mod system;

pub use error::{Error, Result};
pub use matrix::{DuplicatePolicy, SparseMatrix, SparseMatrixBuilder};
pub use system::LinearSystem;

// Re-export so downstream crates agree on the vector type.
pub use nalgebra::DVector;
