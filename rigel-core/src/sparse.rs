//! Sparse matrix operations.
//!
//! Uses CSR (Compressed Sparse Row) format for stiffness, constraint and
//! elimination operators, plus the small set of kernels the constraint pipeline
//! needs on top of `nalgebra-sparse` (row blocks, transposed products, faer
//! conversion).

use crate::error::{Error, Result};
use faer::sparse::{SparseColMat, SymbolicSparseColMat};
use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csc::CscMatrix;
use nalgebra_sparse::csr::CsrMatrix as NalgebraCsr;
use std::ops::Range;

/// Compressed Sparse Row matrix.
pub type CsrMatrix = NalgebraCsr<f64>;

/// Builder for assembling a sparse matrix from triplets (COO format).
///
/// Accumulates (row, col, value) triplets and converts to CSR when complete.
#[derive(Debug, Clone)]
pub struct TripletMatrix {
    n_rows: usize,
    n_cols: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f64>,
}

impl TripletMatrix {
    /// Create a new triplet matrix builder.
    pub fn new(n_rows: usize, n_cols: usize) -> Self {
        Self::with_capacity(n_rows, n_cols, 0)
    }

    /// Create with estimated capacity.
    pub fn with_capacity(n_rows: usize, n_cols: usize, nnz_estimate: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            rows: Vec::with_capacity(nnz_estimate),
            cols: Vec::with_capacity(nnz_estimate),
            values: Vec::with_capacity(nnz_estimate),
        }
    }

    /// Add a coefficient at (row, col), dropping round-off sized values.
    /// Duplicates are summed by [`to_csr`](Self::to_csr).
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.n_rows && col < self.n_cols, "triplet ({}, {}) out of bounds", row, col);
        if value.abs() > f64::EPSILON {
            self.rows.push(row);
            self.cols.push(col);
            self.values.push(value);
        }
    }

    /// Add a value without dropping tiny magnitudes.
    ///
    /// Used for right-hand side columns, where a small settlement is still data.
    pub fn add_exact(&mut self, row: usize, col: usize, value: f64) {
        if value != 0.0 {
            self.rows.push(row);
            self.cols.push(col);
            self.values.push(value);
        }
    }

    /// Scatter an element matrix onto its global DOFs.
    pub fn add_submatrix(&mut self, dofs: &[usize], element: &nalgebra::DMatrix<f64>) {
        debug_assert_eq!(element.shape(), (dofs.len(), dofs.len()));
        for (i, &row) in dofs.iter().enumerate() {
            for (j, &col) in dofs.iter().enumerate() {
                self.add(row, col, element[(i, j)]);
            }
        }
    }

    /// Convert to CSR format, summing duplicate entries.
    pub fn to_csr(self) -> Result<CsrMatrix> {
        let (n_rows, n_cols) = (self.n_rows, self.n_cols);
        let coo = CooMatrix::try_from_triplets(n_rows, n_cols, self.rows, self.cols, self.values)
            .map_err(|e| {
                Error::DimensionMismatch(format!(
                    "invalid triplets for a {}x{} matrix: {}",
                    n_rows, n_cols, e
                ))
            })?;

        // Duplicates are summed by the conversion
        Ok(CsrMatrix::from(&coo))
    }
}

/// Global load vector accumulated from nodal and element contributions.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadVector {
    values: Vec<f64>,
}

impl LoadVector {
    pub fn zeros(n_dofs: usize) -> Self {
        Self {
            values: vec![0.0; n_dofs],
        }
    }

    /// Add `values[k]` to DOF `dofs[k]`.
    pub fn scatter_add(&mut self, dofs: &[usize], values: &[f64]) {
        debug_assert_eq!(dofs.len(), values.len());
        for (&dof, &v) in dofs.iter().zip(values) {
            self.values[dof] += v;
        }
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.values
    }
}

/// y = A x
pub fn mul_vec(a: &CsrMatrix, x: &[f64]) -> Result<Vec<f64>> {
    if x.len() != a.ncols() {
        return Err(Error::DimensionMismatch(format!(
            "cannot multiply {}x{} matrix by vector of length {}",
            a.nrows(),
            a.ncols(),
            x.len()
        )));
    }
    let mut y = vec![0.0; a.nrows()];
    for (i, row) in a.row_iter().enumerate() {
        y[i] = row
            .col_indices()
            .iter()
            .zip(row.values())
            .map(|(&j, &v)| v * x[j])
            .sum();
    }
    Ok(y)
}

/// y = Aᵗ x, without forming the transpose.
pub fn transpose_mul_vec(a: &CsrMatrix, x: &[f64]) -> Result<Vec<f64>> {
    if x.len() != a.nrows() {
        return Err(Error::DimensionMismatch(format!(
            "cannot multiply transpose of {}x{} matrix by vector of length {}",
            a.nrows(),
            a.ncols(),
            x.len()
        )));
    }
    let mut y = vec![0.0; a.ncols()];
    for (i, row) in a.row_iter().enumerate() {
        let xi = x[i];
        if xi == 0.0 {
            continue;
        }
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            y[j] += v * xi;
        }
    }
    Ok(y)
}

/// Largest absolute stored value, 0 for an empty matrix.
pub fn max_abs(a: &CsrMatrix) -> f64 {
    a.values().iter().fold(0.0, |m, v| m.max(v.abs()))
}

/// Copy of the rows in `range`.
pub fn row_block(a: &CsrMatrix, range: Range<usize>) -> Result<CsrMatrix> {
    if range.end > a.nrows() || range.start > range.end {
        return Err(Error::DimensionMismatch(format!(
            "row range {:?} outside matrix with {} rows",
            range,
            a.nrows()
        )));
    }
    let mut triplets = TripletMatrix::new(range.len(), a.ncols());
    for (local, i) in range.enumerate() {
        let row = a.row(i);
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            triplets.add_exact(local, j, v);
        }
    }
    triplets.to_csr()
}

/// Copy of the first `ncols` columns.
pub fn leading_columns(a: &CsrMatrix, ncols: usize) -> Result<CsrMatrix> {
    if ncols > a.ncols() {
        return Err(Error::DimensionMismatch(format!(
            "cannot take {} columns of a matrix with {}",
            ncols,
            a.ncols()
        )));
    }
    let mut triplets = TripletMatrix::new(a.nrows(), ncols);
    for (i, j, &v) in a.triplet_iter() {
        if j < ncols {
            triplets.add_exact(i, j, v);
        }
    }
    triplets.to_csr()
}

/// Hand a CSR operator to faer as a column-major matrix.
///
/// nalgebra-sparse does the transposition of the storage, which keeps row
/// indices sorted within each column, so faer's invariants hold for any
/// shape.
pub fn csr_to_faer_csc(csr: &CsrMatrix) -> SparseColMat<usize, f64> {
    let (nrows, ncols) = (csr.nrows(), csr.ncols());
    let (col_ptr, row_idx, values) = CscMatrix::from(csr).disassemble();

    // SAFETY: a valid CscMatrix has monotone offsets and sorted in-bounds rows
    unsafe {
        SparseColMat::new(
            SymbolicSparseColMat::new_unchecked(nrows, ncols, col_ptr, None, row_idx),
            values,
        )
    }
}
