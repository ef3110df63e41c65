//! Sparse Gauss-Jordan elimination to reduced row-echelon form.
//!
//! Rows are kept as sorted `(column, value)` lists. Columns are processed from
//! left to right; at each step the pivot is the remaining row with the largest
//! magnitude in the current column (partial pivoting), normalized to one and
//! eliminated from every other row. The result has an explicit pivot column
//! per row, and each pivot column is nonzero in its own row only.

use crate::error::{Error, Result};
use crate::sparse::{CsrMatrix, TripletMatrix};
use log::warn;

/// One equation `Σ a_j x_j = rhs` with entries sorted by column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseRow {
    pub entries: Vec<(usize, f64)>,
    pub rhs: f64,
}

impl SparseRow {
    pub fn new(mut entries: Vec<(usize, f64)>, rhs: f64) -> Self {
        entries.sort_unstable_by_key(|&(c, _)| c);
        // Merge duplicate columns
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
        for (c, v) in entries {
            match merged.last_mut() {
                Some((last, acc)) if *last == c => *acc += v,
                _ => merged.push((c, v)),
            }
        }
        Self { entries: merged, rhs }
    }

    /// Coefficient of column `col`.
    pub fn get(&self, col: usize) -> f64 {
        self.entries
            .binary_search_by_key(&col, |&(c, _)| c)
            .map(|k| self.entries[k].1)
            .unwrap_or(0.0)
    }

    /// First column with a coefficient above `tol`.
    pub fn leading(&self, tol: f64) -> Option<usize> {
        self.entries
            .iter()
            .find(|(_, v)| v.abs() > tol)
            .map(|&(c, _)| c)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn scale(&mut self, factor: f64) {
        for (_, v) in &mut self.entries {
            *v *= factor;
        }
        self.rhs *= factor;
    }

    /// self -= factor * other, dropping entries at or below `tol`.
    fn subtract_scaled(&mut self, factor: f64, other: &SparseRow, tol: f64) {
        let mut out = Vec::with_capacity(self.entries.len() + other.entries.len());
        let (mut i, mut j) = (0, 0);
        let (a, b) = (&self.entries, &other.entries);
        while i < a.len() || j < b.len() {
            let (col, v) = match (a.get(i), b.get(j)) {
                (Some(&(ca, va)), Some(&(cb, vb))) if ca == cb => {
                    i += 1;
                    j += 1;
                    (ca, va - factor * vb)
                }
                (Some(&(ca, va)), Some(&(cb, _))) if ca < cb => {
                    i += 1;
                    (ca, va)
                }
                (Some(&(ca, va)), None) => {
                    i += 1;
                    (ca, va)
                }
                (_, Some(&(cb, vb))) => {
                    j += 1;
                    (cb, -factor * vb)
                }
                (None, None) => break,
            };
            if v.abs() > tol {
                out.push((col, v));
            }
        }
        self.entries = out;
        self.rhs -= factor * other.rhs;
    }
}

/// Reduced row-echelon form of an equation system.
#[derive(Debug, Clone)]
pub struct Rref {
    /// Nonzero rows in ascending pivot order; each pivot coefficient is one.
    pub rows: Vec<SparseRow>,
    /// Pivot column of each row.
    pub pivots: Vec<usize>,
    pub n_cols: usize,
    /// Number of rows that reduced to `0 = 0`.
    pub redundant: usize,
}

impl Rref {
    /// Number of stored entries per column.
    pub fn column_nonzeros(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_cols];
        for row in &self.rows {
            for &(c, _) in &row.entries {
                counts[c] += 1;
            }
        }
        counts
    }

    /// Coefficient matrix without the right-hand side.
    pub fn to_csr(&self) -> Result<CsrMatrix> {
        let nnz = self.rows.iter().map(|r| r.entries.len()).sum();
        let mut triplets = TripletMatrix::with_capacity(self.rows.len(), self.n_cols, nnz);
        for (i, row) in self.rows.iter().enumerate() {
            for &(c, v) in &row.entries {
                triplets.add_exact(i, c, v);
            }
        }
        triplets.to_csr()
    }

    pub fn rhs(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.rhs).collect()
    }
}

/// Split an `E × (n + 1)` system with the right-hand side in its last column
/// into sparse rows over `n` columns.
pub fn rows_of(system: &CsrMatrix) -> Result<Vec<SparseRow>> {
    let n = system.ncols().checked_sub(1).ok_or_else(|| {
        Error::DimensionMismatch("equation system has no right-hand side column".into())
    })?;
    Ok(system
        .row_iter()
        .map(|row| {
            let mut rhs = 0.0;
            let mut entries = Vec::with_capacity(row.nnz());
            for (&c, &v) in row.col_indices().iter().zip(row.values()) {
                if c == n {
                    rhs = v;
                } else {
                    entries.push((c, v));
                }
            }
            SparseRow::new(entries, rhs)
        })
        .collect())
}

/// Row-reduce `rows` over `n_cols` columns.
///
/// Coefficients at or below `tol` count as zero. A row reducing to `0 = c`
/// with `|c| > tol` makes the system inconsistent and is an error; rows
/// reducing to `0 = 0` are dropped and counted as redundant.
pub fn row_reduce(mut rows: Vec<SparseRow>, n_cols: usize, tol: f64) -> Result<Rref> {
    for row in &mut rows {
        if let Some(&(c, _)) = row.entries.iter().find(|(c, _)| *c >= n_cols) {
            return Err(Error::DimensionMismatch(format!(
                "equation references column {} of {}",
                c, n_cols
            )));
        }
        row.entries.retain(|(_, v)| v.abs() > tol);
    }

    let mut remaining: Vec<usize> = (0..rows.len()).collect();
    let mut order: Vec<(usize, usize)> = Vec::new();

    loop {
        // Remaining rows have nothing left of the previous pivot column
        let Some(col) = remaining.iter().filter_map(|&r| rows[r].leading(tol)).min() else {
            break;
        };

        let (slot, &pivot_row) = remaining
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                rows[**a].get(col).abs().total_cmp(&rows[**b].get(col).abs())
            })
            .ok_or_else(|| Error::NumericFailure("no pivot row left".into()))?;
        remaining.swap_remove(slot);

        let pivot = rows[pivot_row].get(col);
        rows[pivot_row].scale(1.0 / pivot);
        let pivot_entries = rows[pivot_row].clone();

        for (r, row) in rows.iter_mut().enumerate() {
            if r == pivot_row {
                continue;
            }
            let factor = row.get(col);
            if factor != 0.0 {
                row.subtract_scaled(factor, &pivot_entries, tol);
            }
        }
        // Exact zero at the pivot column in every other row
        for (r, row) in rows.iter_mut().enumerate() {
            if r != pivot_row {
                row.entries.retain(|&(c, _)| c != col);
            }
        }
        order.push((pivot_row, col));
    }

    let mut redundant = 0;
    for &r in &remaining {
        let row = &rows[r];
        if row.rhs.abs() > tol {
            return Err(Error::ModelInconsistency(format!(
                "constraint equations are inconsistent: a row reduces to 0 = {}",
                row.rhs
            )));
        }
        redundant += 1;
    }
    if redundant > 0 {
        warn!("{} redundant constraint equation(s) dropped", redundant);
    }

    let pivots = order.iter().map(|&(_, c)| c).collect();
    let reduced = order.iter().map(|&(r, _)| rows[r].clone()).collect();
    Ok(Rref {
        rows: reduced,
        pivots,
        n_cols,
        redundant,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const TOL: f64 = 1e-12;

    #[test]
    fn test_row_merges_duplicates() {
        let row = SparseRow::new(vec![(3, 1.0), (1, 2.0), (3, 0.5)], 0.0);
        assert_eq!(row.entries, vec![(1, 2.0), (3, 1.5)]);
        assert_eq!(row.get(2), 0.0);
    }

    #[test]
    fn test_small_system() {
        // x0 + x1 = 3, 2 x0 + x2 = 4
        let rows = vec![
            SparseRow::new(vec![(0, 1.0), (1, 1.0)], 3.0),
            SparseRow::new(vec![(0, 2.0), (2, 1.0)], 4.0),
        ];
        let rref = row_reduce(rows, 3, TOL).unwrap();
        assert_eq!(rref.pivots, vec![0, 1]);
        // x0 + 0.5 x2 = 2, x1 - 0.5 x2 = 1
        assert_relative_eq!(rref.rows[0].get(2), 0.5);
        assert_relative_eq!(rref.rows[0].rhs, 2.0);
        assert_relative_eq!(rref.rows[1].get(2), -0.5);
        assert_relative_eq!(rref.rows[1].rhs, 1.0);
        assert_eq!(rref.column_nonzeros(), vec![1, 1, 2]);
    }

    #[test]
    fn test_redundant_and_inconsistent_rows() {
        let rows = vec![
            SparseRow::new(vec![(0, 1.0), (1, -1.0)], 0.0),
            SparseRow::new(vec![(0, 2.0), (1, -2.0)], 0.0),
        ];
        let rref = row_reduce(rows, 2, TOL).unwrap();
        assert_eq!(rref.rows.len(), 1);
        assert_eq!(rref.redundant, 1);

        let rows = vec![
            SparseRow::new(vec![(0, 1.0)], 1.0),
            SparseRow::new(vec![(0, 1.0)], 2.0),
        ];
        assert!(matches!(
            row_reduce(rows, 1, TOL),
            Err(Error::ModelInconsistency(_))
        ));
    }

    #[test]
    fn test_pivot_columns_are_unit_vectors() {
        let mut rng = StdRng::seed_from_u64(7);
        let (m, n) = (5, 9);
        let rows: Vec<SparseRow> = (0..m)
            .map(|i| {
                let mut entries: Vec<(usize, f64)> = (0..n)
                    .filter_map(|c| {
                        if rng.gen_bool(0.4) {
                            Some((c, rng.gen_range(-2.0..2.0)))
                        } else {
                            None
                        }
                    })
                    .collect();
                entries.push((2 * i, 4.0));
                SparseRow::new(entries, rng.gen_range(-1.0..1.0))
            })
            .collect();
        let original = rows.clone();
        let rref = row_reduce(rows, n, TOL).unwrap();

        let counts = rref.column_nonzeros();
        for (row, &p) in rref.rows.iter().zip(&rref.pivots) {
            assert_eq!(counts[p], 1);
            assert_relative_eq!(row.get(p), 1.0, epsilon = 1e-12);
        }
        assert!(rref.pivots.windows(2).all(|w| w[0] < w[1]));

        // Any solution of the reduced system solves the original one
        let mut x = DVector::zeros(n);
        for (row, &p) in rref.rows.iter().zip(&rref.pivots) {
            x[p] = row.rhs;
        }
        for row in &original {
            let lhs: f64 = row.entries.iter().map(|&(c, v)| v * x[c]).sum();
            assert_relative_eq!(lhs, row.rhs, epsilon = 1e-9);
        }

        let dense = DMatrix::from(&rref.to_csr().unwrap());
        assert_eq!(dense.shape(), (rref.rows.len(), n));
    }

    #[test]
    fn test_rows_of_system() {
        let mut t = TripletMatrix::new(1, 4);
        t.add(0, 1, 2.0);
        t.add(0, 3, 5.0);
        let rows = rows_of(&t.to_csr().unwrap()).unwrap();
        assert_eq!(rows[0].entries, vec![(1, 2.0)]);
        assert_relative_eq!(rows[0].rhs, 5.0);
    }
}
