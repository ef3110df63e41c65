//! Hollow permutation operators.
//!
//! A hollow permutation is a 0/1 matrix with at most one unit entry per row and
//! per column. It is stored as a row map `map[row] = Some(col)`; rows without an
//! entry are "hollow". Such operators select, scatter and reorder DOFs without
//! ever building a dense matrix:
//!
//! - `P x` gathers: `y[i] = x[map[i]]`
//! - `Pᵗ y` scatters: `z[map[i]] += y[i]`
//! - `Pᵗ A Q` moves entry `(r, c)` of `A` to `(map_p[r], map_q[c])`
//!
//! Every operation is O(nnz) of its operands.

use crate::error::{Error, Result};
use crate::sparse::{CsrMatrix, TripletMatrix};

/// Sparse 0/1 operator with at most one entry per row and column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HollowPermutation {
    map: Vec<Option<usize>>,
    ncols: usize,
}

impl HollowPermutation {
    /// Build from a row map. Fails if an entry is out of range or a column is
    /// hit twice.
    pub fn new(map: Vec<Option<usize>>, ncols: usize) -> Result<Self> {
        let mut seen = vec![false; ncols];
        for (row, col) in map.iter().enumerate() {
            if let Some(col) = *col {
                if col >= ncols {
                    return Err(Error::DimensionMismatch(format!(
                        "row {} maps to column {} of a permutation with {} columns",
                        row, col, ncols
                    )));
                }
                if seen[col] {
                    return Err(Error::InvalidPermutation(format!(
                        "column {} is used by more than one row",
                        col
                    )));
                }
                seen[col] = true;
            }
        }
        Ok(Self { map, ncols })
    }

    /// Square identity operator.
    pub fn identity(n: usize) -> Self {
        Self {
            map: (0..n).map(Some).collect(),
            ncols: n,
        }
    }

    /// `n × indices.len()` scatter operator: `map[indices[k]] = k`.
    ///
    /// `S x` places the k-th entry of `x` at position `indices[k]`; `Sᵗ y`
    /// gathers the entries of `y` listed in `indices`.
    pub fn selection(n: usize, indices: &[usize]) -> Result<Self> {
        let mut map = vec![None; n];
        for (k, &i) in indices.iter().enumerate() {
            if i >= n {
                return Err(Error::DimensionMismatch(format!(
                    "selected index {} outside range of {}",
                    i, n
                )));
            }
            if map[i].is_some() {
                return Err(Error::InvalidPermutation(format!(
                    "index {} selected twice",
                    i
                )));
            }
            map[i] = Some(k);
        }
        Ok(Self {
            map,
            ncols: indices.len(),
        })
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of unit entries.
    pub fn nnz(&self) -> usize {
        self.map.iter().filter(|c| c.is_some()).count()
    }

    /// Column of the unit entry in `row`, if any.
    #[inline]
    pub fn get(&self, row: usize) -> Option<usize> {
        self.map.get(row).copied().flatten()
    }

    /// `(row, col)` pairs of the unit entries.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.map
            .iter()
            .enumerate()
            .filter_map(|(row, col)| col.map(|c| (row, c)))
    }

    /// y = P x
    pub fn apply(&self, x: &[f64]) -> Result<Vec<f64>> {
        let mut y = vec![0.0; self.nrows()];
        self.apply_add(x, &mut y)?;
        Ok(y)
    }

    /// y += P x
    pub fn apply_add(&self, x: &[f64], y: &mut [f64]) -> Result<()> {
        self.check_len("apply", x.len(), self.ncols)?;
        self.check_len("apply output", y.len(), self.nrows())?;
        for (row, col) in self.entries() {
            y[row] += x[col];
        }
        Ok(())
    }

    /// z = Pᵗ y
    pub fn transpose_apply(&self, y: &[f64]) -> Result<Vec<f64>> {
        self.check_len("transpose apply", y.len(), self.nrows())?;
        let mut z = vec![0.0; self.ncols];
        for (row, col) in self.entries() {
            z[col] += y[row];
        }
        Ok(z)
    }

    /// Pᵗ as a hollow permutation.
    pub fn transpose(&self) -> Self {
        let mut map = vec![None; self.ncols];
        for (row, col) in self.entries() {
            map[col] = Some(row);
        }
        Self {
            map,
            ncols: self.nrows(),
        }
    }

    /// Matrix product `self · other`.
    pub fn compose(&self, other: &HollowPermutation) -> Result<Self> {
        if self.ncols != other.nrows() {
            return Err(Error::DimensionMismatch(format!(
                "cannot compose {}x{} with {}x{} permutation",
                self.nrows(),
                self.ncols,
                other.nrows(),
                other.ncols
            )));
        }
        let map = self
            .map
            .iter()
            .map(|col| col.and_then(|c| other.map[c]))
            .collect();
        Ok(Self {
            map,
            ncols: other.ncols,
        })
    }

    /// Pᵗ A: row `r` of `A` becomes row `map[r]`; hollow rows are dropped.
    pub fn transpose_mul(&self, a: &CsrMatrix) -> Result<CsrMatrix> {
        Self::sandwich(self, a, &Self::identity(a.ncols()))
    }

    /// A P: column `c` of `A` becomes column `map[c]`; hollow columns are dropped.
    pub fn mul(&self, a: &CsrMatrix) -> Result<CsrMatrix> {
        Self::sandwich(&Self::identity(a.nrows()), a, self)
    }

    /// Pᵗ A P
    pub fn congruence(&self, a: &CsrMatrix) -> Result<CsrMatrix> {
        Self::sandwich(self, a, self)
    }

    /// Pᵗ A Q: entry `(r, c)` of `A` moves to `(p[r], q[c])`.
    pub fn sandwich(p: &HollowPermutation, a: &CsrMatrix, q: &HollowPermutation) -> Result<CsrMatrix> {
        if p.nrows() != a.nrows() || q.nrows() != a.ncols() {
            return Err(Error::DimensionMismatch(format!(
                "cannot form Pᵗ A Q with P {}x{}, A {}x{}, Q {}x{}",
                p.nrows(),
                p.ncols(),
                a.nrows(),
                a.ncols(),
                q.nrows(),
                q.ncols()
            )));
        }
        let mut triplets = TripletMatrix::with_capacity(p.ncols(), q.ncols(), a.nnz());
        for (r, c, &v) in a.triplet_iter() {
            if let (Some(pr), Some(qc)) = (p.map[r], q.map[c]) {
                triplets.add_exact(pr, qc, v);
            }
        }
        triplets.to_csr()
    }

    /// Explicit sparse matrix with unit entries.
    pub fn to_sparse(&self) -> Result<CsrMatrix> {
        let mut triplets = TripletMatrix::with_capacity(self.nrows(), self.ncols, self.nrows());
        for (row, col) in self.entries() {
            triplets.add(row, col, 1.0);
        }
        triplets.to_csr()
    }

    /// Recover the operator from a sparse matrix.
    ///
    /// Explicit zeros are ignored; any other value than 1, or two entries in a
    /// row or column, is rejected.
    pub fn from_sparse(a: &CsrMatrix) -> Result<Self> {
        let mut map = vec![None; a.nrows()];
        for (r, c, &v) in a.triplet_iter() {
            if v == 0.0 {
                continue;
            }
            if v != 1.0 {
                return Err(Error::InvalidPermutation(format!(
                    "entry ({}, {}) is {}, expected 0 or 1",
                    r, c, v
                )));
            }
            if map[r].is_some() {
                return Err(Error::InvalidPermutation(format!(
                    "row {} has more than one entry",
                    r
                )));
            }
            map[r] = Some(c);
        }
        Self::new(map, a.ncols())
    }

    fn check_len(&self, op: &str, actual: usize, expected: usize) -> Result<()> {
        if actual != expected {
            return Err(Error::DimensionMismatch(format!(
                "{} on {}x{} permutation: vector length {}, expected {}",
                op,
                self.nrows(),
                self.ncols,
                actual,
                expected
            )));
        }
        Ok(())
    }
}
