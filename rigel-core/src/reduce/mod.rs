//! Symbolic reduction of a constraint system to an elimination operator.
//!
//! Given constraint rows `Σ a_j d_j = c` over the `n` DOFs, the reducer
//! expresses every secondary DOF through the primary ones:
//!
//! ```text
//! d = P_delta · u + rhs
//! ```
//!
//! where `u` holds the `M` primary DOFs in ascending DOF order. Secondary DOFs
//! are the pivots of the reduced row-echelon form; the elimination column
//! order decides which DOF of a row becomes its pivot.

pub mod rref;

pub use rref::{row_reduce, rows_of, Rref, SparseRow};

use crate::error::{Error, Result};
use crate::permutation::HollowPermutation;
use crate::solver::Tolerances;
use crate::sparse::{mul_vec, CsrMatrix, TripletMatrix};
use log::debug;

/// Elimination operator of a constraint system.
#[derive(Debug, Clone)]
pub struct Reduction {
    /// `n × M` operator from primary to all DOFs.
    pub p_delta: CsrMatrix,
    /// Constant part of the secondary DOFs.
    pub rhs: Vec<f64>,
    /// DOF of each reduced column, ascending.
    pub primary_dofs: Vec<usize>,
    /// Secondary flag per DOF.
    pub secondary: Vec<bool>,
    /// Rows that reduced to `0 = 0`.
    pub redundant_rows: usize,
}

impl Reduction {
    pub fn n_dofs(&self) -> usize {
        self.secondary.len()
    }

    /// Number of independent unknowns, `M`.
    pub fn n_primary(&self) -> usize {
        self.primary_dofs.len()
    }

    pub fn n_secondary(&self) -> usize {
        self.secondary.iter().filter(|&&s| s).count()
    }

    /// Full displacement vector from the primary unknowns.
    pub fn expand(&self, u: &[f64]) -> Result<Vec<f64>> {
        let mut d = mul_vec(&self.p_delta, u)?;
        for (di, ci) in d.iter_mut().zip(&self.rhs) {
            *di += ci;
        }
        Ok(d)
    }
}

/// Turns constraint systems into [`Reduction`]s.
#[derive(Debug, Clone, Default)]
pub struct SymbolicReducer {
    tolerances: Tolerances,
}

impl SymbolicReducer {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }

    /// Reduce an `E × (n + 1)` system, right-hand side in its last column.
    ///
    /// `column_order` is the square elimination order, `order[dof] = position`;
    /// pivots are claimed from the lowest position upward.
    pub fn reduce(&self, equations: &CsrMatrix, column_order: &HollowPermutation) -> Result<Reduction> {
        let n = equations.ncols().saturating_sub(1);
        if column_order.nrows() != n || column_order.ncols() != n || column_order.nnz() != n {
            return Err(Error::DimensionMismatch(format!(
                "elimination order is {}x{} with {} entries, system has {} DOFs",
                column_order.nrows(),
                column_order.ncols(),
                column_order.nnz(),
                n
            )));
        }

        // Rows in elimination space
        let rows = rows_of(equations)?
            .into_iter()
            .map(|row| {
                let entries = row
                    .entries
                    .iter()
                    .filter_map(|&(dof, v)| column_order.get(dof).map(|c| (c, v)))
                    .collect();
                SparseRow::new(entries, row.rhs)
            })
            .collect();
        let rref = row_reduce(rows, n, self.tolerances.zero)?;
        let dof_at = column_order.transpose();

        // Claim the pivot of each row
        let counts = rref.column_nonzeros();
        let mut pivot_row_of: Vec<Option<usize>> = vec![None; n];
        for (r, &col) in rref.pivots.iter().enumerate() {
            if counts[col] != 1 {
                return Err(Error::ModelInconsistency(format!(
                    "pivot column {} of constraint row {} is shared by {} rows",
                    col, r, counts[col]
                )));
            }
            let dof = dof_at.get(col).ok_or_else(|| {
                Error::InvalidPermutation(format!("elimination order has no DOF at {}", col))
            })?;
            if pivot_row_of[dof].replace(r).is_some() {
                return Err(Error::ModelInconsistency(format!(
                    "DOF {} is claimed by more than one constraint row",
                    dof
                )));
            }
        }

        // Compact numbering of the primary DOFs
        let primary_dofs: Vec<usize> = (0..n).filter(|&i| pivot_row_of[i].is_none()).collect();
        let mut reduced_col = vec![None; n];
        for (k, &dof) in primary_dofs.iter().enumerate() {
            reduced_col[dof] = Some(k);
        }

        let mut triplets = TripletMatrix::with_capacity(n, primary_dofs.len(), n);
        let mut rhs = vec![0.0; n];
        for i in 0..n {
            let Some(r) = pivot_row_of[i] else {
                if let Some(k) = reduced_col[i] {
                    triplets.add(i, k, 1.0);
                }
                continue;
            };
            let row = &rref.rows[r];
            let own = rref.pivots[r];
            let a_ii = unit_pivot(row, own, i, self.tolerances.pivot)?;
            let scale = -1.0 / a_ii;
            for &(col, a) in &row.entries {
                if col == own {
                    continue;
                }
                let dof = dof_at.get(col).ok_or_else(|| {
                    Error::InvalidPermutation(format!("elimination order has no DOF at {}", col))
                })?;
                let k = reduced_col[dof].ok_or_else(|| {
                    Error::ModelInconsistency(format!(
                        "secondary DOF {} depends on secondary DOF {}",
                        i, dof
                    ))
                })?;
                triplets.add_exact(i, k, a * scale);
            }
            rhs[i] = row.rhs / a_ii;
        }

        let secondary = pivot_row_of.iter().map(Option::is_some).collect();
        debug!(
            "reduced {} equations over {} DOFs: {} primary, {} secondary, {} redundant",
            equations.nrows(),
            n,
            primary_dofs.len(),
            rref.pivots.len(),
            rref.redundant
        );

        Ok(Reduction {
            p_delta: triplets.to_csr()?,
            rhs,
            primary_dofs,
            secondary,
            redundant_rows: rref.redundant,
        })
    }
}

/// Coefficient of a row's pivot column, which row reduction leaves at one.
fn unit_pivot(row: &SparseRow, col: usize, dof: usize, tol: f64) -> Result<f64> {
    let a = row.get(col);
    if (a - 1.0).abs() > tol {
        return Err(Error::ModelInconsistency(format!(
            "pivot of DOF {} is {} instead of 1",
            dof, a
        )));
    }
    Ok(a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn system(n: usize, rows: &[(&[(usize, f64)], f64)]) -> CsrMatrix {
        let mut t = TripletMatrix::new(rows.len(), n + 1);
        for (i, (entries, rhs)) in rows.iter().enumerate() {
            for &(c, v) in entries.iter() {
                t.add(i, c, v);
            }
            t.add_exact(i, n, *rhs);
        }
        t.to_csr().unwrap()
    }

    #[test]
    fn test_fixed_dofs_only_gives_identity_on_released() {
        // DOFs 0 and 3 fixed, 1, 2 and 4 released
        let eqs = system(5, &[(&[(0, 1.0)], 0.0), (&[(3, 1.0)], 0.25)]);
        let red = SymbolicReducer::default()
            .reduce(&eqs, &HollowPermutation::identity(5))
            .unwrap();
        assert_eq!(red.primary_dofs, vec![1, 2, 4]);
        let p = DMatrix::from(&red.p_delta);
        let mut expected = DMatrix::zeros(5, 3);
        expected[(1, 0)] = 1.0;
        expected[(2, 1)] = 1.0;
        expected[(4, 2)] = 1.0;
        assert_eq!(p, expected);
        assert_relative_eq!(red.rhs[3], 0.25);
        assert_eq!(red.n_secondary(), 2);
    }

    #[test]
    fn test_pivot_must_be_reduced_to_one() {
        let reduced = SparseRow::new(vec![(2, 1.0 + 1e-12), (4, -0.5)], 0.0);
        assert_relative_eq!(unit_pivot(&reduced, 2, 7, 1e-9).unwrap(), 1.0, epsilon = 1e-11);

        // A row that skipped normalization, or a column that is not its pivot
        let raw = SparseRow::new(vec![(2, 2.0), (4, -1.0)], 0.4);
        assert!(matches!(unit_pivot(&raw, 2, 7, 1e-9), Err(Error::ModelInconsistency(_))));
        assert!(matches!(unit_pivot(&reduced, 3, 7, 1e-9), Err(Error::ModelInconsistency(_))));
    }

    #[test]
    fn test_slave_follows_master() {
        // 2 d0 - 2 d1 = 0.4, eliminate d0
        let eqs = system(3, &[(&[(0, 2.0), (1, -2.0)], 0.4)]);
        let red = SymbolicReducer::default()
            .reduce(&eqs, &HollowPermutation::identity(3))
            .unwrap();
        assert_eq!(red.primary_dofs, vec![1, 2]);
        let d = red.expand(&[1.5, -3.0]).unwrap();
        assert_relative_eq!(d[0], 1.7, epsilon = 1e-14);
        assert_relative_eq!(d[1], 1.5);
        assert_relative_eq!(d[2], -3.0);
    }

    #[test]
    fn test_column_order_selects_pivot() {
        // Same row, but d1 is eliminated first
        let eqs = system(3, &[(&[(0, 2.0), (1, -2.0)], 0.4)]);
        let order = HollowPermutation::new(vec![Some(1), Some(0), Some(2)], 3).unwrap();
        let red = SymbolicReducer::default().reduce(&eqs, &order).unwrap();
        assert_eq!(red.primary_dofs, vec![0, 2]);
        assert!(red.secondary[1]);
        let d = red.expand(&[1.0, 0.0]).unwrap();
        assert_relative_eq!(d[1], 0.8, epsilon = 1e-14);
    }

    #[test]
    fn test_inconsistent_system() {
        let eqs = system(2, &[(&[(0, 1.0), (1, -1.0)], 0.0), (&[(0, 1.0), (1, -1.0)], 1.0)]);
        let err = SymbolicReducer::default().reduce(&eqs, &HollowPermutation::identity(2));
        assert!(matches!(err, Err(Error::ModelInconsistency(_))));
    }

    #[test]
    fn test_order_shape_is_checked() {
        let eqs = system(3, &[(&[(0, 1.0)], 0.0)]);
        let err = SymbolicReducer::default().reduce(&eqs, &HollowPermutation::identity(2));
        assert!(matches!(err, Err(Error::DimensionMismatch(_))));
    }
}
