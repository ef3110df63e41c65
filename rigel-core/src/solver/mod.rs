//! Partitioned solution of the constrained equilibrium equations.
//!
//! With the elimination operator `T = P_delta` and its constant `c`, every
//! admissible displacement field is `d = T u + c`. The reduced unknowns `u`
//! split into prescribed primary-fixed values `d_fx` and free primary-released
//! values `d_rl`; the physical DOFs split into fixed `F` and released `R`.
//! With
//!
//! ```text
//! B = Tᵗ K T        k = Tᵗ K c
//! A11 = T[F, fx]    A12 = T[F, rl]    A21 = T[R, fx]    A22 = T[R, rl]
//! ```
//!
//! the equilibrium equations `Tᵗ (K d - f) = 0` become two block solves:
//!
//! ```text
//! B22 d_rl  = A22ᵗ f_R - B21 d_fx - k_rl               (sparse Cholesky)
//! A11ᵗ F_F  = B11 d_fx + B12 d_rl + k_fx - A21ᵗ f_R    (sparse QR)
//! ```
//!
//! `F_F` are the forces at the fixed DOFs. `A12` must vanish: a supported DOF
//! may not depend on a free unknown.
//!
//! # Reuse
//!
//! [`PartitionedSolver::prepare`] does all work that depends only on the
//! stiffness and the constraints, including both factorizations. The returned
//! [`PreparedSystem`] then solves any number of load vectors.

pub mod factor;

pub use factor::{CholeskyFactor, Factorization, QrFactor};

use crate::dof::{DofClassification, Fixity};
use crate::error::{Error, Result};
use crate::permutation::HollowPermutation;
use crate::reduce::Reduction;
use crate::sparse::{max_abs, mul_vec, transpose_mul_vec, CsrMatrix};
use log::debug;
use std::time::Instant;

/// Numerical tolerances of the constraint pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Coefficients at or below this magnitude count as zero.
    pub zero: f64,
    /// Allowed deviation of a reduced pivot coefficient from one.
    pub pivot: f64,
    /// Largest allowed `max|A12| / max|T|`.
    pub coupling: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            zero: 1e-9,
            pivot: 1e-9,
            coupling: 1e-5,
        }
    }
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub tolerances: Tolerances,
    /// Keep factorizations between load cases with the same constraint set.
    pub reuse_factorizations: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerances: Tolerances::default(),
            reuse_factorizations: true,
        }
    }
}

/// Solution statistics.
#[derive(Debug, Clone, Default)]
pub struct SolveStats {
    pub n_dofs: usize,
    pub n_primary_fixed: usize,
    pub n_primary_released: usize,
    pub n_secondary: usize,
    pub n_constraint_rows: usize,
    pub redundant_rows: usize,
    /// Whether the factorizations came from an earlier load case.
    pub reused_factorization: bool,
    /// Wall-clock time in seconds.
    pub time_seconds: f64,
}

/// Full displacement and force vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub displacements: Vec<f64>,
    /// Forces at fixed DOFs, applied loads at released DOFs.
    pub forces: Vec<f64>,
}

/// Block elimination solver.
#[derive(Debug, Clone, Default)]
pub struct PartitionedSolver {
    tolerances: Tolerances,
}

impl PartitionedSolver {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }

    /// Solve one load vector.
    pub fn solve(
        &self,
        stiffness: &CsrMatrix,
        forces: &[f64],
        prescribed: &[f64],
        classification: &DofClassification,
        reduction: &Reduction,
    ) -> Result<Solution> {
        self.prepare(stiffness, classification, reduction)?
            .solve(forces, prescribed)
    }

    /// Transform, partition and factor the system.
    pub fn prepare(
        &self,
        stiffness: &CsrMatrix,
        classification: &DofClassification,
        reduction: &Reduction,
    ) -> Result<PreparedSystem> {
        let start = Instant::now();
        let n = classification.n_dofs();
        let t = &reduction.p_delta;
        if stiffness.nrows() != n || stiffness.ncols() != n || t.nrows() != n || reduction.rhs.len() != n {
            return Err(Error::DimensionMismatch(format!(
                "stiffness {}x{} and elimination operator {}x{} do not match {} DOFs",
                stiffness.nrows(),
                stiffness.ncols(),
                t.nrows(),
                t.ncols(),
                n
            )));
        }

        // Reduced columns by fixity of their DOF
        let m = reduction.n_primary();
        let (fx_cols, rl_cols): (Vec<usize>, Vec<usize>) =
            (0..m).partition(|&k| classification.fixity[reduction.primary_dofs[k]] == Fixity::Fixed);
        let fx_sel = HollowPermutation::selection(m, &fx_cols)?;
        let rl_sel = HollowPermutation::selection(m, &rl_cols)?;
        let fixed_sel = HollowPermutation::selection(n, &classification.dofs_with(Fixity::Fixed))?;
        let released_sel = HollowPermutation::selection(n, &classification.dofs_with(Fixity::Released))?;
        let fx_dofs: Vec<usize> = fx_cols.iter().map(|&k| reduction.primary_dofs[k]).collect();

        // Constraint transfer blocks
        let a11 = HollowPermutation::sandwich(&fixed_sel, t, &fx_sel)?;
        let a12 = HollowPermutation::sandwich(&fixed_sel, t, &rl_sel)?;
        let a21 = HollowPermutation::sandwich(&released_sel, t, &fx_sel)?;
        let a22 = HollowPermutation::sandwich(&released_sel, t, &rl_sel)?;

        let coupling = max_abs(&a12);
        let scale = max_abs(t);
        if coupling > self.tolerances.coupling * scale {
            return Err(Error::ModelInconsistency(format!(
                "algorithm failure: supported DOFs depend on free unknowns (coupling {:e} of {:e})",
                coupling, scale
            )));
        }

        // Reduced stiffness
        let kt = stiffness * t;
        let b = &t.transpose() * &kt;
        let b11 = HollowPermutation::sandwich(&fx_sel, &b, &fx_sel)?;
        let b12 = HollowPermutation::sandwich(&fx_sel, &b, &rl_sel)?;
        let b21 = HollowPermutation::sandwich(&rl_sel, &b, &fx_sel)?;
        let b22 = HollowPermutation::sandwich(&rl_sel, &b, &rl_sel)?;

        let kc = mul_vec(stiffness, &reduction.rhs)?;
        let k = transpose_mul_vec(t, &kc)?;
        let k_fx = fx_sel.transpose_apply(&k)?;
        let k_rl = rl_sel.transpose_apply(&k)?;
        debug!(
            "partitioned {} DOFs into {} fixed and {} released unknowns in {:.3?}",
            n,
            fx_cols.len(),
            rl_cols.len(),
            start.elapsed()
        );

        let start = Instant::now();
        let cholesky = if b22.nrows() > 0 {
            Some(CholeskyFactor::new(&b22)?)
        } else {
            None
        };
        let a11t = a11.transpose();
        let qr = if a11t.ncols() > 0 {
            Some(QrFactor::new(&a11t)?)
        } else {
            None
        };
        debug!(
            "factored B22 ({}x{}) and A11ᵗ ({}x{}) in {:.3?}",
            b22.nrows(),
            b22.ncols(),
            a11t.nrows(),
            a11t.ncols(),
            start.elapsed()
        );

        Ok(PreparedSystem {
            t: t.clone(),
            c: reduction.rhs.clone(),
            fx_sel,
            rl_sel,
            fixed_sel,
            released_sel,
            fx_dofs,
            b11,
            b12,
            b21,
            a21,
            a22,
            k_fx,
            k_rl,
            cholesky,
            qr,
            n_secondary: reduction.n_secondary(),
            tolerance: self.tolerances.zero,
        })
    }
}

/// Factored system of one stiffness and constraint set.
pub struct PreparedSystem {
    t: CsrMatrix,
    c: Vec<f64>,
    fx_sel: HollowPermutation,
    rl_sel: HollowPermutation,
    fixed_sel: HollowPermutation,
    released_sel: HollowPermutation,
    fx_dofs: Vec<usize>,
    b11: CsrMatrix,
    b12: CsrMatrix,
    b21: CsrMatrix,
    a21: CsrMatrix,
    a22: CsrMatrix,
    k_fx: Vec<f64>,
    k_rl: Vec<f64>,
    cholesky: Option<CholeskyFactor>,
    qr: Option<QrFactor>,
    n_secondary: usize,
    tolerance: f64,
}

impl PreparedSystem {
    pub fn n_dofs(&self) -> usize {
        self.t.nrows()
    }

    pub fn n_primary_fixed(&self) -> usize {
        self.fx_sel.ncols()
    }

    pub fn n_primary_released(&self) -> usize {
        self.rl_sel.ncols()
    }

    pub fn n_secondary(&self) -> usize {
        self.n_secondary
    }

    /// Solve for applied `forces` and `prescribed` displacements (6N each).
    pub fn solve(&self, forces: &[f64], prescribed: &[f64]) -> Result<Solution> {
        let n = self.n_dofs();
        if forces.len() != n || prescribed.len() != n {
            return Err(Error::DimensionMismatch(format!(
                "expected {} forces and displacements, got {} and {}",
                n,
                forces.len(),
                prescribed.len()
            )));
        }
        let start = Instant::now();

        let d_fx: Vec<f64> = self.fx_dofs.iter().map(|&dof| prescribed[dof]).collect();
        let f_r = self.released_sel.transpose_apply(forces)?;

        // B22 d_rl = A22ᵗ f_R - B21 d_fx - k_rl
        let mut rhs_rl = transpose_mul_vec(&self.a22, &f_r)?;
        sub_assign(&mut rhs_rl, &mul_vec(&self.b21, &d_fx)?);
        sub_assign(&mut rhs_rl, &self.k_rl);
        let d_rl = match &self.cholesky {
            Some(factor) => factor.solve(&rhs_rl)?,
            None => Vec::new(),
        };

        // A11ᵗ F_F = B11 d_fx + B12 d_rl + k_fx - A21ᵗ f_R
        let mut rhs_fx = mul_vec(&self.b11, &d_fx)?;
        add_assign(&mut rhs_fx, &mul_vec(&self.b12, &d_rl)?);
        add_assign(&mut rhs_fx, &self.k_fx);
        sub_assign(&mut rhs_fx, &transpose_mul_vec(&self.a21, &f_r)?);
        let f_f = match &self.qr {
            Some(factor) => factor.solve(&rhs_fx)?,
            None => Vec::new(),
        };

        // d = T u + c
        let mut u = self.fx_sel.apply(&d_fx)?;
        self.rl_sel.apply_add(&d_rl, &mut u)?;
        let mut displacements = mul_vec(&self.t, &u)?;
        add_assign(&mut displacements, &self.c);
        for &dof in &self.fx_dofs {
            let (got, want) = (displacements[dof], prescribed[dof]);
            if (got - want).abs() > self.tolerance * want.abs().max(1.0) {
                return Err(Error::ModelInconsistency(format!(
                    "DOF {} ends at {} instead of its prescribed {}",
                    dof, got, want
                )));
            }
            displacements[dof] = want;
        }

        let mut forces_out = self.fixed_sel.apply(&f_f)?;
        self.released_sel.apply_add(&f_r, &mut forces_out)?;

        debug!(
            "solved {} released and {} fixed unknowns in {:.3?}",
            d_rl.len(),
            f_f.len(),
            start.elapsed()
        );
        Ok(Solution {
            displacements,
            forces: forces_out,
        })
    }
}

fn add_assign(a: &mut [f64], b: &[f64]) {
    for (x, y) in a.iter_mut().zip(b) {
        *x += y;
    }
}

fn sub_assign(a: &mut [f64], b: &[f64]) {
    for (x, y) in a.iter_mut().zip(b) {
        *x -= y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dof::{CalcRole, DofPartition, RigidGroup};
    use crate::reduce::SymbolicReducer;
    use crate::sparse::TripletMatrix;
    use approx::assert_relative_eq;

    /// Chain of `n` unit springs between DOF 0 (fixed) and DOF n.
    fn spring_chain(n: usize, k: f64) -> CsrMatrix {
        let mut t = TripletMatrix::new(n + 1, n + 1);
        for e in 0..n {
            t.add(e, e, k);
            t.add(e + 1, e + 1, k);
            t.add(e, e + 1, -k);
            t.add(e + 1, e, -k);
        }
        t.to_csr().unwrap()
    }

    fn setup(n: usize, fixed: &[usize], mpc_rows: &[(&[(usize, f64)], f64)]) -> (DofClassification, Reduction) {
        let fixity: Vec<Fixity> = (0..n)
            .map(|i| if fixed.contains(&i) { Fixity::Fixed } else { Fixity::Released })
            .collect();
        let mut t = TripletMatrix::new(mpc_rows.len(), n + 1);
        for (i, (entries, rhs)) in mpc_rows.iter().enumerate() {
            for &(c, v) in entries.iter() {
                t.add(i, c, v);
            }
            t.add_exact(i, n, *rhs);
        }
        let system = t.to_csr().unwrap();
        let order = HollowPermutation::identity(n);
        let reduction = SymbolicReducer::default().reduce(&system, &order).unwrap();
        let roles: Vec<CalcRole> = reduction
            .secondary
            .iter()
            .map(|&s| if s { CalcRole::Secondary } else { CalcRole::Primary })
            .collect();
        let partition = DofPartition::new(&fixity, &roles).unwrap();
        let classification = DofClassification {
            fixity,
            roles,
            rigid_groups: Vec::<RigidGroup>::new(),
            column_order: order,
            partition,
            mpc_rows: system,
        };
        (classification, reduction)
    }

    #[test]
    fn test_spring_chain_without_constraints() {
        let k = spring_chain(3, 2.0);
        let (c, r) = setup(4, &[0], &[]);
        let f = [0.0, 0.0, 0.0, 1.0];
        let sol = PartitionedSolver::default().solve(&k, &f, &[0.0; 4], &c, &r).unwrap();
        // Series springs: u_i = i F / k
        for i in 0..4 {
            assert_relative_eq!(sol.displacements[i], i as f64 * 0.5, epsilon = 1e-12);
        }
        // Reaction balances the load
        assert_relative_eq!(sol.forces[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(sol.forces[3], 1.0);
    }

    #[test]
    fn test_prescribed_settlement() {
        let k = spring_chain(2, 1.0);
        let (c, r) = setup(3, &[0, 2], &[]);
        let sol = PartitionedSolver::default()
            .solve(&k, &[0.0; 3], &[0.0, 0.0, 0.4], &c, &r)
            .unwrap();
        assert_relative_eq!(sol.displacements[1], 0.2, epsilon = 1e-12);
        assert_relative_eq!(sol.displacements[2], 0.4);
        assert_relative_eq!(sol.forces[0], -0.2, epsilon = 1e-12);
        assert_relative_eq!(sol.forces[2], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_tied_dofs_move_together() {
        // d2 = d3: the last two springs are bypassed for relative motion
        let k = spring_chain(3, 1.0);
        let (c, r) = setup(4, &[0], &[(&[(2, 1.0), (3, -1.0)], 0.0)]);
        let sol = PartitionedSolver::default()
            .solve(&k, &[0.0, 0.0, 0.0, 1.0], &[0.0; 4], &c, &r)
            .unwrap();
        assert_relative_eq!(sol.displacements[2], sol.displacements[3], epsilon = 1e-12);
        assert_relative_eq!(sol.displacements[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(sol.displacements[3], 2.0, epsilon = 1e-12);
        assert_relative_eq!(sol.forces[0], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_prepared_system_reuse() {
        let k = spring_chain(2, 4.0);
        let (c, r) = setup(3, &[0], &[]);
        let prepared = PartitionedSolver::default().prepare(&k, &c, &r).unwrap();
        assert_eq!(prepared.n_primary_fixed(), 1);
        assert_eq!(prepared.n_primary_released(), 2);
        let a = prepared.solve(&[0.0, 0.0, 1.0], &[0.0; 3]).unwrap();
        let b = prepared.solve(&[0.0, 0.0, 3.0], &[0.0; 3]).unwrap();
        for i in 0..3 {
            assert_relative_eq!(b.displacements[i], 3.0 * a.displacements[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_support_depending_on_free_unknown() {
        // Fixed DOF 0 tied to released DOF 1 and eliminated first
        let k = spring_chain(2, 1.0);
        let (c, r) = setup(3, &[0], &[(&[(0, 1.0), (1, -1.0)], 0.0)]);
        let err = PartitionedSolver::default().prepare(&k, &c, &r);
        assert!(matches!(err, Err(Error::ModelInconsistency(_))));
    }

    #[test]
    fn test_unsupported_structure_fails_numerically() {
        let k = spring_chain(2, 1.0);
        let (c, r) = setup(3, &[], &[]);
        let err = PartitionedSolver::default().prepare(&k, &c, &r);
        assert!(matches!(err, Err(Error::NumericFailure(_))));
    }

    #[test]
    fn test_dimension_checks() {
        let k = spring_chain(2, 1.0);
        let (c, r) = setup(4, &[0], &[]);
        assert!(matches!(
            PartitionedSolver::default().prepare(&k, &c, &r),
            Err(Error::DimensionMismatch(_))
        ));
    }
}
