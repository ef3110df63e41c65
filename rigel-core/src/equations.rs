//! Explicit constraint equation system.
//!
//! All kinematic constraints of a load case are collected into one sparse
//! `E × (6N + 1)` matrix whose last column is the right-hand side:
//!
//! - rows `0..n_boundary`: one row `d_i = settlement_i` per fixed DOF
//! - rows `n_boundary..E`: the rows of every applicable MPC element, in
//!   declaration order

use crate::error::{Error, Result};
use crate::model::{Model, NodeIndexMap};
use crate::sparse::{leading_columns, row_block, CsrMatrix, TripletMatrix};
use crate::types::{Dof, DofConstraint, LoadCase};
use log::{debug, warn};

/// Boundary and MPC rows of one load case.
#[derive(Debug, Clone)]
pub struct ConstraintEquations {
    matrix: CsrMatrix,
    n_boundary: usize,
    n_dofs: usize,
    prescribed: Vec<f64>,
    applicable_mpcs: Vec<usize>,
    supported_dofs: Vec<usize>,
}

/// Build the constraint system of `load_case`.
pub fn build(model: &Model, load_case: &LoadCase, index: &NodeIndexMap) -> Result<ConstraintEquations> {
    let n_dofs = index.n_dofs();
    let (boundary, prescribed) = boundary_conditions(model, load_case, index)?;
    let (mpc, applicable_mpcs) = mpc_equations(model, load_case, index)?;

    let mut supported_dofs = Vec::new();
    for &i in &applicable_mpcs {
        supported_dofs.extend(model.mpc_elements()[i].restrained_dofs(index)?);
    }
    supported_dofs.sort_unstable();
    supported_dofs.dedup();

    let n_boundary = boundary.nrows();
    let n_rows = n_boundary + mpc.nrows();
    let mut triplets = TripletMatrix::with_capacity(n_rows, n_dofs + 1, boundary.nnz() + mpc.nnz());
    for (i, j, &v) in boundary.triplet_iter() {
        triplets.add_exact(i, j, v);
    }
    for (i, j, &v) in mpc.triplet_iter() {
        triplets.add_exact(n_boundary + i, j, v);
    }

    debug!(
        "constraint system for '{}': {} boundary rows, {} MPC rows, {} columns",
        load_case.name,
        n_boundary,
        mpc.nrows(),
        n_dofs + 1
    );

    Ok(ConstraintEquations {
        matrix: triplets.to_csr()?,
        n_boundary,
        n_dofs,
        prescribed,
        applicable_mpcs,
        supported_dofs,
    })
}

/// One row per fixed DOF, with the summed settlements of `load_case` on the
/// right-hand side. Also returns the 6N prescribed displacement vector.
pub fn boundary_conditions(
    model: &Model,
    load_case: &LoadCase,
    index: &NodeIndexMap,
) -> Result<(CsrMatrix, Vec<f64>)> {
    let n_dofs = index.n_dofs();
    let n_fixed: usize = model.nodes().iter().map(|n| n.constraints.fixed_count()).sum();
    let mut triplets = TripletMatrix::with_capacity(n_fixed, n_dofs + 1, 2 * n_fixed);
    let mut prescribed = vec![0.0; n_dofs];

    let mut row = 0;
    for node in model.nodes() {
        let settlement = node.settlement_for(load_case);
        for dof in Dof::ALL {
            let value = settlement.get(dof);
            match node.constraints.get(dof) {
                DofConstraint::Fixed => {
                    let col = index.dof(node.id(), dof)?;
                    triplets.add(row, col, 1.0);
                    triplets.add_exact(row, n_dofs, value);
                    prescribed[col] = value;
                    row += 1;
                }
                DofConstraint::Released if value != 0.0 => {
                    warn!(
                        "settlement {} on released {:?} of node {:?} is ignored",
                        value,
                        dof,
                        node.id()
                    );
                }
                DofConstraint::Released => {}
            }
        }
    }

    Ok((triplets.to_csr()?, prescribed))
}

/// Rows of every MPC element applicable to `load_case`, stacked in declaration
/// order. Also returns the indices of the contributing elements.
pub fn mpc_equations(
    model: &Model,
    load_case: &LoadCase,
    index: &NodeIndexMap,
) -> Result<(CsrMatrix, Vec<usize>)> {
    let n_cols = index.n_dofs() + 1;
    let applicable: Vec<usize> = model
        .mpc_elements()
        .iter()
        .enumerate()
        .filter(|(_, e)| e.applies_to(load_case))
        .map(|(i, _)| i)
        .collect();

    let mut blocks = Vec::with_capacity(applicable.len());
    let mut n_rows = 0;
    let mut nnz = 0;
    for &i in &applicable {
        let element = &model.mpc_elements()[i];
        let rows = element.extra_equations(model, index)?;
        if rows.ncols() != n_cols {
            return Err(Error::DimensionMismatch(format!(
                "MPC element {} returned {} columns, expected {}",
                i,
                rows.ncols(),
                n_cols
            )));
        }
        if rows.nrows() != element.extra_equations_count() {
            return Err(Error::DimensionMismatch(format!(
                "MPC element {} returned {} rows, declared {}",
                i,
                rows.nrows(),
                element.extra_equations_count()
            )));
        }
        n_rows += rows.nrows();
        nnz += rows.nnz();
        blocks.push(rows);
    }

    let mut triplets = TripletMatrix::with_capacity(n_rows, n_cols, nnz);
    let mut offset = 0;
    for block in &blocks {
        for (i, j, &v) in block.triplet_iter() {
            triplets.add_exact(offset + i, j, v);
        }
        offset += block.nrows();
    }
    Ok((triplets.to_csr()?, applicable))
}

impl ConstraintEquations {
    /// Combined system, right-hand side in the last column.
    pub fn matrix(&self) -> &CsrMatrix {
        &self.matrix
    }

    pub fn n_rows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_boundary_rows(&self) -> usize {
        self.n_boundary
    }

    pub fn n_mpc_rows(&self) -> usize {
        self.matrix.nrows() - self.n_boundary
    }

    /// Number of displacement DOFs, `6N`.
    pub fn n_dofs(&self) -> usize {
        self.n_dofs
    }

    /// Boundary rows with right-hand side.
    pub fn boundary_block(&self) -> Result<CsrMatrix> {
        row_block(&self.matrix, 0..self.n_boundary)
    }

    /// MPC rows with right-hand side.
    pub fn mpc_block(&self) -> Result<CsrMatrix> {
        row_block(&self.matrix, self.n_boundary..self.matrix.nrows())
    }

    /// MPC coefficients without the right-hand side column.
    pub fn mpc_coefficients(&self) -> Result<CsrMatrix> {
        leading_columns(&self.mpc_block()?, self.n_dofs)
    }

    /// Settlements at fixed DOFs, zero elsewhere.
    pub fn prescribed_displacements(&self) -> &[f64] {
        &self.prescribed
    }

    /// Indices of the MPC elements that contributed rows.
    pub fn applicable_mpcs(&self) -> &[usize] {
        &self.applicable_mpcs
    }

    /// DOFs held by applicable virtual supports, ascending.
    pub fn supported_dofs(&self) -> &[usize] {
        &self.supported_dofs
    }
}
