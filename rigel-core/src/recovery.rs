//! Member end force recovery from a displacement solution.
//!
//! For every element:
//! 1. Gather the element DOF displacements from the global vector
//! 2. Rotate them to member axes
//! 3. `f = K_local d_local - f_equivalent` for the solved load case
//!
//! End forces are reported in member axes: axial force along local x, shear
//! along local y and z, torsion and bending moments about the same axes.

use crate::analysis::StaticResult;
use crate::element::FiniteElement;
use crate::error::{Error, Result};
use crate::model::Model;
use crate::types::{Force, DOFS_PER_NODE};
use nalgebra::Vector6;
use rayon::prelude::*;

/// End forces of a single element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementForces {
    /// Element index in the model.
    pub element_id: usize,
    /// Forces the nodes exert on the member, one per element node.
    pub end_forces: Vec<Force>,
}

impl ElementForces {
    /// Axial force, positive in tension.
    pub fn axial(&self) -> f64 {
        self.end_forces.last().map_or(0.0, |f| f.0[0])
    }

    /// Largest bending moment magnitude over both ends.
    pub fn max_moment(&self) -> f64 {
        self.end_forces
            .iter()
            .map(|f| f.0[4].abs().max(f.0[5].abs()))
            .fold(0.0, f64::max)
    }
}

/// End forces of all elements of a model.
#[derive(Debug, Clone)]
pub struct ForceField {
    pub element_forces: Vec<ElementForces>,
}

impl ForceField {
    pub fn element(&self, element_id: usize) -> Option<&ElementForces> {
        self.element_forces.get(element_id)
    }

    pub fn n_elements(&self) -> usize {
        self.element_forces.len()
    }

    /// Largest axial force magnitude.
    pub fn max_abs_axial(&self) -> f64 {
        self.element_forces
            .iter()
            .map(|e| e.axial().abs())
            .fold(0.0, f64::max)
    }
}

/// Recover member end forces for the load case of `result`.
///
/// # Example
///
/// ```ignore
/// let result = solve(&model, &load_case)?;
/// let forces = element_forces(&model, &result)?;
/// println!("max axial force: {:.1} N", forces.max_abs_axial());
/// ```
pub fn element_forces(model: &Model, result: &StaticResult) -> Result<ForceField> {
    let index = result.index_map();
    if index.n_dofs() != result.displacements.len() || index.n_nodes() != model.n_nodes() {
        return Err(Error::DimensionMismatch(format!(
            "result has {} displacements for {} nodes, model has {} nodes",
            result.displacements.len(),
            index.n_nodes(),
            model.n_nodes()
        )));
    }

    let element_forces = model
        .elements()
        .par_iter()
        .enumerate()
        .map(|(element_id, element)| {
            let fe: &dyn FiniteElement = element.as_finite_element();
            let coords = model.locations(fe.node_ids())?;
            let u_e: Vec<f64> = element
                .dof_indices(index)?
                .into_iter()
                .map(|dof| result.displacements[dof])
                .collect();
            let local = fe.end_forces(&coords, &u_e, result.load_case())?;
            let end_forces = local
                .as_slice()
                .chunks_exact(DOFS_PER_NODE)
                .map(|c| Force(Vector6::from_column_slice(c)))
                .collect();
            Ok(ElementForces {
                element_id,
                end_forces,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ForceField { element_forces })
}
