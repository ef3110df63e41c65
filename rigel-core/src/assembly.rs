//! Parallel global assembly.
//!
//! Element matrices and load vectors are evaluated in parallel with Rayon and
//! then accumulated in element order, so the assembled result does not depend
//! on thread scheduling.

use crate::element::FiniteElement;
use crate::error::Result;
use crate::model::{Model, NodeIndexMap};
use crate::sparse::{CsrMatrix, LoadVector, TripletMatrix};
use crate::types::{Dof, DofConstraint, LoadCase};
use log::debug;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::time::Instant;

/// Which element matrix to assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatrixKind {
    Stiffness,
    Mass,
    Damping,
}

/// Assemble the global `6N × 6N` stiffness matrix.
///
/// # Example
///
/// ```ignore
/// let index = model.index_map();
/// let k = assemble_stiffness(&model, &index)?;
/// assert_eq!(k.nrows(), model.n_dofs());
/// ```
pub fn assemble_stiffness(model: &Model, index: &NodeIndexMap) -> Result<CsrMatrix> {
    assemble_matrix(model, index, MatrixKind::Stiffness)
}

/// Assemble the global consistent mass matrix.
pub fn assemble_mass(model: &Model, index: &NodeIndexMap) -> Result<CsrMatrix> {
    assemble_matrix(model, index, MatrixKind::Mass)
}

/// Assemble the global damping matrix.
pub fn assemble_damping(model: &Model, index: &NodeIndexMap) -> Result<CsrMatrix> {
    assemble_matrix(model, index, MatrixKind::Damping)
}

fn assemble_matrix(model: &Model, index: &NodeIndexMap, kind: MatrixKind) -> Result<CsrMatrix> {
    let start = Instant::now();
    let n_dofs = index.n_dofs();

    let contributions = model
        .elements()
        .par_iter()
        .map(|element| {
            let fe: &dyn FiniteElement = element.as_finite_element();
            let coords = model.locations(fe.node_ids())?;
            let matrix = match kind {
                MatrixKind::Stiffness => fe.stiffness(&coords)?,
                MatrixKind::Mass => fe.mass(&coords)?,
                MatrixKind::Damping => fe.damping(&coords)?,
            };
            Ok((element.dof_indices(index)?, matrix))
        })
        .collect::<Result<Vec<(Vec<usize>, DMatrix<f64>)>>>()?;

    // Each two-node element touches 144 entries
    let nnz_estimate = contributions.iter().map(|(dofs, _)| dofs.len() * dofs.len()).sum();
    let mut triplets = TripletMatrix::with_capacity(n_dofs, n_dofs, nnz_estimate);
    for (dofs, matrix) in &contributions {
        triplets.add_submatrix(dofs, matrix);
    }

    let matrix = triplets.to_csr()?;
    debug!(
        "assembled {:?} of {} elements: {} DOFs, {} nonzeros in {:.3?}",
        kind,
        contributions.len(),
        n_dofs,
        matrix.nnz(),
        start.elapsed()
    );
    Ok(matrix)
}

/// Assemble the global load vector of `load_case`: nodal loads plus the
/// equivalent nodal loads of every member load.
pub fn assemble_force_vector(model: &Model, load_case: &LoadCase, index: &NodeIndexMap) -> Result<Vec<f64>> {
    let mut rhs = LoadVector::zeros(index.n_dofs());

    for node in model.nodes() {
        let force = node.load_for(load_case);
        let dofs: Vec<usize> = index.dof_range(node.id())?.collect();
        rhs.scatter_add(&dofs, force.0.as_slice());
    }

    let element_loads = model
        .elements()
        .par_iter()
        .filter(|element| {
            element
                .as_finite_element()
                .loads()
                .iter()
                .any(|load| &load.load_case == load_case)
        })
        .map(|element| {
            let fe: &dyn FiniteElement = element.as_finite_element();
            let coords = model.locations(fe.node_ids())?;
            let loads = fe.equivalent_nodal_loads(&coords, load_case)?;
            Ok((element.dof_indices(index)?, loads))
        })
        .collect::<Result<Vec<_>>>()?;

    for (dofs, loads) in &element_loads {
        rhs.scatter_add(dofs, loads.as_slice());
    }
    Ok(rhs.into_vec())
}

/// Prescribed displacements of `load_case`: the settlements at fixed DOFs,
/// zero everywhere else.
pub fn assemble_displacement_vector(
    model: &Model,
    load_case: &LoadCase,
    index: &NodeIndexMap,
) -> Result<Vec<f64>> {
    let mut d = vec![0.0; index.n_dofs()];
    for node in model.nodes() {
        let settlement = node.settlement_for(load_case);
        for dof in Dof::ALL {
            if node.constraints.get(dof) == DofConstraint::Fixed {
                d[index.dof(node.id(), dof)?] = settlement.get(dof);
            }
        }
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ElementLoad, FrameElement, TrussElement};
    use crate::material::{FrameSection, Material};
    use crate::model::NodeId;
    use crate::types::{Constraint, Displacement, Force, LoadType};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn portal() -> (Model, Vec<NodeId>) {
        let mut model = Model::new();
        let ids = vec![
            model.add_node(Vector3::new(0.0, 0.0, 0.0)),
            model.add_node(Vector3::new(0.0, 3.0, 0.0)),
            model.add_node(Vector3::new(4.0, 3.0, 0.0)),
            model.add_node(Vector3::new(4.0, 0.0, 0.0)),
        ];
        let section = FrameSection::rectangle(0.2, 0.3).unwrap();
        for w in ids.windows(2) {
            let frame = FrameElement::new([w[0], w[1]], Material::steel(), section);
            model.add_element(Element::Frame(frame)).unwrap();
        }
        (model, ids)
    }

    #[test]
    fn test_assembly_empty_model() {
        let model = Model::new();
        let k = assemble_stiffness(&model, &model.index_map()).unwrap();
        assert_eq!(k.nrows(), 0);
    }

    #[test]
    fn test_stiffness_is_symmetric_with_positive_diagonal() {
        let (model, _) = portal();
        let k = assemble_stiffness(&model, &model.index_map()).unwrap();
        assert_eq!(k.nrows(), 24);
        let dense = DMatrix::from(&k);
        for i in 0..24 {
            assert!(dense[(i, i)] > 0.0, "diagonal {} is not positive", i);
            for j in 0..24 {
                assert_relative_eq!(dense[(i, j)], dense[(j, i)], max_relative = 1e-10, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_rigid_translation_is_force_free() {
        let (model, _) = portal();
        let k = DMatrix::from(&assemble_stiffness(&model, &model.index_map()).unwrap());
        let mut u = nalgebra::DVector::zeros(24);
        for node in 0..4 {
            u[6 * node] = 1.0;
            u[6 * node + 2] = -0.5;
        }
        assert!((k * u).abs().max() < 1e-3);
    }

    #[test]
    fn test_shared_node_accumulates() {
        let mut model = Model::new();
        let a = model.add_node(Vector3::zeros());
        let b = model.add_node(Vector3::new(1.0, 0.0, 0.0));
        let c = model.add_node(Vector3::new(2.0, 0.0, 0.0));
        for (p, q) in [(a, b), (b, c)] {
            model
                .add_element(Element::Truss(TrussElement::new([p, q], Material::steel(), 1e-3)))
                .unwrap();
        }
        let k = DMatrix::from(&assemble_stiffness(&model, &model.index_map()).unwrap());
        let ea_l = 200e9 * 1e-3;
        assert_relative_eq!(k[(6, 6)], 2.0 * ea_l, max_relative = 1e-12);
        assert_relative_eq!(k[(0, 6)], -ea_l, max_relative = 1e-12);
    }

    #[test]
    fn test_mass_requires_density() {
        let (model, _) = portal();
        let m = assemble_mass(&model, &model.index_map()).unwrap();
        assert!(m.nnz() > 0);

        let mut model = Model::new();
        let a = model.add_node(Vector3::zeros());
        let b = model.add_node(Vector3::x());
        let mat = Material::new(1e9, 0.3).unwrap();
        model
            .add_element(Element::Truss(TrussElement::new([a, b], mat, 1.0)))
            .unwrap();
        assert!(assemble_mass(&model, &model.index_map()).is_err());
        assert_eq!(assemble_damping(&model, &model.index_map()).unwrap().nnz(), 0);
    }

    #[test]
    fn test_force_vector() {
        let (mut model, ids) = portal();
        let lc = LoadCase::new("live", LoadType::Live);
        model
            .add_nodal_load(ids[1], &lc, Force::new([5.0, 0.0, 0.0, 0.0, 0.0, 0.0]))
            .unwrap();
        model
            .add_nodal_load(ids[1], &LoadCase::default(), Force::new([7.0, 0.0, 0.0, 0.0, 0.0, 0.0]))
            .unwrap();

        let beam = FrameElement::new([ids[1], ids[2]], Material::steel(), FrameSection::rectangle(0.2, 0.3).unwrap())
            .with_load(ElementLoad::uniform(&lc, Vector3::new(0.0, -2.0, 0.0)));
        model.add_element(Element::Frame(beam)).unwrap();

        let f = assemble_force_vector(&model, &lc, &model.index_map()).unwrap();
        assert_relative_eq!(f[6], 5.0);
        // Half of the 8 kN beam load at each end
        assert_relative_eq!(f[7], -4.0, epsilon = 1e-10);
        assert_relative_eq!(f[13], -4.0, epsilon = 1e-10);
        let total: f64 = (0..4).map(|n| f[6 * n + 1]).sum();
        assert_relative_eq!(total, -8.0, epsilon = 1e-10);
    }

    #[test]
    fn test_displacement_vector_only_at_fixed_dofs() {
        let (mut model, ids) = portal();
        let lc = LoadCase::default();
        model.set_constraints(ids[0], Constraint::PINNED).unwrap();
        model
            .add_settlement(ids[0], &lc, Displacement::new([0.0, -0.01, 0.0, 0.002, 0.0, 0.0]))
            .unwrap();
        let d = assemble_displacement_vector(&model, &lc, &model.index_map()).unwrap();
        assert_relative_eq!(d[1], -0.01);
        // Rx is released, its settlement is dropped
        assert_relative_eq!(d[3], 0.0);
    }
}
