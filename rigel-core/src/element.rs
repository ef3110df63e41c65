//! Element library.
//!
//! [`FiniteElement`] is the capability set every element kind provides; the
//! model stores elements as the [`Element`] sum type and dispatches with a
//! `match`.
//!
//! # Submodules
//!
//! - [`frame`] - 3D Euler-Bernoulli beam-column
//! - [`truss`] - axial bar
//! - [`load`] - member loads and equivalent nodal loads
//! - [`gauss`] - Gauss quadrature rules for numerical integration

use crate::error::{Error, Result};
use crate::model::{NodeId, NodeIndexMap};
use crate::types::{LoadCase, Point3, DOFS_PER_NODE};
use nalgebra::{DMatrix, DVector, Matrix3};

pub mod frame;
pub mod gauss;
pub mod load;
pub mod truss;

pub use frame::FrameElement;
pub use gauss::{gauss_1d, GaussOrder};
pub use load::{ElementLoad, ElementLoadKind, LoadAxes, Vector12};
pub use truss::TrussElement;

/// Finite element interface.
///
/// Matrices are expressed per element DOF in the order
/// `[node 1 (6 DOFs), node 2 (6 DOFs), ...]`. Implementors provide member-axis
/// quantities and the rotation to global axes; the global forms are derived.
///
/// Elements must be thread-safe (Send + Sync) to enable parallel assembly.
pub trait FiniteElement: Send + Sync {
    /// Nodes in element order.
    fn node_ids(&self) -> &[NodeId];

    /// Rotation whose rows are the member axes in global coordinates.
    fn rotation(&self, coords: &[Point3]) -> Result<Matrix3<f64>>;

    fn local_stiffness_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>>;

    fn local_mass_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>>;

    fn local_damping_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>>;

    /// Work-equivalent nodal loads of the member loads of `load_case`, member axes.
    fn local_equivalent_loads(&self, coords: &[Point3], load_case: &LoadCase) -> Result<Vector12>;

    /// Member loads of all load cases.
    fn loads(&self) -> &[ElementLoad];

    /// Global stiffness matrix.
    fn stiffness(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let t = self.transformation(coords)?;
        Ok(t.transpose() * self.local_stiffness_matrix(coords)? * t)
    }

    /// Global mass matrix.
    fn mass(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let t = self.transformation(coords)?;
        Ok(t.transpose() * self.local_mass_matrix(coords)? * t)
    }

    /// Global damping matrix.
    fn damping(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let t = self.transformation(coords)?;
        Ok(t.transpose() * self.local_damping_matrix(coords)? * t)
    }

    /// Global equivalent nodal loads for `load_case`.
    fn equivalent_nodal_loads(&self, coords: &[Point3], load_case: &LoadCase) -> Result<DVector<f64>> {
        let t = self.transformation(coords)?;
        let local = self.local_equivalent_loads(coords, load_case)?;
        Ok(t.transpose() * DVector::from_column_slice(local.as_slice()))
    }

    /// Member end forces in member axes from global element displacements.
    ///
    /// `f = K_local T d - f_equivalent`: the forces the nodes exert on the
    /// member, with the member loads of `load_case` taken out.
    fn end_forces(&self, coords: &[Point3], displacements: &[f64], load_case: &LoadCase) -> Result<DVector<f64>> {
        let t = self.transformation(coords)?;
        if displacements.len() != t.ncols() {
            return Err(Error::DimensionMismatch(format!(
                "element expects {} displacements, got {}",
                t.ncols(),
                displacements.len()
            )));
        }
        let local_d = &t * DVector::from_column_slice(displacements);
        let local = self.local_equivalent_loads(coords, load_case)?;
        Ok(self.local_stiffness_matrix(coords)? * local_d - DVector::from_column_slice(local.as_slice()))
    }

    #[doc(hidden)]
    fn transformation(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        Ok(frame::transformation(&self.rotation(coords)?))
    }
}

/// Element kinds a model can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Frame(FrameElement),
    Truss(TrussElement),
}

impl Element {
    /// The element as its capability set.
    pub fn as_finite_element(&self) -> &dyn FiniteElement {
        match self {
            Element::Frame(e) => e,
            Element::Truss(e) => e,
        }
    }

    pub fn node_ids(&self) -> &[NodeId] {
        self.as_finite_element().node_ids()
    }

    /// Global DOF indices of the element, node by node.
    pub fn dof_indices(&self, index: &NodeIndexMap) -> Result<Vec<usize>> {
        let mut dofs = Vec::with_capacity(self.node_ids().len() * DOFS_PER_NODE);
        for &id in self.node_ids() {
            dofs.extend(index.dof_range(id)?);
        }
        Ok(dofs)
    }

    /// Reject malformed elements before they enter a model.
    pub fn validate(&self) -> Result<()> {
        let nodes = self.node_ids();
        if nodes.windows(2).any(|w| w[0] == w[1]) {
            return Err(Error::Element(format!(
                "element connects node {:?} to itself",
                nodes[0]
            )));
        }
        if let Element::Truss(t) = self {
            if t.area <= 0.0 {
                return Err(Error::InvalidMaterial("truss area must be positive".into()));
            }
        }
        for load in self.as_finite_element().loads() {
            load.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{FrameSection, Material};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn frame() -> Element {
        let section = FrameSection::new(1e-2, 1e-5, 2e-5, 3e-5).unwrap();
        Element::Frame(FrameElement::new([NodeId(0), NodeId(1)], Material::steel(), section))
    }

    #[test]
    fn test_dispatch_matches_variant() {
        let e = frame();
        assert_eq!(e.node_ids(), &[NodeId(0), NodeId(1)]);
        let coords = [Point3::zeros(), Point3::new(2.0, 0.0, 0.0)];
        let k = e.as_finite_element().stiffness(&coords).unwrap();
        assert_eq!(k.shape(), (12, 12));
    }

    #[test]
    fn test_end_forces_of_fixed_fixed_member_under_load() {
        // Both ends restrained: end forces are the negated equivalent loads
        let lc = LoadCase::default();
        let mut e = frame();
        if let Element::Frame(f) = &mut e {
            f.loads.push(ElementLoad::uniform(&lc, Vector3::new(0.0, -6.0, 0.0)));
        }
        let coords = [Point3::zeros(), Point3::new(3.0, 0.0, 0.0)];
        let f = e.as_finite_element().end_forces(&coords, &[0.0; 12], &lc).unwrap();
        assert_relative_eq!(f[1], 9.0, epsilon = 1e-10);
        assert_relative_eq!(f[5], 4.5, epsilon = 1e-10);
    }

    #[test]
    fn test_validate_rejects_degenerate_elements() {
        let bad = Element::Truss(TrussElement::new([NodeId(2), NodeId(2)], Material::steel(), 1.0));
        assert!(bad.validate().is_err());
        let bad = Element::Truss(TrussElement::new([NodeId(0), NodeId(1)], Material::steel(), 0.0));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_end_forces_length_check() {
        let coords = [Point3::zeros(), Point3::x()];
        let err = frame().as_finite_element().end_forces(&coords, &[0.0; 6], &LoadCase::default());
        assert!(matches!(err, Err(Error::DimensionMismatch(_))));
    }
}
