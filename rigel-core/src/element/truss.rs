//! Two-node axial bar.
//!
//! Carries axial force only; rotational DOFs of its nodes receive no stiffness
//! and must be restrained or tied by another element.

use crate::element::frame::member_geometry;
use crate::element::load::{truss_equivalent_loads, ElementLoad, Vector12};
use crate::element::FiniteElement;
use crate::error::Result;
use crate::material::Material;
use crate::model::NodeId;
use crate::types::{LoadCase, Point3};
use nalgebra::{DMatrix, Matrix3};

#[derive(Debug, Clone, PartialEq)]
pub struct TrussElement {
    pub nodes: [NodeId; 2],
    pub material: Material,
    /// Cross-sectional area.
    pub area: f64,
    pub loads: Vec<ElementLoad>,
}

impl TrussElement {
    pub fn new(nodes: [NodeId; 2], material: Material, area: f64) -> Self {
        Self {
            nodes,
            material,
            area,
            loads: Vec::new(),
        }
    }

    pub fn with_load(mut self, load: ElementLoad) -> Self {
        self.loads.push(load);
        self
    }

    /// Consistent translational matrix for a distributed coefficient `rho`.
    fn consistent(&self, rho: f64, length: f64) -> DMatrix<f64> {
        let m = rho * self.area * length;
        let mut k = DMatrix::zeros(12, 12);
        for d in 0..3 {
            k[(d, d)] = m / 3.0;
            k[(d + 6, d + 6)] = m / 3.0;
            k[(d, d + 6)] = m / 6.0;
            k[(d + 6, d)] = m / 6.0;
        }
        k
    }
}

impl FiniteElement for TrussElement {
    fn node_ids(&self) -> &[NodeId] {
        &self.nodes
    }

    fn rotation(&self, coords: &[Point3]) -> Result<Matrix3<f64>> {
        Ok(member_geometry(coords, 0.0)?.1)
    }

    fn local_stiffness_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let (l, _) = member_geometry(coords, 0.0)?;
        let k = self.material.youngs_modulus * self.area / l;
        let mut ke = DMatrix::zeros(12, 12);
        ke[(0, 0)] = k;
        ke[(6, 6)] = k;
        ke[(0, 6)] = -k;
        ke[(6, 0)] = -k;
        Ok(ke)
    }

    fn local_mass_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let rho = self.material.require_density("mass")?;
        let (l, _) = member_geometry(coords, 0.0)?;
        Ok(self.consistent(rho, l))
    }

    fn local_damping_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let (l, _) = member_geometry(coords, 0.0)?;
        Ok(self.consistent(self.material.damping.unwrap_or(0.0), l))
    }

    fn local_equivalent_loads(&self, coords: &[Point3], load_case: &LoadCase) -> Result<Vector12> {
        let (l, r) = member_geometry(coords, 0.0)?;
        Ok(self
            .loads
            .iter()
            .filter(|load| &load.load_case == load_case)
            .fold(Vector12::zeros(), |acc, load| acc + truss_equivalent_loads(load, l, &r)))
    }

    fn loads(&self) -> &[ElementLoad] {
        &self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_inclined_bar_stiffness() {
        let bar = TrussElement::new([NodeId(0), NodeId(1)], Material::steel(), 1e-3);
        let coords = [Point3::zeros(), Point3::new(3.0, 4.0, 0.0)];
        let k = bar.stiffness(&coords).unwrap();
        let ea_l = 200e9 * 1e-3 / 5.0;

        // k_xx = EA/L cos², k_xy = EA/L cos sin
        assert_relative_eq!(k[(0, 0)], ea_l * 0.36, max_relative = 1e-12);
        assert_relative_eq!(k[(0, 1)], ea_l * 0.48, max_relative = 1e-12);
        assert_relative_eq!(k[(0, 6)], -ea_l * 0.36, max_relative = 1e-12);
        // No rotational stiffness
        assert_eq!(k.row(3).abs().max(), 0.0);

        // Motion perpendicular to the bar is free
        let mut u = DVector::zeros(12);
        u[6] = -4.0;
        u[7] = 3.0;
        assert!((&k * &u).abs().max() < 1e-3);
    }

    #[test]
    fn test_mass_sums_to_total() {
        let bar = TrussElement::new([NodeId(0), NodeId(1)], Material::steel(), 2e-3);
        let m = bar.mass(&[Point3::zeros(), Point3::new(0.0, 0.0, 2.0)]).unwrap();
        let total: f64 = (0..12).flat_map(|i| (0..12).map(move |j| (i, j)))
            .filter(|(i, j)| i % 6 == 1 && j % 6 == 1)
            .map(|(i, j)| m[(i, j)])
            .sum();
        assert_relative_eq!(total, 7850.0 * 2e-3 * 2.0, epsilon = 1e-9);
    }
}
