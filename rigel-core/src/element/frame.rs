//! Two-node 3D Euler-Bernoulli frame element.
//!
//! DOF order per element: `[u1 v1 w1 θx1 θy1 θz1 u2 v2 w2 θx2 θy2 θz2]` in
//! member axes. Local x runs from the first to the second node. Global Y is
//! "up": for a non-vertical member local z is `x × Ŷ` and local y completes
//! the right-handed set; for a vertical member local y is `∓X` and local z is
//! `Z`. The web rotation turns y and z about x.

use crate::element::load::{frame_equivalent_loads, ElementLoad, Vector12};
use crate::element::FiniteElement;
use crate::error::{Error, Result};
use crate::material::{FrameSection, Material};
use crate::model::NodeId;
use crate::types::{LoadCase, Point3};
use nalgebra::{DMatrix, Matrix3, Vector3};

/// Relative tolerance for treating a member as parallel to global Y.
const VERTICAL_TOLERANCE: f64 = 1e-9;

/// 3D beam-column with axial, torsional and biaxial bending stiffness.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameElement {
    pub nodes: [NodeId; 2],
    pub material: Material,
    pub section: FrameSection,
    /// Rotation of the section about the member axis, radians.
    pub web_rotation: f64,
    pub loads: Vec<ElementLoad>,
}

impl FrameElement {
    pub fn new(nodes: [NodeId; 2], material: Material, section: FrameSection) -> Self {
        Self {
            nodes,
            material,
            section,
            web_rotation: 0.0,
            loads: Vec::new(),
        }
    }

    pub fn with_web_rotation(mut self, angle: f64) -> Self {
        self.web_rotation = angle;
        self
    }

    pub fn with_load(mut self, load: ElementLoad) -> Self {
        self.loads.push(load);
        self
    }

    /// Stiffness in member axes.
    pub fn local_stiffness(&self, length: f64) -> DMatrix<f64> {
        let e = self.material.youngs_modulus;
        let g = self.material.shear_modulus();
        let s = &self.section;
        let l = length;

        let mut k = DMatrix::zeros(12, 12);

        let ea = e * s.area / l;
        k[(0, 0)] = ea;
        k[(0, 6)] = -ea;
        k[(6, 6)] = ea;

        let gj = g * s.j / l;
        k[(3, 3)] = gj;
        k[(3, 9)] = -gj;
        k[(9, 9)] = gj;

        // Bending in the local x-y plane (about z)
        let ei = e * s.iz;
        k[(1, 1)] = 12.0 * ei / l.powi(3);
        k[(1, 5)] = 6.0 * ei / l.powi(2);
        k[(1, 7)] = -12.0 * ei / l.powi(3);
        k[(1, 11)] = 6.0 * ei / l.powi(2);
        k[(5, 5)] = 4.0 * ei / l;
        k[(5, 7)] = -6.0 * ei / l.powi(2);
        k[(5, 11)] = 2.0 * ei / l;
        k[(7, 7)] = 12.0 * ei / l.powi(3);
        k[(7, 11)] = -6.0 * ei / l.powi(2);
        k[(11, 11)] = 4.0 * ei / l;

        // Bending in the local x-z plane (about y)
        let ei = e * s.iy;
        k[(2, 2)] = 12.0 * ei / l.powi(3);
        k[(2, 4)] = -6.0 * ei / l.powi(2);
        k[(2, 8)] = -12.0 * ei / l.powi(3);
        k[(2, 10)] = -6.0 * ei / l.powi(2);
        k[(4, 4)] = 4.0 * ei / l;
        k[(4, 8)] = 6.0 * ei / l.powi(2);
        k[(4, 10)] = 2.0 * ei / l;
        k[(8, 8)] = 12.0 * ei / l.powi(3);
        k[(8, 10)] = 6.0 * ei / l.powi(2);
        k[(10, 10)] = 4.0 * ei / l;

        mirror_upper(&mut k);
        k
    }

    /// Consistent inertia-like matrix in member axes for a distributed
    /// coefficient `rho` (density for mass, viscous coefficient for damping).
    pub fn local_consistent_matrix(&self, rho: f64, length: f64) -> DMatrix<f64> {
        let l = length;
        let m = rho * self.section.area * l;
        let mut k = DMatrix::zeros(12, 12);

        k[(0, 0)] = m / 3.0;
        k[(0, 6)] = m / 6.0;
        k[(6, 6)] = m / 3.0;

        let mt = rho * self.section.polar_moment() * l;
        k[(3, 3)] = mt / 3.0;
        k[(3, 9)] = mt / 6.0;
        k[(9, 9)] = mt / 3.0;

        let c = m / 420.0;
        k[(1, 1)] = 156.0 * c;
        k[(1, 5)] = 22.0 * l * c;
        k[(1, 7)] = 54.0 * c;
        k[(1, 11)] = -13.0 * l * c;
        k[(5, 5)] = 4.0 * l * l * c;
        k[(5, 7)] = 13.0 * l * c;
        k[(5, 11)] = -3.0 * l * l * c;
        k[(7, 7)] = 156.0 * c;
        k[(7, 11)] = -22.0 * l * c;
        k[(11, 11)] = 4.0 * l * l * c;

        k[(2, 2)] = 156.0 * c;
        k[(2, 4)] = -22.0 * l * c;
        k[(2, 8)] = 54.0 * c;
        k[(2, 10)] = 13.0 * l * c;
        k[(4, 4)] = 4.0 * l * l * c;
        k[(4, 8)] = -13.0 * l * c;
        k[(4, 10)] = -3.0 * l * l * c;
        k[(8, 8)] = 156.0 * c;
        k[(8, 10)] = 22.0 * l * c;
        k[(10, 10)] = 4.0 * l * l * c;

        mirror_upper(&mut k);
        k
    }

    fn geometry(&self, coords: &[Point3]) -> Result<(f64, Matrix3<f64>)> {
        member_geometry(coords, self.web_rotation)
    }
}

impl FiniteElement for FrameElement {
    fn node_ids(&self) -> &[NodeId] {
        &self.nodes
    }

    fn rotation(&self, coords: &[Point3]) -> Result<Matrix3<f64>> {
        Ok(self.geometry(coords)?.1)
    }

    fn local_stiffness_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let (l, _) = self.geometry(coords)?;
        Ok(self.local_stiffness(l))
    }

    fn local_mass_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let rho = self.material.require_density("mass")?;
        let (l, _) = self.geometry(coords)?;
        Ok(self.local_consistent_matrix(rho, l))
    }

    fn local_damping_matrix(&self, coords: &[Point3]) -> Result<DMatrix<f64>> {
        let (l, _) = self.geometry(coords)?;
        Ok(self.local_consistent_matrix(self.material.damping.unwrap_or(0.0), l))
    }

    fn local_equivalent_loads(&self, coords: &[Point3], load_case: &LoadCase) -> Result<Vector12> {
        let (l, r) = self.geometry(coords)?;
        Ok(self
            .loads
            .iter()
            .filter(|load| &load.load_case == load_case)
            .fold(Vector12::zeros(), |acc, load| acc + frame_equivalent_loads(load, l, &r)))
    }

    fn loads(&self) -> &[ElementLoad] {
        &self.loads
    }
}

/// Member length and rotation matrix (rows are local axes in global coordinates).
pub(crate) fn member_geometry(coords: &[Point3], web_rotation: f64) -> Result<(f64, Matrix3<f64>)> {
    if coords.len() != 2 {
        return Err(Error::Element(format!(
            "line element needs 2 node coordinates, got {}",
            coords.len()
        )));
    }
    let d = coords[1] - coords[0];
    let length = d.norm();
    if length <= f64::EPSILON {
        return Err(Error::Element("line element has zero length".into()));
    }
    let x = d / length;

    let (y, z) = if x.x.abs() < VERTICAL_TOLERANCE && x.z.abs() < VERTICAL_TOLERANCE {
        let y = if x.y > 0.0 { -Vector3::x() } else { Vector3::x() };
        (y, Vector3::z())
    } else {
        let z = x.cross(&Vector3::y()).normalize();
        (z.cross(&x), z)
    };

    let (s, c) = web_rotation.sin_cos();
    let y_rot = y * c + z * s;
    let z_rot = z * c - y * s;

    Ok((length, Matrix3::from_rows(&[x.transpose(), y_rot.transpose(), z_rot.transpose()])))
}

/// 12×12 block-diagonal transformation `diag(R, R, R, R)`.
pub(crate) fn transformation(r: &Matrix3<f64>) -> DMatrix<f64> {
    let mut t = DMatrix::zeros(12, 12);
    for b in 0..4 {
        t.view_mut((3 * b, 3 * b), (3, 3)).copy_from(r);
    }
    t
}

fn mirror_upper(k: &mut DMatrix<f64>) {
    for i in 0..k.nrows() {
        for j in (i + 1)..k.ncols() {
            k[(j, i)] = k[(i, j)];
        }
    }
}
