//! Member loads and their equivalent nodal loads.
//!
//! Loads are described along the member in iso-parametric coordinates
//! `ξ ∈ [-1, 1]` (`ξ = -1` at the first node). Equivalent nodal loads are the
//! work-consistent integrals of the element shape functions against the load:
//! Hermite cubics for bending, linear functions for axial force and torsion.

use crate::element::gauss::{gauss_on_interval, GaussOrder};
use crate::error::{Error, Result};
use crate::types::LoadCase;
use nalgebra::{Matrix3, SVector, Vector3};

/// Local 12-component vector of a two-node line element.
pub type Vector12 = SVector<f64, 12>;

/// Coordinate system a load is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadAxes {
    #[default]
    Global,
    Local,
}

/// Distribution of a member load.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementLoadKind {
    /// Constant force per unit length over the whole member.
    Uniform { intensity: Vector3<f64> },
    /// Point force at `position` (ξ).
    Concentrated { position: f64, force: Vector3<f64> },
    /// Force per unit length `q(ξ) = Σ c_k ξ^k` acting on `[start, end]`.
    ///
    /// At most four coefficients (cubic intensity).
    PartialNonUniform {
        start: f64,
        end: f64,
        coefficients: Vec<Vector3<f64>>,
    },
}

/// A load applied along a member for one load case.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementLoad {
    pub load_case: LoadCase,
    pub axes: LoadAxes,
    pub kind: ElementLoadKind,
}

impl ElementLoad {
    /// Uniform load in global axes.
    pub fn uniform(load_case: &LoadCase, intensity: Vector3<f64>) -> Self {
        Self {
            load_case: load_case.clone(),
            axes: LoadAxes::Global,
            kind: ElementLoadKind::Uniform { intensity },
        }
    }

    /// Point force in global axes.
    pub fn concentrated(load_case: &LoadCase, position: f64, force: Vector3<f64>) -> Self {
        Self {
            load_case: load_case.clone(),
            axes: LoadAxes::Global,
            kind: ElementLoadKind::Concentrated { position, force },
        }
    }

    /// Express the load in member axes instead.
    pub fn in_local_axes(mut self) -> Self {
        self.axes = LoadAxes::Local;
        self
    }

    /// Check positions and polynomial degree.
    pub fn validate(&self) -> Result<()> {
        match &self.kind {
            ElementLoadKind::Uniform { .. } => Ok(()),
            ElementLoadKind::Concentrated { position, .. } => {
                if !(-1.0..=1.0).contains(position) {
                    return Err(Error::Element(format!(
                        "concentrated load position {} outside [-1, 1]",
                        position
                    )));
                }
                Ok(())
            }
            ElementLoadKind::PartialNonUniform {
                start,
                end,
                coefficients,
            } => {
                if !(-1.0 <= *start && start < end && *end <= 1.0) {
                    return Err(Error::Element(format!(
                        "partial load range [{}, {}] is not inside [-1, 1]",
                        start, end
                    )));
                }
                if coefficients.is_empty() || coefficients.len() > 4 {
                    return Err(Error::Element(format!(
                        "partial load needs 1 to 4 coefficients, got {}",
                        coefficients.len()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Force samples `(ξ, force, is_density)` in member axes.
    ///
    /// Distributed loads are sampled at Gauss points with weights folded into
    /// the force, so each sample already is a force resultant per unit ξ.
    fn local_samples(&self, rotation: &Matrix3<f64>) -> Vec<(f64, Vector3<f64>, bool)> {
        let to_local = |v: &Vector3<f64>| match self.axes {
            LoadAxes::Global => rotation * v,
            LoadAxes::Local => *v,
        };
        match &self.kind {
            ElementLoadKind::Uniform { intensity } => {
                let q = to_local(intensity);
                gauss_on_interval(GaussOrder::Three, -1.0, 1.0)
                    .into_iter()
                    .map(|(xi, w)| (xi, q * w, true))
                    .collect()
            }
            ElementLoadKind::Concentrated { position, force } => {
                vec![(*position, to_local(force), false)]
            }
            ElementLoadKind::PartialNonUniform {
                start,
                end,
                coefficients,
            } => gauss_on_interval(GaussOrder::Four, *start, *end)
                .into_iter()
                .map(|(xi, w)| {
                    let q = coefficients
                        .iter()
                        .rev()
                        .fold(Vector3::zeros(), |acc, c| acc * xi + c);
                    (xi, to_local(&q) * w, true)
                })
                .collect(),
        }
    }
}

/// Hermite cubic shape functions at `xi` for a member of length `l`:
/// `[N1, N2, N3, N4]` for `[v1, θ1, v2, θ2]` with `θ = dv/dx`.
pub fn hermite(xi: f64, l: f64) -> [f64; 4] {
    let a = 1.0 - xi;
    let b = 1.0 + xi;
    [
        a * a * (2.0 + xi) / 4.0,
        l * a * a * b / 8.0,
        b * b * (2.0 - xi) / 4.0,
        l * b * b * (xi - 1.0) / 8.0,
    ]
}

/// Linear shape functions at `xi`.
pub fn linear(xi: f64) -> [f64; 2] {
    [(1.0 - xi) / 2.0, (1.0 + xi) / 2.0]
}

/// Work-equivalent nodal loads of a frame member in local axes.
pub fn frame_equivalent_loads(load: &ElementLoad, length: f64, rotation: &Matrix3<f64>) -> Vector12 {
    let mut f = Vector12::zeros();
    for (xi, q, distributed) in load.local_samples(rotation) {
        let q = if distributed { q * length / 2.0 } else { q };
        let [na1, na2] = linear(xi);
        let [n1, n2, n3, n4] = hermite(xi, length);

        f[0] += na1 * q.x;
        f[6] += na2 * q.x;

        f[1] += n1 * q.y;
        f[5] += n2 * q.y;
        f[7] += n3 * q.y;
        f[11] += n4 * q.y;

        // θy = -dw/dx flips the rotational terms
        f[2] += n1 * q.z;
        f[4] -= n2 * q.z;
        f[8] += n3 * q.z;
        f[10] -= n4 * q.z;
    }
    f
}

/// Nodal loads of a pin-ended member: every component shared linearly.
pub fn truss_equivalent_loads(load: &ElementLoad, length: f64, rotation: &Matrix3<f64>) -> Vector12 {
    let mut f = Vector12::zeros();
    for (xi, q, distributed) in load.local_samples(rotation) {
        let q = if distributed { q * length / 2.0 } else { q };
        let [na1, na2] = linear(xi);
        for k in 0..3 {
            f[k] += na1 * q[k];
            f[6 + k] += na2 * q[k];
        }
    }
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn case() -> LoadCase {
        LoadCase::default()
    }

    #[test]
    fn test_hermite_partition_of_unity() {
        for &xi in &[-1.0, -0.3, 0.0, 0.7, 1.0] {
            let [n1, _, n3, _] = hermite(xi, 2.0);
            assert_relative_eq!(n1 + n3, 1.0, epsilon = 1e-14);
        }
        let [n1, n2, n3, n4] = hermite(-1.0, 3.0);
        assert_relative_eq!(n1, 1.0);
        assert_relative_eq!(n2, 0.0);
        assert_relative_eq!(n3, 0.0);
        assert_relative_eq!(n4, 0.0);
    }

    #[test]
    fn test_uniform_load_fixed_end_values() {
        // w L / 2 and w L² / 12 at each end
        let (w, l) = (-10.0, 3.0);
        let load = ElementLoad::uniform(&case(), Vector3::new(0.0, w, 0.0)).in_local_axes();
        let f = frame_equivalent_loads(&load, l, &Matrix3::identity());
        assert_relative_eq!(f[1], w * l / 2.0, epsilon = 1e-12);
        assert_relative_eq!(f[7], w * l / 2.0, epsilon = 1e-12);
        assert_relative_eq!(f[5], w * l * l / 12.0, epsilon = 1e-12);
        assert_relative_eq!(f[11], -w * l * l / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_load_local_z_signs() {
        let (w, l) = (4.0, 2.0);
        let load = ElementLoad::uniform(&case(), Vector3::new(0.0, 0.0, w)).in_local_axes();
        let f = frame_equivalent_loads(&load, l, &Matrix3::identity());
        assert_relative_eq!(f[2], w * l / 2.0, epsilon = 1e-12);
        assert_relative_eq!(f[4], -w * l * l / 12.0, epsilon = 1e-12);
        assert_relative_eq!(f[10], w * l * l / 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_midspan_point_load() {
        // P/2 and P L / 8
        let (p, l) = (-8.0, 4.0);
        let load = ElementLoad::concentrated(&case(), 0.0, Vector3::new(0.0, p, 0.0)).in_local_axes();
        let f = frame_equivalent_loads(&load, l, &Matrix3::identity());
        assert_relative_eq!(f[1], p / 2.0, epsilon = 1e-12);
        assert_relative_eq!(f[5], p * l / 8.0, epsilon = 1e-12);
        assert_relative_eq!(f[11], -p * l / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_partial_constant_load_matches_uniform() {
        let l = 5.0;
        let q = Vector3::new(1.0, -2.0, 3.0);
        let uniform = ElementLoad::uniform(&case(), q);
        let partial = ElementLoad {
            load_case: case(),
            axes: LoadAxes::Global,
            kind: ElementLoadKind::PartialNonUniform {
                start: -1.0,
                end: 1.0,
                coefficients: vec![q],
            },
        };
        let r = Matrix3::identity();
        let a = frame_equivalent_loads(&uniform, l, &r);
        let b = frame_equivalent_loads(&partial, l, &r);
        for k in 0..12 {
            assert_relative_eq!(a[k], b[k], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_triangular_load_total() {
        // q(ξ) = q0 (1 + ξ) / 2 rises from 0 to q0; total force q0 L / 2
        let (q0, l) = (6.0, 2.0);
        let load = ElementLoad {
            load_case: case(),
            axes: LoadAxes::Local,
            kind: ElementLoadKind::PartialNonUniform {
                start: -1.0,
                end: 1.0,
                coefficients: vec![Vector3::new(0.0, q0 / 2.0, 0.0), Vector3::new(0.0, q0 / 2.0, 0.0)],
            },
        };
        let f = frame_equivalent_loads(&load, l, &Matrix3::identity());
        assert_relative_eq!(f[1] + f[7], q0 * l / 2.0, epsilon = 1e-12);
        // 3/20 and 7/20 of the total at each end
        assert_relative_eq!(f[1], 3.0 * q0 * l / 20.0, epsilon = 1e-12);
        assert_relative_eq!(f[7], 7.0 * q0 * l / 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_validation() {
        let bad = ElementLoad::concentrated(&case(), 1.5, Vector3::x());
        assert!(bad.validate().is_err());
        let bad = ElementLoad {
            load_case: case(),
            axes: LoadAxes::Local,
            kind: ElementLoadKind::PartialNonUniform {
                start: 0.5,
                end: 0.0,
                coefficients: vec![Vector3::x()],
            },
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_truss_load_shared_between_ends() {
        let load = ElementLoad::uniform(&case(), Vector3::new(0.0, -3.0, 0.0)).in_local_axes();
        let f = truss_equivalent_loads(&load, 2.0, &Matrix3::identity());
        assert_relative_eq!(f[1], -3.0, epsilon = 1e-12);
        assert_relative_eq!(f[7], -3.0, epsilon = 1e-12);
        assert_relative_eq!(f[5], 0.0);
    }
}
