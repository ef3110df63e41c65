//! Core data types for frame analysis.
//!
//! This module defines fundamental types used throughout rigel:
//! - Geometric primitives (points)
//! - Degree of freedom identifiers and nodal support flags
//! - Six-component nodal displacement and force values
//! - Load cases

use nalgebra::{Vector3, Vector6};
use std::ops::{Add, AddAssign, Neg};

/// A point in 3D space.
pub type Point3 = Vector3<f64>;

/// Degrees of freedom carried by every node.
pub const DOFS_PER_NODE: usize = 6;

/// Scalar degree of freedom of a node.
///
/// Global DOF index of component `k` at dense node index `i` is `6 * i + k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dof {
    Dx,
    Dy,
    Dz,
    Rx,
    Ry,
    Rz,
}

impl Dof {
    /// All components in storage order.
    pub const ALL: [Dof; DOFS_PER_NODE] = [Dof::Dx, Dof::Dy, Dof::Dz, Dof::Rx, Dof::Ry, Dof::Rz];

    /// Offset of this component inside a node's block of six DOFs.
    #[inline]
    pub fn offset(self) -> usize {
        self as usize
    }

    /// Translational components (Dx, Dy, Dz).
    pub fn is_translation(self) -> bool {
        self.offset() < 3
    }
}

/// Support state of a single DOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DofConstraint {
    #[default]
    Released,
    Fixed,
}

/// Per-axis support flags of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Constraint(pub [DofConstraint; DOFS_PER_NODE]);

impl Constraint {
    /// No DOF is restrained.
    pub const RELEASED: Constraint = Constraint([DofConstraint::Released; DOFS_PER_NODE]);

    /// All six DOFs restrained.
    pub const FIXED: Constraint = Constraint([DofConstraint::Fixed; DOFS_PER_NODE]);

    /// Translations restrained, rotations free.
    pub const PINNED: Constraint = Constraint([
        DofConstraint::Fixed,
        DofConstraint::Fixed,
        DofConstraint::Fixed,
        DofConstraint::Released,
        DofConstraint::Released,
        DofConstraint::Released,
    ]);

    /// Rotations restrained, translations free.
    pub const ROTATION_FIXED: Constraint = Constraint([
        DofConstraint::Released,
        DofConstraint::Released,
        DofConstraint::Released,
        DofConstraint::Fixed,
        DofConstraint::Fixed,
        DofConstraint::Fixed,
    ]);

    /// Build from six booleans, `true` meaning fixed.
    pub fn from_flags(flags: [bool; DOFS_PER_NODE]) -> Self {
        let mut c = [DofConstraint::Released; DOFS_PER_NODE];
        for (slot, fixed) in c.iter_mut().zip(flags) {
            if fixed {
                *slot = DofConstraint::Fixed;
            }
        }
        Self(c)
    }

    /// Flag of one component.
    #[inline]
    pub fn get(&self, dof: Dof) -> DofConstraint {
        self.0[dof.offset()]
    }

    /// Set the flag of one component.
    pub fn with(mut self, dof: Dof, value: DofConstraint) -> Self {
        self.0[dof.offset()] = value;
        self
    }

    /// True if every component is released.
    pub fn is_released(&self) -> bool {
        self.0.iter().all(|c| *c == DofConstraint::Released)
    }

    /// Number of fixed components.
    pub fn fixed_count(&self) -> usize {
        self.0.iter().filter(|c| **c == DofConstraint::Fixed).count()
    }

    /// Fixed components in storage order.
    pub fn fixed_dofs(&self) -> impl Iterator<Item = Dof> + '_ {
        Dof::ALL
            .into_iter()
            .filter(move |d| self.get(*d) == DofConstraint::Fixed)
    }
}

/// Six-component nodal displacement: [dx, dy, dz, rx, ry, rz].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement(pub Vector6<f64>);

impl Displacement {
    /// Create a displacement from its components.
    pub fn new(components: [f64; DOFS_PER_NODE]) -> Self {
        Self(Vector6::from_row_slice(&components))
    }

    /// Zero displacement.
    pub fn zero() -> Self {
        Self(Vector6::zeros())
    }

    /// Pure translation.
    pub fn translation(dx: f64, dy: f64, dz: f64) -> Self {
        Self::new([dx, dy, dz, 0.0, 0.0, 0.0])
    }

    /// Value of one component.
    #[inline]
    pub fn get(&self, dof: Dof) -> f64 {
        self.0[dof.offset()]
    }

    /// Translational part.
    pub fn displacements(&self) -> Vector3<f64> {
        Vector3::new(self.0[0], self.0[1], self.0[2])
    }

    /// Rotational part.
    pub fn rotations(&self) -> Vector3<f64> {
        Vector3::new(self.0[3], self.0[4], self.0[5])
    }
}

impl Add for Displacement {
    type Output = Displacement;

    fn add(self, rhs: Displacement) -> Displacement {
        Displacement(self.0 + rhs.0)
    }
}

impl AddAssign for Displacement {
    fn add_assign(&mut self, rhs: Displacement) {
        self.0 += rhs.0;
    }
}

/// Six-component nodal force: [fx, fy, fz, mx, my, mz].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Force(pub Vector6<f64>);

impl Force {
    /// Create a force from its components.
    pub fn new(components: [f64; DOFS_PER_NODE]) -> Self {
        Self(Vector6::from_row_slice(&components))
    }

    /// Zero force.
    pub fn zero() -> Self {
        Self(Vector6::zeros())
    }

    /// Value of one component.
    #[inline]
    pub fn get(&self, dof: Dof) -> f64 {
        self.0[dof.offset()]
    }

    /// Force part.
    pub fn forces(&self) -> Vector3<f64> {
        Vector3::new(self.0[0], self.0[1], self.0[2])
    }

    /// Moment part.
    pub fn moments(&self) -> Vector3<f64> {
        Vector3::new(self.0[3], self.0[4], self.0[5])
    }
}

impl Add for Force {
    type Output = Force;

    fn add(self, rhs: Force) -> Force {
        Force(self.0 + rhs.0)
    }
}

impl AddAssign for Force {
    fn add_assign(&mut self, rhs: Force) {
        self.0 += rhs.0;
    }
}

impl Neg for Force {
    type Output = Force;

    fn neg(self) -> Force {
        Force(-self.0)
    }
}

/// Nature of the loads grouped in a load case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadType {
    #[default]
    Default,
    Dead,
    Live,
    Snow,
    Wind,
    Quake,
    Crane,
    Other,
}

/// Named group of loads and settlements solved together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadCase {
    pub name: String,
    pub load_type: LoadType,
}

impl LoadCase {
    /// Create a load case.
    pub fn new(name: impl Into<String>, load_type: LoadType) -> Self {
        Self {
            name: name.into(),
            load_type,
        }
    }
}

impl Default for LoadCase {
    fn default() -> Self {
        Self::new("default", LoadType::Default)
    }
}
