//! Rigel Core - constrained static solver for 3D frame models
//!
//! Linear static analysis of frame and truss structures with supports,
//! settlements and multi-point constraints:
//! - Element library for 3D beam-columns and axial bars
//! - Parallel assembly using Rayon
//! - Explicit constraint equations reduced to an elimination operator
//! - Partitioned sparse solve (Cholesky and QR from faer)
//!
//! # Architecture
//!
//! A solve runs these stages over a borrowed [`Model`]:
//!
//! - [`assembly`]: global stiffness and load vectors
//! - [`dof`]: fixity, rigid groups, elimination order and the DOF partition
//! - [`equations`]: boundary and MPC rows in one sparse system
//! - [`reduce`]: row reduction to `d = P_delta u + rhs`
//! - [`permutation`]: hollow permutation operators for every re-partitioning
//! - [`solver`]: block elimination with reusable factorizations
//!
//! [`analysis`] drives the stages per load case, [`recovery`] turns the
//! displacements into member end forces.

pub mod types;
pub mod error;
pub mod sparse;
pub mod permutation;
pub mod graph;
pub mod material;
pub mod model;
pub mod element;
pub mod mpc;
pub mod assembly;
pub mod equations;
pub mod dof;
pub mod reduce;
pub mod solver;
pub mod analysis;
pub mod recovery;

pub use types::{Constraint, Displacement, Dof, DofConstraint, Force, LoadCase, LoadType, Point3};
pub use error::{Error, Result};
pub use sparse::CsrMatrix;
pub use permutation::HollowPermutation;
pub use material::{FrameSection, Material};
pub use model::{Model, NodeId, NodeIndexMap};
pub use element::{Element, ElementLoad, FiniteElement, FrameElement, TrussElement};
pub use mpc::{Applicability, HingeLink, MpcElement, RigidElement, VirtualSupport};
pub use dof::{DofClassification, DofClassifier};
pub use reduce::{Reduction, SymbolicReducer};
pub use solver::{PartitionedSolver, SolverConfig, Tolerances};
pub use analysis::{solve, StaticAnalysis, StaticResult};
pub use recovery::{element_forces, ForceField};
