//! Multi-point constraint (MPC) elements.
//!
//! An MPC element contributes linear equations between DOFs instead of
//! stiffness. Each equation is one row of a sparse `count × (6N + 1)` matrix,
//! the last column holding the right-hand side, with the row convention
//! `Σ a_j d_j = c`.

use crate::error::{Error, Result};
use crate::model::{Model, NodeId, NodeIndexMap};
use crate::sparse::{CsrMatrix, TripletMatrix};
use crate::types::{Constraint, Displacement, Dof, LoadCase, LoadType, DOFS_PER_NODE};

/// Distance under which hinge-linked nodes count as coincident.
const COINCIDENCE_TOLERANCE: f64 = 1e-6;

/// Which load cases an MPC element takes part in.
#[derive(Debug, Clone, PartialEq)]
pub struct Applicability {
    pub use_for_all_loads: bool,
    pub load_types: Vec<LoadType>,
    pub load_cases: Vec<LoadCase>,
}

impl Applicability {
    /// Active for every load case.
    pub fn all() -> Self {
        Self {
            use_for_all_loads: true,
            load_types: Vec::new(),
            load_cases: Vec::new(),
        }
    }

    /// Active only for the listed load cases.
    pub fn cases(load_cases: Vec<LoadCase>) -> Self {
        Self {
            use_for_all_loads: false,
            load_types: Vec::new(),
            load_cases,
        }
    }

    /// Active only for load cases of the listed types.
    pub fn types(load_types: Vec<LoadType>) -> Self {
        Self {
            use_for_all_loads: false,
            load_types,
            load_cases: Vec::new(),
        }
    }

    pub fn applies_to(&self, load_case: &LoadCase) -> bool {
        self.use_for_all_loads
            || self.load_types.contains(&load_case.load_type)
            || self.load_cases.contains(load_case)
    }
}

impl Default for Applicability {
    fn default() -> Self {
        Self::all()
    }
}

/// Nodes that move as one rigid body.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidElement {
    pub nodes: Vec<NodeId>,
    /// Preferred master node of the rigid group.
    pub central_node: Option<NodeId>,
    pub applicability: Applicability,
}

impl RigidElement {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self {
            nodes,
            central_node: None,
            applicability: Applicability::all(),
        }
    }

    pub fn with_central_node(mut self, node: NodeId) -> Self {
        self.central_node = Some(node);
        self
    }

    pub fn with_applicability(mut self, applicability: Applicability) -> Self {
        self.applicability = applicability;
        self
    }
}

/// Coincident nodes sharing translations while rotating independently.
#[derive(Debug, Clone, PartialEq)]
pub struct HingeLink {
    pub nodes: Vec<NodeId>,
    pub central_node: Option<NodeId>,
    pub applicability: Applicability,
}

impl HingeLink {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self {
            nodes,
            central_node: None,
            applicability: Applicability::all(),
        }
    }
}

/// Support applied through constraint equations instead of node flags.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualSupport {
    pub nodes: Vec<NodeId>,
    pub constraint: Constraint,
    /// Prescribed movement of the restrained components.
    pub settlement: Displacement,
    pub applicability: Applicability,
}

impl VirtualSupport {
    pub fn new(nodes: Vec<NodeId>, constraint: Constraint) -> Self {
        Self {
            nodes,
            constraint,
            settlement: Displacement::zero(),
            applicability: Applicability::all(),
        }
    }

    pub fn with_settlement(mut self, settlement: Displacement) -> Self {
        self.settlement = settlement;
        self
    }
}

/// MPC element kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum MpcElement {
    Rigid(RigidElement),
    Hinge(HingeLink),
    VirtualSupport(VirtualSupport),
}

impl MpcElement {
    pub fn nodes(&self) -> &[NodeId] {
        match self {
            MpcElement::Rigid(e) => &e.nodes,
            MpcElement::Hinge(e) => &e.nodes,
            MpcElement::VirtualSupport(e) => &e.nodes,
        }
    }

    pub fn central_node(&self) -> Option<NodeId> {
        match self {
            MpcElement::Rigid(e) => e.central_node,
            MpcElement::Hinge(e) => e.central_node,
            MpcElement::VirtualSupport(_) => None,
        }
    }

    pub fn applicability(&self) -> &Applicability {
        match self {
            MpcElement::Rigid(e) => &e.applicability,
            MpcElement::Hinge(e) => &e.applicability,
            MpcElement::VirtualSupport(e) => &e.applicability,
        }
    }

    pub fn applies_to(&self, load_case: &LoadCase) -> bool {
        self.applicability().applies_to(load_case)
    }

    pub fn is_rigid(&self) -> bool {
        matches!(self, MpcElement::Rigid(_))
    }

    /// Rigid and hinge links need two distinct nodes, a virtual support one.
    pub fn validate(&self) -> Result<()> {
        let required = match self {
            MpcElement::Rigid(_) | MpcElement::Hinge(_) => 2,
            MpcElement::VirtualSupport(_) => 1,
        };
        let found = distinct(self.nodes()).len();
        if found < required {
            return Err(Error::Model(format!(
                "MPC element needs at least {} distinct node(s), got {}",
                required, found
            )));
        }
        Ok(())
    }

    /// DOFs held against the ground. Rigid and hinge links only tie DOFs to
    /// each other and hold none.
    pub fn restrained_dofs(&self, index: &NodeIndexMap) -> Result<Vec<usize>> {
        match self {
            MpcElement::VirtualSupport(e) => {
                let mut dofs = Vec::with_capacity(self.extra_equations_count());
                for &node in &distinct(&e.nodes) {
                    for dof in e.constraint.fixed_dofs() {
                        dofs.push(index.dof(node, dof)?);
                    }
                }
                Ok(dofs)
            }
            MpcElement::Rigid(_) | MpcElement::Hinge(_) => Ok(Vec::new()),
        }
    }

    /// Number of equation rows this element contributes.
    pub fn extra_equations_count(&self) -> usize {
        match self {
            MpcElement::Rigid(e) => DOFS_PER_NODE * distinct(&e.nodes).len().saturating_sub(1),
            MpcElement::Hinge(e) => 3 * distinct(&e.nodes).len().saturating_sub(1),
            MpcElement::VirtualSupport(e) => e.constraint.fixed_count() * distinct(&e.nodes).len(),
        }
    }

    /// Equation rows as a sparse `count × (6N + 1)` matrix.
    pub fn extra_equations(&self, model: &Model, index: &NodeIndexMap) -> Result<CsrMatrix> {
        let n_cols = index.n_dofs() + 1;
        let rhs = index.n_dofs();
        let mut t = TripletMatrix::new(self.extra_equations_count(), n_cols);

        match self {
            MpcElement::Rigid(e) => {
                let nodes = distinct(&e.nodes);
                let master = reference_node(&nodes, e.central_node)?;
                let xm = node_location(model, master)?;
                let mut row = 0;
                for &slave in nodes.iter().filter(|&&n| n != master) {
                    // u_s = u_m + θ_m × r,  θ_s = θ_m
                    let r = node_location(model, slave)? - xm;
                    for k in 0..3 {
                        t.add(row + k, index.dof(slave, Dof::ALL[k])?, 1.0);
                        t.add(row + k, index.dof(master, Dof::ALL[k])?, -1.0);
                    }
                    let (rdx, rdy, rdz) = (index.dof(master, Dof::Rx)?, index.dof(master, Dof::Ry)?, index.dof(master, Dof::Rz)?);
                    // (θ × r)x = θy rz - θz ry
                    t.add(row, rdy, -r.z);
                    t.add(row, rdz, r.y);
                    // (θ × r)y = θz rx - θx rz
                    t.add(row + 1, rdz, -r.x);
                    t.add(row + 1, rdx, r.z);
                    // (θ × r)z = θx ry - θy rx
                    t.add(row + 2, rdx, -r.y);
                    t.add(row + 2, rdy, r.x);
                    for k in 3..6 {
                        t.add(row + k, index.dof(slave, Dof::ALL[k])?, 1.0);
                        t.add(row + k, index.dof(master, Dof::ALL[k])?, -1.0);
                    }
                    row += DOFS_PER_NODE;
                }
            }
            MpcElement::Hinge(e) => {
                let nodes = distinct(&e.nodes);
                let master = reference_node(&nodes, e.central_node)?;
                let xm = node_location(model, master)?;
                let mut row = 0;
                for &slave in nodes.iter().filter(|&&n| n != master) {
                    let gap = (node_location(model, slave)? - xm).norm();
                    if gap > COINCIDENCE_TOLERANCE {
                        return Err(Error::Element(format!(
                            "hinge link nodes {:?} and {:?} are {} apart",
                            master, slave, gap
                        )));
                    }
                    for k in 0..3 {
                        t.add(row + k, index.dof(slave, Dof::ALL[k])?, 1.0);
                        t.add(row + k, index.dof(master, Dof::ALL[k])?, -1.0);
                    }
                    row += 3;
                }
            }
            MpcElement::VirtualSupport(e) => {
                let mut row = 0;
                for &node in &distinct(&e.nodes) {
                    for dof in e.constraint.fixed_dofs() {
                        t.add(row, index.dof(node, dof)?, 1.0);
                        t.add_exact(row, rhs, e.settlement.get(dof));
                        row += 1;
                    }
                }
            }
        }

        t.to_csr()
    }
}

/// Nodes in first-occurrence order without repeats.
fn distinct(nodes: &[NodeId]) -> Vec<NodeId> {
    let mut out: Vec<NodeId> = Vec::with_capacity(nodes.len());
    for &n in nodes {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

/// Central node if it belongs to the element, else the first node.
fn reference_node(nodes: &[NodeId], central: Option<NodeId>) -> Result<NodeId> {
    central
        .filter(|c| nodes.contains(c))
        .or_else(|| nodes.first().copied())
        .ok_or_else(|| Error::Model("MPC element has no nodes".into()))
}

fn node_location(model: &Model, id: NodeId) -> Result<nalgebra::Vector3<f64>> {
    model
        .node(id)
        .map(|n| n.location)
        .ok_or_else(|| Error::Model(format!("unknown node {:?}", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector, Vector3};

    fn three_nodes() -> (Model, Vec<NodeId>) {
        let mut model = Model::new();
        let ids = vec![
            model.add_node(Vector3::new(0.0, 0.0, 0.0)),
            model.add_node(Vector3::new(1.0, 2.0, 0.0)),
            model.add_node(Vector3::new(-1.0, 0.5, 3.0)),
        ];
        (model, ids)
    }

    #[test]
    fn test_applicability() {
        let dead = LoadCase::new("dead", LoadType::Dead);
        let wind = LoadCase::new("wind", LoadType::Wind);
        assert!(Applicability::all().applies_to(&dead));
        assert!(Applicability::types(vec![LoadType::Dead]).applies_to(&dead));
        assert!(!Applicability::types(vec![LoadType::Dead]).applies_to(&wind));
        assert!(Applicability::cases(vec![wind.clone()]).applies_to(&wind));
        assert!(!Applicability::cases(vec![wind]).applies_to(&dead));
    }

    #[test]
    fn test_rigid_rows_satisfied_by_rigid_motion() {
        let (mut model, ids) = three_nodes();
        let rigid = MpcElement::Rigid(RigidElement::new(ids.clone()));
        model.add_mpc_element(rigid.clone()).unwrap();
        let index = model.index_map();

        let eqs = rigid.extra_equations(&model, &index).unwrap();
        assert_eq!(eqs.nrows(), 12);
        assert_eq!(eqs.ncols(), 19);

        // Small rigid motion: translation t, rotation w about the origin
        let t = Vector3::new(0.1, -0.2, 0.05);
        let w = Vector3::new(0.01, 0.02, -0.03);
        let mut d = DVector::zeros(19);
        for node in model.nodes() {
            let i = index.index_of(node.id()).unwrap();
            let u = t + w.cross(&node.location);
            for k in 0..3 {
                d[6 * i + k] = u[k];
                d[6 * i + 3 + k] = w[k];
            }
        }
        let residual = DMatrix::from(&eqs) * d;
        assert!(residual.abs().max() < 1e-14);
    }

    #[test]
    fn test_rigid_master_is_central_node() {
        let (mut model, ids) = three_nodes();
        let rigid = MpcElement::Rigid(RigidElement::new(ids.clone()).with_central_node(ids[2]));
        model.add_mpc_element(rigid.clone()).unwrap();
        let index = model.index_map();
        let dense = DMatrix::from(&rigid.extra_equations(&model, &index).unwrap());
        // Master translations carry -1 in every translational row
        let master_dx = index.dof(ids[2], Dof::Dx).unwrap();
        assert_relative_eq!(dense[(0, master_dx)], -1.0);
        assert_relative_eq!(dense[(6, master_dx)], -1.0);
    }

    #[test]
    fn test_hinge_link_rows() {
        let mut model = Model::new();
        let a = model.add_node(Vector3::new(1.0, 1.0, 1.0));
        let b = model.add_node(Vector3::new(1.0, 1.0, 1.0));
        let hinge = MpcElement::Hinge(HingeLink::new(vec![a, b, a]));
        model.add_mpc_element(hinge.clone()).unwrap();
        assert_eq!(hinge.extra_equations_count(), 3);
        let eqs = hinge.extra_equations(&model, &model.index_map()).unwrap();
        assert_eq!(eqs.nnz(), 6);
    }

    #[test]
    fn test_hinge_link_requires_coincident_nodes() {
        let (model, ids) = three_nodes();
        let hinge = MpcElement::Hinge(HingeLink::new(vec![ids[0], ids[1]]));
        assert!(matches!(
            hinge.extra_equations(&model, &model.index_map()),
            Err(Error::Element(_))
        ));
    }

    #[test]
    fn test_node_count_validation() {
        let (mut model, ids) = three_nodes();
        let empty = MpcElement::Rigid(RigidElement::new(vec![]));
        assert!(matches!(model.add_mpc_element(empty.clone()), Err(Error::Model(_))));
        assert!(matches!(empty.extra_equations(&model, &model.index_map()), Err(Error::Model(_))));

        let single = MpcElement::Hinge(HingeLink::new(vec![ids[0], ids[0]]));
        assert!(matches!(model.add_mpc_element(single), Err(Error::Model(_))));
        let support = MpcElement::VirtualSupport(VirtualSupport::new(vec![ids[0]], Constraint::FIXED));
        assert_eq!(model.add_mpc_element(support).unwrap(), 0);
        assert_eq!(model.mpc_elements().len(), 1);
    }

    #[test]
    fn test_restrained_dofs() {
        let (model, ids) = three_nodes();
        let index = model.index_map();
        let support = MpcElement::VirtualSupport(VirtualSupport::new(vec![ids[1], ids[1]], Constraint::PINNED));
        assert_eq!(support.restrained_dofs(&index).unwrap(), vec![6, 7, 8]);
        let rigid = MpcElement::Rigid(RigidElement::new(ids));
        assert!(rigid.restrained_dofs(&index).unwrap().is_empty());
    }

    #[test]
    fn test_virtual_support_rows_carry_settlement() {
        let (model, ids) = three_nodes();
        let support = MpcElement::VirtualSupport(
            VirtualSupport::new(vec![ids[1]], Constraint::PINNED)
                .with_settlement(Displacement::translation(0.0, -0.01, 0.0)),
        );
        assert_eq!(support.extra_equations_count(), 3);
        let index = model.index_map();
        let dense = DMatrix::from(&support.extra_equations(&model, &index).unwrap());
        assert_relative_eq!(dense[(1, index.dof(ids[1], Dof::Dy).unwrap())], 1.0);
        assert_relative_eq!(dense[(1, 18)], -0.01);
        assert_relative_eq!(dense[(0, 18)], 0.0);
    }
}
