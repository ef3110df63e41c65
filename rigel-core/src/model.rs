//! Structural model: nodes, elements and multi-point constraint elements.
//!
//! Nodes are addressed through stable [`NodeId`] handles. Dense indices (the
//! `i` in DOF `6 i + k`) are never stored on the nodes; each solve builds its
//! own [`NodeIndexMap`] with [`Model::index_map`] and passes it down the
//! pipeline.

use crate::element::Element;
use crate::error::{Error, Result};
use crate::mpc::MpcElement;
use crate::types::{Constraint, Displacement, Dof, Force, LoadCase, Point3, DOFS_PER_NODE};
use std::collections::HashMap;
use std::ops::Range;

/// Stable handle of a node inside a [`Model`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Prescribed support movement of a node for one load case.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub load_case: LoadCase,
    pub displacement: Displacement,
}

/// Concentrated nodal load for one load case.
#[derive(Debug, Clone, PartialEq)]
pub struct NodalLoad {
    pub load_case: LoadCase,
    pub force: Force,
}

/// A node with six DOFs.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    /// Location in global coordinates.
    pub location: Point3,
    /// Per-axis support flags.
    pub constraints: Constraint,
    pub settlements: Vec<Settlement>,
    pub loads: Vec<NodalLoad>,
}

impl Node {
    fn new(id: NodeId, location: Point3) -> Self {
        Self {
            id,
            location,
            constraints: Constraint::RELEASED,
            settlements: Vec::new(),
            loads: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Sum of the settlements defined for `load_case`.
    pub fn settlement_for(&self, load_case: &LoadCase) -> Displacement {
        self.settlements
            .iter()
            .filter(|s| &s.load_case == load_case)
            .fold(Displacement::zero(), |acc, s| acc + s.displacement)
    }

    /// Sum of the nodal loads defined for `load_case`.
    pub fn load_for(&self, load_case: &LoadCase) -> Force {
        self.loads
            .iter()
            .filter(|l| &l.load_case == load_case)
            .fold(Force::zero(), |acc, l| acc + l.force)
    }
}

/// Dense numbering of the nodes of a model, valid for one solve.
#[derive(Debug, Clone)]
pub struct NodeIndexMap {
    indices: HashMap<NodeId, usize>,
    ids: Vec<NodeId>,
}

impl NodeIndexMap {
    /// Dense index of a node.
    pub fn index_of(&self, id: NodeId) -> Result<usize> {
        self.indices
            .get(&id)
            .copied()
            .ok_or_else(|| Error::Model(format!("node {:?} is not part of the model", id)))
    }

    /// Node at a dense index.
    pub fn id_of(&self, index: usize) -> Option<NodeId> {
        self.ids.get(index).copied()
    }

    /// Global DOF index of one component of a node.
    pub fn dof(&self, id: NodeId, dof: Dof) -> Result<usize> {
        Ok(self.index_of(id)? * DOFS_PER_NODE + dof.offset())
    }

    /// Global DOF range of a node.
    pub fn dof_range(&self, id: NodeId) -> Result<Range<usize>> {
        let start = self.index_of(id)? * DOFS_PER_NODE;
        Ok(start..start + DOFS_PER_NODE)
    }

    pub fn n_nodes(&self) -> usize {
        self.ids.len()
    }

    /// Total DOF count, `6 N`.
    pub fn n_dofs(&self) -> usize {
        self.ids.len() * DOFS_PER_NODE
    }
}

/// Frame model: nodes, elements and MPC elements.
#[derive(Debug, Clone, Default)]
pub struct Model {
    nodes: Vec<Node>,
    elements: Vec<Element>,
    mpc_elements: Vec<MpcElement>,
    next_id: usize,
}

impl Model {
    /// Create a new empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a released node, returning its handle.
    pub fn add_node(&mut self, location: Point3) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.push(Node::new(id, location));
        id
    }

    /// Remove a node that no element references.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let referenced = self.elements.iter().any(|e| e.node_ids().contains(&id))
            || self.mpc_elements.iter().any(|e| e.nodes().contains(&id));
        if referenced {
            return Err(Error::Model(format!(
                "node {:?} is still referenced by an element",
                id
            )));
        }
        let pos = self.position(id)?;
        Ok(self.nodes.remove(pos))
    }

    /// Add an element, checking that its nodes exist.
    pub fn add_element(&mut self, element: Element) -> Result<usize> {
        element.validate()?;
        self.check_nodes(element.node_ids())?;
        let idx = self.elements.len();
        self.elements.push(element);
        Ok(idx)
    }

    /// Add an MPC element, checking its node count and that its nodes exist.
    pub fn add_mpc_element(&mut self, element: MpcElement) -> Result<usize> {
        element.validate()?;
        self.check_nodes(element.nodes())?;
        if let Some(central) = element.central_node() {
            self.check_nodes(&[central])?;
        }
        let idx = self.mpc_elements.len();
        self.mpc_elements.push(element);
        Ok(idx)
    }

    /// Set the support flags of a node.
    pub fn set_constraints(&mut self, id: NodeId, constraints: Constraint) -> Result<()> {
        self.node_mut(id)?.constraints = constraints;
        Ok(())
    }

    /// Add a concentrated load to a node.
    pub fn add_nodal_load(&mut self, id: NodeId, load_case: &LoadCase, force: Force) -> Result<()> {
        self.node_mut(id)?.loads.push(NodalLoad {
            load_case: load_case.clone(),
            force,
        });
        Ok(())
    }

    /// Add a support settlement to a node.
    pub fn add_settlement(
        &mut self,
        id: NodeId,
        load_case: &LoadCase,
        displacement: Displacement,
    ) -> Result<()> {
        self.node_mut(id)?.settlements.push(Settlement {
            load_case: load_case.clone(),
            displacement,
        });
        Ok(())
    }

    /// Number of nodes.
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of DOFs, `6 N`.
    pub fn n_dofs(&self) -> usize {
        self.nodes.len() * DOFS_PER_NODE
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn mpc_elements(&self) -> &[MpcElement] {
        &self.mpc_elements
    }

    /// Locations of a list of nodes.
    pub fn locations(&self, ids: &[NodeId]) -> Result<Vec<Point3>> {
        ids.iter()
            .map(|&id| {
                self.node(id)
                    .map(|n| n.location)
                    .ok_or_else(|| Error::Model(format!("unknown node {:?}", id)))
            })
            .collect()
    }

    /// Fresh dense numbering in node storage order.
    pub fn index_map(&self) -> NodeIndexMap {
        let ids: Vec<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        let indices = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        NodeIndexMap { indices, ids }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        let pos = self.position(id)?;
        Ok(&mut self.nodes[pos])
    }

    fn position(&self, id: NodeId) -> Result<usize> {
        self.nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| Error::Model(format!("unknown node {:?}", id)))
    }

    fn check_nodes(&self, ids: &[NodeId]) -> Result<()> {
        for &id in ids {
            self.position(id)?;
        }
        Ok(())
    }
}
