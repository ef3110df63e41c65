//! DOF classification.
//!
//! Every scalar DOF is classified twice:
//!
//! - [`Fixity`]: fixed by a node support or released
//! - [`CalcRole`]: primary (an independent unknown) or secondary (expressed
//!   through primaries by an MPC row)
//!
//! The two together split the DOFs into the four groups of [`DofPartition`],
//! which is the layout the partitioned solver works in.

use crate::equations::{self, ConstraintEquations};
use crate::error::{Error, Result};
use crate::graph::SparseGraph;
use crate::model::{Model, NodeId, NodeIndexMap};
use crate::mpc::MpcElement;
use crate::permutation::HollowPermutation;
use crate::reduce::{row_reduce, rows_of, Rref, SparseRow};
use crate::solver::Tolerances;
use crate::sparse::{CsrMatrix, TripletMatrix};
use crate::types::{Dof, DofConstraint, LoadCase, DOFS_PER_NODE};
use log::debug;

/// Support state of a DOF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fixity {
    Fixed,
    Released,
}

/// Whether a DOF is solved for or derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalcRole {
    Primary,
    Secondary,
}

/// Nodes moving as one rigid body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigidGroup {
    /// Members in dense index order.
    pub nodes: Vec<NodeId>,
    pub master: NodeId,
}

/// The four DOF groups, in partition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DofGroup {
    SecondaryFixed,
    SecondaryReleased,
    PrimaryFixed,
    PrimaryReleased,
}

impl DofGroup {
    pub const ALL: [DofGroup; 4] = [
        DofGroup::SecondaryFixed,
        DofGroup::SecondaryReleased,
        DofGroup::PrimaryFixed,
        DofGroup::PrimaryReleased,
    ];

    fn of(fixity: Fixity, role: CalcRole) -> Self {
        match (role, fixity) {
            (CalcRole::Secondary, Fixity::Fixed) => DofGroup::SecondaryFixed,
            (CalcRole::Secondary, Fixity::Released) => DofGroup::SecondaryReleased,
            (CalcRole::Primary, Fixity::Fixed) => DofGroup::PrimaryFixed,
            (CalcRole::Primary, Fixity::Released) => DofGroup::PrimaryReleased,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Split of the DOFs into the four [`DofGroup`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofPartition {
    groups: [Vec<usize>; 4],
    permutation: HollowPermutation,
}

impl DofPartition {
    pub fn new(fixity: &[Fixity], roles: &[CalcRole]) -> Result<Self> {
        if fixity.len() != roles.len() {
            return Err(Error::DimensionMismatch(format!(
                "{} fixity flags but {} roles",
                fixity.len(),
                roles.len()
            )));
        }
        let mut groups: [Vec<usize>; 4] = Default::default();
        for (dof, (&f, &r)) in fixity.iter().zip(roles).enumerate() {
            groups[DofGroup::of(f, r).slot()].push(dof);
        }
        let mut map = vec![None; fixity.len()];
        for (pos, &dof) in groups.iter().flatten().enumerate() {
            map[dof] = Some(pos);
        }
        let permutation = HollowPermutation::new(map, fixity.len())?;
        Ok(Self { groups, permutation })
    }

    pub fn n_dofs(&self) -> usize {
        self.permutation.nrows()
    }

    /// DOFs of a group, ascending.
    pub fn dofs(&self, group: DofGroup) -> &[usize] {
        &self.groups[group.slot()]
    }

    pub fn len(&self, group: DofGroup) -> usize {
        self.groups[group.slot()].len()
    }

    /// `n × m_g` scatter operator of one group.
    pub fn selection(&self, group: DofGroup) -> Result<HollowPermutation> {
        HollowPermutation::selection(self.n_dofs(), self.dofs(group))
    }

    /// Square reordering, `P[dof]` = position in group order.
    pub fn permutation(&self) -> &HollowPermutation {
        &self.permutation
    }

    /// Split a full vector into its four group parts.
    pub fn split(&self, x: &[f64]) -> Result<[Vec<f64>; 4]> {
        let reordered = self.permutation.transpose_apply(x)?;
        let mut parts: [Vec<f64>; 4] = Default::default();
        let mut start = 0;
        for (part, group) in parts.iter_mut().zip(&self.groups) {
            *part = reordered[start..start + group.len()].to_vec();
            start += group.len();
        }
        Ok(parts)
    }

    /// Inverse of [`split`](Self::split).
    pub fn merge(&self, parts: &[Vec<f64>; 4]) -> Result<Vec<f64>> {
        for (part, group) in parts.iter().zip(&self.groups) {
            if part.len() != group.len() {
                return Err(Error::DimensionMismatch(format!(
                    "group part has {} entries, expected {}",
                    part.len(),
                    group.len()
                )));
            }
        }
        let reordered: Vec<f64> = parts.iter().flatten().copied().collect();
        self.permutation.apply(&reordered)
    }
}

/// Result of [`DofClassifier::classify`].
#[derive(Debug, Clone, PartialEq)]
pub struct DofClassification {
    pub fixity: Vec<Fixity>,
    pub roles: Vec<CalcRole>,
    pub rigid_groups: Vec<RigidGroup>,
    /// Square elimination order, `order[dof] = position`.
    pub column_order: HollowPermutation,
    pub partition: DofPartition,
    /// Independent MPC rows that constrain released DOFs, in DOF numbering
    /// with the right-hand side in the last column.
    pub mpc_rows: CsrMatrix,
}

impl DofClassification {
    pub fn n_dofs(&self) -> usize {
        self.fixity.len()
    }

    /// DOFs with the given fixity, ascending.
    pub fn dofs_with(&self, fixity: Fixity) -> Vec<usize> {
        (0..self.fixity.len()).filter(|&i| self.fixity[i] == fixity).collect()
    }
}

/// Computes [`DofClassification`]s.
#[derive(Debug, Clone, Default)]
pub struct DofClassifier {
    tolerances: Tolerances,
}

impl DofClassifier {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }

    /// Classify the DOFs of `model` for `load_case`.
    pub fn classify(&self, model: &Model, load_case: &LoadCase, index: &NodeIndexMap) -> Result<DofClassification> {
        let equations = equations::build(model, load_case, index)?;
        self.classify_with(model, load_case, index, &equations)
    }

    /// Classify using an already built constraint system.
    pub fn classify_with(
        &self,
        model: &Model,
        load_case: &LoadCase,
        index: &NodeIndexMap,
        equations: &ConstraintEquations,
    ) -> Result<DofClassification> {
        let fixity = fixity(model, index)?;
        let rigid_groups = rigid_groups(model, load_case, index)?;
        let column_order = elimination_order(model, load_case, index, &fixity, &rigid_groups)?;

        // J in elimination space, full rank
        let dof_rows = rows_of(&equations.mpc_block()?)?;
        let rows = dof_rows
            .into_iter()
            .map(|row| {
                let entries = row
                    .entries
                    .iter()
                    .filter_map(|&(dof, v)| column_order.get(dof).map(|c| (c, v)))
                    .collect();
                SparseRow::new(entries, row.rhs)
            })
            .collect();
        let rref = row_reduce(rows, fixity.len(), self.tolerances.zero)?;
        let kept = drop_support_rows(
            rref,
            &column_order,
            &fixity,
            equations.prescribed_displacements(),
            self.tolerances.zero,
        )?;
        let j = kept.to_csr()?;
        let mpc_rows = rows_in_dof_order(&kept, &column_order)?;

        let ordered_roles = determine_primary_secondary(&j)?;
        let roles: Vec<CalcRole> = (0..fixity.len())
            .map(|dof| {
                column_order
                    .get(dof)
                    .map(|pos| ordered_roles[pos])
                    .ok_or_else(|| Error::InvalidPermutation(format!("DOF {} has no elimination position", dof)))
            })
            .collect::<Result<_>>()?;

        let partition = DofPartition::new(&fixity, &roles)?;
        debug!(
            "classified {} DOFs: {} secondary fixed, {} secondary released, {} primary fixed, {} primary released, {} rigid group(s)",
            fixity.len(),
            partition.len(DofGroup::SecondaryFixed),
            partition.len(DofGroup::SecondaryReleased),
            partition.len(DofGroup::PrimaryFixed),
            partition.len(DofGroup::PrimaryReleased),
            rigid_groups.len()
        );

        Ok(DofClassification {
            fixity,
            roles,
            rigid_groups,
            column_order,
            partition,
            mpc_rows,
        })
    }
}

/// Remove reduced MPC rows whose pivot is a fixed DOF.
///
/// Fixed DOFs come last in the elimination order, so such a row involves
/// fixed DOFs only. The boundary rows already determine those DOFs; the row
/// must agree with the prescribed values and then adds nothing.
fn drop_support_rows(
    rref: Rref,
    column_order: &HollowPermutation,
    fixity: &[Fixity],
    prescribed: &[f64],
    tol: f64,
) -> Result<Rref> {
    let dof_at = column_order.transpose();
    let dof_of = |col: usize| {
        dof_at
            .get(col)
            .ok_or_else(|| Error::InvalidPermutation(format!("elimination order has no DOF at {}", col)))
    };

    let mut rows = Vec::with_capacity(rref.rows.len());
    let mut pivots = Vec::with_capacity(rref.pivots.len());
    let mut dropped = 0;
    for (row, pivot) in rref.rows.into_iter().zip(rref.pivots) {
        if fixity[dof_of(pivot)?] == Fixity::Released {
            rows.push(row);
            pivots.push(pivot);
            continue;
        }
        let mut lhs = 0.0;
        for &(col, a) in &row.entries {
            lhs += a * prescribed[dof_of(col)?];
        }
        if (lhs - row.rhs).abs() > tol * row.rhs.abs().max(1.0) {
            return Err(Error::ModelInconsistency(format!(
                "constraint between supported DOFs requires {} but the supports give {}",
                row.rhs, lhs
            )));
        }
        dropped += 1;
    }
    if dropped > 0 {
        debug!("{} MPC row(s) only involve supported DOFs and were dropped", dropped);
    }

    Ok(Rref {
        rows,
        pivots,
        n_cols: rref.n_cols,
        redundant: rref.redundant + dropped,
    })
}

/// Reduced rows mapped back to DOF numbering, right-hand side appended.
fn rows_in_dof_order(rref: &Rref, column_order: &HollowPermutation) -> Result<CsrMatrix> {
    let dof_at = column_order.transpose();
    let n = rref.n_cols;
    let nnz = rref.rows.iter().map(|r| r.entries.len() + 1).sum();
    let mut triplets = TripletMatrix::with_capacity(rref.rows.len(), n + 1, nnz);
    for (i, row) in rref.rows.iter().enumerate() {
        for &(col, v) in &row.entries {
            let dof = dof_at
                .get(col)
                .ok_or_else(|| Error::InvalidPermutation(format!("elimination order has no DOF at {}", col)))?;
            triplets.add_exact(i, dof, v);
        }
        triplets.add_exact(i, n, row.rhs);
    }
    triplets.to_csr()
}

/// Fixity of every DOF from the node supports.
pub fn fixity(model: &Model, index: &NodeIndexMap) -> Result<Vec<Fixity>> {
    let mut out = vec![Fixity::Released; index.n_dofs()];
    for node in model.nodes() {
        for dof in Dof::ALL {
            if node.constraints.get(dof) == DofConstraint::Fixed {
                out[index.dof(node.id(), dof)?] = Fixity::Fixed;
            }
        }
    }
    Ok(out)
}

/// Roles from a full-rank constraint matrix.
///
/// Columns are scanned in ascending order. A column is secondary when it has
/// exactly one nonzero, in a row no earlier column claimed. Every row must end
/// up claimed.
pub fn determine_primary_secondary(j: &CsrMatrix) -> Result<Vec<CalcRole>> {
    let columns = j.transpose();
    let mut claimed = vec![false; j.nrows()];
    let mut matched = 0;
    let roles = columns
        .row_iter()
        .map(|col| {
            let rows: Vec<usize> = col
                .col_indices()
                .iter()
                .zip(col.values())
                .filter(|(_, &v)| v != 0.0)
                .map(|(&r, _)| r)
                .collect();
            match rows.as_slice() {
                [r] if !claimed[*r] => {
                    claimed[*r] = true;
                    matched += 1;
                    CalcRole::Secondary
                }
                _ => CalcRole::Primary,
            }
        })
        .collect();

    if matched != j.nrows() {
        return Err(Error::ModelInconsistency(format!(
            "constraint equations resolve only {} of {} rows to secondary DOFs",
            matched,
            j.nrows()
        )));
    }
    Ok(roles)
}

/// Connected rigid groups for `load_case`, with their masters.
pub fn rigid_groups(model: &Model, load_case: &LoadCase, index: &NodeIndexMap) -> Result<Vec<RigidGroup>> {
    let rigid: Vec<&MpcElement> = model
        .mpc_elements()
        .iter()
        .filter(|e| e.is_rigid() && e.applies_to(load_case))
        .collect();

    let mut edges = Vec::new();
    for element in &rigid {
        let members = element
            .nodes()
            .iter()
            .map(|&id| index.index_of(id))
            .collect::<Result<Vec<_>>>()?;
        edges.extend(members.iter().map(|&m| (m, m)));
        edges.extend(members.windows(2).map(|w| (w[0], w[1])));
    }
    let graph = SparseGraph::from_edges(index.n_nodes(), edges)?;

    graph
        .connected_components()
        .into_iter()
        .map(|members| {
            let nodes = members
                .iter()
                .map(|&i| {
                    index
                        .id_of(i)
                        .ok_or_else(|| Error::Model(format!("no node at index {}", i)))
                })
                .collect::<Result<Vec<_>>>()?;
            let master = select_master(model, &rigid, &nodes)?;
            Ok(RigidGroup { nodes, master })
        })
        .collect()
}

/// Central node if one is given, else the constrained member, else the first.
fn select_master(model: &Model, rigid: &[&MpcElement], nodes: &[NodeId]) -> Result<NodeId> {
    let central = rigid
        .iter()
        .filter_map(|e| e.central_node())
        .find(|c| nodes.contains(c));
    let constrained: Vec<NodeId> = nodes
        .iter()
        .copied()
        .filter(|&id| model.node(id).is_some_and(|n| !n.constraints.is_released()))
        .collect();

    let master = central.or_else(|| constrained.first().copied()).unwrap_or(nodes[0]);
    if constrained.iter().any(|&id| id != master) {
        return Err(Error::ModelInconsistency(format!(
            "rigid group {:?} has supports on {:?} but is driven by {:?}",
            nodes, constrained, master
        )));
    }
    Ok(master)
}

/// Square elimination order over all DOFs.
///
/// Released DOFs come first, then released DOFs of rigid masters and MPC
/// central nodes, then fixed DOFs; ties in ascending DOF order.
pub fn elimination_order(
    model: &Model,
    load_case: &LoadCase,
    index: &NodeIndexMap,
    fixity: &[Fixity],
    rigid_groups: &[RigidGroup],
) -> Result<HollowPermutation> {
    let mut keep = vec![false; index.n_nodes()];
    for group in rigid_groups {
        keep[index.index_of(group.master)?] = true;
    }
    for element in model.mpc_elements().iter().filter(|e| e.applies_to(load_case)) {
        if let Some(central) = element.central_node() {
            keep[index.index_of(central)?] = true;
        }
    }

    let rank = |dof: usize| match fixity[dof] {
        Fixity::Fixed => 2,
        Fixity::Released if keep[dof / DOFS_PER_NODE] => 1,
        Fixity::Released => 0,
    };
    let mut dofs: Vec<usize> = (0..fixity.len()).collect();
    dofs.sort_by_key(|&dof| (rank(dof), dof));

    let mut map = vec![None; fixity.len()];
    for (pos, &dof) in dofs.iter().enumerate() {
        map[dof] = Some(pos);
    }
    HollowPermutation::new(map, fixity.len())
}
