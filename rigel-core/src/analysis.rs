//! Linear static analysis of a [`Model`].
//!
//! [`solve`] runs one load case. [`StaticAnalysis`] keeps the assembled
//! stiffness and, per set of applicable MPC elements, the classification,
//! reduction and factorizations, so further load cases with the same
//! constraints only pay for the triangular solves.

use crate::assembly::{assemble_displacement_vector, assemble_force_vector, assemble_stiffness};
use crate::dof::{CalcRole, DofClassification, DofClassifier, DofGroup, Fixity};
use crate::equations::{self, ConstraintEquations};
use crate::error::{Error, Result};
use crate::model::{Model, NodeId, NodeIndexMap};
use crate::reduce::SymbolicReducer;
use crate::solver::{PartitionedSolver, PreparedSystem, SolveStats, SolverConfig};
use crate::sparse::{mul_vec, CsrMatrix};
use crate::types::{Displacement, Force, LoadCase, DOFS_PER_NODE};
use log::{debug, info};
use nalgebra::Vector6;
use std::collections::HashMap;
use std::time::Instant;

/// Solve one load case with the default configuration.
///
/// # Example
///
/// ```ignore
/// let result = rigel_core::solve(&model, &LoadCase::default())?;
/// let tip = result.displacement(tip_id)?;
/// println!("tip deflection: {:.3e} m", tip.get(Dof::Dy));
/// ```
pub fn solve(model: &Model, load_case: &LoadCase) -> Result<StaticResult> {
    StaticAnalysis::new(model, SolverConfig::default()).solve(load_case)
}

/// Displacements and forces of one load case.
#[derive(Debug, Clone)]
pub struct StaticResult {
    /// Global displacement vector, `6 i + k` is DOF `k` of node index `i`.
    pub displacements: Vec<f64>,
    /// `K d` at supported DOFs, applied loads everywhere else.
    pub forces: Vec<f64>,
    pub stats: SolveStats,
    load_case: LoadCase,
    applied: Vec<f64>,
    /// Fixed DOFs and DOFs held by virtual supports.
    supported: Vec<bool>,
    index: NodeIndexMap,
}

impl StaticResult {
    pub fn load_case(&self) -> &LoadCase {
        &self.load_case
    }

    /// Node numbering the vectors refer to.
    pub fn index_map(&self) -> &NodeIndexMap {
        &self.index
    }

    /// Displacement of one node.
    pub fn displacement(&self, id: NodeId) -> Result<Displacement> {
        let range = self.index.dof_range(id)?;
        Ok(Displacement(Vector6::from_column_slice(&self.displacements[range])))
    }

    /// Nodal force of one node.
    pub fn force(&self, id: NodeId) -> Result<Force> {
        let range = self.index.dof_range(id)?;
        Ok(Force(Vector6::from_column_slice(&self.forces[range])))
    }

    /// Reactions of supported nodes: force minus applied load at each DOF
    /// that is fixed or held by a virtual support, zero elsewhere.
    pub fn support_reactions(&self) -> Vec<(NodeId, Force)> {
        (0..self.index.n_nodes())
            .filter_map(|i| {
                let dofs = i * DOFS_PER_NODE..(i + 1) * DOFS_PER_NODE;
                if !dofs.clone().any(|d| self.supported[d]) {
                    return None;
                }
                let reaction = Vector6::from_iterator(dofs.map(|d| {
                    if self.supported[d] {
                        self.forces[d] - self.applied[d]
                    } else {
                        0.0
                    }
                }));
                self.index.id_of(i).map(|id| (id, Force(reaction)))
            })
            .collect()
    }

    /// Sum of all nodal forces per translation axis.
    pub fn resultant(&self) -> [f64; 3] {
        let mut sum = [0.0; 3];
        for node in self.forces.chunks_exact(DOFS_PER_NODE) {
            for k in 0..3 {
                sum[k] += node[k];
            }
        }
        sum
    }
}

/// Constraint handling shared by all load cases with the same applicable MPCs.
struct ConstraintSystem {
    classification: DofClassification,
    prepared: PreparedSystem,
}

/// Multi load case static analysis of one model.
pub struct StaticAnalysis<'a> {
    model: &'a Model,
    config: SolverConfig,
    index: NodeIndexMap,
    stiffness: Option<CsrMatrix>,
    systems: HashMap<Vec<usize>, ConstraintSystem>,
}

impl<'a> StaticAnalysis<'a> {
    pub fn new(model: &'a Model, config: SolverConfig) -> Self {
        Self {
            model,
            config,
            index: model.index_map(),
            stiffness: None,
            systems: HashMap::new(),
        }
    }

    /// Solve every load case in order.
    pub fn solve_all(&mut self, load_cases: &[LoadCase]) -> Result<Vec<StaticResult>> {
        load_cases.iter().map(|lc| self.solve(lc)).collect()
    }

    /// Solve one load case.
    pub fn solve(&mut self, load_case: &LoadCase) -> Result<StaticResult> {
        let start = Instant::now();
        if self.index.n_dofs() == 0 {
            return Err(Error::Model("model has no nodes".into()));
        }

        if self.stiffness.is_none() {
            self.stiffness = Some(assemble_stiffness(self.model, &self.index)?);
        }

        let stage = Instant::now();
        let equations = equations::build(self.model, load_case, &self.index)?;
        debug!("built {} constraint rows in {:.3?}", equations.n_rows(), stage.elapsed());

        let key = equations.applicable_mpcs().to_vec();
        if !self.config.reuse_factorizations {
            self.systems.clear();
        }
        let reused = self.systems.contains_key(&key);
        let redundant_rows = if reused {
            let system = self.cached(&key)?;
            self.check_constraints(&equations, &system.classification)?
        } else {
            let stiffness = self
                .stiffness
                .as_ref()
                .ok_or_else(|| Error::Model("stiffness matrix was not assembled".into()))?;
            let stage = Instant::now();
            let classification = DofClassifier::new(self.config.tolerances)
                .classify_with(self.model, load_case, &self.index, &equations)?;
            debug!("classified DOFs in {:.3?}", stage.elapsed());

            let redundant_rows = self.check_constraints(&equations, &classification)?;
            let system = self.constraint_system(stiffness, classification)?;
            self.systems.insert(key.clone(), system);
            redundant_rows
        };
        let system = self.cached(&key)?;

        let stage = Instant::now();
        let applied = assemble_force_vector(self.model, load_case, &self.index)?;
        let prescribed = assemble_displacement_vector(self.model, load_case, &self.index)?;
        debug!("assembled load vectors in {:.3?}", stage.elapsed());

        let solution = system.prepared.solve(&applied, &prescribed)?;
        let mut forces = solution.forces;
        let fixity = &system.classification.fixity;

        // Virtual supports on released DOFs take up K d - f
        let held: Vec<usize> = equations
            .supported_dofs()
            .iter()
            .copied()
            .filter(|&dof| fixity[dof] == Fixity::Released)
            .collect();
        if !held.is_empty() {
            let stiffness = self
                .stiffness
                .as_ref()
                .ok_or_else(|| Error::Model("stiffness matrix was not assembled".into()))?;
            let kd = mul_vec(stiffness, &solution.displacements)?;
            for &dof in &held {
                forces[dof] = kd[dof];
            }
        }
        let mut supported: Vec<bool> = fixity.iter().map(|&f| f == Fixity::Fixed).collect();
        for &dof in equations.supported_dofs() {
            supported[dof] = true;
        }

        let stats = SolveStats {
            n_dofs: self.index.n_dofs(),
            n_primary_fixed: system.prepared.n_primary_fixed(),
            n_primary_released: system.prepared.n_primary_released(),
            n_secondary: system.prepared.n_secondary(),
            n_constraint_rows: equations.n_rows(),
            redundant_rows,
            reused_factorization: reused,
            time_seconds: start.elapsed().as_secs_f64(),
        };
        info!(
            "solved '{}': {} DOFs, {} free unknowns, {} secondary, {} constraint rows{} in {:.3}s",
            load_case.name,
            stats.n_dofs,
            stats.n_primary_released,
            stats.n_secondary,
            stats.n_constraint_rows,
            if reused { " (reused factorization)" } else { "" },
            stats.time_seconds
        );

        Ok(StaticResult {
            displacements: solution.displacements,
            forces,
            stats,
            load_case: load_case.clone(),
            applied,
            supported,
            index: self.index.clone(),
        })
    }

    fn cached(&self, key: &[usize]) -> Result<&ConstraintSystem> {
        self.systems
            .get(key)
            .ok_or_else(|| Error::Model("constraint system cache lost an entry".into()))
    }

    /// Reduce the independent MPC rows, cross-check the roles and factor.
    fn constraint_system(&self, stiffness: &CsrMatrix, classification: DofClassification) -> Result<ConstraintSystem> {
        let tolerances = self.config.tolerances;

        let stage = Instant::now();
        let reduction =
            SymbolicReducer::new(tolerances).reduce(&classification.mpc_rows, &classification.column_order)?;
        debug!("reduced MPC rows in {:.3?}", stage.elapsed());

        for (dof, (&role, &secondary)) in classification.roles.iter().zip(&reduction.secondary).enumerate() {
            if (role == CalcRole::Secondary) != secondary {
                return Err(Error::ModelInconsistency(format!(
                    "DOF {} is {:?} in the classification but {} in the reduction",
                    dof,
                    role,
                    if secondary { "secondary" } else { "primary" }
                )));
            }
        }

        let prepared = PartitionedSolver::new(tolerances).prepare(stiffness, &classification, &reduction)?;
        Ok(ConstraintSystem {
            classification,
            prepared,
        })
    }

    /// Reduce boundary and MPC rows together. The system must be consistent
    /// and leave exactly the primary-released DOFs free. Returns the number of
    /// redundant rows.
    fn check_constraints(&self, equations: &ConstraintEquations, classification: &DofClassification) -> Result<usize> {
        let combined =
            SymbolicReducer::new(self.config.tolerances).reduce(equations.matrix(), &classification.column_order)?;
        let free = combined.n_primary();
        let expected = classification.partition.len(DofGroup::PrimaryReleased);
        if free != expected {
            return Err(Error::ModelInconsistency(format!(
                "constraints leave {} free DOFs but {} primary released DOFs were found",
                free, expected
            )));
        }
        Ok(combined.redundant_rows)
    }
}
