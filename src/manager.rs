//! Orchestration of a FETI solve as an explicit sequence of phases.
use crate::coarse::CoarseProblem;
use crate::error::{require_phase, FetiError, Phase};
use crate::interface::{InterfaceId, InterfaceKey, SubdomainId};
use crate::local::LocalProblem;
use crate::mapping::{DofMap, GlobalMapping};
use crate::operators::{interface_gap, CoarseProjector, DualOperator};
use crate::settings::FetiSettings;
use crate::solver::FetiSolution;
use crate::stiffness::StiffnessOperator;
use feti_krylov::pcpg::ProjectedConjugateGradient;
use feti_traits::Real;
use log::{debug, info};
use nalgebra::{DMatrix, DVector, DVectorView};
use std::collections::BTreeMap;

/// Result of the dual interface solve.
#[derive(Debug, Clone)]
pub struct DualSolution<T: Real> {
    /// Interface forces `λ = λ_im + λ_ker`.
    pub lambda: DVector<T>,
    /// Rigid body coefficients of the floating subdomains.
    pub alpha: DVector<T>,
    /// The particular solution `λ_im = G^T (GG^T)^{-1} e`.
    pub initial_multiplier: DVector<T>,
    pub num_iterations: usize,
    pub converged: bool,
    /// Norm of the projected residual at every convergence check of PCPG.
    pub projected_residual_norms: Vec<T>,
    /// `λ` after every PCPG update.
    pub lambda_iterates: Vec<DVector<T>>,
    /// Final PCPG residual, the interface gap `F(λ, true)` before projection.
    pub residual: DVector<T>,
}

/// Drives the phases of a FETI solve and owns all intermediate data.
///
/// Each phase requires the previous ones to be completed. Calling an operation too early
/// returns [`FetiError::PreconditionNotMet`], naming the phase that is missing.
#[derive(Debug)]
pub struct SolverManager<T: Real> {
    settings: FetiSettings<T>,
    phase: Phase,
    problems: BTreeMap<SubdomainId, LocalProblem<T>>,
    interface_sizes: BTreeMap<InterfaceId, usize>,
    coarse: CoarseProblem<T>,
    mapping: GlobalMapping,
    g: DMatrix<T>,
    ggt: DMatrix<T>,
    e: DVector<T>,
    ggt_inverse: Option<DMatrix<T>>,
    dual_solution: Option<DualSolution<T>>,
}

impl<T: Real> Default for SolverManager<T> {
    fn default() -> Self {
        Self::new(FetiSettings::default())
    }
}

impl<T: Real> SolverManager<T> {
    pub fn new(settings: FetiSettings<T>) -> Self {
        Self {
            settings,
            phase: Phase::Created,
            problems: BTreeMap::new(),
            interface_sizes: BTreeMap::new(),
            coarse: CoarseProblem::new(),
            mapping: GlobalMapping::default(),
            g: DMatrix::zeros(0, 0),
            ggt: DMatrix::zeros(0, 0),
            e: DVector::zeros(0),
            ggt_inverse: None,
            dual_solution: None,
        }
    }

    fn advance_to(&mut self, phase: Phase) {
        self.phase = self.phase.max(phase);
    }

    /// Creates one local problem per subdomain and validates the interface data.
    ///
    /// Every key `(i, j)` registered on subdomain `i` must have a matching key `(j, i)` on
    /// subdomain `j`, and both trace operators must have the same number of rows.
    pub fn create_local_problems<S>(
        &mut self,
        stiffness: BTreeMap<SubdomainId, S>,
        mut traces: BTreeMap<SubdomainId, BTreeMap<InterfaceKey, DMatrix<T>>>,
        mut loads: BTreeMap<SubdomainId, DVector<T>>,
    ) -> Result<(), FetiError>
    where
        S: StiffnessOperator<T> + 'static,
    {
        if self.phase != Phase::Created {
            return Err(FetiError::PreconditionNotMet {
                operation: "create local problems",
                required: Phase::Created,
                current: self.phase,
            });
        }

        if let Some(id) = traces.keys().find(|id| !stiffness.contains_key(id)) {
            return Err(FetiError::InvalidInput(format!(
                "Interface traces given for unknown subdomain {}",
                id
            )));
        }
        if let Some(id) = loads.keys().find(|id| !stiffness.contains_key(id)) {
            return Err(FetiError::InvalidInput(format!("Load given for unknown subdomain {}", id)));
        }

        let mut problems = BTreeMap::new();
        for (id, operator) in stiffness {
            let load = loads
                .remove(&id)
                .ok_or_else(|| FetiError::InvalidInput(format!("Missing load for subdomain {}", id)))?;
            let local_traces = traces.remove(&id).unwrap_or_default();
            let problem = LocalProblem::new(id, Box::new(operator), load, local_traces)?;
            problems.insert(id, problem);
        }

        let interface_sizes = interface_sizes(&problems)?;

        info!(
            "Created {} local problems with {} interfaces",
            problems.len(),
            interface_sizes.len()
        );
        self.problems = problems;
        self.interface_sizes = interface_sizes;
        self.phase = Phase::LocalBuilt;
        Ok(())
    }

    /// Registers `e`, the `G` blocks and the diagonal `GG^T` block of every floating subdomain.
    pub fn assemble_local_coarse_data(&mut self) -> Result<(), FetiError> {
        require_phase("assemble local coarse data", Phase::LocalBuilt, self.phase)?;

        for (&id, problem) in &self.problems {
            if !problem.is_floating() {
                continue;
            }
            if let Some(e) = problem.rigid_body_load() {
                self.coarse.update_e(id, e);
            }

            let k = problem.kernel_dim();
            self.coarse.update_ggt(id, id, DMatrix::zeros(k, k));
            for key in problem.traces().keys() {
                let (Some(interface), Some(g)) = (key.interface(), problem.interface_rigid_modes(key)) else {
                    continue;
                };
                self.coarse.add_to_ggt(id, id, &g * g.transpose());
                self.coarse.update_g(id, interface, g);
            }
        }

        self.advance_to(Phase::LocalCoarseAssembled);
        Ok(())
    }

    /// Registers the off-diagonal `GG^T` blocks between neighboring floating subdomains.
    ///
    /// Neighbors without rigid body modes have no block and are skipped.
    pub fn assemble_cross_coarse_data(&mut self) -> Result<(), FetiError> {
        require_phase("assemble cross coarse data", Phase::LocalCoarseAssembled, self.phase)?;

        let mut cross_blocks = Vec::new();
        for (&id, problem) in &self.problems {
            if !problem.is_floating() {
                continue;
            }
            for &neighbor in problem.neighbors() {
                let neighbor_is_floating = self
                    .problems
                    .get(&neighbor)
                    .map(LocalProblem::is_floating)
                    .unwrap_or(false);
                if !neighbor_is_floating {
                    debug!(
                        "Skipping GG^T block ({}, {}): neighbor has no rigid body modes",
                        id, neighbor
                    );
                    continue;
                }

                let missing = || FetiError::MissingCoarseBlock { owner: id, neighbor };
                let interface = InterfaceId::new(id, neighbor).ok_or_else(missing)?;
                let g_own = self.coarse.g_block(id, interface).ok_or_else(missing)?;
                let g_neighbor = self
                    .coarse
                    .g_block(neighbor, interface)
                    .ok_or_else(missing)?;
                cross_blocks.push((id, neighbor, g_own * g_neighbor.transpose()));
            }
        }

        for (row, col, block) in cross_blocks {
            self.coarse.update_ggt(row, col, block);
        }

        self.advance_to(Phase::CoarseAssembled);
        Ok(())
    }

    /// Lays out the alpha blocks of floating subdomains and the lambda blocks of canonical
    /// interfaces, both in subdomain id order.
    pub fn build_global_mapping(&mut self) -> Result<(), FetiError> {
        require_phase("build global mapping", Phase::CoarseAssembled, self.phase)?;

        let alpha = DofMap::from_block_lengths(
            self.problems
                .iter()
                .filter(|(_, problem)| problem.is_floating())
                .map(|(&id, problem)| (id, problem.kernel_dim())),
        );
        let lambda = DofMap::from_block_lengths(
            self.interface_sizes
                .iter()
                .map(|(&interface, &size)| (interface, size)),
        );
        self.mapping = GlobalMapping { alpha, lambda };

        info!(
            "Built global mapping: alpha size {}, lambda size {}",
            self.alpha_size(),
            self.lambda_size()
        );
        self.advance_to(Phase::MappingBuilt);
        Ok(())
    }

    /// Assembles the dense coarse quantities `G`, `GG^T` and `e`.
    pub fn assemble_globals(&mut self) -> Result<(), FetiError> {
        require_phase("assemble global coarse matrices", Phase::MappingBuilt, self.phase)?;

        self.g = self
            .coarse
            .assemble_g(&self.mapping.alpha, &self.mapping.lambda);
        self.ggt = self.coarse.assemble_ggt(&self.mapping.alpha);
        self.e = self.coarse.assemble_e(&self.mapping.alpha);
        self.ggt_inverse = None;

        self.advance_to(Phase::GlobalAssembled);
        Ok(())
    }

    /// Computes the particular solution `λ_im = G^T (GG^T)^{-1} e` of the coarse constraint `G λ = e`.
    ///
    /// Fails with [`FetiError::NumericalFailure`] if the reciprocal condition number of
    /// `GG^T` is below the configured threshold.
    pub fn compute_initial_multiplier(&mut self) -> Result<DVector<T>, FetiError> {
        require_phase("compute initial multiplier", Phase::GlobalAssembled, self.phase)?;

        let ggt_inverse = self.invert_ggt()?;
        let coefficients = &ggt_inverse * &self.e;
        let lambda_im = self.g.tr_mul(&coefficients);
        self.ggt_inverse = Some(ggt_inverse);
        Ok(lambda_im)
    }

    fn invert_ggt(&self) -> Result<DMatrix<T>, FetiError> {
        let n = self.alpha_size();
        if n == 0 {
            return Ok(DMatrix::zeros(0, 0));
        }

        let numerical_failure = |rcond: T| FetiError::NumericalFailure {
            operation: "invert GG^T",
            reciprocal_condition: rcond.to_subset().unwrap_or(f64::NAN),
        };

        let singular_values = self
            .ggt
            .clone()
            .try_svd(false, false, T::default_epsilon(), 0)
            .ok_or_else(|| numerical_failure(T::zero()))?
            .singular_values;
        let sigma_max = singular_values.max();
        let sigma_min = singular_values.min();
        let rcond = if sigma_max > T::zero() {
            sigma_min / sigma_max
        } else {
            T::zero()
        };
        debug!("Reciprocal condition number of GG^T: {}", rcond);
        if rcond < self.settings.coarse_rcond_threshold {
            return Err(numerical_failure(rcond));
        }

        self.ggt
            .clone()
            .try_inverse()
            .ok_or_else(|| numerical_failure(rcond))
    }

    /// Applies the interface operator, returning the interface gap for the multipliers `lambda`.
    pub fn apply_f(&self, lambda: DVectorView<T>, external_force: bool) -> Result<DVector<T>, FetiError> {
        require_phase("apply the dual operator", Phase::MappingBuilt, self.phase)?;
        if lambda.len() != self.lambda_size() {
            return Err(FetiError::InvalidInput(format!(
                "Multiplier vector has length {}, expected {}",
                lambda.len(),
                self.lambda_size()
            )));
        }
        interface_gap(
            &self.problems,
            &self.mapping.lambda,
            lambda,
            external_force,
            self.settings.parallel,
        )
    }

    /// Solves the dual interface problem with PCPG and recovers the rigid body coefficients.
    ///
    /// Reaching the iteration cap is not an error. Check [`DualSolution::converged`].
    pub fn solve_dual_interface_problem(&mut self) -> Result<&DualSolution<T>, FetiError> {
        require_phase("solve the dual interface problem", Phase::GlobalAssembled, self.phase)?;

        let lambda_im = self.compute_initial_multiplier()?;
        let ggt_inverse = self
            .ggt_inverse
            .as_ref()
            .ok_or(FetiError::PreconditionNotMet {
                operation: "solve the dual interface problem",
                required: Phase::GlobalAssembled,
                current: self.phase,
            })?;

        let d = self.apply_f(DVectorView::from(&lambda_im), true)?;

        let operator = DualOperator::new(&self.problems, &self.mapping.lambda, self.settings.parallel);
        let projector = CoarseProjector::new(&self.g, ggt_inverse);
        let output = ProjectedConjugateGradient::new()
            .with_operator(operator)
            .with_projector(projector)
            .with_tolerance(self.settings.tolerance)
            .with_max_iter(self.settings.max_iterations)
            .solve(&d)
            .map_err(|err| FetiError::Pcpg(err.kind))?;

        let lambda = &lambda_im + &output.solution;
        let gap = self.apply_f(DVectorView::from(&lambda), true)?;
        let alpha = ggt_inverse * (&self.g * gap);

        info!(
            "Dual interface problem: {} iterations, converged: {}",
            output.num_iterations, output.converged
        );

        let lambda_iterates = output
            .iterates
            .iter()
            .map(|lambda_ker| &lambda_im + lambda_ker)
            .collect();
        self.phase = Phase::Solved;
        Ok(self.dual_solution.insert(DualSolution {
            lambda,
            alpha,
            initial_multiplier: lambda_im,
            num_iterations: output.num_iterations,
            converged: output.converged,
            projected_residual_norms: output.projected_residual_norms,
            lambda_iterates,
            residual: output.residual,
        }))
    }

    /// Recovers displacements, interface forces and rigid body coefficients per subdomain.
    pub fn assemble_solution(&self) -> Result<FetiSolution<T>, FetiError> {
        require_phase("assemble the solution", Phase::Solved, self.phase)?;
        let dual = self
            .dual_solution
            .as_ref()
            .ok_or(FetiError::PreconditionNotMet {
                operation: "assemble the solution",
                required: Phase::Solved,
                current: self.phase,
            })?;

        let interface_forces = self
            .mapping
            .lambda
            .scatter(DVectorView::from(&dual.lambda));
        let rigid_body_coefficients = self
            .mapping
            .alpha
            .scatter(DVectorView::from(&dual.alpha));

        let mut displacements = BTreeMap::new();
        let mut interface_gaps: BTreeMap<InterfaceId, DVector<T>> = BTreeMap::new();
        for (&id, problem) in &self.problems {
            let u = problem.displacement(&interface_forces, rigid_body_coefficients.get(&id))?;
            for (key, trace) in problem.interface_traces(&u) {
                let Some(interface) = key.interface() else { continue };
                interface_gaps
                    .entry(interface)
                    .and_modify(|gap| *gap += &trace)
                    .or_insert(trace);
            }
            displacements.insert(id, u);
        }

        Ok(FetiSolution {
            displacements,
            interface_forces,
            interface_gaps,
            rigid_body_coefficients,
            lambda: dual.lambda.clone(),
            alpha: dual.alpha.clone(),
            num_iterations: dual.num_iterations,
            converged: dual.converged,
            projected_residual_norms: dual.projected_residual_norms.clone(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &FetiSettings<T> {
        &self.settings
    }

    pub fn local_problems(&self) -> &BTreeMap<SubdomainId, LocalProblem<T>> {
        &self.problems
    }

    /// Number of multipliers per canonical interface.
    pub fn interface_sizes(&self) -> &BTreeMap<InterfaceId, usize> {
        &self.interface_sizes
    }

    pub fn coarse_problem(&self) -> &CoarseProblem<T> {
        &self.coarse
    }

    pub fn mapping(&self) -> &GlobalMapping {
        &self.mapping
    }

    pub fn lambda_size(&self) -> usize {
        self.mapping.lambda_size()
    }

    pub fn alpha_size(&self) -> usize {
        self.mapping.alpha_size()
    }

    pub fn g(&self) -> &DMatrix<T> {
        &self.g
    }

    pub fn ggt(&self) -> &DMatrix<T> {
        &self.ggt
    }

    pub fn e(&self) -> &DVector<T> {
        &self.e
    }

    pub fn dual_solution(&self) -> Option<&DualSolution<T>> {
        self.dual_solution.as_ref()
    }
}

/// Checks that every interface is registered on both sides with matching sizes, and returns
/// the number of multipliers of each canonical interface.
fn interface_sizes<T: Real>(
    problems: &BTreeMap<SubdomainId, LocalProblem<T>>,
) -> Result<BTreeMap<InterfaceId, usize>, FetiError> {
    let mut sizes = BTreeMap::new();
    for (&id, problem) in problems {
        for (key, b) in problem.traces() {
            let neighbor = problems.get(&key.neighbor).ok_or_else(|| {
                FetiError::InvalidInput(format!(
                    "Subdomain {} has an interface with unknown subdomain {}",
                    id, key.neighbor
                ))
            })?;
            let b_neighbor = neighbor.traces().get(&key.reversed()).ok_or_else(|| {
                FetiError::InvalidInput(format!(
                    "Interface ({}, {}) has no matching interface ({}, {})",
                    key.owner, key.neighbor, key.neighbor, key.owner
                ))
            })?;
            if b.nrows() != b_neighbor.nrows() {
                return Err(FetiError::InvalidInput(format!(
                    "Interface ({}, {}) has {} dofs, but ({}, {}) has {}",
                    key.owner,
                    key.neighbor,
                    b.nrows(),
                    key.neighbor,
                    key.owner,
                    b_neighbor.nrows()
                )));
            }
            if let Some(interface) = key.interface() {
                sizes.insert(interface, b.nrows());
            }
        }
    }
    Ok(sizes)
}
