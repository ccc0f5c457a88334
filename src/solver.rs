//! High-level entry point running all phases of a FETI solve.
use crate::error::FetiError;
use crate::interface::{InterfaceId, InterfaceKey, SubdomainId};
use crate::manager::SolverManager;
use crate::settings::FetiSettings;
use crate::stiffness::{DenseStiffness, StiffnessOperator};
use feti_traits::Real;
use log::info;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;

/// Solves a decomposed linear elasticity (or any symmetric) problem with FETI.
///
/// ```ignore
/// let solution = FetiSolver::new(stiffness, traces, loads)
///     .with_settings(settings)
///     .solve()?;
/// ```
pub struct FetiSolver<T: Real> {
    stiffness: BTreeMap<SubdomainId, Box<dyn StiffnessOperator<T>>>,
    traces: BTreeMap<SubdomainId, BTreeMap<InterfaceKey, DMatrix<T>>>,
    loads: BTreeMap<SubdomainId, DVector<T>>,
    settings: FetiSettings<T>,
}

impl<T: Real> FetiSolver<T> {
    pub fn new<S>(
        stiffness: BTreeMap<SubdomainId, S>,
        traces: BTreeMap<SubdomainId, BTreeMap<InterfaceKey, DMatrix<T>>>,
        loads: BTreeMap<SubdomainId, DVector<T>>,
    ) -> Self
    where
        S: StiffnessOperator<T> + 'static,
    {
        let stiffness = stiffness
            .into_iter()
            .map(|(id, operator)| (id, Box::new(operator) as Box<dyn StiffnessOperator<T>>))
            .collect();
        Self {
            stiffness,
            traces,
            loads,
            settings: FetiSettings::default(),
        }
    }

    /// Factorizes dense stiffness matrices with the kernel tolerance of the given settings.
    pub fn from_dense_matrices(
        matrices: BTreeMap<SubdomainId, DMatrix<T>>,
        traces: BTreeMap<SubdomainId, BTreeMap<InterfaceKey, DMatrix<T>>>,
        loads: BTreeMap<SubdomainId, DVector<T>>,
        settings: FetiSettings<T>,
    ) -> Result<Self, FetiError> {
        let stiffness = matrices
            .into_iter()
            .map(|(id, matrix)| {
                DenseStiffness::with_kernel_tolerance(matrix, settings.kernel_tolerance)
                    .map(|operator| (id, operator))
                    .map_err(|err| {
                        FetiError::InvalidInput(format!("Stiffness matrix of subdomain {}: {}", id, err))
                    })
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Self::new(stiffness, traces, loads).with_settings(settings))
    }

    pub fn with_settings(self, settings: FetiSettings<T>) -> Self {
        Self { settings, ..self }
    }

    pub fn settings(&self) -> &FetiSettings<T> {
        &self.settings
    }

    /// Runs every phase of the solve and recovers the primal solution.
    pub fn solve(self) -> Result<FetiSolution<T>, FetiError> {
        let mut manager = SolverManager::new(self.settings);
        manager.create_local_problems(self.stiffness, self.traces, self.loads)?;
        manager.assemble_local_coarse_data()?;
        manager.assemble_cross_coarse_data()?;
        manager.build_global_mapping()?;
        manager.assemble_globals()?;
        manager.solve_dual_interface_problem()?;
        let solution = manager.assemble_solution()?;
        info!(
            "FETI solve finished. Max interface gap: {}",
            solution.max_interface_gap()
        );
        Ok(solution)
    }
}

/// Primal and dual solution of a FETI solve.
#[derive(Debug, Clone)]
pub struct FetiSolution<T: Real> {
    /// Displacement `u_i = K_i^+ (f_i - B̃_i^T λ) + R_i α_i` of every subdomain.
    pub displacements: BTreeMap<SubdomainId, DVector<T>>,
    /// Interface force `λ` of every canonical interface.
    pub interface_forces: BTreeMap<InterfaceId, DVector<T>>,
    /// Displacement jump across every canonical interface, `B_first u_first - B_second u_second`.
    pub interface_gaps: BTreeMap<InterfaceId, DVector<T>>,
    /// Rigid body coefficients of every floating subdomain.
    pub rigid_body_coefficients: BTreeMap<SubdomainId, DVector<T>>,
    pub lambda: DVector<T>,
    pub alpha: DVector<T>,
    pub num_iterations: usize,
    pub converged: bool,
    pub projected_residual_norms: Vec<T>,
}

impl<T: Real> FetiSolution<T> {
    /// Largest absolute displacement jump over all interface dofs.
    pub fn max_interface_gap(&self) -> T {
        self.interface_gaps
            .values()
            .flat_map(|gap| gap.iter())
            .fold(T::zero(), |acc, x| acc.max(x.abs()))
    }
}
