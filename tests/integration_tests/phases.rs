use crate::integration_tests::{assembled_manager, floating_toy, key, toy_bars};
use feti::interface::SubdomainId;
use feti::stiffness::{DenseStiffness, SparseStiffness, StiffnessOperator};
use feti::{FetiError, FetiSettings, FetiSolver, Phase, SolverManager};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeMap;
use util::assert_approx_matrix_eq;

fn created_manager() -> SolverManager<f64> {
    let problem = toy_bars();
    let stiffness: BTreeMap<_, _> = problem
        .stiffness
        .into_iter()
        .map(|(id, k)| (id, DenseStiffness::new(k).unwrap()))
        .collect();
    let mut manager = SolverManager::default();
    manager
        .create_local_problems(stiffness, problem.traces, problem.loads)
        .unwrap();
    manager
}

fn assert_missing_phase<T>(result: Result<T, FetiError>, expected: Phase) {
    match result {
        Err(FetiError::PreconditionNotMet { required, .. }) => assert_eq!(required, expected),
        Err(other) => panic!("expected PreconditionNotMet, got {}", other),
        Ok(_) => panic!("expected PreconditionNotMet, got Ok"),
    }
}

#[test]
fn global_assembly_requires_mapping() {
    let mut manager = created_manager();
    manager.assemble_local_coarse_data().unwrap();
    manager.assemble_cross_coarse_data().unwrap();
    assert_eq!(manager.phase(), Phase::CoarseAssembled);

    assert_missing_phase(manager.assemble_globals(), Phase::MappingBuilt);
    assert_missing_phase(manager.compute_initial_multiplier(), Phase::GlobalAssembled);
    assert_missing_phase(manager.solve_dual_interface_problem().map(|_| ()), Phase::GlobalAssembled);
    assert_missing_phase(manager.assemble_solution(), Phase::Solved);

    let err = manager.assemble_globals().unwrap_err();
    assert!(err.to_string().contains("global mapping built"));

    manager.build_global_mapping().unwrap();
    manager.assemble_globals().unwrap();
    assert_eq!(manager.phase(), Phase::GlobalAssembled);
}

#[test]
fn cross_coarse_data_requires_local_coarse_data() {
    let mut manager = created_manager();
    assert_missing_phase(manager.assemble_cross_coarse_data(), Phase::LocalCoarseAssembled);
    assert_missing_phase(manager.build_global_mapping(), Phase::CoarseAssembled);
}

#[test]
fn phases_can_be_repeated_without_changing_results() {
    let mut manager = assembled_manager(&floating_toy(), FetiSettings::default());
    let g = manager.g().clone();
    let ggt = manager.ggt().clone();

    manager.assemble_local_coarse_data().unwrap();
    manager.assemble_cross_coarse_data().unwrap();
    manager.build_global_mapping().unwrap();
    manager.assemble_globals().unwrap();
    assert_eq!(manager.phase(), Phase::GlobalAssembled);
    assert_eq!(manager.g(), &g);
    assert_eq!(manager.ggt(), &ggt);

    manager.solve_dual_interface_problem().unwrap();
    assert_eq!(manager.phase(), Phase::Solved);
    assert!(manager.dual_solution().is_some());
    assert!(manager.assemble_solution().is_ok());
}

#[test]
fn singular_coarse_problem_is_a_numerical_failure() {
    // A floating subdomain without interfaces cannot be equilibrated
    let stiffness = BTreeMap::from([(
        SubdomainId(1),
        DenseStiffness::new(DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0])).unwrap(),
    )]);
    let loads = BTreeMap::from([(SubdomainId(1), DVector::from_column_slice(&[1.0, 0.0]))]);
    let result = FetiSolver::new(stiffness, BTreeMap::new(), loads).solve();
    match result {
        Err(FetiError::NumericalFailure {
            reciprocal_condition, ..
        }) => assert_eq!(reciprocal_condition, 0.0),
        other => panic!("expected NumericalFailure, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn coarse_condition_threshold_is_configurable() {
    let settings = FetiSettings {
        coarse_rcond_threshold: 2.0,
        ..FetiSettings::default()
    };
    let mut manager = assembled_manager(&floating_toy(), settings);
    assert!(matches!(
        manager.compute_initial_multiplier(),
        Err(FetiError::NumericalFailure { .. })
    ));
}

#[test]
fn inconsistent_interfaces_are_invalid_input() {
    let mut problem = toy_bars();
    problem
        .traces
        .get_mut(&SubdomainId(2))
        .unwrap()
        .remove(&key(2, 1));
    let result = problem.solver(FetiSettings::default()).unwrap().solve();
    assert!(matches!(result, Err(FetiError::InvalidInput(_))));

    let mut problem = toy_bars();
    problem
        .traces
        .get_mut(&SubdomainId(1))
        .unwrap()
        .insert(key(1, 1), DMatrix::zeros(1, 2));
    let result = problem.solver(FetiSettings::default()).unwrap().solve();
    assert!(matches!(result, Err(FetiError::InvalidInput(_))));
}

#[test]
fn non_square_stiffness_is_invalid_input() {
    let mut problem = toy_bars();
    problem
        .stiffness
        .insert(SubdomainId(1), DMatrix::zeros(2, 3));
    assert!(matches!(
        problem.solver(FetiSettings::default()),
        Err(FetiError::InvalidInput(_))
    ));
}

#[test]
fn sparse_and_dense_subdomains_can_be_mixed() {
    let problem = toy_bars();
    let mut stiffness: BTreeMap<SubdomainId, Box<dyn StiffnessOperator<f64>>> = BTreeMap::new();
    for (&id, k) in &problem.stiffness {
        let operator: Box<dyn StiffnessOperator<f64>> = if id == SubdomainId(1) {
            Box::new(SparseStiffness::new(CsrMatrix::from(k)).unwrap())
        } else {
            Box::new(DenseStiffness::new(k.clone()).unwrap())
        };
        stiffness.insert(id, operator);
    }

    let solution = FetiSolver::new(stiffness, problem.traces.clone(), problem.loads.clone())
        .solve()
        .unwrap();
    let expected = problem.restrict(&problem.solve_monolithic().unwrap());
    for (id, u) in &solution.displacements {
        assert_approx_matrix_eq!(u, &expected[id], abstol = 1e-10);
    }
}
