use crate::integration_tests::{assembled_manager, toy_bars};
use feti::interface::{InterfaceId, SubdomainId};
use feti::FetiSettings;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DVector, DVectorView};
use util::{assert_approx_eq, assert_approx_matrix_eq};

#[test]
fn toy_bars_have_empty_coarse_problem() {
    let manager = assembled_manager(&toy_bars(), FetiSettings::default());
    assert_eq!(manager.alpha_size(), 0);
    assert_eq!(manager.lambda_size(), 1);
    assert_eq!(manager.g().shape(), (0, 1));
    assert_eq!(manager.ggt().shape(), (0, 0));
    assert_eq!(manager.e().len(), 0);
}

#[test]
fn toy_bars_initial_multiplier_is_zero() {
    let mut manager = assembled_manager(&toy_bars(), FetiSettings::default());
    let lambda_im = manager.compute_initial_multiplier().unwrap();
    assert_eq!(lambda_im, DVector::zeros(1));
}

#[test]
fn toy_bars_dual_operator() {
    let manager = assembled_manager(&toy_bars(), FetiSettings::default());
    // Interface gap of the loaded bars without interface force
    let zero = DVector::zeros(1);
    let d = manager.apply_f(DVectorView::from(&zero), true).unwrap();
    assert_approx_eq!(d[0], 2.0, abstol = 1e-12);

    // The homogeneous operator is negative definite, F = -4
    let one = DVector::from_element(1, 1.0);
    let f = manager.apply_f(DVectorView::from(&one), false).unwrap();
    assert_approx_eq!(f[0], -4.0, abstol = 1e-12);
}

#[test]
fn toy_bars_pcpg_converges_in_at_most_two_iterations() {
    let mut manager = assembled_manager(&toy_bars(), FetiSettings::default());
    let dual = manager.solve_dual_interface_problem().unwrap().clone();

    assert!(dual.converged);
    assert!(dual.num_iterations <= 2);
    assert_eq!(dual.projected_residual_norms.len(), dual.num_iterations + 1);
    assert!(*dual.projected_residual_norms.last().unwrap() < 1e-10);
    assert_eq!(dual.lambda_iterates.len(), dual.num_iterations);
    assert_approx_eq!(dual.lambda[0], 0.5, abstol = 1e-12);

    // The interface gap vanishes at the solution
    let gap = manager
        .apply_f(DVectorView::from(&dual.lambda), true)
        .unwrap();
    assert!(gap.norm() < 1e-10);
    assert_eq!(dual.alpha.len(), 0);

    // The final PCPG residual is the gap of the returned multiplier
    assert_eq!(dual.residual.len(), 1);
    assert_approx_matrix_eq!(&dual.residual, &gap, abstol = 1e-12);
}

#[test]
fn toy_bars_match_monolithic_solve() {
    let problem = toy_bars();
    let solution = problem
        .solver(FetiSettings::default())
        .unwrap()
        .solve()
        .unwrap();
    assert!(solution.converged);
    assert!(solution.max_interface_gap() < 1e-10);
    assert!(solution.rigid_body_coefficients.is_empty());

    let u1 = &solution.displacements[&SubdomainId(1)];
    let u2 = &solution.displacements[&SubdomainId(2)];
    assert_matrix_eq!(u1.clone(), DVector::from_column_slice(&[0.5, 0.0]), comp = abs, tol = 1e-10);
    assert_matrix_eq!(u2.clone(), DVector::from_column_slice(&[0.0, -0.5]), comp = abs, tol = 1e-10);

    let expected = problem.restrict(&problem.solve_monolithic().unwrap());
    for (id, u) in &solution.displacements {
        assert_approx_matrix_eq!(u, &expected[id], abstol = 1e-10);
    }

    let interface = InterfaceId::new(SubdomainId(1), SubdomainId(2)).unwrap();
    assert_approx_eq!(solution.interface_forces[&interface][0], 0.5, abstol = 1e-12);
}

#[test]
fn iteration_cap_is_not_an_error() {
    let settings = FetiSettings {
        max_iterations: 0,
        ..FetiSettings::default()
    };
    let solution = toy_bars().solver(settings).unwrap().solve().unwrap();
    assert!(!solution.converged);
    assert_eq!(solution.num_iterations, 0);
    assert_eq!(solution.projected_residual_norms.len(), 1);
    assert_approx_eq!(solution.projected_residual_norms[0], 2.0, abstol = 1e-12);
    assert_approx_eq!(solution.max_interface_gap(), 2.0, abstol = 1e-12);
}

#[test]
fn zero_tolerance_stops_at_exact_solution() {
    let settings = FetiSettings {
        tolerance: 0.0,
        max_iterations: 5,
        ..FetiSettings::default()
    };
    let solution = toy_bars().solver(settings).unwrap().solve().unwrap();
    assert!(solution.converged);
    assert_eq!(solution.num_iterations, 1);
    assert_approx_eq!(solution.lambda[0], 0.5, abstol = 1e-12);
    assert!(solution.max_interface_gap() < 1e-12);
}
