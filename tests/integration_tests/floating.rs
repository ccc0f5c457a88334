use crate::integration_tests::{assembled_manager, floating_toy, key};
use feti::interface::{InterfaceId, SubdomainId};
use feti::procedural::BarChain;
use feti::FetiSettings;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector};
use util::{assert_approx_eq, assert_approx_matrix_eq};

#[test]
fn floating_toy_coarse_problem() {
    let mut manager = assembled_manager(&floating_toy(), FetiSettings::default());
    assert_eq!(manager.alpha_size(), 1);
    assert_eq!(manager.lambda_size(), 1);

    // The kernel basis is only defined up to sign, but GG^T and G e are not
    assert_approx_eq!(manager.ggt()[(0, 0)], 0.5, abstol = 1e-12);
    let ge = manager.g() * manager.e();
    assert_approx_eq!(ge[0], -0.5, abstol = 1e-12);

    let interface = InterfaceId::new(SubdomainId(1), SubdomainId(2)).unwrap();
    let coarse = manager.coarse_problem();
    assert!(coarse.g_block(SubdomainId(1), interface).is_none());
    assert!(coarse.g_block(SubdomainId(2), interface).is_some());
    assert!(coarse.e_block(SubdomainId(1)).is_none());

    let lambda_im = manager.compute_initial_multiplier().unwrap();
    assert_approx_eq!(lambda_im[0], -1.0, abstol = 1e-12);
}

#[test]
fn floating_toy_is_solved_by_initial_multiplier() {
    let mut manager = assembled_manager(&floating_toy(), FetiSettings::default());
    let dual = manager.solve_dual_interface_problem().unwrap();

    // The projector is zero, so there is nothing left for PCPG to do
    assert!(dual.converged);
    assert_eq!(dual.num_iterations, 0);
    assert_approx_matrix_eq!(&dual.lambda, &dual.initial_multiplier, abstol = 1e-12);
    assert_approx_eq!(dual.lambda[0], -1.0, abstol = 1e-12);
}

#[test]
fn floating_toy_displacements() {
    let solution = floating_toy()
        .solver(FetiSettings::default())
        .unwrap()
        .solve()
        .unwrap();
    assert!(solution.converged);
    assert_matrix_eq!(
        solution.displacements[&SubdomainId(1)].clone(),
        DVector::from_column_slice(&[1.0, 2.0]),
        comp = abs,
        tol = 1e-10
    );
    assert_matrix_eq!(
        solution.displacements[&SubdomainId(2)].clone(),
        DVector::from_column_slice(&[2.0, 3.0]),
        comp = abs,
        tol = 1e-10
    );
    assert_eq!(solution.rigid_body_coefficients.len(), 1);
    assert_eq!(solution.rigid_body_coefficients[&SubdomainId(2)].len(), 1);
    assert!(solution.max_interface_gap() < 1e-10);
}

#[test]
fn chain_with_two_floating_subdomains() {
    // Nodes 0 (fixed) to 3, one element per subdomain, unit load at the free end.
    // Every spring carries unit tension, so u = [1, 2, 3] on the free nodes.
    let problem = BarChain::new(3, 1).decompose(|node, _| if node == 3 { 1.0 } else { 0.0 });
    let mut manager = assembled_manager(&problem, FetiSettings::default());
    assert_eq!(manager.alpha_size(), 2);
    assert_eq!(manager.lambda_size(), 2);

    // Both floating subdomains share interface (2, 3), so GG^T has an off-diagonal block
    let coarse = manager.coarse_problem();
    assert!(coarse.ggt_block(SubdomainId(2), SubdomainId(3)).is_some());
    assert!(coarse.ggt_block(SubdomainId(3), SubdomainId(2)).is_some());
    assert!(coarse.ggt_block(SubdomainId(1), SubdomainId(2)).is_none());
    let ggt = manager.ggt().clone();
    assert_approx_matrix_eq!(&ggt, &ggt.transpose(), abstol = 1e-14);
    assert!(ggt[(0, 1)].abs() > 1e-3);

    manager.solve_dual_interface_problem().unwrap();
    let solution = manager.assemble_solution().unwrap();
    assert!(solution.converged);

    let expected = [
        (SubdomainId(1), vec![1.0]),
        (SubdomainId(2), vec![1.0, 2.0]),
        (SubdomainId(3), vec![2.0, 3.0]),
    ];
    for (id, u) in expected {
        assert_matrix_eq!(
            solution.displacements[&id].clone(),
            DVector::from_vec(u),
            comp = abs,
            tol = 1e-10
        );
    }
}

#[test]
fn multi_lane_interfaces_have_multi_dimensional_kernels() {
    let problem = BarChain::new(3, 2)
        .with_lanes(3)
        .with_fixed_ends(false, true)
        .decompose(crate::integration_tests::mixed_load);
    let manager = assembled_manager(&problem, FetiSettings::default());

    // Subdomains 1 and 2 float with one rigid body mode per lane
    assert_eq!(manager.alpha_size(), 6);
    assert_eq!(manager.lambda_size(), 6);
    let kernel = manager.local_problems()[&SubdomainId(1)].kernel().clone();
    assert_eq!(kernel.ncols(), 3);
    assert_approx_matrix_eq!(&(kernel.transpose() * &kernel), &DMatrix::<f64>::identity(3, 3), abstol = 1e-12);

    let b = &problem.traces[&SubdomainId(2)][&key(2, 3)];
    assert_eq!(b.shape(), (3, 9));
}
