use feti::interface::{InterfaceKey, SubdomainId};
use feti::procedural::{BarChain, DecomposedProblem};
use feti::{DenseStiffness, FetiSettings, SolverManager};
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeMap;

mod floating;
mod phases;
mod settings;
mod toy_bars;

pub fn key(owner: usize, neighbor: usize) -> InterfaceKey {
    InterfaceKey::new(SubdomainId(owner), SubdomainId(neighbor))
}

/// Two bars of two elements, fixed at both ends of the chain and sharing one interface node.
///
/// `K1 = [[2, -1], [-1, 1]]`, `K2 = [[1, -1], [-1, 2]]`, `f1 = [1, 0]`, `f2 = [0, -1]`.
pub fn toy_bars() -> DecomposedProblem<f64> {
    BarChain::new(2, 2)
        .with_fixed_ends(true, true)
        .decompose(|node, _| match node {
            1 => 1.0,
            3 => -1.0,
            _ => 0.0,
        })
}

/// A bar fixed at its left end, glued to a floating bar pulled at its right end.
///
/// `K1 = [[2, -1], [-1, 1]]`, `K2 = [[1, -1], [-1, 1]]`, `f1 = [0, 0]`, `f2 = [0, 1]`.
/// The exact solution is `u = [1, 2, 3]` on the glued nodes.
pub fn floating_toy() -> DecomposedProblem<f64> {
    let stiffness = BTreeMap::from([
        (SubdomainId(1), DMatrix::from_row_slice(2, 2, &[2.0, -1.0, -1.0, 1.0])),
        (SubdomainId(2), DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0])),
    ]);
    let traces = BTreeMap::from([
        (
            SubdomainId(1),
            BTreeMap::from([(key(1, 2), DMatrix::from_row_slice(1, 2, &[0.0, 1.0]))]),
        ),
        (
            SubdomainId(2),
            BTreeMap::from([(key(2, 1), DMatrix::from_row_slice(1, 2, &[1.0, 0.0]))]),
        ),
    ]);
    let loads = BTreeMap::from([
        (SubdomainId(1), DVector::from_column_slice(&[0.0, 0.0])),
        (SubdomainId(2), DVector::from_column_slice(&[0.0, 1.0])),
    ]);
    let local_to_global = BTreeMap::from([(SubdomainId(1), vec![0, 1]), (SubdomainId(2), vec![1, 2])]);
    DecomposedProblem {
        stiffness,
        traces,
        loads,
        local_to_global,
        num_global_dofs: 3,
    }
}

/// Arbitrary but deterministic nodal loads.
pub fn mixed_load(node: usize, lane: usize) -> f64 {
    ((7 * node + 3 * lane) % 5) as f64 - 2.0
}

/// Creates a manager for the problem and runs it up to and including global assembly.
pub fn assembled_manager(problem: &DecomposedProblem<f64>, settings: FetiSettings<f64>) -> SolverManager<f64> {
    let stiffness: BTreeMap<_, _> = problem
        .stiffness
        .iter()
        .map(|(&id, k)| (id, DenseStiffness::new(k.clone()).unwrap()))
        .collect();
    let mut manager = SolverManager::new(settings);
    manager
        .create_local_problems(stiffness, problem.traces.clone(), problem.loads.clone())
        .unwrap();
    manager.assemble_local_coarse_data().unwrap();
    manager.assemble_cross_coarse_data().unwrap();
    manager.build_global_mapping().unwrap();
    manager.assemble_globals().unwrap();
    manager
}
