//! Procedurally generated decomposed problems, mainly for testing and benchmarking.
use crate::error::FetiError;
use crate::interface::{InterfaceKey, SubdomainId};
use crate::settings::FetiSettings;
use crate::solver::FetiSolver;
use feti_traits::Real;
use itertools::izip;
use nalgebra::{DMatrix, DVector};
use numeric_literals::replace_float_literals;
use std::collections::BTreeMap;

/// A chain of one-dimensional bar elements, split into subdomains of equal length.
///
/// Each node carries `lanes` independent degrees of freedom, and elements in lane `l` have
/// stiffness `1 + l`. Subdomain `s` (counting from zero) gets the id `s + 1` and owns the
/// global nodes `s * e ..= (s + 1) * e`, where `e` is the number of elements per subdomain.
/// Neighboring subdomains share one node. The end nodes of the chain may be fixed, in which
/// case they are eliminated. Subdomains touching no fixed node are floating with `lanes`
/// rigid body modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BarChain {
    pub num_subdomains: usize,
    pub elements_per_subdomain: usize,
    pub lanes: usize,
    pub fix_left: bool,
    pub fix_right: bool,
}

impl BarChain {
    /// A single-lane chain fixed at its left end.
    pub fn new(num_subdomains: usize, elements_per_subdomain: usize) -> Self {
        Self {
            num_subdomains,
            elements_per_subdomain,
            lanes: 1,
            fix_left: true,
            fix_right: false,
        }
    }

    pub fn with_lanes(self, lanes: usize) -> Self {
        Self { lanes, ..self }
    }

    pub fn with_fixed_ends(self, fix_left: bool, fix_right: bool) -> Self {
        Self {
            fix_left,
            fix_right,
            ..self
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_subdomains * self.elements_per_subdomain + 1
    }

    fn is_fixed(&self, node: usize) -> bool {
        (self.fix_left && node == 0) || (self.fix_right && node + 1 == self.num_nodes())
    }

    fn subdomain_id(&self, s: usize) -> SubdomainId {
        SubdomainId(s + 1)
    }

    /// Splits the chain into subdomains.
    ///
    /// `load(node, lane)` gives the nodal load at a global node. The load of a node shared by
    /// two subdomains is applied to the left one.
    ///
    /// # Panics
    ///
    /// Panics if there are no subdomains, no elements per subdomain or no lanes.
    #[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
    pub fn decompose<T: Real>(&self, load: impl Fn(usize, usize) -> T) -> DecomposedProblem<T> {
        assert!(self.num_subdomains > 0, "Bar chain needs at least one subdomain");
        assert!(self.elements_per_subdomain > 0, "Subdomains need at least one element");
        assert!(self.lanes > 0, "Bar chain needs at least one lane");

        let e = self.elements_per_subdomain;
        let lanes = self.lanes;

        // Global index of every free node
        let mut free_index = vec![None; self.num_nodes()];
        let mut num_free_nodes = 0;
        for (node, index) in free_index.iter_mut().enumerate() {
            if !self.is_fixed(node) {
                *index = Some(num_free_nodes);
                num_free_nodes += 1;
            }
        }

        let mut problem = DecomposedProblem {
            stiffness: BTreeMap::new(),
            traces: BTreeMap::new(),
            loads: BTreeMap::new(),
            local_to_global: BTreeMap::new(),
            num_global_dofs: num_free_nodes * lanes,
        };

        for s in 0..self.num_subdomains {
            let id = self.subdomain_id(s);
            let first_node = s * e;
            let nodes: Vec<usize> = (first_node..=first_node + e)
                .filter(|&node| !self.is_fixed(node))
                .collect();
            let local_node = |node: usize| nodes.iter().position(|&n| n == node);
            let ndof = nodes.len() * lanes;

            let mut k = DMatrix::zeros(ndof, ndof);
            for a in first_node..first_node + e {
                let b = a + 1;
                for lane in 0..lanes {
                    let stiffness = 1.0 + nalgebra::convert::<f64, T>(lane as f64);
                    let dofs = [local_node(a), local_node(b)].map(|i| i.map(|i| i * lanes + lane));
                    for (i, sign_i) in izip!(dofs, [1.0, -1.0]) {
                        for (j, sign_j) in izip!(dofs, [1.0, -1.0]) {
                            if let (Some(i), Some(j)) = (i, j) {
                                k[(i, j)] += sign_i * sign_j * stiffness;
                            }
                        }
                    }
                }
            }

            let mut f = DVector::zeros(ndof);
            for (i, &node) in nodes.iter().enumerate() {
                if s > 0 && node == first_node {
                    continue;
                }
                for lane in 0..lanes {
                    f[i * lanes + lane] = load(node, lane);
                }
            }

            let mut traces = BTreeMap::new();
            let interface_nodes = [
                (s > 0).then(|| (s - 1, first_node)),
                (s + 1 < self.num_subdomains).then(|| (s + 1, first_node + e)),
            ];
            for (neighbor, node) in interface_nodes.into_iter().flatten() {
                if let Some(i) = local_node(node) {
                    let mut b = DMatrix::zeros(lanes, ndof);
                    for lane in 0..lanes {
                        b[(lane, i * lanes + lane)] = 1.0;
                    }
                    traces.insert(InterfaceKey::new(id, self.subdomain_id(neighbor)), b);
                }
            }

            let local_to_global = nodes
                .iter()
                .flat_map(|&node| {
                    let index = free_index[node];
                    (0..lanes).filter_map(move |lane| index.map(|index| index * lanes + lane))
                })
                .collect();

            problem.stiffness.insert(id, k);
            problem.traces.insert(id, traces);
            problem.loads.insert(id, f);
            problem.local_to_global.insert(id, local_to_global);
        }

        problem
    }
}

/// Input data of a FETI solve, together with the global numbering of the undecomposed problem.
#[derive(Debug, Clone)]
pub struct DecomposedProblem<T: Real> {
    pub stiffness: BTreeMap<SubdomainId, DMatrix<T>>,
    pub traces: BTreeMap<SubdomainId, BTreeMap<InterfaceKey, DMatrix<T>>>,
    pub loads: BTreeMap<SubdomainId, DVector<T>>,
    /// Global dof of every local dof.
    pub local_to_global: BTreeMap<SubdomainId, Vec<usize>>,
    pub num_global_dofs: usize,
}

impl<T: Real> DecomposedProblem<T> {
    /// Glues the subdomains back together: `K = Σ L_i^T K_i L_i` and `f = Σ L_i^T f_i`.
    pub fn assemble_monolithic(&self) -> (DMatrix<T>, DVector<T>) {
        let n = self.num_global_dofs;
        let mut k = DMatrix::zeros(n, n);
        let mut f = DVector::zeros(n);
        for (id, global_dofs) in &self.local_to_global {
            let (Some(k_local), Some(f_local)) = (self.stiffness.get(id), self.loads.get(id)) else {
                continue;
            };
            for (i, &gi) in global_dofs.iter().enumerate() {
                f[gi] += f_local[i];
                for (j, &gj) in global_dofs.iter().enumerate() {
                    k[(gi, gj)] += k_local[(i, j)];
                }
            }
        }
        (k, f)
    }

    /// Solves the monolithic problem with a dense Cholesky factorization.
    ///
    /// Returns `None` if the monolithic stiffness matrix is not positive definite.
    pub fn solve_monolithic(&self) -> Option<DVector<T>> {
        let (k, f) = self.assemble_monolithic();
        k.cholesky().map(|cholesky| cholesky.solve(&f))
    }

    /// Restricts a global vector to the dofs of every subdomain.
    pub fn restrict(&self, global: &DVector<T>) -> BTreeMap<SubdomainId, DVector<T>> {
        self.local_to_global
            .iter()
            .map(|(&id, global_dofs)| {
                let local = DVector::from_iterator(global_dofs.len(), global_dofs.iter().map(|&gi| global[gi]));
                (id, local)
            })
            .collect()
    }

    /// Sets up a solver for this problem, factorizing the dense subdomain matrices.
    pub fn solver(&self, settings: FetiSettings<T>) -> Result<FetiSolver<T>, FetiError> {
        FetiSolver::from_dense_matrices(
            self.stiffness.clone(),
            self.traces.clone(),
            self.loads.clone(),
            settings,
        )
    }
}
