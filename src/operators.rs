//! Operators of the dual interface problem, bound to the state of an assembled solver.
use crate::error::FetiError;
use crate::interface::{InterfaceId, InterfaceKey, SubdomainId};
use crate::local::LocalProblem;
use crate::mapping::DofMap;
use feti_krylov::pcpg::OperatorError;
use feti_krylov::LinearOperator;
use feti_traits::Real;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Computes the interface gap `F(λ)` for the global multiplier vector `lambda`.
///
/// Every subdomain is solved with the multipliers of its interfaces (and its own load if
/// `external_force` is set). The signed traces of the two subdomains sharing an interface are
/// summed into one gap per interface dof, and the gaps are laid out according to `lambda_map`.
///
/// The result is linear in `lambda` when `external_force` is `false` and affine otherwise.
pub fn interface_gap<T: Real>(
    problems: &BTreeMap<SubdomainId, LocalProblem<T>>,
    lambda_map: &DofMap<InterfaceId>,
    lambda: DVectorView<T>,
    external_force: bool,
    parallel: bool,
) -> Result<DVector<T>, FetiError> {
    let lambda_blocks = lambda_map.scatter(lambda);
    let local_traces = |problem: &LocalProblem<T>| -> Result<BTreeMap<InterfaceKey, DVector<T>>, FetiError> {
        let u = problem.solve(Some(&lambda_blocks), external_force)?;
        Ok(problem.interface_traces(&u))
    };

    let traces: Vec<_> = if parallel {
        problems
            .par_iter()
            .map(|(_, problem)| local_traces(problem))
            .collect::<Result<_, _>>()?
    } else {
        problems
            .values()
            .map(local_traces)
            .collect::<Result<_, _>>()?
    };

    // Fan in serially, in subdomain order
    let mut gaps: BTreeMap<InterfaceId, DVector<T>> = BTreeMap::new();
    for (key, trace) in traces.into_iter().flatten() {
        let Some(interface) = key.interface() else { continue };
        gaps.entry(interface)
            .and_modify(|gap| *gap += &trace)
            .or_insert(trace);
    }
    Ok(lambda_map.gather(&gaps))
}

/// The positive semi-definite dual operator `λ ↦ -F(λ, external_force = false)`.
///
/// Interface forces act as reactions on the subdomains, so `F` itself is negative
/// semi-definite. PCPG is run on the negated operator with the gap `d = F(λ_im, true)` itself
/// as residual, since `-F(λ_ker, false) = d` closes the gap of `λ_im + λ_ker`.
#[derive(Debug, Clone, Copy)]
pub struct DualOperator<'a, T: Real> {
    problems: &'a BTreeMap<SubdomainId, LocalProblem<T>>,
    lambda_map: &'a DofMap<InterfaceId>,
    parallel: bool,
}

impl<'a, T: Real> DualOperator<'a, T> {
    pub fn new(
        problems: &'a BTreeMap<SubdomainId, LocalProblem<T>>,
        lambda_map: &'a DofMap<InterfaceId>,
        parallel: bool,
    ) -> Self {
        Self {
            problems,
            lambda_map,
            parallel,
        }
    }
}

impl<'a, T: Real> LinearOperator<T> for DualOperator<'a, T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        let gap = interface_gap(self.problems, self.lambda_map, x, false, self.parallel)?;
        y.axpy(-T::one(), &gap, T::zero());
        Ok(())
    }
}

/// The orthogonal projector `P = I - G^T (G G^T)^{-1} G` onto the null space of `G`.
#[derive(Debug, Clone, Copy)]
pub struct CoarseProjector<'a, T: Real> {
    g: &'a DMatrix<T>,
    ggt_inverse: &'a DMatrix<T>,
}

impl<'a, T: Real> CoarseProjector<'a, T> {
    pub fn new(g: &'a DMatrix<T>, ggt_inverse: &'a DMatrix<T>) -> Self {
        assert_eq!(g.nrows(), ggt_inverse.nrows(), "G and (GG^T)^-1 must have the same number of rows");
        assert!(ggt_inverse.is_square());
        Self { g, ggt_inverse }
    }
}

impl<'a, T: Real> LinearOperator<T> for CoarseProjector<'a, T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.copy_from(&x);
        if self.g.nrows() == 0 {
            return Ok(());
        }
        let gx = self.g * x;
        let coefficients = self.ggt_inverse * gx;
        // y <- x - G^T (GG^T)^-1 G x
        y.gemv_tr(-T::one(), self.g, &coefficients, T::one());
        Ok(())
    }
}
