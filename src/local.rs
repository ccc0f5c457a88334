//! Subdomain-local problems.
use crate::error::FetiError;
use crate::interface::{InterfaceId, InterfaceKey, SubdomainId};
use crate::stiffness::StiffnessOperator;
use feti_traits::Real;
use nalgebra::{DMatrix, DVector, DVectorView};
use std::collections::BTreeMap;
use std::fmt;

/// One subdomain: stiffness operator `K`, load `f` and interface trace operators `B`.
///
/// Interface forces act on the subdomain as reactions. The local equilibrium reads
/// `K u = f - sum_I sign_I B_I^T lambda_I`, where `sign_I` is the sign of the interface key
/// (see [`InterfaceKey::sign`]).
pub struct LocalProblem<T: Real> {
    id: SubdomainId,
    stiffness: Box<dyn StiffnessOperator<T>>,
    load: DVector<T>,
    traces: BTreeMap<InterfaceKey, DMatrix<T>>,
    kernel: DMatrix<T>,
    neighbors: Vec<SubdomainId>,
}

impl<T: Real> fmt::Debug for LocalProblem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalProblem")
            .field("id", &self.id)
            .field("ndof", &self.ndof())
            .field("kernel_dim", &self.kernel_dim())
            .field("neighbors", &self.neighbors)
            .finish()
    }
}

impl<T: Real> LocalProblem<T> {
    /// Creates a local problem, checking that all dimensions agree.
    pub fn new(
        id: SubdomainId,
        stiffness: Box<dyn StiffnessOperator<T>>,
        load: DVector<T>,
        traces: BTreeMap<InterfaceKey, DMatrix<T>>,
    ) -> Result<Self, FetiError> {
        let ndof = stiffness.ndof();
        if load.len() != ndof {
            return Err(FetiError::InvalidInput(format!(
                "Load of subdomain {} has length {}, but the stiffness operator has {} dofs",
                id,
                load.len(),
                ndof
            )));
        }

        for (key, b) in &traces {
            if key.owner != id {
                return Err(FetiError::InvalidInput(format!(
                    "Interface key ({}, {}) registered on subdomain {}",
                    key.owner, key.neighbor, id
                )));
            }
            if key.interface().is_none() {
                return Err(FetiError::InvalidInput(format!(
                    "Subdomain {} cannot share an interface with itself",
                    id
                )));
            }
            if b.ncols() != ndof {
                return Err(FetiError::InvalidInput(format!(
                    "Trace operator ({}, {}) has {} columns, but subdomain {} has {} dofs",
                    key.owner,
                    key.neighbor,
                    b.ncols(),
                    id,
                    ndof
                )));
            }
        }

        let kernel = stiffness.kernel();
        let neighbors = traces.keys().map(|key| key.neighbor).collect();

        Ok(Self {
            id,
            stiffness,
            load,
            traces,
            kernel,
            neighbors,
        })
    }

    pub fn id(&self) -> SubdomainId {
        self.id
    }

    pub fn ndof(&self) -> usize {
        self.load.len()
    }

    pub fn load(&self) -> &DVector<T> {
        &self.load
    }

    /// Sorted ids of the neighboring subdomains.
    pub fn neighbors(&self) -> &[SubdomainId] {
        &self.neighbors
    }

    pub fn traces(&self) -> &BTreeMap<InterfaceKey, DMatrix<T>> {
        &self.traces
    }

    pub fn stiffness(&self) -> &dyn StiffnessOperator<T> {
        self.stiffness.as_ref()
    }

    /// Null space basis `R` of the stiffness operator. Has zero columns for non-floating subdomains.
    pub fn kernel(&self) -> &DMatrix<T> {
        &self.kernel
    }

    pub fn kernel_dim(&self) -> usize {
        self.kernel.ncols()
    }

    pub fn is_floating(&self) -> bool {
        self.kernel_dim() > 0
    }

    /// Computes `u = K^+ (f_ext - sum_I sign_I B_I^T lambda_I)`.
    ///
    /// `f_ext` is the subdomain load if `external_force` is set and zero otherwise. Interfaces
    /// without an entry in `lambda` contribute nothing.
    pub fn solve(
        &self,
        lambda: Option<&BTreeMap<InterfaceId, DVector<T>>>,
        external_force: bool,
    ) -> Result<DVector<T>, FetiError> {
        let rhs = self.interface_load(lambda, external_force)?;
        self.stiffness
            .apply_inverse(DVectorView::from(&rhs))
            .map_err(|source| FetiError::LocalSolveFailed {
                subdomain: self.id,
                source,
            })
    }

    fn interface_load(
        &self,
        lambda: Option<&BTreeMap<InterfaceId, DVector<T>>>,
        external_force: bool,
    ) -> Result<DVector<T>, FetiError> {
        let mut rhs = if external_force {
            self.load.clone()
        } else {
            DVector::zeros(self.ndof())
        };

        if let Some(lambda) = lambda {
            for (key, b) in &self.traces {
                let Some(interface) = key.interface() else { continue };
                if let Some(lambda_i) = lambda.get(&interface) {
                    if lambda_i.len() != b.nrows() {
                        return Err(FetiError::InvalidInput(format!(
                            "Multiplier block for interface {} has length {}, expected {}",
                            interface,
                            lambda_i.len(),
                            b.nrows()
                        )));
                    }
                    // rhs <- rhs - sign * B^T lambda
                    rhs.gemv_tr(-key.sign::<T>(), b, lambda_i, T::one());
                }
            }
        }
        Ok(rhs)
    }

    /// Signed interface traces `sign_I B_I u` for every incident interface.
    pub fn interface_traces(&self, u: &DVector<T>) -> BTreeMap<InterfaceKey, DVector<T>> {
        self.traces
            .iter()
            .map(|(key, b)| (*key, b * u * key.sign::<T>()))
            .collect()
    }

    /// Self-equilibration load `e = -R^T f`, or `None` for non-floating subdomains.
    pub fn rigid_body_load(&self) -> Option<DVector<T>> {
        self.is_floating()
            .then(|| -(self.kernel.tr_mul(&self.load)))
    }

    /// Coarse block `G = (-sign B R)^T` of the given interface, or `None` if the subdomain is
    /// not floating or does not own the key.
    pub fn interface_rigid_modes(&self, key: &InterfaceKey) -> Option<DMatrix<T>> {
        if !self.is_floating() {
            return None;
        }
        let b = self.traces.get(key)?;
        Some((b * &self.kernel * (-key.sign::<T>())).transpose())
    }

    /// Recovers the displacement `u = K^+ (f - sum_I sign_I B_I^T lambda_I) + R alpha`.
    ///
    /// `alpha` must have one entry per kernel mode.
    pub fn displacement(
        &self,
        lambda: &BTreeMap<InterfaceId, DVector<T>>,
        alpha: Option<&DVector<T>>,
    ) -> Result<DVector<T>, FetiError> {
        let mut u = self.solve(Some(lambda), true)?;
        if let Some(alpha) = alpha {
            if alpha.len() != self.kernel_dim() {
                return Err(FetiError::InvalidInput(format!(
                    "Rigid body coefficients of subdomain {} have length {}, expected {}",
                    self.id,
                    alpha.len(),
                    self.kernel_dim()
                )));
            }
            u.gemv(T::one(), &self.kernel, alpha, T::one());
        }
        Ok(u)
    }
}
