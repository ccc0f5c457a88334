use feti_traits::Real;
use serde::{Deserialize, Serialize};

/// Settings for a FETI solve.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetiSettings<T> {
    /// Absolute tolerance on the norm of the projected residual of the interface problem.
    pub tolerance: T,
    pub max_iterations: usize,
    /// Singular values of a dense stiffness matrix below `kernel_tolerance * sigma_max`
    /// span its kernel.
    pub kernel_tolerance: T,
    /// Smallest admissible reciprocal condition number of `G G^T`.
    pub coarse_rcond_threshold: T,
    /// Dispatch the subdomain solves of each dual operator application through rayon.
    pub parallel: bool,
}

impl<T: Real> Default for FetiSettings<T> {
    fn default() -> Self {
        Self {
            tolerance: nalgebra::convert(1e-10),
            max_iterations: 500,
            kernel_tolerance: nalgebra::convert(1e-10),
            coarse_rcond_threshold: nalgebra::convert(1e-12),
            parallel: false,
        }
    }
}
