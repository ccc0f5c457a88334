use nalgebra::RealField;

pub use nalgebra;

/// Real scalar type accepted by the FETI solver and its Krylov kernels.
///
/// Used as a trait alias for `RealField + Copy`, together with the thread-safety bounds needed
/// to dispatch subdomain solves in parallel.
pub trait Real: RealField + Copy + Send + Sync {}

impl<T: RealField + Copy + Send + Sync> Real for T {}
