//! Krylov kernels for the FETI dual interface problem.
//!
//! The central piece is [`pcpg::ProjectedConjugateGradient`], a conjugate gradient method
//! restricted to the range of a projector, which is what the dual FETI system requires when
//! floating subdomains make the interface operator singular.
pub mod pcpg;

pub use pcpg::{IdentityOperator, LinearOperator};
