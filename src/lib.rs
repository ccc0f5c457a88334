//! Dual interface solver for the FETI (Finite Element Tearing and Interconnecting) method.
//!
//! A problem is given as a set of subdomains, each with a stiffness operator, a load and a trace
//! operator per neighboring subdomain. [`FetiSolver`] enforces displacement continuity across
//! the interfaces with Lagrange multipliers and recovers the rigid body motion of floating
//! subdomains from the coarse problem. [`SolverManager`] exposes the individual phases.
pub mod coarse;
pub mod error;
pub mod interface;
pub mod local;
pub mod manager;
pub mod mapping;
pub mod operators;
pub mod procedural;
pub mod settings;
pub mod solver;
pub mod stiffness;

pub mod krylov {
    pub use feti_krylov::*;
}

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use error::{FetiError, Phase};
pub use feti_traits::Real;
pub use interface::{InterfaceId, InterfaceKey, SubdomainId};
pub use manager::{DualSolution, SolverManager};
pub use settings::FetiSettings;
pub use solver::{FetiSolution, FetiSolver};
pub use stiffness::{DenseStiffness, SparseStiffness, StiffnessOperator};
