//! Error types of the FETI solver.
use crate::interface::SubdomainId;
use feti_krylov::pcpg::PcpgErrorKind;
use std::error::Error;
use std::fmt;

/// Phases of a FETI solve, in the order in which they must be completed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Created,
    LocalBuilt,
    LocalCoarseAssembled,
    CoarseAssembled,
    MappingBuilt,
    GlobalAssembled,
    Solved,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::LocalBuilt => "local problems built",
            Phase::LocalCoarseAssembled => "local coarse data assembled",
            Phase::CoarseAssembled => "coarse data assembled",
            Phase::MappingBuilt => "global mapping built",
            Phase::GlobalAssembled => "global coarse matrices assembled",
            Phase::Solved => "dual problem solved",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum FetiError {
    /// An operation was called before the phase it depends on was completed.
    PreconditionNotMet {
        operation: &'static str,
        required: Phase,
        current: Phase,
    },
    /// A coarse matrix is singular or too ill-conditioned to be inverted.
    NumericalFailure {
        operation: &'static str,
        reciprocal_condition: f64,
    },
    /// The subdomain, interface or load data is inconsistent.
    InvalidInput(String),
    /// The neighbor is floating, but the coarse block coupling it to the owner is missing.
    MissingCoarseBlock { owner: SubdomainId, neighbor: SubdomainId },
    /// The stiffness operator of a subdomain failed to solve.
    LocalSolveFailed { subdomain: SubdomainId, source: eyre::Report },
    /// The interface solver broke down.
    Pcpg(PcpgErrorKind),
}

impl fmt::Display for FetiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreconditionNotMet {
                operation,
                required,
                current,
            } => write!(
                f,
                "Cannot {}: requires phase '{}', but the solver is in phase '{}'",
                operation, required, current
            ),
            Self::NumericalFailure {
                operation,
                reciprocal_condition,
            } => write!(
                f,
                "Numerical failure in {}: reciprocal condition number {:e}",
                operation, reciprocal_condition
            ),
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::MissingCoarseBlock { owner, neighbor } => write!(
                f,
                "Missing coarse block for floating neighbor {} of subdomain {}",
                neighbor, owner
            ),
            Self::LocalSolveFailed { subdomain, source } => {
                write!(f, "Local solve failed in subdomain {}: {}", subdomain, source)
            }
            Self::Pcpg(kind) => write!(f, "Interface solve failed: {}", kind),
        }
    }
}

impl Error for FetiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::LocalSolveFailed { source, .. } => Some(&**source),
            Self::Pcpg(kind) => Some(kind),
            _ => None,
        }
    }
}

/// Returns `PreconditionNotMet` unless `current` has reached `required`.
pub(crate) fn require_phase(operation: &'static str, required: Phase, current: Phase) -> Result<(), FetiError> {
    if current >= required {
        Ok(())
    } else {
        Err(FetiError::PreconditionNotMet {
            operation,
            required,
            current,
        })
    }
}
