use core::fmt;
use feti_traits::Real;
use log::{debug, info, warn};
use nalgebra::base::constraint::AreMultipliable;
use nalgebra::constraint::{DimEq, ShapeConstraint};
use nalgebra::storage::Storage;
use nalgebra::{ClosedAdd, ClosedMul, DVector, DVectorView, DVectorViewMut, Dim, Dyn, Matrix, Scalar, U1};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::{One, Zero};
use std::error::Error;

/// Error type produced by fallible operator applications.
pub type OperatorError = Box<dyn Error + Send + Sync>;

/// A linear map `y = A x` between vectors of equal length.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T, R, C, S> LinearOperator<T> for Matrix<T, R, C, S>
where
    T: Scalar + One + Zero + ClosedMul + ClosedAdd,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
    ShapeConstraint: DimEq<Dyn, R> + DimEq<C, Dyn> + AreMultipliable<R, C, Dyn, U1>,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: Scalar + Zero + One + ClosedMul + ClosedAdd,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.copy_from(&x);
        Ok(())
    }
}

/// y = Ax
fn apply_operator<'a, T, A>(
    y: impl Into<DVectorViewMut<'a, T>>,
    a: &'a A,
    x: impl Into<DVectorView<'a, T>>,
) -> Result<(), OperatorError>
where
    T: Scalar,
    A: LinearOperator<T>,
{
    a.apply(y.into(), x.into())
}

#[derive(Debug)]
#[non_exhaustive]
pub enum PcpgErrorKind {
    OperatorError(OperatorError),
    ProjectorError(OperatorError),
    PreconditionerError(OperatorError),
    /// `p^T F p <= 0` for a search direction, so the operator is not positive definite on the
    /// projected subspace.
    IndefiniteOperator,
    /// `y^T w <= 0` for a nonzero projected residual.
    IndefinitePreconditioner,
}

impl fmt::Display for PcpgErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::ProjectorError(err) => {
                write!(f, "Error applying projector: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
            Self::IndefiniteOperator => write!(f, "Operator appears to be indefinite on the projected subspace"),
            Self::IndefinitePreconditioner => write!(f, "Indefinite preconditioner"),
        }
    }
}

impl Error for PcpgErrorKind {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OperatorError(err) | Self::ProjectorError(err) | Self::PreconditionerError(err) => Some(&**err),
            _ => None,
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct PcpgError<T: Scalar> {
    /// State of the solver at the time of failure.
    pub output: PcpgOutput<T>,
    pub kind: PcpgErrorKind,
}

impl<T: Scalar> PcpgError<T> {
    fn new(output: PcpgOutput<T>, kind: PcpgErrorKind) -> Self {
        Self { output, kind }
    }
}

impl<T: Scalar> fmt::Display for PcpgError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PCPG solve failed after {} iterations. ", self.output.num_iterations)?;
        write!(f, "Error: {}", self.kind)
    }
}

impl<T: Scalar> Error for PcpgError<T> {}

/// Result of a PCPG solve.
///
/// Reaching the iteration cap is not treated as an error: `converged` is then `false` and
/// `solution` holds the last iterate. Callers decide how to treat this by inspecting
/// `projected_residual_norms`.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct PcpgOutput<T: Scalar> {
    pub solution: DVector<T>,
    /// Unprojected residual `r` corresponding to `solution`.
    pub residual: DVector<T>,
    /// Norm of the projected residual `w = P r` at every convergence check.
    pub projected_residual_norms: Vec<T>,
    /// The solution after every update.
    pub iterates: Vec<DVector<T>>,
    /// Number of updates made to the initial solution vector.
    pub num_iterations: usize,
    pub converged: bool,
}

/// Projected preconditioned conjugate gradient.
///
/// Solves `F λ = d` for a symmetric operator `F` that is only positive definite on the range
/// of the projector `P`. Every residual and search direction is projected before use, so the
/// iterates remain in `λ_0 + range(P)`.
///
/// The tolerance is absolute and applies to the norm of the projected residual.
#[derive(Debug, Clone)]
pub struct ProjectedConjugateGradient<T, A, P, M> {
    operator: A,
    projector: P,
    preconditioner: M,
    tolerance: T,
    max_iter: usize,
}

impl<T: Real> ProjectedConjugateGradient<T, (), IdentityOperator, IdentityOperator> {
    pub fn new() -> Self {
        Self {
            operator: (),
            projector: IdentityOperator,
            preconditioner: IdentityOperator,
            tolerance: nalgebra::convert(1e-10),
            max_iter: 500,
        }
    }
}

impl<T: Real> Default for ProjectedConjugateGradient<T, (), IdentityOperator, IdentityOperator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, P, M> ProjectedConjugateGradient<T, (), P, M> {
    pub fn with_operator<A>(self, operator: A) -> ProjectedConjugateGradient<T, A, P, M> {
        ProjectedConjugateGradient {
            operator,
            projector: self.projector,
            preconditioner: self.preconditioner,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }
}

impl<T, A, P, M> ProjectedConjugateGradient<T, A, P, M> {
    pub fn with_projector<P2>(self, projector: P2) -> ProjectedConjugateGradient<T, A, P2, M> {
        ProjectedConjugateGradient {
            operator: self.operator,
            projector,
            preconditioner: self.preconditioner,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }

    pub fn with_preconditioner<M2>(self, preconditioner: M2) -> ProjectedConjugateGradient<T, A, P, M2> {
        ProjectedConjugateGradient {
            operator: self.operator,
            projector: self.projector,
            preconditioner,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        }
    }

    pub fn with_tolerance(self, tolerance: T) -> Self {
        Self { tolerance, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self { max_iter, ..self }
    }
}

impl<T, A, P, M> ProjectedConjugateGradient<T, A, P, M>
where
    T: Real,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    M: LinearOperator<T>,
{
    /// Solves starting from `λ = 0`, where `residual` is the residual of the zero iterate.
    pub fn solve<'b>(&self, residual: impl Into<DVectorView<'b, T>>) -> Result<PcpgOutput<T>, PcpgError<T>> {
        let residual = residual.into();
        let guess = DVector::zeros(residual.len());
        self.solve_(residual, guess)
    }

    /// Solves starting from `guess`. `residual` must be the residual belonging to `guess`.
    pub fn solve_with_guess<'b>(
        &self,
        residual: impl Into<DVectorView<'b, T>>,
        guess: impl Into<DVectorView<'b, T>>,
    ) -> Result<PcpgOutput<T>, PcpgError<T>> {
        self.solve_(residual.into(), guess.into().clone_owned())
    }

    #[allow(non_snake_case)]
    fn solve_(&self, d: DVectorView<T>, lambda: DVector<T>) -> Result<PcpgOutput<T>, PcpgError<T>> {
        use PcpgErrorKind::*;
        assert_eq!(d.len(), lambda.len(), "Residual and initial iterate must have the same length");

        let n = d.len();
        let mut output = PcpgOutput {
            solution: lambda,
            residual: d.clone_owned(),
            projected_residual_norms: Vec::new(),
            iterates: Vec::new(),
            num_iterations: 0,
            converged: false,
        };

        let mut w = DVector::zeros(n);
        let mut z = DVector::zeros(n);
        let mut y = DVector::zeros(n);
        let mut p = DVector::zeros(n);
        let mut Fp = DVector::zeros(n);
        let mut yTw_prev = T::zero();

        loop {
            // w = P r
            if let Err(err) = apply_operator(&mut w, &self.projector, &output.residual) {
                return Err(PcpgError::new(output, ProjectorError(err)));
            }
            let w_norm = w.norm();
            output.projected_residual_norms.push(w_norm);
            debug!(
                "PCPG iteration {}: projected residual norm {}",
                output.num_iterations + 1,
                w_norm
            );

            // A vanishing projected residual is exact convergence, also for a zero tolerance
            if w_norm < self.tolerance || w_norm == T::zero() {
                output.converged = true;
                info!("PCPG converged after {} iterations", output.num_iterations);
                break;
            } else if output.num_iterations >= self.max_iter {
                warn!(
                    "PCPG reached max iterations ({}) with projected residual norm {}",
                    self.max_iter, w_norm
                );
                break;
            }

            // z = M w
            if let Err(err) = apply_operator(&mut z, &self.preconditioner, &w) {
                return Err(PcpgError::new(output, PreconditionerError(err)));
            }
            // y = P z
            if let Err(err) = apply_operator(&mut y, &self.projector, &z) {
                return Err(PcpgError::new(output, ProjectorError(err)));
            }

            let yTw = y.dot(&w);
            if yTw <= T::zero() {
                return Err(PcpgError::new(output, IndefinitePreconditioner));
            }

            if output.num_iterations == 0 {
                p.copy_from(&y);
            } else {
                // p <- y + beta * p
                let beta = yTw / yTw_prev;
                p.axpy(T::one(), &y, beta);
            }

            // Fp = F * p
            if let Err(err) = apply_operator(&mut Fp, &self.operator, &p) {
                return Err(PcpgError::new(output, OperatorError(err)));
            }
            let pFp = p.dot(&Fp);
            if pFp <= T::zero() {
                return Err(PcpgError::new(output, IndefiniteOperator));
            }

            let alpha = yTw / pFp;
            // lambda <- lambda + alpha * p
            output.solution.axpy(alpha, &p, T::one());
            // r <- r - alpha * Fp
            output.residual.axpy(-alpha, &Fp, T::one());
            output.iterates.push(output.solution.clone());

            output.num_iterations += 1;
            yTw_prev = yTw;
        }

        Ok(output)
    }
}
