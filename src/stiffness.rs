//! Subdomain stiffness operators.
//!
//! The FETI solver only needs two things from a subdomain stiffness matrix `K`: the action of
//! a (generalized) inverse and a basis for its null space. [`StiffnessOperator`] captures
//! exactly that, so that callers can plug in their own factorizations.
use eyre::{bail, eyre};
use feti_traits::Real;
use nalgebra::{DMatrix, DVector, DVectorView, Scalar};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};

pub trait StiffnessOperator<T: Scalar>: Send + Sync {
    /// Number of degrees of freedom of the subdomain.
    fn ndof(&self) -> usize;

    /// Applies a generalized inverse of `K` to `rhs`.
    ///
    /// For singular `K`, `rhs` is expected to lie in the range of `K`. Implementations must
    /// document what they do otherwise.
    fn apply_inverse(&self, rhs: DVectorView<T>) -> eyre::Result<DVector<T>>;

    /// Orthonormal basis of the null space of `K`, with one column per rigid body mode.
    ///
    /// Has zero columns when `K` is non-singular.
    fn kernel(&self) -> DMatrix<T>;
}

impl<T, S> StiffnessOperator<T> for Box<S>
where
    T: Scalar,
    S: ?Sized + StiffnessOperator<T>,
{
    fn ndof(&self) -> usize {
        S::ndof(self)
    }

    fn apply_inverse(&self, rhs: DVectorView<T>) -> eyre::Result<DVector<T>> {
        S::apply_inverse(self, rhs)
    }

    fn kernel(&self) -> DMatrix<T> {
        S::kernel(self)
    }
}

/// A dense stiffness matrix, factorized once with a singular value decomposition.
///
/// Singular values below `kernel_tolerance * sigma_max` are treated as zero. Their right
/// singular vectors form the kernel, and the inverse is the Moore-Penrose pseudo-inverse.
/// Hence `apply_inverse` returns the minimum-norm least-squares solution: any kernel
/// component of the right-hand side is discarded, and the result is orthogonal to the kernel.
#[derive(Debug, Clone)]
pub struct DenseStiffness<T: Scalar> {
    matrix: DMatrix<T>,
    pseudo_inverse: DMatrix<T>,
    kernel: DMatrix<T>,
}

impl<T: Real> DenseStiffness<T> {
    pub fn new(matrix: DMatrix<T>) -> eyre::Result<Self> {
        Self::with_kernel_tolerance(matrix, nalgebra::convert(1e-10))
    }

    pub fn with_kernel_tolerance(matrix: DMatrix<T>, kernel_tolerance: T) -> eyre::Result<Self> {
        if !matrix.is_square() {
            bail!(
                "Stiffness matrix must be square, but has dimensions {}x{}",
                matrix.nrows(),
                matrix.ncols()
            );
        }

        let n = matrix.nrows();
        if n == 0 {
            return Ok(Self {
                matrix,
                pseudo_inverse: DMatrix::zeros(0, 0),
                kernel: DMatrix::zeros(0, 0),
            });
        }

        let svd = matrix
            .clone()
            .try_svd(true, true, T::default_epsilon(), 0)
            .ok_or_else(|| eyre!("SVD of stiffness matrix failed to converge"))?;
        let threshold = kernel_tolerance * svd.singular_values.max();

        let v_t = svd
            .v_t
            .as_ref()
            .ok_or_else(|| eyre!("SVD did not compute right singular vectors"))?;
        let kernel_columns: Vec<DVector<T>> = svd
            .singular_values
            .iter()
            .enumerate()
            .filter(|(_, sigma)| **sigma <= threshold)
            .map(|(i, _)| v_t.row(i).transpose())
            .collect();
        let kernel = if kernel_columns.is_empty() {
            DMatrix::zeros(n, 0)
        } else {
            DMatrix::from_columns(&kernel_columns)
        };

        let pseudo_inverse = svd.pseudo_inverse(threshold).map_err(|msg| eyre!(msg))?;

        Ok(Self {
            matrix,
            pseudo_inverse,
            kernel,
        })
    }

    pub fn matrix(&self) -> &DMatrix<T> {
        &self.matrix
    }
}

impl<T: Real> StiffnessOperator<T> for DenseStiffness<T> {
    fn ndof(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply_inverse(&self, rhs: DVectorView<T>) -> eyre::Result<DVector<T>> {
        if rhs.len() != self.ndof() {
            bail!(
                "Right-hand side has length {}, expected {}",
                rhs.len(),
                self.ndof()
            );
        }
        Ok(&self.pseudo_inverse * rhs)
    }

    fn kernel(&self) -> DMatrix<T> {
        self.kernel.clone()
    }
}

/// A sparse, symmetric positive definite stiffness matrix factorized with sparse Cholesky.
///
/// Only suitable for subdomains with enough Dirichlet conditions to remove all rigid body
/// modes. The kernel is always empty.
#[derive(Debug, Clone)]
pub struct SparseStiffness<T: Real> {
    matrix: CsrMatrix<T>,
    cholesky: CscCholesky<T>,
}

impl<T: Real> SparseStiffness<T> {
    pub fn new(matrix: CsrMatrix<T>) -> eyre::Result<Self> {
        if matrix.nrows() != matrix.ncols() {
            bail!(
                "Stiffness matrix must be square, but has dimensions {}x{}",
                matrix.nrows(),
                matrix.ncols()
            );
        }
        let csc = CscMatrix::from(&matrix);
        let cholesky =
            CscCholesky::factor(&csc).map_err(|err| eyre!("Sparse Cholesky factorization failed: {}", err))?;
        Ok(Self { matrix, cholesky })
    }

    pub fn matrix(&self) -> &CsrMatrix<T> {
        &self.matrix
    }
}

impl<T: Real> StiffnessOperator<T> for SparseStiffness<T> {
    fn ndof(&self) -> usize {
        self.matrix.nrows()
    }

    fn apply_inverse(&self, rhs: DVectorView<T>) -> eyre::Result<DVector<T>> {
        if rhs.len() != self.ndof() {
            bail!(
                "Right-hand side has length {}, expected {}",
                rhs.len(),
                self.ndof()
            );
        }
        let b = rhs.clone_owned();
        let x = self.cholesky.solve(&b);
        Ok(x.column(0).into_owned())
    }

    fn kernel(&self) -> DMatrix<T> {
        DMatrix::zeros(self.ndof(), 0)
    }
}
