//! Sparse factorizations backed by faer.
//!
//! - [`CholeskyFactor`]: sparse LLᵀ for the symmetric positive definite block
//!   of released unknowns.
//! - [`QrFactor`]: sparse QR for the general, possibly non-square, support
//!   block. Solves in the least-squares sense.
//!
//! Both keep their numeric factor so one factorization serves any number of
//! right-hand sides.

use crate::error::{Error, Result};
use crate::sparse::{csr_to_faer_csc, CsrMatrix};
use faer::linalg::cholesky::llt::factor::LltError;
use faer::linalg::solvers::SolveLstsqCore;
use faer::prelude::*;
use faer::sparse::linalg::solvers::{Llt, Qr, SymbolicLlt, SymbolicQr};
use faer::sparse::linalg::LltError as SparseLltError;

/// A factorized matrix that solves `A x = b`.
pub trait Factorization: Send + Sync {
    /// Solve for one right-hand side.
    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>>;

    /// Shape of the factorized matrix.
    fn shape(&self) -> (usize, usize);

    /// Factorization name for diagnostics.
    fn name(&self) -> &str;
}

/// Sparse Cholesky factorization using the faer library.
///
/// # Example
///
/// ```ignore
/// let factor = CholeskyFactor::new(&b22)?;
/// let d_rl = factor.solve(&rhs)?;
/// ```
pub struct CholeskyFactor {
    llt: Llt<usize, f64>,
    n: usize,
}

impl CholeskyFactor {
    pub fn new(matrix: &CsrMatrix) -> Result<Self> {
        let n = matrix.nrows();
        if n != matrix.ncols() {
            return Err(Error::DimensionMismatch(format!(
                "Cholesky needs a square matrix, got {}x{}",
                n,
                matrix.ncols()
            )));
        }

        let csc = csr_to_faer_csc(matrix);
        let csc_ref = csc.as_ref();

        let symbolic = SymbolicLlt::try_new(csc_ref.symbolic(), faer::Side::Lower)
            .map_err(|e| Error::NumericFailure(format!("symbolic Cholesky analysis failed: {:?}", e)))?;

        let llt = Llt::try_new_with_symbolic(symbolic, csc_ref, faer::Side::Lower).map_err(|e| match e {
            SparseLltError::Generic(err) => {
                Error::NumericFailure(format!("sparse Cholesky error: {:?}", err))
            }
            SparseLltError::Numeric(LltError::NonPositivePivot { index }) => Error::NumericFailure(format!(
                "released stiffness is not positive definite at pivot {} (unstable structure?)",
                index
            )),
        })?;

        Ok(Self { llt, n })
    }
}

impl Factorization for CholeskyFactor {
    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        if rhs.len() != self.n {
            return Err(Error::DimensionMismatch(format!(
                "right-hand side has {} entries, matrix has {} rows",
                rhs.len(),
                self.n
            )));
        }
        if self.n == 0 {
            return Ok(vec![]);
        }

        let mut x = faer::Mat::from_fn(self.n, 1, |i, _| rhs[i]);
        self.llt.solve_in_place(x.as_mut());
        finite((0..self.n).map(|i| x[(i, 0)]).collect(), self.name())
    }

    fn shape(&self) -> (usize, usize) {
        (self.n, self.n)
    }

    fn name(&self) -> &str {
        "faer sparse Cholesky (LLᵀ)"
    }
}

/// Sparse QR factorization using the faer library.
///
/// Requires at least as many rows as columns; for a square nonsingular
/// matrix the least-squares solution is the exact one.
pub struct QrFactor {
    qr: Qr<usize, f64>,
    nrows: usize,
    ncols: usize,
}

impl QrFactor {
    pub fn new(matrix: &CsrMatrix) -> Result<Self> {
        let (nrows, ncols) = (matrix.nrows(), matrix.ncols());
        if nrows < ncols {
            return Err(Error::NumericFailure(format!(
                "QR of a {}x{} matrix: more unknowns than equations",
                nrows, ncols
            )));
        }

        let csc = csr_to_faer_csc(matrix);
        let symbolic = SymbolicQr::try_new(csc.as_ref().symbolic())
            .map_err(|e| Error::NumericFailure(format!("symbolic QR analysis failed: {:?}", e)))?;
        let qr = Qr::try_new_with_symbolic(symbolic, csc.as_ref())
            .map_err(|e| Error::NumericFailure(format!("sparse QR error: {:?}", e)))?;

        Ok(Self { qr, nrows, ncols })
    }
}

impl Factorization for QrFactor {
    fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        if rhs.len() != self.nrows {
            return Err(Error::DimensionMismatch(format!(
                "right-hand side has {} entries, matrix has {} rows",
                rhs.len(),
                self.nrows
            )));
        }
        if self.ncols == 0 {
            return Ok(vec![]);
        }

        let mut x = faer::Mat::from_fn(self.nrows, 1, |i, _| rhs[i]);
        self.qr.solve_lstsq_in_place_with_conj(faer::Conj::No, x.as_mut());
        // Solution lives in the leading rows
        finite((0..self.ncols).map(|i| x[(i, 0)]).collect(), self.name())
    }

    fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    fn name(&self) -> &str {
        "faer sparse QR"
    }
}

fn finite(x: Vec<f64>, solver: &str) -> Result<Vec<f64>> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(Error::NumericFailure(format!(
            "{} produced a non-finite solution (singular matrix)",
            solver
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::TripletMatrix;
    use approx::assert_relative_eq;

    fn matrix(n: usize, m: usize, entries: &[(usize, usize, f64)]) -> CsrMatrix {
        let mut triplet = TripletMatrix::new(n, m);
        for &(i, j, v) in entries {
            triplet.add(i, j, v);
        }
        triplet.to_csr().unwrap()
    }

    /// Released block of a spring chain grounded at its first node. Spring
    /// `e` joins released unknowns `e - 1` and `e`.
    fn grounded_chain(springs: &[f64]) -> CsrMatrix {
        let n = springs.len();
        let mut triplet = TripletMatrix::new(n, n);
        for (e, &k) in springs.iter().enumerate() {
            triplet.add(e, e, k);
            if e > 0 {
                triplet.add(e - 1, e - 1, k);
                triplet.add(e - 1, e, -k);
                triplet.add(e, e - 1, -k);
            }
        }
        triplet.to_csr().unwrap()
    }

    #[test]
    fn test_cholesky_of_grounded_chain() {
        let factor = CholeskyFactor::new(&grounded_chain(&[2.0; 4])).unwrap();
        // Tip load: every spring carries it, u_i = (i + 1) F / k
        let u = factor.solve(&[0.0, 0.0, 0.0, 3.0]).unwrap();
        for i in 0..4 {
            assert_relative_eq!(u[i], (i + 1) as f64 * 1.5, epsilon = 1e-12);
        }
        // Same factor, load at the second node: the rest follows rigidly
        let u = factor.solve(&[0.0, 3.0, 0.0, 0.0]).unwrap();
        for (i, expected) in [1.5, 3.0, 3.0, 3.0].into_iter().enumerate() {
            assert_relative_eq!(u[i], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cholesky_of_graded_chain() {
        // Springs in series: u_i sums the flexibilities up to spring i
        let springs = [4.0, 1.0, 0.5];
        let u = CholeskyFactor::new(&grounded_chain(&springs))
            .unwrap()
            .solve(&[0.0, 0.0, 2.0])
            .unwrap();
        let mut flexibility = 0.0;
        for (i, k) in springs.iter().enumerate() {
            flexibility += 1.0 / k;
            assert_relative_eq!(u[i], 2.0 * flexibility, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_cholesky_rejects_softening_chain() {
        // A negative ground spring makes the block indefinite
        let k = grounded_chain(&[-3.0, 1.0]);
        assert!(matches!(CholeskyFactor::new(&k), Err(Error::NumericFailure(_))));
    }

    #[test]
    fn test_cholesky_shape_checks() {
        let a = matrix(2, 3, &[(0, 0, 1.0)]);
        assert!(matches!(CholeskyFactor::new(&a), Err(Error::DimensionMismatch(_))));

        let a = matrix(2, 2, &[(0, 0, 1.0), (1, 1, 1.0)]);
        let factor = CholeskyFactor::new(&a).unwrap();
        assert!(factor.solve(&[1.0, 2.0, 3.0]).is_err());
        assert_eq!(factor.shape(), (2, 2));
    }

    #[test]
    fn test_qr_square_unsymmetric() {
        // [2 1; 0 3] x = [5; 6] -> x = [1.5, 2]
        let a = matrix(2, 2, &[(0, 0, 2.0), (0, 1, 1.0), (1, 1, 3.0)]);
        let x = QrFactor::new(&a).unwrap().solve(&[5.0, 6.0]).unwrap();
        assert_relative_eq!(x[0], 1.5, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_qr_least_squares() {
        // Fit x to [1, 2, 3] with three equal rows -> mean
        let a = matrix(3, 1, &[(0, 0, 1.0), (1, 0, 1.0), (2, 0, 1.0)]);
        let x = QrFactor::new(&a).unwrap().solve(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(x.len(), 1);
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_qr_wide_matrix_is_rejected() {
        let a = matrix(1, 2, &[(0, 0, 1.0), (0, 1, 1.0)]);
        assert!(matches!(QrFactor::new(&a), Err(Error::NumericFailure(_))));
    }
}
