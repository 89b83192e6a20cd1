use nalgebra::{DMatrix, DVector, Dyn};
use num_complex::Complex;

use crate::error::LinearSolverError;

/// LU factorisation of the real iteration matrix `E1 = gamma/h * I - J`,
/// with partial pivoting via the `nalgebra` LU decomposition.
///
/// Factorisation failure (an exactly singular or non-finite pivot, LAPACK
/// `info != 0` semantics) is reported so the step kernel can halve the step
/// and retry.
#[derive(Clone, Default)]
pub struct RealLu {
    lu: Option<nalgebra::LU<f64, Dyn, Dyn>>,
}

impl RealLu {
    pub fn factorize(&mut self, matrix: &DMatrix<f64>) -> Result<(), LinearSolverError> {
        self.lu = None;
        let lu = matrix.clone().lu();
        let det = lu.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(LinearSolverError::LuFactorisationFailed);
        }
        self.lu = Some(lu);
        Ok(())
    }

    pub fn solve_in_place(&self, b: &mut DVector<f64>) -> Result<(), LinearSolverError> {
        let lu = self.lu.as_ref().ok_or(LinearSolverError::LuNotInitialized)?;
        match lu.solve_mut(b) {
            true => Ok(()),
            false => Err(LinearSolverError::LuSolveFailed),
        }
    }
}

/// LU factorisation of the complex iteration matrix
/// `E2 = (alpha + i beta)/h * I - J`.
///
/// The real Jacobian is embedded into a complex matrix; the two real stage
/// residuals are packed as one complex right-hand side before the solve.
#[derive(Clone, Default)]
pub struct ComplexLu {
    lu: Option<nalgebra::LU<Complex<f64>, Dyn, Dyn>>,
}

impl ComplexLu {
    pub fn factorize(&mut self, matrix: &DMatrix<Complex<f64>>) -> Result<(), LinearSolverError> {
        self.lu = None;
        let lu = matrix.clone().lu();
        let det = lu.determinant();
        if det.norm_sqr() == 0.0 || !det.re.is_finite() || !det.im.is_finite() {
            return Err(LinearSolverError::LuFactorisationFailed);
        }
        self.lu = Some(lu);
        Ok(())
    }

    pub fn solve_in_place(&self, b: &mut DVector<Complex<f64>>) -> Result<(), LinearSolverError> {
        let lu = self.lu.as_ref().ok_or(LinearSolverError::LuNotInitialized)?;
        match lu.solve_mut(b) {
            true => Ok(()),
            false => Err(LinearSolverError::LuSolveFailed),
        }
    }
}
