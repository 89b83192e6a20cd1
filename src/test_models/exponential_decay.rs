use nalgebra::{DMatrix, DVector};

use crate::OdeSystem;

/// Scalar linear test equation `y' = lambda y` with `p = [lambda]`.
///
/// `lambda = -1000` is the standard stiff accuracy check: the exact solution
/// is `y0 exp(lambda t)`.
pub struct ExponentialDecay;

impl OdeSystem for ExponentialDecay {
    fn nstates(&self) -> usize {
        1
    }

    fn nparams(&self) -> usize {
        1
    }

    fn rhs(&self, y: &DVector<f64>, p: &DVector<f64>, _t: f64, dydt: &mut DVector<f64>) {
        dydt[0] = p[0] * y[0];
    }

    fn jacobian(&self, _y: &DVector<f64>, p: &DVector<f64>, _t: f64, jac: &mut DMatrix<f64>) {
        jac[(0, 0)] = p[0];
    }
}
