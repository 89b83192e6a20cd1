use nalgebra::{DMatrix, DVector};

use crate::OdeSystem;

/// Van der Pol oscillator with stiffness parameter `p = [mu]`:
///
/// ```text
/// y0' = y1
/// y1' = mu (1 - y0^2) y1 - y0
/// ```
///
/// Non-stiff for `mu` near 1, strongly stiff for `mu` in the thousands,
/// which makes one system cover both integrators and arbitrarily skewed
/// batches.
pub struct VanDerPol;

impl OdeSystem for VanDerPol {
    fn nstates(&self) -> usize {
        2
    }

    fn nparams(&self) -> usize {
        1
    }

    fn rhs(&self, y: &DVector<f64>, p: &DVector<f64>, _t: f64, dydt: &mut DVector<f64>) {
        let mu = p[0];
        dydt[0] = y[1];
        dydt[1] = mu * (1.0 - y[0] * y[0]) * y[1] - y[0];
    }

    fn jacobian(&self, y: &DVector<f64>, p: &DVector<f64>, _t: f64, jac: &mut DMatrix<f64>) {
        let mu = p[0];
        jac[(0, 0)] = 0.0;
        jac[(0, 1)] = 1.0;
        jac[(1, 0)] = -2.0 * mu * y[0] * y[1] - 1.0;
        jac[(1, 1)] = mu * (1.0 - y[0] * y[0]);
    }
}
