use nalgebra::DVector;

/// Floor applied to every weighted norm. Keeps the Gustafsson controller
/// well-defined when a step is effectively exact.
const NORM_FLOOR: f64 = 1e-10;

/// Per-component error weights `sc[i] = 1 / (atol + max(|y0[i]|, |y[i]|) * rtol)`
/// and the weighted RMS norm used for both Newton increments and the embedded
/// error estimate.
///
/// The weights are rebuilt from the new state after every accepted step; at
/// initialisation only the initial state enters.
#[derive(Clone)]
pub struct ErrorWeights {
    atol: f64,
    rtol: f64,
    sc: DVector<f64>,
}

impl ErrorWeights {
    pub fn new(nstates: usize, atol: f64, rtol: f64) -> Self {
        Self {
            atol,
            rtol,
            sc: DVector::zeros(nstates),
        }
    }

    /// `sc[i] = 1 / (atol + |y0[i]| * rtol)`
    pub fn init(&mut self, y0: &DVector<f64>) {
        for i in 0..self.sc.len() {
            self.sc[i] = 1.0 / (self.atol + y0[i].abs() * self.rtol);
        }
    }

    /// `sc[i] = 1 / (atol + max(|y0[i]|, |y[i]|) * rtol)`
    ///
    /// Symmetric in its two arguments.
    pub fn update(&mut self, y0: &DVector<f64>, y: &DVector<f64>) {
        for i in 0..self.sc.len() {
            self.sc[i] = 1.0 / (self.atol + y0[i].abs().max(y[i].abs()) * self.rtol);
        }
    }

    /// `max(1e-10, sqrt(mean_i (sc[i] * v[i])^2))`
    pub fn norm(&self, v: &DVector<f64>) -> f64 {
        let n = self.sc.len();
        let mut sum = 0.0;
        for i in 0..n {
            let e = self.sc[i] * v[i];
            sum += e * e;
        }
        (sum / n as f64).sqrt().max(NORM_FLOOR)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn weights_invariant_after_update() {
        let atol = 1e-10;
        let rtol = 1e-6;
        let mut weights = ErrorWeights::new(3, atol, rtol);
        let y0 = DVector::from_vec(vec![1.0, -2.0, 0.0]);
        let y = DVector::from_vec(vec![0.5, -3.0, 1e-4]);
        weights.update(&y0, &y);
        for i in 0..3 {
            let lhs = weights.sc[i] * (atol + y0[i].abs().max(y[i].abs()) * rtol);
            assert!((lhs - 1.0).abs() < 1e-14);
        }
    }

    #[test]
    fn init_uses_initial_state_only() {
        let mut weights = ErrorWeights::new(2, 1e-10, 1e-6);
        let y0 = DVector::from_vec(vec![2.0, 0.0]);
        weights.init(&y0);
        assert!((weights.sc[0] - 1.0 / (1e-10 + 2.0 * 1e-6)).abs() < 1e-20);
        assert!((weights.sc[1] - 1.0 / 1e-10).abs() < 1e-4);
    }

    #[test]
    fn norm_is_floored() {
        let mut weights = ErrorWeights::new(2, 1e-10, 1e-6);
        weights.init(&DVector::from_vec(vec![1.0, 1.0]));
        let zero = DVector::zeros(2);
        assert_eq!(weights.norm(&zero), 1e-10);
    }

    #[test]
    fn norm_is_weighted_rms() {
        let mut weights = ErrorWeights::new(2, 0.5, 0.0);
        weights.init(&DVector::from_vec(vec![1.0, 1.0]));
        // sc = [2, 2], v = [1, 1] -> sqrt((4 + 4) / 2) = 2
        let v = DVector::from_vec(vec![1.0, 1.0]);
        assert!((weights.norm(&v) - 2.0).abs() < 1e-14);
    }
}
