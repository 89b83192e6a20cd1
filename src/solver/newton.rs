/// Simplified-Newton iteration cap.
pub(crate) const NEWTON_MAX_ITER: usize = 8;
/// Convergence target for `rate * increment`.
pub(crate) const NEWTON_TOL: f64 = 0.03;
/// Contraction rate below which the iteration matrix is considered current.
pub(crate) const THETA_MIN: f64 = 0.001;

/// Outcome of one Newton iteration.
pub(crate) enum NewtonStatus {
    Converged,
    Continue,
    /// The iteration is contracting too slowly (or diverging); reject the
    /// step and shrink it by `factor`.
    Diverged { factor: f64 },
}

/// Convergence monitor for the simplified-Newton iteration on the stage
/// increments.
///
/// Tracks the contraction rate `theta` between successive increments and
/// predicts whether the remaining iterations can still reach the tolerance.
/// The smoothed rate survives across steps: it seeds the convergence check
/// of the first iteration of the next step, where no contraction estimate
/// exists yet.
#[derive(Clone)]
pub(crate) struct NewtonConvergence {
    rate: f64,
    theta: f64,
    increment_old: f64,
    iter: usize,
}

impl NewtonConvergence {
    pub fn new() -> Self {
        Self {
            rate: 2.0_f64.powf(1.25),
            theta: 0.0,
            increment_old: 0.0,
            iter: 0,
        }
    }

    /// Reinitialise for a fresh integration.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Begin a step attempt, decaying the carried rate.
    pub fn start_step(&mut self) {
        self.rate = self.rate.max(f64::EPSILON).powf(0.8);
        self.theta = 0.0;
        self.increment_old = 0.0;
        self.iter = 0;
    }

    /// Classify the iteration that produced `increment`. On
    /// [NewtonStatus::Diverged] the caller must discard the computed update.
    pub fn check(&mut self, increment: f64) -> NewtonStatus {
        self.theta = THETA_MIN;
        if self.iter > 0 {
            self.theta = increment / self.increment_old;
            if self.theta >= 0.99 {
                return NewtonStatus::Diverged { factor: 0.5 };
            }
            self.rate = self.theta / (1.0 - self.theta);
            let remaining = NEWTON_MAX_ITER - self.iter - 1;
            let predicted = increment * self.theta.powi(remaining as i32) / (1.0 - self.theta);
            if predicted >= NEWTON_TOL {
                let q = (predicted / NEWTON_TOL).min(10.0);
                let factor = 0.8 * q.powf(-1.0 / (NEWTON_MAX_ITER - self.iter) as f64);
                return NewtonStatus::Diverged { factor };
            }
        }
        self.increment_old = increment.max(f64::EPSILON);
        if self.rate * increment <= NEWTON_TOL {
            NewtonStatus::Converged
        } else {
            self.iter += 1;
            NewtonStatus::Continue
        }
    }

    /// Index of the iteration the loop exited on.
    pub fn niter(&self) -> usize {
        self.iter
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn converges_immediately_on_tiny_increment() {
        let mut conv = NewtonConvergence::new();
        conv.start_step();
        assert!(matches!(conv.check(1e-12), NewtonStatus::Converged));
        assert_eq!(conv.niter(), 0);
        assert_eq!(conv.theta(), THETA_MIN);
    }

    #[test]
    fn detects_divergence() {
        let mut conv = NewtonConvergence::new();
        conv.start_step();
        assert!(matches!(conv.check(1.0), NewtonStatus::Continue));
        // increment grew: theta >= 0.99
        match conv.check(2.0) {
            NewtonStatus::Diverged { factor } => assert_eq!(factor, 0.5),
            _ => panic!("expected divergence"),
        }
    }

    #[test]
    fn predicts_slow_convergence() {
        let mut conv = NewtonConvergence::new();
        conv.start_step();
        assert!(matches!(conv.check(10.0), NewtonStatus::Continue));
        // contracting, but far too slowly to reach 0.03 in the remaining
        // iterations: theta = 0.9 -> predicted ~ 9 * 0.9^6 / 0.1 >> tol
        match conv.check(9.0) {
            NewtonStatus::Diverged { factor } => {
                assert!(factor > 0.0 && factor < 0.8);
            }
            _ => panic!("expected predicted non-convergence"),
        }
    }

    #[test]
    fn healthy_contraction_converges() {
        let mut conv = NewtonConvergence::new();
        conv.start_step();
        let mut increment = 0.1;
        let mut converged = false;
        for _ in 0..NEWTON_MAX_ITER {
            match conv.check(increment) {
                NewtonStatus::Converged => {
                    converged = true;
                    break;
                }
                NewtonStatus::Continue => increment *= 0.01,
                NewtonStatus::Diverged { .. } => panic!("unexpected divergence"),
            }
        }
        assert!(converged);
    }

    #[test]
    fn rate_decays_between_steps() {
        let mut conv = NewtonConvergence::new();
        let initial = conv.rate();
        conv.start_step();
        assert!((conv.rate() - initial.powf(0.8)).abs() < 1e-15);
    }
}
