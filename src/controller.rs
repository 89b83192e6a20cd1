/// Step-size controller constants, shared by both solvers.
pub(crate) const FAC_MIN: f64 = 0.2;
pub(crate) const FAC_MAX: f64 = 8.0;
pub(crate) const FAC_SAFE: f64 = 0.9;
pub(crate) const FAC_REJ: f64 = 0.1;

/// Predictive (Gustafsson) step-size controller with the classical
/// error-per-step controller as fallback and upper bound.
///
/// The classical factor is weighted by the Newton effort of the step, so a
/// step that needed many Newton iterations grows the step size less
/// aggressively. Explicit solvers pass `niter = 0` and the weight drops out.
#[derive(Clone)]
pub struct StepController {
    /// Order of the embedded error estimator.
    order: f64,
    /// Newton iteration cap entering the effort weighting.
    newton_max_iter: usize,
    /// Use the predictive controller once an accepted step exists.
    gustafsson: bool,
    h_acc: f64,
    err_old: f64,
}

impl StepController {
    pub fn new(order: f64, newton_max_iter: usize) -> Self {
        Self {
            order,
            newton_max_iter,
            gustafsson: true,
            h_acc: 0.0,
            err_old: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.h_acc = 0.0;
        self.err_old = 0.0;
    }

    /// `clamp(err^(-1/p) * (1 + 2 m) / (k + 1 + 2 m))`
    pub fn classical_factor(&self, err: f64, niter: usize) -> f64 {
        let m = self.newton_max_iter as f64;
        let fac = err.powf(-1.0 / self.order) * (1.0 + 2.0 * m) / (niter as f64 + 1.0 + 2.0 * m);
        fac.clamp(FAC_MIN, FAC_MAX)
    }

    /// Factor for an accepted step: the minimum of the classical factor and,
    /// once error history exists, the predictive factor
    /// `FacSafe * (h / h_acc) * (err^2 / err_old)^(-1/4)`.
    pub fn factor(&self, h: f64, err: f64, niter: usize, first_step: bool) -> f64 {
        let fac = self.classical_factor(err, niter);
        if self.gustafsson && !first_step {
            let fac_gus = FAC_SAFE * (h / self.h_acc) * (err * err / self.err_old).powf(-0.25);
            fac.min(fac_gus.clamp(FAC_MIN, FAC_MAX))
        } else {
            fac
        }
    }

    /// Record an accepted step in the controller history.
    pub fn accept(&mut self, h: f64, err: f64) {
        if self.gustafsson {
            self.h_acc = h;
            self.err_old = err.max(1e-2);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classical_factor_is_clamped() {
        let controller = StepController::new(4.0, 8);
        // tiny error wants a huge step, clamp at FAC_MAX
        assert_eq!(controller.classical_factor(1e-10, 0), FAC_MAX);
        // huge error wants a tiny step, clamp at FAC_MIN
        assert_eq!(controller.classical_factor(1e10, 0), FAC_MIN);
    }

    #[test]
    fn newton_effort_shrinks_growth() {
        let controller = StepController::new(4.0, 8);
        let easy = controller.classical_factor(0.5, 1);
        let hard = controller.classical_factor(0.5, 7);
        assert!(hard < easy);
    }

    #[test]
    fn first_step_uses_classical_only() {
        let controller = StepController::new(4.0, 8);
        let err = 0.3;
        assert_eq!(
            controller.factor(1e-3, err, 2, true),
            controller.classical_factor(err, 2)
        );
    }

    #[test]
    fn predictive_factor_damps_error_growth() {
        let mut controller = StepController::new(4.0, 8);
        controller.accept(1e-3, 0.9);
        // same h, error grew: the predictive factor must bound the classical one
        let fac = controller.factor(1e-3, 0.8, 1, false);
        assert!(fac <= controller.classical_factor(0.8, 1));
        assert!(fac >= FAC_MIN);
    }

    #[test]
    fn error_history_is_floored() {
        let mut controller = StepController::new(4.0, 8);
        controller.accept(1e-3, 1e-12);
        assert_eq!(controller.err_old, 1e-2);
    }
}
