use nalgebra::DVector;

use crate::controller::{StepController, FAC_REJ};
use crate::norm::ErrorWeights;
use crate::solver::{IvpSolver, IvpStatus, SolverStats};
use crate::tableau::rkf45 as rk;
use crate::{OdeSystem, SolverOptions, StepLog};

const STAGES: usize = 6;

/// Explicit Fehlberg 4(5) integrator for the non-stiff corners of a batch.
///
/// Same driver contract and step-size policy as [crate::Radau5], with the
/// Newton and linear-algebra machinery absent: six right-hand-side
/// evaluations per attempt, error from the difference of the embedded pair.
/// The fifth-order solution is propagated.
pub struct Rkf45<'a, S: OdeSystem> {
    system: &'a S,
    h_init: f64,
    max_steps: usize,
    controller: StepController,
    weights: ErrorWeights,
    stats: SolverStats,

    k: [DVector<f64>; STAGES],
    y_stage: DVector<f64>,
    y_new: DVector<f64>,
    err_vec: DVector<f64>,
    y0: DVector<f64>,
}

impl<'a, S: OdeSystem> Rkf45<'a, S> {
    pub fn new(system: &'a S, options: &SolverOptions) -> Self {
        let n = system.nstates();
        Self {
            system,
            h_init: options.h_init,
            max_steps: options.max_steps,
            controller: StepController::new(rk::ELO, 0),
            weights: ErrorWeights::new(n, options.atol, options.rtol),
            stats: SolverStats::default(),
            k: std::array::from_fn(|_| DVector::zeros(n)),
            y_stage: DVector::zeros(n),
            y_new: DVector::zeros(n),
            err_vec: DVector::zeros(n),
            y0: DVector::zeros(n),
        }
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Integrate one IVP from `t0` to `tf`, overwriting `y` with the state
    /// at `tf`.
    pub fn integrate(
        &mut self,
        t0: f64,
        tf: f64,
        p: &DVector<f64>,
        y: &mut DVector<f64>,
        mut log: Option<&mut StepLog>,
    ) -> IvpStatus {
        self.stats = SolverStats::default();
        self.controller.reset();

        let mut t = t0;
        let mut h = self.h_init;
        let mut first_step = true;
        let mut reject = false;

        self.weights.init(y);
        self.y0.copy_from(y);
        if let Some(log) = log.as_deref_mut() {
            log.clear();
            log.push(t, y);
        }

        while t + f64::EPSILON < tf {
            self.stats.number_of_steps += 1;
            if self.stats.number_of_steps >= self.max_steps {
                return IvpStatus::MaxStepsExceeded;
            }
            if 0.1 * h.abs() <= t.abs() * f64::EPSILON {
                return IvpStatus::StepSizeTooSmall;
            }

            let err = self.attempt_step(t, h, p, y);

            let mut h_new = self.controller.classical_factor(err, 0) * h;
            if err < 1.0 {
                h_new = self.controller.factor(h, err, 0, first_step) * h;
                self.controller.accept(h, err);
                first_step = false;
                t += h;
                std::mem::swap(y, &mut self.y_new);
                self.weights.update(&self.y0, y);
                self.y0.copy_from(y);
                if let Some(log) = log.as_deref_mut() {
                    log.push(t, y);
                }
                h_new = h_new.min(tf - t);
                if reject {
                    h_new = h_new.min(h);
                }
                reject = false;
                h = if t + h_new - tf >= 0.0 { tf - t } else { h_new };
            } else {
                self.stats.number_of_error_test_failures += 1;
                h = if first_step || reject { FAC_REJ * h } else { h_new };
                reject = true;
            }
        }
        IvpStatus::Success
    }

    /// Evaluate the six stages, the fifth-order candidate state in `y_new`,
    /// and return the weighted norm of the embedded error estimate.
    fn attempt_step(&mut self, t: f64, h: f64, p: &DVector<f64>, y: &DVector<f64>) -> f64 {
        for i in 0..STAGES {
            self.y_stage.copy_from(y);
            for j in 0..i {
                self.y_stage.axpy(h * rk::A[i][j], &self.k[j], 1.0);
            }
            self.system
                .rhs(&self.y_stage, p, t + rk::C[i] * h, &mut self.k[i]);
        }

        self.y_new.copy_from(y);
        self.err_vec.fill(0.0);
        for i in 0..STAGES {
            self.y_new.axpy(h * rk::B[i], &self.k[i], 1.0);
            self.err_vec.axpy(h * rk::E[i], &self.k[i], 1.0);
        }
        self.weights.norm(&self.err_vec)
    }
}

impl<S: OdeSystem> IvpSolver for Rkf45<'_, S> {
    fn integrate(
        &mut self,
        t0: f64,
        tf: f64,
        p: &DVector<f64>,
        y: &mut DVector<f64>,
        log: Option<&mut StepLog>,
    ) -> IvpStatus {
        Rkf45::integrate(self, t0, tf, p, y, log)
    }

    fn stats(&self) -> &SolverStats {
        &self.stats
    }
}
