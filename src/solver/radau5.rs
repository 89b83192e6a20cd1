use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

use crate::controller::{StepController, FAC_REJ};
use crate::error::LinearSolverError;
use crate::linear_solver::{ComplexLu, RealLu};
use crate::norm::ErrorWeights;
use crate::solver::newton::{NewtonConvergence, NewtonStatus, NEWTON_MAX_ITER, THETA_MIN};
use crate::solver::{IvpSolver, IvpStatus, SolverStats};
use crate::tableau::radau5 as rk;
use crate::{OdeSystem, SolverOptions, StepLog};

/// LU reuse window for the ratio of the proposed to the current step size.
const Q_MIN: f64 = 1.0;
const Q_MAX: f64 = 1.2;
/// Warm-start the stage increments from the previous step's interpolant.
const START_NEWTON: bool = true;
/// Consecutive LU failures tolerated before the IVP is abandoned.
const MAX_CONSECUTIVE_FAILURES: usize = 5;
const H_MIN: f64 = 0.0;

/// Fifth-order, three-stage, fully implicit Radau-IIA integrator.
///
/// One instance carries the whole per-worker scratch: stage increments,
/// interpolant, Jacobian, and both factored iteration matrices. The batch
/// dispatcher builds one per worker and reuses it across every IVP that
/// worker claims.
///
/// The three coupled stage systems are diagonalised into a real N×N solve
/// against `E1 = gamma/h I - J` and a complex N×N solve against
/// `E2 = (alpha + i beta)/h I - J`, both factored once per step (or less:
/// the factorisation is kept across steps while the Newton contraction rate
/// and the step-size ratio stay inside the reuse window).
pub struct Radau5<'a, S: OdeSystem> {
    system: &'a S,
    h_init: f64,
    max_steps: usize,
    controller: StepController,
    convergence: NewtonConvergence,
    weights: ErrorWeights,
    stats: SolverStats,

    jac: DMatrix<f64>,
    e1_mat: DMatrix<f64>,
    e2_mat: DMatrix<Complex<f64>>,
    e1: RealLu,
    e2: ComplexLu,

    z1: DVector<f64>,
    z2: DVector<f64>,
    z3: DVector<f64>,
    dz1: DVector<f64>,
    dz2: DVector<f64>,
    dz3: DVector<f64>,
    cont: [DVector<f64>; 3],
    f0: DVector<f64>,
    y0: DVector<f64>,
    f: DVector<f64>,
    tmp: DVector<f64>,
    zc: DVector<Complex<f64>>,
}

impl<'a, S: OdeSystem> Radau5<'a, S> {
    pub fn new(system: &'a S, options: &SolverOptions) -> Self {
        let n = system.nstates();
        Self {
            system,
            h_init: options.h_init,
            max_steps: options.max_steps,
            controller: StepController::new(rk::ELO, NEWTON_MAX_ITER),
            convergence: NewtonConvergence::new(),
            weights: ErrorWeights::new(n, options.atol, options.rtol),
            stats: SolverStats::default(),
            jac: DMatrix::zeros(n, n),
            e1_mat: DMatrix::zeros(n, n),
            e2_mat: DMatrix::zeros(n, n),
            e1: RealLu::default(),
            e2: ComplexLu::default(),
            z1: DVector::zeros(n),
            z2: DVector::zeros(n),
            z3: DVector::zeros(n),
            dz1: DVector::zeros(n),
            dz2: DVector::zeros(n),
            dz3: DVector::zeros(n),
            cont: [DVector::zeros(n), DVector::zeros(n), DVector::zeros(n)],
            f0: DVector::zeros(n),
            y0: DVector::zeros(n),
            f: DVector::zeros(n),
            tmp: DVector::zeros(n),
            zc: DVector::zeros(n),
        }
    }

    pub fn stats(&self) -> &SolverStats {
        &self.stats
    }

    /// Integrate one IVP from `t0` to `tf`, overwriting `y` with the state
    /// at `tf`. The outcome is a value, not an error: recoverable trouble
    /// (rejected steps, failed factorisations, stalled Newton) is retried
    /// internally with a reduced step.
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
        self.convergence.reset();

        let mut t = t0;
        let mut h = self.h_init;
        let mut h_old = h;
        let mut first_step = true;
        let mut reject = false;
        let mut skip_jac = false;
        let mut skip_lu = false;
        let mut n_consecutive = 0;

        self.weights.init(y);
        self.y0.copy_from(y);
        if let Some(log) = log.as_deref_mut() {
            log.clear();
            log.push(t, y);
        }

        while t + f64::EPSILON < tf {
            if !reject {
                self.system.rhs(y, p, t, &mut self.f0);
            }
            if !skip_lu {
                if !skip_jac {
                    self.system.jacobian(y, p, t, &mut self.jac);
                }
                if self.decompose(h).is_err() {
                    n_consecutive += 1;
                    if n_consecutive >= MAX_CONSECUTIVE_FAILURES {
                        log::warn!("abandoning IVP at t = {t}: {n_consecutive} consecutive LU failures");
                        return IvpStatus::MaxConsecutiveErrorsExceeded;
                    }
                    h *= 0.5;
                    reject = true;
                    skip_jac = true;
                    skip_lu = false;
                    continue;
                }
                n_consecutive = 0;
                self.stats.number_of_linear_solver_setups += 1;
            }
            self.stats.number_of_steps += 1;
            if self.stats.number_of_steps >= self.max_steps {
                return IvpStatus::MaxStepsExceeded;
            }
            if 0.1 * h.abs() <= t.abs() * f64::EPSILON {
                return IvpStatus::StepSizeTooSmall;
            }

            if first_step || !START_NEWTON {
                self.z1.fill(0.0);
                self.z2.fill(0.0);
                self.z3.fill(0.0);
            } else {
                self.predict_stages(h, h_old);
            }

            self.convergence.start_step();
            let mut newton_done = false;
            let mut fac = 0.5;
            for iter in 0..NEWTON_MAX_ITER {
                if self.newton_iteration(t, h, p, y).is_err() {
                    // back-substitution failed on a factorisation we had
                    // accepted; treat it like a failed decomposition
                    break;
                }
                self.stats.number_of_newton_iterations += 1;
                let d1 = self.weights.norm(&self.dz1);
                let d2 = self.weights.norm(&self.dz2);
                let d3 = self.weights.norm(&self.dz3);
                let increment = ((d1 * d1 + d2 * d2 + d3 * d3) / 3.0).sqrt();
                match self.convergence.check(increment) {
                    NewtonStatus::Diverged { factor } => {
                        fac = factor;
                        break;
                    }
                    status => {
                        self.z1 -= &self.dz1;
                        self.z2 -= &self.dz2;
                        self.z3 -= &self.dz3;
                        if matches!(status, NewtonStatus::Converged) {
                            newton_done = true;
                            break;
                        }
                        if iter == NEWTON_MAX_ITER - 1 {
                            return IvpStatus::MaxNewtonIterationsExceeded;
                        }
                    }
                }
            }
            if !newton_done {
                self.stats.number_of_nonlinear_solver_fails += 1;
                h *= fac;
                reject = true;
                skip_jac = true;
                skip_lu = false;
                continue;
            }

            let err = match self.error_estimate(t, h, p, y, first_step, reject) {
                Ok(err) => err,
                Err(_) => {
                    // same recovery as an unconverged Newton iteration
                    self.stats.number_of_nonlinear_solver_fails += 1;
                    h *= 0.5;
                    reject = true;
                    skip_jac = true;
                    skip_lu = false;
                    continue;
                }
            };

            let niter = self.convergence.niter();
            let mut h_new = self.controller.classical_factor(err, niter) * h;
            if err < 1.0 {
                h_new = self.controller.factor(h, err, niter, first_step) * h;
                self.controller.accept(h, err);
                first_step = false;
                h_old = h;
                t += h;
                *y += &self.z3;
                self.make_interpolant();
                self.weights.update(&self.y0, y);
                self.y0.copy_from(y);
                if let Some(log) = log.as_deref_mut() {
                    log.push(t, y);
                }
                h_new = h_new.max(H_MIN).min(tf - t);
                if reject {
                    h_new = h_new.min(h);
                }
                reject = false;
                if t + h_new / Q_MIN - tf >= 0.0 {
                    h = tf - t;
                    skip_lu = false;
                } else {
                    let h_ratio = h_new / h;
                    skip_lu = self.convergence.theta() <= THETA_MIN
                        && h_ratio >= Q_MIN
                        && h_ratio <= Q_MAX;
                    if !skip_lu {
                        h = h_new;
                    }
                }
                skip_jac = niter == 1 || self.convergence.rate() <= THETA_MIN;
            } else {
                self.stats.number_of_error_test_failures += 1;
                h = if first_step || reject { FAC_REJ * h } else { h_new };
                reject = true;
                skip_jac = true;
                skip_lu = false;
            }
        }
        IvpStatus::Success
    }

    /// Build and factor `E1 = gamma/h I - J` and `E2 = (alpha + i beta)/h I - J`.
    fn decompose(&mut self, h: f64) -> Result<(), LinearSolverError> {
        let n = self.jac.nrows();
        let gamma_h = rk::GAMMA / h;
        let e2_diag = Complex::new(rk::ALPHA / h, rk::BETA / h);
        for j in 0..n {
            for i in 0..n {
                let jac = self.jac[(i, j)];
                self.e1_mat[(i, j)] = -jac;
                self.e2_mat[(i, j)] = Complex::new(-jac, 0.0);
            }
            self.e1_mat[(j, j)] += gamma_h;
            self.e2_mat[(j, j)] += e2_diag;
        }
        self.e1.factorize(&self.e1_mat)?;
        self.e2.factorize(&self.e2_mat)
    }

    /// One simplified-Newton iteration: build the residual
    /// `R_i = Z_i - h sum_j A_ij f(t + c_j h, y + Z_j)`, transform it by
    /// `Tinv inv(A) / h`, back-substitute the real and complex systems, and
    /// transform back by `T`. Leaves the update in `dz1..dz3`.
    fn newton_iteration(
        &mut self,
        t: f64,
        h: f64,
        p: &DVector<f64>,
        y: &DVector<f64>,
    ) -> Result<(), LinearSolverError> {
        let n = y.len();

        self.dz1.copy_from(&self.z1);
        self.dz2.copy_from(&self.z2);
        self.dz3.copy_from(&self.z3);
        for j in 0..3 {
            let z = match j {
                0 => &self.z1,
                1 => &self.z2,
                _ => &self.z3,
            };
            self.tmp.copy_from(y);
            self.tmp += z;
            self.system.rhs(&self.tmp, p, t + rk::C[j] * h, &mut self.f);
            self.dz1.axpy(-h * rk::A[0][j], &self.f, 1.0);
            self.dz2.axpy(-h * rk::A[1][j], &self.f, 1.0);
            self.dz3.axpy(-h * rk::A[2][j], &self.f, 1.0);
        }

        for i in 0..n {
            let x1 = self.dz1[i] / h;
            let x2 = self.dz2[i] / h;
            let x3 = self.dz3[i] / h;
            self.dz1[i] = rk::T_INV_A_INV[0][0] * x1 + rk::T_INV_A_INV[0][1] * x2 + rk::T_INV_A_INV[0][2] * x3;
            self.dz2[i] = rk::T_INV_A_INV[1][0] * x1 + rk::T_INV_A_INV[1][1] * x2 + rk::T_INV_A_INV[1][2] * x3;
            self.dz3[i] = rk::T_INV_A_INV[2][0] * x1 + rk::T_INV_A_INV[2][1] * x2 + rk::T_INV_A_INV[2][2] * x3;
        }
        self.e1.solve_in_place(&mut self.dz1)?;
        for i in 0..n {
            self.zc[i] = Complex::new(self.dz2[i], self.dz3[i]);
        }
        self.e2.solve_in_place(&mut self.zc)?;
        for i in 0..n {
            self.dz2[i] = self.zc[i].re;
            self.dz3[i] = self.zc[i].im;
        }
        for i in 0..n {
            let x1 = self.dz1[i];
            let x2 = self.dz2[i];
            let x3 = self.dz3[i];
            self.dz1[i] = rk::T[0][0] * x1 + rk::T[0][1] * x2 + rk::T[0][2] * x3;
            self.dz2[i] = rk::T[1][0] * x1 + rk::T[1][1] * x2 + rk::T[1][2] * x3;
            self.dz3[i] = rk::T[2][0] * x1 + rk::T[2][1] * x2 + rk::T[2][2] * x3;
        }
        Ok(())
    }

    /// Embedded error estimate against the real factorisation, with a second
    /// chance at startup: if the first estimate rejects while the step is the
    /// first (or follows a rejection), the estimate is repeated with the
    /// right-hand side evaluated at the perturbed state instead of `f0`.
    fn error_estimate(
        &mut self,
        t: f64,
        h: f64,
        p: &DVector<f64>,
        y: &DVector<f64>,
        first_step: bool,
        reject: bool,
    ) -> Result<f64, LinearSolverError> {
        let n = y.len();
        let he1 = rk::E[1] / h;
        let he2 = rk::E[2] / h;
        let he3 = rk::E[3] / h;
        // weighted stage combination, reused by the second-chance estimate
        for i in 0..n {
            self.f[i] = he1 * self.z1[i] + he2 * self.z2[i] + he3 * self.z3[i];
        }
        for i in 0..n {
            self.tmp[i] = rk::E[0] * self.f0[i] + self.f[i];
        }
        self.e1.solve_in_place(&mut self.tmp)?;
        let mut err = self.weights.norm(&self.tmp);
        if err >= 1.0 && (first_step || reject) {
            self.tmp += y;
            self.system.rhs(&self.tmp, p, t, &mut self.dz1);
            for i in 0..n {
                self.tmp[i] = self.dz1[i] + self.f[i];
            }
            self.e1.solve_in_place(&mut self.tmp)?;
            err = self.weights.norm(&self.tmp);
        }
        Ok(err)
    }

    /// Quadratic interpolant through the three stage increments,
    /// `Q(c_i) = Z_i`, stored as coefficients of `Q(1 + c x)`.
    fn make_interpolant(&mut self) {
        let den = (rk::C[2] - rk::C[1]) * (rk::C[1] - rk::C[0]) * (rk::C[0] - rk::C[2]);
        let [c0, c1, c2] = rk::C;
        for i in 0..self.z1.len() {
            let z1 = self.z1[i];
            let z2 = self.z2[i];
            let z3 = self.z3[i];
            self.cont[0][i] = ((-c2 * c2 * c1 * z1 + z3 * c1 * c0 * c0 + c1 * c1 * c2 * z1
                - c1 * c1 * c0 * z3
                + c2 * c2 * c0 * z2
                - z2 * c2 * c0 * c0)
                / den)
                - z3;
            self.cont[1][i] =
                -(c0 * c0 * (z3 - z2) + c1 * c1 * (z1 - z3) + c2 * c2 * (z2 - z1)) / den;
            self.cont[2][i] = (c0 * (z3 - z2) + c1 * (z1 - z3) + c2 * (z2 - z1)) / den;
        }
    }

    /// Warm-start prediction for the next step's Newton iteration, evaluating
    /// the interpolant at the new stage times `1 + c_i h/h_old`.
    fn predict_stages(&mut self, h: f64, h_old: f64) {
        let r = h / h_old;
        let x1 = 1.0 + rk::C[0] * r;
        let x2 = 1.0 + rk::C[1] * r;
        let x3 = 1.0 + rk::C[2] * r;
        for i in 0..self.z1.len() {
            self.z1[i] = self.cont[0][i] + x1 * (self.cont[1][i] + x1 * self.cont[2][i]);
            self.z2[i] = self.cont[0][i] + x2 * (self.cont[1][i] + x2 * self.cont[2][i]);
            self.z3[i] = self.cont[0][i] + x3 * (self.cont[1][i] + x3 * self.cont[2][i]);
        }
    }
}

impl<S: OdeSystem> IvpSolver for Radau5<'_, S> {
    fn integrate(
        &mut self,
        t0: f64,
        tf: f64,
        p: &DVector<f64>,
        y: &mut DVector<f64>,
        log: Option<&mut StepLog>,
    ) -> IvpStatus {
        Radau5::integrate(self, t0, tf, p, y, log)
    }

    fn stats(&self) -> &SolverStats {
        &self.stats
    }
}
