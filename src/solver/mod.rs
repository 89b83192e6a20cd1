use std::ops::AddAssign;

use nalgebra::DVector;

use crate::StepLog;

pub mod newton;
pub mod radau5;
pub mod rkf45;

pub use radau5::Radau5;
pub use rkf45::Rkf45;

/// Integration method used for every IVP of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Implicit Radau-IIA(5), the default for stiff systems.
    Radau5,
    /// Explicit Fehlberg 4(5) for non-stiff systems.
    Rkf45,
}

/// Per-IVP outcome. A non-success value marks that IVP's state as invalid;
/// the rest of the batch is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvpStatus {
    Success,
    /// Five LU decompositions failed in a row.
    MaxConsecutiveErrorsExceeded,
    /// The step-attempt budget was exhausted before reaching `tf`.
    MaxStepsExceeded,
    /// The step size shrank below the resolution of the current time,
    /// `0.1 * |h| <= |t| * EPS`.
    StepSizeTooSmall,
    /// Newton was still unconverged at its final allowed iteration.
    MaxNewtonIterationsExceeded,
}

impl IvpStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, IvpStatus::Success)
    }
}

/// Work counters for one IVP, zeroed at the start of every integration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Step attempts, including rejected ones.
    pub number_of_steps: usize,
    pub number_of_newton_iterations: usize,
    pub number_of_error_test_failures: usize,
    pub number_of_linear_solver_setups: usize,
    pub number_of_nonlinear_solver_fails: usize,
}

impl AddAssign<&SolverStats> for SolverStats {
    fn add_assign(&mut self, rhs: &SolverStats) {
        self.number_of_steps += rhs.number_of_steps;
        self.number_of_newton_iterations += rhs.number_of_newton_iterations;
        self.number_of_error_test_failures += rhs.number_of_error_test_failures;
        self.number_of_linear_solver_setups += rhs.number_of_linear_solver_setups;
        self.number_of_nonlinear_solver_fails += rhs.number_of_nonlinear_solver_fails;
    }
}

/// One adaptive integrator with its per-worker scratch, reusable across the
/// IVPs a worker claims.
pub(crate) trait IvpSolver {
    fn integrate(
        &mut self,
        t0: f64,
        tf: f64,
        p: &DVector<f64>,
        y: &mut DVector<f64>,
        log: Option<&mut StepLog>,
    ) -> IvpStatus;

    fn stats(&self) -> &SolverStats;
}
