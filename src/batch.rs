use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use nalgebra::DVector;

use crate::error::OdeBatchError;
use crate::solver::{IvpSolver, IvpStatus, Method, Radau5, Rkf45, SolverStats};
use crate::{Layout, OdeSystem, SolverOptions, StepLog};

/// Result of one dispatched batch: a return code and work counters per IVP,
/// plus the step trace of the nominated IVP if logging was requested.
/// Final states are written back into the caller's packed `y` array.
#[derive(Debug)]
pub struct BatchOutput {
    pub codes: Vec<IvpStatus>,
    pub stats: Vec<SolverStats>,
    pub log: Option<StepLog>,
}

impl BatchOutput {
    /// True when every IVP of the batch finished successfully.
    pub fn all_success(&self) -> bool {
        self.codes.iter().all(IvpStatus::is_success)
    }

    /// Counters reduced over the whole batch.
    pub fn total_stats(&self) -> SolverStats {
        let mut total = SolverStats::default();
        for stats in &self.stats {
            total += stats;
        }
        total
    }
}

struct IvpResult {
    index: usize,
    y: DVector<f64>,
    stats: SolverStats,
    code: IvpStatus,
    log: Option<StepLog>,
}

/// Fans a batch of independent IVPs sharing one [OdeSystem] across OS-thread
/// workers.
///
/// Each worker owns one integrator instance (and with it all per-IVP
/// scratch), allocated when the worker starts and reused for every IVP the
/// worker claims. Work is handed out either as static contiguous chunks or
/// through a shared atomic counter that workers fetch-and-add to claim the
/// next unstarted IVP; the queue keeps load balanced when per-IVP cost is
/// skewed. Results are scattered back by IVP index after all workers join,
/// so the output is bit-identical regardless of dispatch mode or worker
/// count.
pub struct BatchSolver<S: OdeSystem> {
    system: S,
    method: Method,
    options: SolverOptions,
    num_workers: usize,
}

impl<S: OdeSystem> BatchSolver<S> {
    /// Validate the options and build a dispatcher. Invalid options
    /// (non-power-of-two launch shape, non-positive tolerances) are
    /// batch-fatal and reported here, before any work starts.
    pub fn new(system: S, method: Method, options: SolverOptions) -> Result<Self, OdeBatchError> {
        options.validate()?;
        let num_workers = options.num_workers();
        Ok(Self {
            system,
            method,
            options,
            num_workers,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    /// Integrate every IVP of the batch from `t0[k]` to `tf[k]`.
    ///
    /// `p` and `y` are packed `K x nparams` and `K x nstates` arrays in the
    /// configured [Layout]; final states overwrite `y` in place. Shape
    /// mismatches are batch-fatal; per-IVP failures are reported in the
    /// returned codes and leave that IVP's slot in `y` untouched.
    pub fn integrate(
        &self,
        t0: &[f64],
        tf: &[f64],
        p: &[f64],
        y: &mut [f64],
    ) -> Result<BatchOutput, OdeBatchError> {
        let nivp = t0.len();
        self.check_shapes(nivp, tf, p, y)?;

        let nstates = self.system.nstates();
        log::debug!(
            "dispatching {nivp} IVPs across {} workers ({})",
            self.num_workers,
            if self.options.use_queue {
                "queue"
            } else {
                "static"
            }
        );

        let next = AtomicUsize::new(0);
        let y_in: &[f64] = y;
        let mut results: Vec<IvpResult> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.num_workers);
            for worker in 0..self.num_workers {
                let next = &next;
                handles.push(scope.spawn(move || match self.method {
                    Method::Radau5 => {
                        let mut solver = Radau5::new(&self.system, &self.options);
                        self.worker_loop(&mut solver, worker, next, t0, tf, p, y_in)
                    }
                    Method::Rkf45 => {
                        let mut solver = Rkf45::new(&self.system, &self.options);
                        self.worker_loop(&mut solver, worker, next, t0, tf, p, y_in)
                    }
                }));
            }
            handles
                .into_iter()
                .flat_map(|handle| handle.join().expect("worker panicked"))
                .collect()
        });

        // scatter in index order so the caller-visible arrays are
        // independent of worker interleaving
        results.sort_by_key(|result| result.index);
        let mut codes = vec![IvpStatus::Success; nivp];
        let mut stats = vec![SolverStats::default(); nivp];
        let mut log = None;
        for result in results {
            if result.code.is_success() {
                scatter(y, &result.y, result.index, nivp, nstates, self.options.layout);
            } else {
                log::warn!("IVP {} failed: {:?}", result.index, result.code);
            }
            codes[result.index] = result.code;
            stats[result.index] = result.stats;
            if result.log.is_some() {
                log = result.log;
            }
        }
        Ok(BatchOutput { codes, stats, log })
    }

    /// Convenience wrapper for a batch sharing a single time span.
    pub fn integrate_to(
        &self,
        t0: f64,
        tf: f64,
        p: &[f64],
        y: &mut [f64],
    ) -> Result<BatchOutput, OdeBatchError> {
        let nivp = if self.system.nstates() == 0 {
            0
        } else {
            y.len() / self.system.nstates()
        };
        let t0 = vec![t0; nivp];
        let tf = vec![tf; nivp];
        self.integrate(&t0, &tf, p, y)
    }

    fn worker_loop<I: IvpSolver>(
        &self,
        solver: &mut I,
        worker: usize,
        next: &AtomicUsize,
        t0: &[f64],
        tf: &[f64],
        p: &[f64],
        y: &[f64],
    ) -> Vec<IvpResult> {
        let nivp = t0.len();
        let mut results = Vec::new();
        if self.options.use_queue {
            loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                if index >= nivp {
                    break;
                }
                results.push(self.run_one(solver, index, t0, tf, p, y));
            }
        } else {
            let start = worker * nivp / self.num_workers;
            let end = (worker + 1) * nivp / self.num_workers;
            for index in start..end {
                results.push(self.run_one(solver, index, t0, tf, p, y));
            }
        }
        results
    }

    fn run_one<I: IvpSolver>(
        &self,
        solver: &mut I,
        index: usize,
        t0: &[f64],
        tf: &[f64],
        p: &[f64],
        y: &[f64],
    ) -> IvpResult {
        let nivp = t0.len();
        let layout = self.options.layout;
        let p_k = gather(p, index, nivp, self.system.nparams(), layout);
        let mut y_k = gather(y, index, nivp, self.system.nstates(), layout);
        let mut log = if self.options.log_ivp == Some(index) {
            Some(StepLog::new())
        } else {
            None
        };
        let code = solver.integrate(t0[index], tf[index], &p_k, &mut y_k, log.as_mut());
        IvpResult {
            index,
            y: y_k,
            stats: solver.stats().clone(),
            code,
            log,
        }
    }

    fn check_shapes(
        &self,
        nivp: usize,
        tf: &[f64],
        p: &[f64],
        y: &[f64],
    ) -> Result<(), OdeBatchError> {
        if tf.len() != nivp {
            return Err(crate::batch_error!(
                WrongSliceLength,
                {
                    name: "tf",
                    expected: nivp,
                    found: tf.len()
                }
            ));
        }
        if p.len() != nivp * self.system.nparams() {
            return Err(crate::batch_error!(
                WrongSliceLength,
                {
                    name: "p",
                    expected: nivp * self.system.nparams(),
                    found: p.len()
                }
            ));
        }
        if y.len() != nivp * self.system.nstates() {
            return Err(crate::batch_error!(
                WrongSliceLength,
                {
                    name: "y",
                    expected: nivp * self.system.nstates(),
                    found: y.len()
                }
            ));
        }
        if let Some(index) = self.options.log_ivp {
            if index >= nivp {
                return Err(crate::batch_error!(
                    LogIndexOutOfRange,
                    { index, nivp }
                ));
            }
        }
        Ok(())
    }
}

fn gather(packed: &[f64], index: usize, nivp: usize, ncomp: usize, layout: Layout) -> DVector<f64> {
    match layout {
        Layout::RowMajor => {
            DVector::from_column_slice(&packed[index * ncomp..(index + 1) * ncomp])
        }
        Layout::ColumnMajor => {
            let mut v = DVector::zeros(ncomp);
            for i in 0..ncomp {
                v[i] = packed[i * nivp + index];
            }
            v
        }
    }
}

fn scatter(
    packed: &mut [f64],
    v: &DVector<f64>,
    index: usize,
    nivp: usize,
    ncomp: usize,
    layout: Layout,
) {
    match layout {
        Layout::RowMajor => {
            packed[index * ncomp..(index + 1) * ncomp].copy_from_slice(v.as_slice())
        }
        Layout::ColumnMajor => {
            for i in 0..ncomp {
                packed[i * nivp + index] = v[i];
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_models::van_der_pol::VanDerPol;
    use crate::ClosureSystem;
    use nalgebra::DMatrix;

    fn mixed_mu_batch(nivp: usize) -> (Vec<f64>, Vec<f64>) {
        // deterministic spread of stiffness parameters in [0.1, 100]
        let p: Vec<f64> = (0..nivp)
            .map(|k| 0.1 + 99.9 * (k as f64 / (nivp - 1).max(1) as f64))
            .collect();
        let mut y = Vec::with_capacity(nivp * 2);
        for _ in 0..nivp {
            y.extend_from_slice(&[2.0, 0.0]);
        }
        (p, y)
    }

    fn solver(options: SolverOptions) -> BatchSolver<VanDerPol> {
        BatchSolver::new(VanDerPol, Method::Radau5, options).unwrap()
    }

    #[test]
    fn queue_and_static_modes_agree_bitwise() {
        let nivp = 97;
        let (p, y_init) = mixed_mu_batch(nivp);

        let mut outputs = Vec::new();
        for use_queue in [true, false] {
            let options = SolverOptions {
                use_queue,
                num_blocks: Some(4),
                ..Default::default()
            };
            let solver = solver(options);
            let mut y = y_init.clone();
            let output = solver.integrate_to(0.0, 1.0, &p, &mut y).unwrap();
            assert!(output.all_success());
            outputs.push((y, output.stats));
        }
        assert_eq!(outputs[0].0, outputs[1].0);
        assert_eq!(outputs[0].1, outputs[1].1);
    }

    #[test]
    fn worker_count_does_not_change_results() {
        let nivp = 33;
        let (p, y_init) = mixed_mu_batch(nivp);

        let mut states = Vec::new();
        for num_blocks in [1, 4] {
            let options = SolverOptions {
                num_blocks: Some(num_blocks),
                ..Default::default()
            };
            let solver = solver(options);
            let mut y = y_init.clone();
            assert!(solver.integrate_to(0.0, 1.0, &p, &mut y).unwrap().all_success());
            states.push(y);
        }
        assert_eq!(states[0], states[1]);
    }

    #[test]
    fn layouts_agree() {
        let nivp = 7;
        let (p, y_row) = mixed_mu_batch(nivp);

        let options = SolverOptions {
            num_blocks: Some(2),
            ..Default::default()
        };
        let solver_row = solver(options.clone());
        let mut y_c = y_row.clone();
        solver_row.integrate_to(0.0, 1.0, &p, &mut y_c).unwrap();

        // transpose initial state into column-major and back
        let mut y_f = vec![0.0; nivp * 2];
        for k in 0..nivp {
            for i in 0..2 {
                y_f[i * nivp + k] = y_row[k * 2 + i];
            }
        }
        let options = SolverOptions {
            layout: Layout::ColumnMajor,
            ..options
        };
        let solver_col = solver(options);
        solver_col.integrate_to(0.0, 1.0, &p, &mut y_f).unwrap();

        for k in 0..nivp {
            for i in 0..2 {
                assert_eq!(y_c[k * 2 + i], y_f[i * nivp + k]);
            }
        }
    }

    #[test]
    fn failed_ivp_does_not_corrupt_neighbours() {
        // IVP 1 carries a poisoned Jacobian through its parameter
        let system = ClosureSystem::new(
            |y: &DVector<f64>, p: &DVector<f64>, _t, dydt: &mut DVector<f64>| {
                dydt[0] = if p[0] > 0.5 { f64::NAN } else { -y[0] };
            },
            |_y, p: &DVector<f64>, _t, jac: &mut DMatrix<f64>| {
                jac[(0, 0)] = if p[0] > 0.5 { f64::NAN } else { -1.0 };
            },
            1,
            1,
        );
        let solver = BatchSolver::new(system, Method::Radau5, SolverOptions::default()).unwrap();
        let p = vec![0.0, 1.0, 0.0];
        let mut y = vec![1.0, 1.0, 1.0];
        let output = solver.integrate_to(0.0, 1.0, &p, &mut y).unwrap();

        assert_eq!(output.codes[1], IvpStatus::MaxConsecutiveErrorsExceeded);
        assert!(output.codes[0].is_success());
        assert!(output.codes[2].is_success());
        // failed slot is left at its initial value
        assert_eq!(y[1], 1.0);
        let exact = (-1.0_f64).exp();
        assert!((y[0] - exact).abs() < 1e-5);
        assert_eq!(y[0], y[2]);
    }

    #[test]
    fn shape_mismatch_is_batch_fatal() {
        let solver = solver(SolverOptions::default());
        let mut y = vec![2.0, 0.0];
        assert!(solver.integrate(&[0.0], &[1.0, 2.0], &[1.0], &mut y).is_err());
        assert!(solver.integrate(&[0.0], &[1.0], &[], &mut y).is_err());
        assert!(solver.integrate(&[0.0], &[1.0], &[1.0], &mut y[..1]).is_err());
    }

    #[test]
    fn log_index_out_of_range_is_batch_fatal() {
        let options = SolverOptions {
            log_ivp: Some(5),
            ..Default::default()
        };
        let solver = solver(options);
        let mut y = vec![2.0, 0.0];
        assert!(solver.integrate(&[0.0], &[1.0], &[1.0], &mut y).is_err());
    }

    #[test]
    fn nominated_ivp_is_logged() {
        let nivp = 5;
        let (p, mut y) = mixed_mu_batch(nivp);
        let options = SolverOptions {
            log_ivp: Some(3),
            num_blocks: Some(2),
            ..Default::default()
        };
        let solver = solver(options);
        let output = solver.integrate_to(0.0, 1.0, &p, &mut y).unwrap();
        let log = output.log.expect("log requested");
        assert!(log.len() >= 2);
        assert_eq!(log.times()[0], 0.0);
        assert_eq!(*log.times().last().unwrap(), 1.0);
        // the last logged state is the final state of IVP 3
        let last = log.states().last().unwrap();
        assert_eq!(last[0], y[3 * 2]);
        assert_eq!(last[1], y[3 * 2 + 1]);
    }

    #[test]
    fn counters_are_reduced_over_the_batch() {
        let nivp = 4;
        let (p, mut y) = mixed_mu_batch(nivp);
        let solver = solver(SolverOptions::default());
        let output = solver.integrate_to(0.0, 1.0, &p, &mut y).unwrap();
        let total = output.total_stats();
        let by_hand: usize = output.stats.iter().map(|s| s.number_of_steps).sum();
        assert_eq!(total.number_of_steps, by_hand);
        assert!(total.number_of_steps >= nivp);
        assert!(total.number_of_newton_iterations > 0);
    }

    #[test]
    fn rkf45_batch_runs() {
        let nivp = 9;
        let (p, mut y) = mixed_mu_batch(nivp);
        let solver = BatchSolver::new(
            VanDerPol,
            Method::Rkf45,
            SolverOptions {
                num_blocks: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        let output = solver.integrate_to(0.0, 0.5, &p, &mut y).unwrap();
        assert!(output.all_success());
        let total = output.total_stats();
        assert_eq!(total.number_of_newton_iterations, 0);
    }
}
