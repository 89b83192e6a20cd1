use nalgebra::{DMatrix, DVector};

/// The user problem hook: right-hand side and Jacobian of a family of IVPs
/// `dy/dt = f(t, p, y)` sharing one dimensionality.
///
/// Every IVP in a batch shares the same system; only the parameter vector
/// `p` and the state differ. Implementations must be pure functions of their
/// arguments — the batch dispatcher calls them concurrently from many
/// workers.
pub trait OdeSystem: Sync {
    /// Number of state components N.
    fn nstates(&self) -> usize;

    /// Number of per-IVP parameters P.
    fn nparams(&self) -> usize;

    /// Evaluate `dydt = f(t, p, y)`.
    fn rhs(&self, y: &DVector<f64>, p: &DVector<f64>, t: f64, dydt: &mut DVector<f64>);

    /// Evaluate the N×N Jacobian `J_ij = df_i/dy_j` into `jac`.
    fn jacobian(&self, y: &DVector<f64>, p: &DVector<f64>, t: f64, jac: &mut DMatrix<f64>);
}

/// An [OdeSystem] defined by a pair of closures.
pub struct ClosureSystem<F, G>
where
    F: Fn(&DVector<f64>, &DVector<f64>, f64, &mut DVector<f64>) + Sync,
    G: Fn(&DVector<f64>, &DVector<f64>, f64, &mut DMatrix<f64>) + Sync,
{
    rhs: F,
    jacobian: G,
    nstates: usize,
    nparams: usize,
}

impl<F, G> ClosureSystem<F, G>
where
    F: Fn(&DVector<f64>, &DVector<f64>, f64, &mut DVector<f64>) + Sync,
    G: Fn(&DVector<f64>, &DVector<f64>, f64, &mut DMatrix<f64>) + Sync,
{
    pub fn new(rhs: F, jacobian: G, nstates: usize, nparams: usize) -> Self {
        Self {
            rhs,
            jacobian,
            nstates,
            nparams,
        }
    }
}

impl<F, G> OdeSystem for ClosureSystem<F, G>
where
    F: Fn(&DVector<f64>, &DVector<f64>, f64, &mut DVector<f64>) + Sync,
    G: Fn(&DVector<f64>, &DVector<f64>, f64, &mut DMatrix<f64>) + Sync,
{
    fn nstates(&self) -> usize {
        self.nstates
    }

    fn nparams(&self) -> usize {
        self.nparams
    }

    fn rhs(&self, y: &DVector<f64>, p: &DVector<f64>, t: f64, dydt: &mut DVector<f64>) {
        (self.rhs)(y, p, t, dydt)
    }

    fn jacobian(&self, y: &DVector<f64>, p: &DVector<f64>, t: f64, jac: &mut DMatrix<f64>) {
        (self.jacobian)(y, p, t, jac)
    }
}
