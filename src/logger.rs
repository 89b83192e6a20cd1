use nalgebra::DVector;

/// Step-by-step trajectory of one nominated IVP.
///
/// Holds the initial state and an entry per accepted step. Disabled by
/// default; enabled for a single IVP index via
/// [crate::SolverOptions::log_ivp].
#[derive(Clone, Debug, Default)]
pub struct StepLog {
    times: Vec<f64>,
    states: Vec<DVector<f64>>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, t: f64, y: &DVector<f64>) {
        self.times.push(t);
        self.states.push(y.clone());
    }

    pub(crate) fn clear(&mut self) {
        self.times.clear();
        self.states.clear();
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn states(&self) -> &[DVector<f64>] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &DVector<f64>)> {
        self.times.iter().copied().zip(self.states.iter())
    }
}
