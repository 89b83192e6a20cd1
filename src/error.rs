use thiserror::Error;

/// Custom error type for odebatch
///
/// This error type is used to wrap all batch-fatal errors that can occur when
/// setting up or dispatching a batch. Per-IVP outcomes are reported as
/// [crate::IvpStatus] values, not as errors: a failed IVP never aborts the
/// batch.
#[derive(Error, Debug)]
pub enum OdeBatchError {
    #[error("Linear solver error: {0}")]
    LinearSolverError(#[from] LinearSolverError),
    #[error("Options error: {0}")]
    OptionsError(#[from] OptionsError),
    #[error("Batch error: {0}")]
    BatchError(#[from] BatchError),
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors that can occur when factorising or solving the block
/// iteration matrices
#[derive(Error, Debug)]
pub enum LinearSolverError {
    #[error("LU not initialized")]
    LuNotInitialized,
    #[error("LU factorisation failed")]
    LuFactorisationFailed,
    #[error("LU solve failed")]
    LuSolveFailed,
}

/// Possible errors in the solver options, raised at construction
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("{name} = {value} is not a power of two")]
    NotPowerOfTwo { name: &'static str, value: usize },
    #[error("{name} = {value} must be positive")]
    NonPositive { name: &'static str, value: f64 },
    #[error("max_steps must be non-zero")]
    ZeroMaxSteps,
    #[error("Order '{0}' not recognized")]
    UnknownLayout(char),
}

/// Possible errors when dispatching a batch
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("{name} has wrong length: expected {expected}, got {found}")]
    WrongSliceLength {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Logged IVP index {index} is out of range for batch of {nivp}")]
    LogIndexOutOfRange { index: usize, nivp: usize },
}

#[macro_export]
macro_rules! options_error {
    ($variant:ident) => {
        $crate::error::OdeBatchError::from($crate::error::OptionsError::$variant)
    };
    ($variant:ident, $($arg:tt)*) => {
        $crate::error::OdeBatchError::from($crate::error::OptionsError::$variant $($arg)*)
    };
}

#[macro_export]
macro_rules! batch_error {
    ($variant:ident) => {
        $crate::error::OdeBatchError::from($crate::error::BatchError::$variant)
    };
    ($variant:ident, $($arg:tt)*) => {
        $crate::error::OdeBatchError::from($crate::error::BatchError::$variant $($arg)*)
    };
}
