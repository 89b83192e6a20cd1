use std::num::NonZeroUsize;

use crate::error::OdeBatchError;

/// Memory layout of the packed batch arrays (`p` and `y`).
///
/// `RowMajor` ('C') stores all components of one IVP contiguously,
/// `ColumnMajor` ('F') stores one component of all IVPs contiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    RowMajor,
    ColumnMajor,
}

impl TryFrom<char> for Layout {
    type Error = OdeBatchError;

    fn try_from(order: char) -> Result<Self, Self::Error> {
        match order {
            'C' => Ok(Layout::RowMajor),
            'F' => Ok(Layout::ColumnMajor),
            _ => Err(crate::options_error!(UnknownLayout, (order))),
        }
    }
}

/// Options shared by all solvers in a batch.
///
/// Validated once when the [crate::BatchSolver] is constructed and immutable
/// afterwards. The dispatch-shape fields (`vector_size`, `block_size`,
/// `num_blocks`) follow the conventions of accelerator work-group launches:
/// the worker count is `block_size / vector_size * num_blocks`, with
/// `num_blocks` defaulting to the hardware parallelism.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Absolute tolerance, must be positive.
    pub atol: f64,
    /// Relative tolerance, must be positive.
    pub rtol: f64,
    /// Initial step size, must be positive.
    pub h_init: f64,
    /// Maximum number of step attempts per IVP.
    pub max_steps: usize,
    /// SIMD lane count the block size is normalized by, power of two.
    pub vector_size: usize,
    /// Workers per block, power of two.
    pub block_size: usize,
    /// Number of blocks, defaults to the hardware parallelism.
    pub num_blocks: Option<usize>,
    /// Claim IVPs from a shared atomic queue instead of static chunks.
    pub use_queue: bool,
    /// Layout of the packed `p` and `y` arrays.
    pub layout: Layout,
    /// Record a `(t, y)` entry after every accepted step of this IVP.
    pub log_ivp: Option<usize>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            atol: 1e-10,
            rtol: 1e-6,
            h_init: 1e-6,
            max_steps: 200_000,
            vector_size: 1,
            block_size: 1,
            num_blocks: None,
            use_queue: true,
            layout: Layout::RowMajor,
            log_ivp: None,
        }
    }
}

impl SolverOptions {
    pub(crate) fn validate(&self) -> Result<(), OdeBatchError> {
        if !(self.atol > 0.0) {
            return Err(crate::options_error!(
                NonPositive,
                {
                    name: "atol",
                    value: self.atol
                }
            ));
        }
        if !(self.rtol > 0.0) {
            return Err(crate::options_error!(
                NonPositive,
                {
                    name: "rtol",
                    value: self.rtol
                }
            ));
        }
        if !(self.h_init > 0.0) {
            return Err(crate::options_error!(
                NonPositive,
                {
                    name: "h_init",
                    value: self.h_init
                }
            ));
        }
        if self.max_steps == 0 {
            return Err(crate::options_error!(ZeroMaxSteps));
        }
        if !self.vector_size.is_power_of_two() {
            return Err(crate::options_error!(
                NotPowerOfTwo,
                {
                    name: "vector_size",
                    value: self.vector_size
                }
            ));
        }
        if !self.block_size.is_power_of_two() {
            return Err(crate::options_error!(
                NotPowerOfTwo,
                {
                    name: "block_size",
                    value: self.block_size
                }
            ));
        }
        Ok(())
    }

    /// Number of OS-thread workers the batch dispatcher will launch.
    pub fn num_workers(&self) -> usize {
        let block_size = self.block_size.max(self.vector_size) / self.vector_size;
        let num_blocks = self.num_blocks.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        });
        (block_size * num_blocks).max(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_options_are_valid() {
        assert!(SolverOptions::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_tolerances() {
        for (atol, rtol, h_init) in [(0.0, 1e-6, 1e-6), (1e-10, -1.0, 1e-6), (1e-10, 1e-6, 0.0)] {
            let options = SolverOptions {
                atol,
                rtol,
                h_init,
                ..Default::default()
            };
            assert!(options.validate().is_err());
        }
    }

    #[test]
    fn rejects_non_power_of_two_shapes() {
        let options = SolverOptions {
            vector_size: 3,
            ..Default::default()
        };
        assert!(options.validate().is_err());
        let options = SolverOptions {
            block_size: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn layout_from_order_char() {
        assert_eq!(Layout::try_from('C').unwrap(), Layout::RowMajor);
        assert_eq!(Layout::try_from('F').unwrap(), Layout::ColumnMajor);
        assert!(Layout::try_from('X').is_err());
    }

    #[test]
    fn worker_count_normalizes_block_size() {
        let options = SolverOptions {
            vector_size: 4,
            block_size: 8,
            num_blocks: Some(3),
            ..Default::default()
        };
        assert_eq!(options.num_workers(), 6);

        // block size smaller than the vector width is promoted to one worker
        let options = SolverOptions {
            vector_size: 8,
            block_size: 2,
            num_blocks: Some(2),
            ..Default::default()
        };
        assert_eq!(options.num_workers(), 2);
    }
}
