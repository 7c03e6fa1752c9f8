use crate::error::SamplerError;
use anyhow::{ensure, Result};

/// Derives the per-rank share of a global batch.
///
/// A global batch of `global_batch_size` samples is split evenly across
/// `data_parallel_size` ranks, and each rank's share is itself a whole
/// number of micro-batches:
///
/// ```text
/// global_batch_size = num_micro_batches * micro_batch_size * data_parallel_size
/// ```
///
/// # Example
/// ```ignore
/// let calculator = BatchSizeCalculator::new(2, 16, 4)?;
/// assert_eq!(calculator.num_micro_batches(), 2);
/// assert_eq!(calculator.global_batch_size_on_this_data_parallel_rank(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSizeCalculator {
    micro_batch_size: usize,
    data_parallel_size: usize,
    global_batch_size: usize,
    num_micro_batches: usize,
    global_batch_size_on_this_data_parallel_rank: usize,
}

impl BatchSizeCalculator {
    pub fn new(
        micro_batch_size: usize,
        global_batch_size: usize,
        data_parallel_size: usize,
    ) -> Result<Self> {
        ensure!(
            micro_batch_size > 0,
            SamplerError::config(format!(
                "micro_batch_size must be > 0, but got micro_batch_size={micro_batch_size}"
            ))
        );
        ensure!(
            data_parallel_size > 0,
            SamplerError::config(format!(
                "data_parallel_size must be > 0, but got data_parallel_size={data_parallel_size}"
            ))
        );

        let mut calculator = Self {
            micro_batch_size,
            data_parallel_size,
            global_batch_size: 0,
            num_micro_batches: 0,
            global_batch_size_on_this_data_parallel_rank: 0,
        };
        calculator.update_global_batch_size(global_batch_size)?;
        Ok(calculator)
    }

    /// Replaces the global batch size, e.g. during batch-size ramp-up.
    ///
    /// On error the previous sizes are kept.
    pub fn update_global_batch_size(&mut self, new_global_batch_size: usize) -> Result<()> {
        let micro_times_data_parallel = self
            .micro_batch_size
            .checked_mul(self.data_parallel_size)
            .ok_or_else(|| {
                SamplerError::config(format!(
                    "micro_batch_size ({}) times data_parallel_size ({}) overflows",
                    self.micro_batch_size, self.data_parallel_size
                ))
            })?;
        ensure!(
            new_global_batch_size > 0,
            SamplerError::config("global_batch_size must be > 0")
        );
        ensure!(
            new_global_batch_size % micro_times_data_parallel == 0,
            SamplerError::config(format!(
                "global_batch_size ({}) is not divisible by micro_batch_size ({}) times \
                 data_parallel_size ({})",
                new_global_batch_size, self.micro_batch_size, self.data_parallel_size
            ))
        );

        self.global_batch_size = new_global_batch_size;
        self.num_micro_batches = new_global_batch_size / micro_times_data_parallel;
        self.global_batch_size_on_this_data_parallel_rank =
            self.num_micro_batches * self.micro_batch_size;
        Ok(())
    }

    pub fn micro_batch_size(&self) -> usize {
        self.micro_batch_size
    }

    pub fn data_parallel_size(&self) -> usize {
        self.data_parallel_size
    }

    pub fn global_batch_size(&self) -> usize {
        self.global_batch_size
    }

    /// Micro-batches each rank runs per global batch.
    pub fn num_micro_batches(&self) -> usize {
        self.num_micro_batches
    }

    /// Number of indices one rank receives per global batch.
    pub fn global_batch_size_on_this_data_parallel_rank(&self) -> usize {
        self.global_batch_size_on_this_data_parallel_rank
    }
}
