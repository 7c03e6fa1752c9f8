use crate::batch_size::BatchSizeCalculator;
use crate::config::SamplerConfig;
use crate::error::SamplerError;
use crate::sampler::{BatchSampler, SamplerState};
use anyhow::{ensure, Result};
use tracing::{debug, trace};

/// ============================================================================
/// Sequential, resumable batch sampler for data-parallel training.
///
/// Walks `consumed_samples..total_samples` in order, cuts it into global
/// batches and hands each rank every `data_parallel_size`-th index of each
/// global batch, starting at its rank. There is no shuffling and no epoch
/// wraparound: once the cursor reaches `total_samples` the sampler is done.
///
/// # Worker allocation
/// - For 10 samples, `global_batch_size = 4` and two ranks:
/// ```text
/// Global batches: [0, 1, 2, 3] [4, 5, 6, 7] (8, 9)
///
///   Rank 0: [0, 2] [4, 6] (8)
///   Rank 1: [1, 3] [5, 7] (9)
/// ```
/// The parenthesised partial batch is only yielded with `drop_last = false`
/// and does not advance the cursor. A rank whose share of the partial batch
/// is empty still yields an empty batch, so all ranks take the same number
/// of steps.
///
/// `data_sharding` and `seed` in the config are ignored.
#[derive(Debug, Clone)]
pub struct PretrainingBatchSampler {
    config: SamplerConfig,
    batch_sizes: BatchSizeCalculator,
    consumed_samples: usize,
}

impl PretrainingBatchSampler {
    pub fn new(config: SamplerConfig, consumed_samples: usize) -> Result<Self> {
        let batch_sizes = config.validate()?;
        ensure!(
            consumed_samples < config.total_samples,
            SamplerError::config(format!(
                "no samples left to consume: consumed_samples={}, total_samples={}",
                consumed_samples, config.total_samples
            ))
        );
        Ok(Self {
            config,
            batch_sizes,
            consumed_samples,
        })
    }

    pub fn from_state(config: SamplerConfig, state: SamplerState) -> Result<Self> {
        Self::new(config, state.consumed_samples)
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    pub fn global_batch_size(&self) -> usize {
        self.batch_sizes.global_batch_size()
    }

    /// Switches to a new global batch size, e.g. during batch-size ramp-up.
    pub fn update_global_batch_size(&mut self, new_global_batch_size: usize) -> Result<()> {
        self.batch_sizes
            .update_global_batch_size(new_global_batch_size)?;
        self.config.global_batch_size = new_global_batch_size;
        Ok(())
    }
}

impl BatchSampler for PretrainingBatchSampler {
    fn len(&self) -> usize {
        self.config.num_batches()
    }

    fn consumed_samples(&self) -> usize {
        self.consumed_samples
    }

    fn iter(&mut self) -> Result<Box<dyn Iterator<Item = Vec<usize>> + Send + '_>> {
        let global_batch_size = self.batch_sizes.global_batch_size();
        let batch_size = self.batch_sizes.global_batch_size_on_this_data_parallel_rank();
        let rank = self.config.data_parallel_rank;
        let world_size = self.config.data_parallel_size;
        let drop_last = self.config.drop_last;

        debug!(
            consumed_samples = self.consumed_samples,
            total_samples = self.config.total_samples,
            global_batch_size,
            "Sequential sampling"
        );

        let mut indices = self.consumed_samples..self.config.total_samples;
        let consumed_samples = &mut self.consumed_samples;

        Ok(Box::new(std::iter::from_fn(move || {
            let global_batch: Vec<usize> = indices.by_ref().take(global_batch_size).collect();
            let is_full = global_batch.len() == global_batch_size;
            if !is_full && (drop_last || global_batch.is_empty()) {
                return None;
            }

            let batch: Vec<usize> = global_batch
                .into_iter()
                .skip(rank)
                .step_by(world_size)
                .collect();
            if is_full {
                debug_assert_eq!(batch.len(), batch_size);
                *consumed_samples += global_batch_size;
            }
            trace!(rank, ?batch, "Yielding batch");
            Some(batch)
        })))
    }

    fn state(&self) -> SamplerState {
        SamplerState {
            consumed_samples: self.consumed_samples,
            epoch: 0,
        }
    }
}
