use crate::batch_size::BatchSizeCalculator;
use crate::config::SamplerConfig;
use crate::epoch::SupportsEpochSeeding;
use crate::error::SamplerError;
use crate::permutation::{ChaChaPermutation, Permutation};
use crate::sampler::{BatchSampler, SamplerState};
use anyhow::{ensure, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// ============================================================================
/// Shuffled, resumable batch sampler for data-parallel training.
///
/// Each rank builds its own `RandomBatchSampler` from the same config (apart
/// from `data_parallel_rank`) and the same `consumed_samples`. Ranks never
/// talk to each other about indices: they derive the same epoch, shuffle with
/// the same seed, and read different slices of the result.
///
/// # Epochs
/// The `last_batch_size = total_samples % global_batch_size` tail never fills
/// a global batch, so it is left out of the epoch arithmetic:
/// ```text
/// active_total_samples  = total_samples - last_batch_size
/// epoch                 = consumed_samples / active_total_samples
/// current_epoch_samples = consumed_samples % active_total_samples
/// ```
/// The shuffle seed is `seed + epoch`.
///
/// # Sharding policies
/// For `total_samples = 10`, `micro_batch_size = 1`, `global_batch_size = 4`,
/// two ranks, and an unshuffled permutation for readability:
/// ```text
/// data_sharding = true (contiguous bucket per rank, shuffled inside)
///   bucket_size = (10 / (1 * 2)) * 1 = 5
///   Rank 0: [0, 1] [2, 3] (4)
///   Rank 1: [5, 6] [7, 8] (9)
///
/// data_sharding = false (one global shuffle, strided across ranks)
///   full_bucket_size = (10 / 1) * 1 = 10
///   Rank 0: [0, 2] [4, 6] (8)
///   Rank 1: [1, 3] [5, 7] (9)
/// ```
/// Parenthesised batches are partial and only appear with `drop_last = false`.
/// Bucket sizes are computed from `total_samples`, while offsets inside the
/// epoch come from `active_total_samples`; every rank has to use exactly
/// these formulas for the per-rank slices to stay disjoint.
///
/// # Cursor
/// Every full batch advances `consumed_samples` by `global_batch_size` (the
/// global count, not this rank's share). A trailing partial batch does not
/// move the cursor. With `data_sharding` the full batches of a pass always
/// add up to `active_total_samples`, so the next `iter()` call starts the
/// following epoch.
///
/// # Example
/// ```ignore
/// let config = SamplerConfig::builder()
///     .total_samples(dataset.len())
///     .micro_batch_size(4)
///     .global_batch_size(64)
///     .data_parallel_rank(rank)
///     .data_parallel_size(world_size)
///     .build();
/// let mut sampler = RandomBatchSampler::new(config, checkpoint.consumed_samples)?;
///
/// loop {
///     for batch in sampler.iter()? {
///         // `batch` is this rank's 16 indices for the step
///     }
///     save_checkpoint(sampler.state())?;
/// }
/// ```
pub struct RandomBatchSampler {
    config: SamplerConfig,
    batch_sizes: BatchSizeCalculator,
    consumed_samples: usize,
    last_batch_size: usize,
    epoch: usize,
    dataset: Option<Arc<dyn SupportsEpochSeeding>>,
    permutation: Arc<dyn Permutation>,
}

/// Where the cursor sits relative to the current epoch.
#[derive(Debug, Clone, Copy)]
struct EpochPosition {
    epoch: usize,
    active_total_samples: usize,
    current_epoch_samples: usize,
}

impl RandomBatchSampler {
    pub fn new(config: SamplerConfig, consumed_samples: usize) -> Result<Self> {
        let batch_sizes = config.validate()?;
        let global_batch_size = batch_sizes.global_batch_size();
        ensure!(
            config.total_samples >= global_batch_size,
            SamplerError::config(format!(
                "total_samples ({}) must be >= global_batch_size ({}) to fill one batch",
                config.total_samples, global_batch_size
            ))
        );

        let last_batch_size = config.total_samples % global_batch_size;
        let epoch = consumed_samples / (config.total_samples - last_batch_size);
        Ok(Self {
            config,
            batch_sizes,
            consumed_samples,
            last_batch_size,
            epoch,
            dataset: None,
            permutation: Arc::new(ChaChaPermutation::new()),
        })
    }

    /// Resumes from a checkpointed cursor.
    pub fn from_state(config: SamplerConfig, state: SamplerState) -> Result<Self> {
        Self::new(config, state.consumed_samples)
    }

    /// Notify `dataset` of every epoch before its indices are produced.
    pub fn with_epoch_seeding(mut self, dataset: Arc<dyn SupportsEpochSeeding>) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Replace the default [`ChaChaPermutation`]. All ranks must use the same
    /// oracle.
    pub fn with_permutation(mut self, permutation: impl Permutation + 'static) -> Self {
        self.permutation = Arc::new(permutation);
        self
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Epoch of the most recent `iter()` call (or of the initial cursor).
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Samples at the tail of the dataset that never fill a global batch.
    pub fn last_batch_size(&self) -> usize {
        self.last_batch_size
    }

    pub fn active_total_samples(&self) -> usize {
        self.config.total_samples - self.last_batch_size
    }

    pub fn global_batch_size(&self) -> usize {
        self.batch_sizes.global_batch_size()
    }

    /// Indices this rank receives per full batch.
    pub fn batch_size_on_this_rank(&self) -> usize {
        self.batch_sizes.global_batch_size_on_this_data_parallel_rank()
    }

    /// Switches to a new global batch size, e.g. during batch-size ramp-up.
    ///
    /// The epoch arithmetic is rebuilt from the new size on the next `iter()`.
    /// On error nothing changes.
    pub fn update_global_batch_size(&mut self, new_global_batch_size: usize) -> Result<()> {
        ensure!(
            self.config.total_samples >= new_global_batch_size,
            SamplerError::config(format!(
                "total_samples ({}) must be >= global_batch_size ({}) to fill one batch",
                self.config.total_samples, new_global_batch_size
            ))
        );
        self.batch_sizes
            .update_global_batch_size(new_global_batch_size)?;
        self.config.global_batch_size = new_global_batch_size;
        self.last_batch_size = self.config.total_samples % new_global_batch_size;
        Ok(())
    }

    fn epoch_position(&self) -> Result<EpochPosition> {
        let active_total_samples = self.active_total_samples();
        let epoch = self.consumed_samples / active_total_samples;
        let current_epoch_samples = self.consumed_samples % active_total_samples;

        let alignment = self.config.micro_batch_size * self.config.data_parallel_size;
        ensure!(
            current_epoch_samples % alignment == 0,
            SamplerError::Precondition {
                epoch,
                current_epoch_samples,
                alignment,
            }
        );
        Ok(EpochPosition {
            epoch,
            active_total_samples,
            current_epoch_samples,
        })
    }

    /// This rank's remaining indices for the epoch at `position`, in order.
    fn index_range(&self, position: &EpochPosition) -> Vec<usize> {
        let SamplerConfig {
            total_samples,
            micro_batch_size,
            data_parallel_rank: rank,
            data_parallel_size: world_size,
            seed,
            ..
        } = self.config;
        let shuffle_seed = seed.wrapping_add(position.epoch as u64);

        if self.config.data_sharding {
            let bucket_size = (total_samples / (micro_batch_size * world_size)) * micro_batch_size;
            let bucket_offset = position.current_epoch_samples / world_size;
            let start_idx = rank * bucket_size;

            debug!(
                epoch = position.epoch,
                dataset_seed = ?self.dataset.as_ref().and_then(|d| d.current_seed()),
                active_total_samples = position.active_total_samples,
                current_epoch_samples = position.current_epoch_samples,
                bucket_size,
                bucket_offset,
                start_idx,
                "Sharded random sampling"
            );

            self.permutation
                .permute(bucket_size, shuffle_seed)
                .into_iter()
                .skip(bucket_offset)
                .map(|index| start_idx + index)
                .collect()
        } else {
            let full_bucket_size = (total_samples / micro_batch_size) * micro_batch_size;
            let full_bucket_offset = position.current_epoch_samples;

            debug!(
                epoch = position.epoch,
                dataset_seed = ?self.dataset.as_ref().and_then(|d| d.current_seed()),
                active_total_samples = position.active_total_samples,
                current_epoch_samples = position.current_epoch_samples,
                full_bucket_size,
                full_bucket_offset,
                "Flat random sampling"
            );

            self.permutation
                .permute(full_bucket_size, shuffle_seed)
                .into_iter()
                .skip(full_bucket_offset)
                .skip(rank)
                .step_by(world_size)
                .collect()
        }
    }
}

impl BatchSampler for RandomBatchSampler {
    fn len(&self) -> usize {
        self.config.num_batches()
    }

    fn consumed_samples(&self) -> usize {
        self.consumed_samples
    }

    fn iter(&mut self) -> Result<Box<dyn Iterator<Item = Vec<usize>> + Send + '_>> {
        let position = self.epoch_position()?;
        self.epoch = position.epoch;
        if let Some(dataset) = &self.dataset {
            dataset.set_epoch(position.epoch);
        }

        let mut indices = self.index_range(&position).into_iter();
        let batch_size = self.batch_sizes.global_batch_size_on_this_data_parallel_rank();
        let global_batch_size = self.batch_sizes.global_batch_size();
        let drop_last = self.config.drop_last;
        let rank = self.config.data_parallel_rank;
        let consumed_samples = &mut self.consumed_samples;

        Ok(Box::new(std::iter::from_fn(move || {
            let batch: Vec<usize> = indices.by_ref().take(batch_size).collect();
            if batch.len() == batch_size {
                *consumed_samples += global_batch_size;
                trace!(rank, consumed_samples = *consumed_samples, ?batch, "Yielding batch");
                Some(batch)
            } else if !drop_last && !batch.is_empty() {
                trace!(rank, ?batch, "Yielding partial batch");
                Some(batch)
            } else {
                None
            }
        })))
    }

    fn state(&self) -> SamplerState {
        SamplerState {
            consumed_samples: self.consumed_samples,
            epoch: self.consumed_samples / self.active_total_samples(),
        }
    }
}

impl fmt::Debug for RandomBatchSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomBatchSampler")
            .field("config", &self.config)
            .field("consumed_samples", &self.consumed_samples)
            .field("last_batch_size", &self.last_batch_size)
            .field("epoch", &self.epoch)
            .field("epoch_seeding", &self.dataset.is_some())
            .finish_non_exhaustive()
    }
}
