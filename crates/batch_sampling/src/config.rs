//! src/config.rs
//!
//! Configuration shared by the batch samplers.
//!
//! The `SamplerConfig` struct stores the parameters that control how a rank's
//! index stream is built. It is immutable once a sampler is constructed; the
//! only state that changes during training is the sampler's
//! `consumed_samples` cursor.
//!
//! Example:
//! ```ignore
//! let config = SamplerConfig::builder()
//!     .total_samples(100)
//!     .micro_batch_size(2)
//!     .global_batch_size(4)
//!     .data_parallel_rank(0)
//!     .data_parallel_size(2)
//!     .drop_last(true)
//!     .data_sharding(true)
//!     .build();
//! config.validate()?;
//! ```
//!
//! Every rank must be given the same config apart from `data_parallel_rank`.
//! Ranks never exchange index assignments; they only agree because they run
//! the same arithmetic on the same numbers.

use crate::batch_size::BatchSizeCalculator;
use crate::error::SamplerError;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a batch sampler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Dataset size visible to sampling, constant for the run
    pub total_samples: usize,
    /// Samples per micro-batch on one rank
    pub micro_batch_size: usize,
    /// Samples per training step across all ranks
    pub global_batch_size: usize,
    /// This worker's rank, `0 <= rank < data_parallel_size`
    #[serde(default)]
    pub data_parallel_rank: usize,
    /// Number of data-parallel ranks
    #[serde(default = "default_data_parallel_size")]
    pub data_parallel_size: usize,
    /// Whether to drop a trailing incomplete batch
    #[serde(default = "default_true")]
    pub drop_last: bool,
    /// Shuffle inside contiguous per-rank buckets (true) or stride over
    /// one global shuffle (false). Only used by the random sampler.
    #[serde(default = "default_true")]
    pub data_sharding: bool,
    /// Base shuffle seed; the epoch is added to it. Must match on all ranks.
    #[serde(default)]
    pub seed: u64,
}

fn default_data_parallel_size() -> usize {
    1
}

fn default_true() -> bool {
    true
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            total_samples: 0,
            micro_batch_size: 1,
            global_batch_size: 1,
            data_parallel_rank: 0,
            data_parallel_size: 1,
            drop_last: true,
            data_sharding: true,
            seed: 0,
        }
    }
}

impl SamplerConfig {
    pub fn builder() -> SamplerConfigBuilder {
        SamplerConfigBuilder::default()
    }

    /// Parses a config from JSON. Missing optional fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse sampler config")
    }

    /// Checks sizes and rank, then derives the per-rank batch sizes.
    pub fn validate(&self) -> Result<BatchSizeCalculator> {
        ensure!(
            self.total_samples > 0,
            SamplerError::config(format!(
                "no sample to consume: total_samples={}",
                self.total_samples
            ))
        );
        ensure!(
            self.data_parallel_size > 0,
            SamplerError::config(format!(
                "data_parallel_size must be > 0, but got data_parallel_size={}",
                self.data_parallel_size
            ))
        );
        ensure!(
            self.data_parallel_rank < self.data_parallel_size,
            SamplerError::config(format!(
                "Invalid rank {}, rank should be in the interval [0, {}]",
                self.data_parallel_rank,
                self.data_parallel_size - 1
            ))
        );
        BatchSizeCalculator::new(
            self.micro_batch_size,
            self.global_batch_size,
            self.data_parallel_size,
        )
    }

    /// Number of batches a full pass yields: `floor(N / G)` with `drop_last`,
    /// otherwise `ceil(N / G)`.
    pub fn num_batches(&self) -> usize {
        if self.global_batch_size == 0 {
            return 0;
        }
        if self.drop_last {
            self.total_samples / self.global_batch_size
        } else {
            self.total_samples.div_ceil(self.global_batch_size)
        }
    }
}

/// Builder for SamplerConfig with method chaining
#[derive(Debug, Clone, Default)]
pub struct SamplerConfigBuilder {
    config: SamplerConfig,
}

impl SamplerConfigBuilder {
    pub fn total_samples(mut self, total_samples: usize) -> Self {
        self.config.total_samples = total_samples;
        self
    }

    pub fn micro_batch_size(mut self, size: usize) -> Self {
        self.config.micro_batch_size = size;
        self
    }

    /// Must be a multiple of `micro_batch_size * data_parallel_size`
    pub fn global_batch_size(mut self, size: usize) -> Self {
        self.config.global_batch_size = size;
        self
    }

    pub fn data_parallel_rank(mut self, rank: usize) -> Self {
        self.config.data_parallel_rank = rank;
        self
    }

    pub fn data_parallel_size(mut self, size: usize) -> Self {
        self.config.data_parallel_size = size;
        self
    }

    pub fn drop_last(mut self, drop: bool) -> Self {
        self.config.drop_last = drop;
        self
    }

    pub fn data_sharding(mut self, sharding: bool) -> Self {
        self.config.data_sharding = sharding;
        self
    }

    /// Set the base shuffle seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Build the final configuration. Validation happens when a sampler is
    /// constructed, or explicitly through [`SamplerConfig::validate`].
    pub fn build(self) -> SamplerConfig {
        self.config
    }
}
