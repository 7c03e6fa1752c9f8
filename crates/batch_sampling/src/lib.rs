pub mod batch_size;
pub mod config;
pub mod epoch;
pub mod error;
pub mod permutation;
pub mod pretraining;
pub mod random;
pub mod sampler;

pub use batch_size::BatchSizeCalculator;
pub use config::{SamplerConfig, SamplerConfigBuilder};
pub use epoch::{RandomSeedDataset, SupportsEpochSeeding};
pub use error::SamplerError;
pub use permutation::{ChaChaPermutation, Permutation};
pub use pretraining::PretrainingBatchSampler;
pub use random::RandomBatchSampler;
pub use sampler::{BatchSampler, SamplerState};
