use std::sync::atomic::{AtomicU64, Ordering};

/// A dataset that reseeds its own per-sample randomness every epoch.
///
/// Samplers call `set_epoch` with the epoch they are about to draw indices
/// for, before any index of that epoch is produced. This keeps
/// dataset-internal randomness (augmentations, masking) in step with the
/// index order on every rank.
///
/// Implementations must be `Send + Sync` so the same dataset handle can be
/// shared with loader threads while the sampler updates it.
pub trait SupportsEpochSeeding: Send + Sync {
    fn set_epoch(&self, epoch: usize);

    /// The seed currently in effect, for diagnostics only.
    fn current_seed(&self) -> Option<u64> {
        None
    }
}

/// Wraps a dataset and tracks the seed its per-sample randomness should use.
///
/// # Seed derivation
/// ```text
/// curr_seed   = base_seed + epoch
/// sample_seed = curr_seed + index
/// ```
/// At epoch 0 `curr_seed == base_seed`. Sample `i` gets a distinct seed in
/// each epoch, and the same seed for the same `(epoch, i)` on any rank or
/// any rerun.
///
/// # Example
/// ```ignore
/// let dataset = Arc::new(RandomSeedDataset::new(images, 1234));
/// let mut sampler = RandomBatchSampler::new(config, 0)?
///     .with_epoch_seeding(dataset.clone());
///
/// for batch in sampler.iter()? {
///     for index in batch {
///         let mut rng = StdRng::seed_from_u64(dataset.sample_seed(index));
///         // ... augment dataset.inner()[index] with `rng` ...
///     }
/// }
/// ```
#[derive(Debug)]
pub struct RandomSeedDataset<D> {
    inner: D,
    base_seed: u64,
    curr_seed: AtomicU64,
}

impl<D> RandomSeedDataset<D> {
    pub fn new(inner: D, base_seed: u64) -> Self {
        Self {
            inner,
            base_seed,
            curr_seed: AtomicU64::new(base_seed),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    pub fn curr_seed(&self) -> u64 {
        self.curr_seed.load(Ordering::Acquire)
    }

    /// Seed for sample `index` in the current epoch.
    #[inline]
    pub fn sample_seed(&self, index: usize) -> u64 {
        self.curr_seed().wrapping_add(index as u64)
    }
}

impl<D: Send + Sync> SupportsEpochSeeding for RandomSeedDataset<D> {
    fn set_epoch(&self, epoch: usize) {
        self.curr_seed
            .store(self.base_seed.wrapping_add(epoch as u64), Ordering::Release);
    }

    fn current_seed(&self) -> Option<u64> {
        Some(self.curr_seed())
    }
}
