use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A seeded shuffle of `0..n`.
///
/// Every rank calls `permute` with the same `(n, seed)` and relies on getting
/// back the same sequence, so implementations must be pure functions of their
/// arguments: no thread-local RNGs, no platform-dependent arithmetic.
pub trait Permutation: Send + Sync {
    /// Returns the integers `0..n`, each exactly once, in an order determined
    /// only by `seed`.
    fn permute(&self, n: usize, seed: u64) -> Vec<usize>;
}

/// Fisher–Yates over a ChaCha8 stream.
///
/// # Algorithm
/// 1. `rng = ChaCha8Rng::seed_from_u64(seed)`.
/// 2. Start from `[0, 1, ..., n-1]`.
/// 3. For `i` from `n-1` down to `1`: draw `j` uniformly from `0..=i` and
///    swap positions `i` and `j`.
///
/// Uniform draws use Lemire's multiply-and-reject on `next_u64`, so every
/// draw consumes a whole number of 64-bit words and there is no modulo bias.
/// ChaCha8's output stream is fixed by its seed independent of platform,
/// which makes the whole permutation reproducible across processes and builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaChaPermutation;

impl ChaChaPermutation {
    pub fn new() -> Self {
        Self
    }
}

impl Permutation for ChaChaPermutation {
    fn permute(&self, n: usize, seed: u64) -> Vec<usize> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..n).collect();
        for i in (1..n).rev() {
            let j = bounded_u64(&mut rng, i as u64 + 1) as usize;
            indices.swap(i, j);
        }
        indices
    }
}

/// Uniform draw from `0..range`. `range` must be non-zero.
#[inline]
fn bounded_u64<R: RngCore>(rng: &mut R, range: u64) -> u64 {
    let mut product = u128::from(rng.next_u64()) * u128::from(range);
    let mut low = product as u64;
    if low < range {
        let threshold = range.wrapping_neg() % range;
        while low < threshold {
            product = u128::from(rng.next_u64()) * u128::from(range);
            low = product as u64;
        }
    }
    (product >> 64) as u64
}

impl<F> Permutation for F
where
    F: Fn(usize, u64) -> Vec<usize> + Send + Sync,
{
    fn permute(&self, n: usize, seed: u64) -> Vec<usize> {
        self(n, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const TEST_SEED: u64 = 42;

    #[test]
    fn yields_every_index_once() {
        let permutation = ChaChaPermutation::new().permute(1000, TEST_SEED);
        assert_eq!(permutation.len(), 1000);
        assert_eq!(HashSet::<_>::from_iter(permutation.iter().copied()).len(), 1000);
        assert!(permutation.iter().all(|&i| i < 1000));
    }

    #[test]
    fn same_seed_same_order() {
        let oracle = ChaChaPermutation::new();
        assert_eq!(oracle.permute(100, 3), oracle.permute(100, 3));
        // A second instance must agree too (separate ranks)
        assert_eq!(oracle.permute(100, 3), ChaChaPermutation.permute(100, 3));
        assert_ne!(oracle.permute(100, 3), oracle.permute(100, 4));
    }

    #[test]
    fn actually_shuffles() {
        let permutation = ChaChaPermutation::new().permute(100, TEST_SEED);
        assert_ne!(permutation, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn handles_tiny_ranges() {
        let oracle = ChaChaPermutation::new();
        assert!(oracle.permute(0, TEST_SEED).is_empty());
        assert_eq!(oracle.permute(1, TEST_SEED), vec![0]);
    }

    #[test]
    fn bounded_draws_stay_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(TEST_SEED);
        for range in [1u64, 2, 3, 7, 1 << 40, u64::MAX] {
            for _ in 0..100 {
                assert!(bounded_u64(&mut rng, range) < range);
            }
        }
    }

    #[test]
    fn closures_act_as_oracles() {
        let reversed = |n: usize, _seed: u64| (0..n).rev().collect::<Vec<_>>();
        assert_eq!(reversed.permute(4, 0), vec![3, 2, 1, 0]);
    }
}
