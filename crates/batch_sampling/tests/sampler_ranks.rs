//! Cross-rank tests for the batch samplers.
//!
//! Tests cover:
//! - Sharded policy: per-rank index sets partition the active pool
//! - Flat policy: interleaving the ranks rebuilds the global permutation
//! - Sequential sampler: ranks split every global batch between them
//! - All ranks agree on the epoch they notify the dataset with

mod common;
use common::{init_tracing, job_config, samplers_for_all_ranks};

use batch_sampling::{
    BatchSampler, ChaChaPermutation, Permutation, PretrainingBatchSampler, RandomBatchSampler,
    RandomSeedDataset,
};

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

// ================================================================================================
// 1. Sharded policy
// ================================================================================================
#[test]
fn sharded_ranks_partition_the_active_pool() -> Result<()> {
    init_tracing();
    // last_batch_size = 4, active pool = 96, bucket_size = 24
    let config = job_config(100, 2, 8, 4).drop_last(true).build();

    let mut seen = HashSet::new();
    for (rank, mut sampler) in samplers_for_all_ranks(&config, 0)?.into_iter().enumerate() {
        let indices: Vec<usize> = sampler.iter()?.flatten().collect();
        assert_eq!(indices.len(), 24, "rank {rank} should read its whole bucket");
        assert!(
            indices.iter().all(|&i| (rank * 24..(rank + 1) * 24).contains(&i)),
            "rank {rank} left its bucket"
        );
        for index in indices {
            assert!(seen.insert(index), "index {index} emitted by two ranks");
        }
        assert_eq!(sampler.consumed_samples(), 96);
    }
    assert_eq!(seen.len(), 96);
    Ok(())
}

#[test]
fn sharded_resume_skips_consumed_portion() -> Result<()> {
    let config = job_config(100, 2, 8, 4).build();
    let consumed = 16;

    let mut from_start = samplers_for_all_ranks(&config, 0)?;
    let mut resumed = samplers_for_all_ranks(&config, consumed)?;

    let mut seen = HashSet::new();
    for (full, tail) in from_start.iter_mut().zip(resumed.iter_mut()) {
        let full: Vec<usize> = full.iter()?.flatten().collect();
        let tail: Vec<usize> = tail.iter()?.flatten().collect();
        // Each rank already handed out 16 / 4 = 4 of its indices
        assert_eq!(tail, full[4..]);
        seen.extend(tail);
    }
    assert_eq!(seen.len(), 96 - consumed);
    Ok(())
}

// ================================================================================================
// 2. Flat policy
// ================================================================================================
#[test]
fn flat_ranks_interleave_into_global_permutation() -> Result<()> {
    let world_size = 4;
    let config = job_config(100, 2, 8, world_size)
        .data_sharding(false)
        .drop_last(false)
        .build();

    let per_rank: Vec<Vec<usize>> = samplers_for_all_ranks(&config, 0)?
        .iter_mut()
        .map(|sampler| -> Result<Vec<usize>> { Ok(sampler.iter()?.flatten().collect()) })
        .collect::<Result<_>>()?;

    let mut merged = Vec::new();
    for position in 0..per_rank[0].len() {
        for indices in &per_rank {
            if let Some(&index) = indices.get(position) {
                merged.push(index);
            }
        }
    }
    assert_eq!(merged, ChaChaPermutation::new().permute(100, 0));
    Ok(())
}

#[test]
fn flat_ranks_never_overlap_within_epoch() -> Result<()> {
    let config = job_config(64, 4, 16, 2).data_sharding(false).seed(9).build();

    let mut seen = HashSet::new();
    for mut sampler in samplers_for_all_ranks(&config, 0)? {
        for index in sampler.iter()?.flatten() {
            assert!(seen.insert(index));
        }
    }
    assert_eq!(seen.len(), 64);
    Ok(())
}

// ================================================================================================
// 3. Sequential sampler
// ================================================================================================
#[test]
fn sequential_ranks_cover_every_full_batch() -> Result<()> {
    let world_size = 3;
    let base = job_config(50, 2, 12, world_size).build();

    let mut seen = HashSet::new();
    for rank in 0..world_size {
        let mut config = base.clone();
        config.data_parallel_rank = rank;
        let mut sampler = PretrainingBatchSampler::new(config, 0)?;
        for batch in sampler.iter()? {
            assert_eq!(batch.len(), 4);
            seen.extend(batch);
        }
    }
    // Four full global batches of 12
    assert_eq!(seen, (0..48).collect::<HashSet<_>>());
    Ok(())
}

// ================================================================================================
// 4. Epoch notification
// ================================================================================================
#[test]
fn all_ranks_notify_the_same_epoch() -> Result<()> {
    let config = job_config(40, 1, 8, 4).seed(5).build();

    for consumed in [0, 40, 88] {
        let mut seeds = HashSet::new();
        for rank in 0..4 {
            let dataset = Arc::new(RandomSeedDataset::new((), 500));
            let mut rank_config = config.clone();
            rank_config.data_parallel_rank = rank;
            let mut sampler =
                RandomBatchSampler::new(rank_config, consumed)?.with_epoch_seeding(dataset.clone());
            sampler.iter()?.next();
            seeds.insert(dataset.curr_seed());
        }
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds.into_iter().next(), Some(500 + (consumed / 40) as u64));
    }
    Ok(())
}
