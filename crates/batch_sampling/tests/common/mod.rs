#![allow(dead_code)]

use batch_sampling::{BatchSampler, RandomBatchSampler, SamplerConfig, SamplerConfigBuilder};

use anyhow::Result;

/// Base config shared by every rank in a simulated job; callers set the rank.
pub fn job_config(
    total_samples: usize,
    micro_batch_size: usize,
    global_batch_size: usize,
    world_size: usize,
) -> SamplerConfigBuilder {
    SamplerConfig::builder()
        .total_samples(total_samples)
        .micro_batch_size(micro_batch_size)
        .global_batch_size(global_batch_size)
        .data_parallel_size(world_size)
}

/// Builds one sampler per rank, all starting from `consumed_samples`.
pub fn samplers_for_all_ranks(
    config: &SamplerConfig,
    consumed_samples: usize,
) -> Result<Vec<RandomBatchSampler>> {
    (0..config.data_parallel_size)
        .map(|rank| {
            let mut config = config.clone();
            config.data_parallel_rank = rank;
            RandomBatchSampler::new(config, consumed_samples)
        })
        .collect()
}

/// Pulls batches one `iter()` call at a time, recording the cursor each batch
/// started from. Stops after `max_steps` batches or when a pass yields nothing.
pub fn step_with_cursor<S: BatchSampler>(
    sampler: &mut S,
    max_steps: usize,
) -> Result<Vec<(usize, Vec<usize>)>> {
    let mut steps = Vec::with_capacity(max_steps);
    while steps.len() < max_steps {
        let cursor = sampler.consumed_samples();
        match sampler.iter()?.next() {
            Some(batch) => steps.push((cursor, batch)),
            None => break,
        }
    }
    Ok(steps)
}

/// Routes sampler `tracing` events to the test harness; set `RUST_LOG=trace`
/// to see per-batch output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
