use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A `BatchSampler` turns a resumable cursor into this rank's stream of
/// index batches.
///
/// # Cursor
/// - `consumed_samples` counts *global* samples (all ranks combined) already
///   handed to training. It is the only mutable state, the only thing a
///   checkpoint needs, and it only moves forward.
///
/// # Method
/// - `iter()`: rebuilds epoch and offsets from `consumed_samples` and returns
///   a lazy iterator over the remaining batches of the current epoch.
///    - Each full batch advances `consumed_samples` by `global_batch_size`
///      right before it is yielded.
///    - Dropping the iterator early is fine; the cursor already reflects
///      every batch that was handed out.
///    - Calling `iter()` again continues from the cursor, so a training loop
///      calls it once per pass.
///
/// The iterator mutably borrows the sampler, so the cursor cannot be read
/// while a pass is in flight.
pub trait BatchSampler: Send {
    /// Number of batches a full pass over the dataset yields. Does not depend
    /// on the cursor.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Global samples consumed so far; store this in checkpoints.
    fn consumed_samples(&self) -> usize;

    fn iter(&mut self) -> Result<Box<dyn Iterator<Item = Vec<usize>> + Send + '_>>;

    /// Snapshot of the cursor for checkpointing.
    fn state(&self) -> SamplerState;
}

/// Serializable checkpoint record of a sampler's cursor.
///
/// Only `consumed_samples` is needed to resume; `epoch` is recorded for
/// humans reading checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerState {
    pub consumed_samples: usize,
    pub epoch: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_json_shape() -> Result<()> {
        let state = SamplerState {
            consumed_samples: 96,
            epoch: 1,
        };
        let json = serde_json::to_string(&state)?;
        assert_eq!(json, r#"{"consumed_samples":96,"epoch":1}"#);
        assert_eq!(serde_json::from_str::<SamplerState>(&json)?, state);
        Ok(())
    }
}
