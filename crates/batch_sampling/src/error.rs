//! Error types for batch samplers.
//!
//! Two failure classes exist and neither is recoverable:
//! - `Config`: sizes, rank or batch divisibility are inconsistent.
//! - `Precondition`: the resume cursor does not line up with the
//!   micro-batch grid when an iteration starts.
//!
//! Public functions return `anyhow::Result`; callers that need to tell the
//! two apart can `downcast_ref::<SamplerError>()` on the returned error.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SamplerError {
    /// Invalid sampler configuration
    #[error("invalid sampler configuration: {reason}")]
    Config { reason: String },

    /// Cursor is not aligned to `micro_batch_size * data_parallel_size`
    #[error(
        "consumed samples misaligned: {current_epoch_samples} samples into epoch {epoch} \
         is not a multiple of micro_batch_size * data_parallel_size ({alignment})"
    )]
    Precondition {
        epoch: usize,
        current_epoch_samples: usize,
        alignment: usize,
    },
}

impl SamplerError {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if this is a cursor precondition violation.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}
