//! Training loop, validation pass, and checkpoint policy.

pub mod checkpoint;
pub mod data;
pub mod progress;
pub mod trainer;

pub use checkpoint::{process_checkpoint, CheckpointHyperparams, CheckpointMeta, CheckpointStore};
pub use data::collate;
pub use progress::{global_step, is_interval_step, TrainingProgress};
pub use trainer::{train, validate, OptimizerKind, TrainSettings};

use std::path::PathBuf;

/// Errors raised by the training loop and checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Checkpoint bundle unreadable, malformed, or incomplete.
    #[error("checkpoint at {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    /// Loss became non-finite. The run aborts rather than training on
    /// garbage gradients; the step is in the error for postmortems.
    #[error("non-finite loss {loss} at global step {global_step}")]
    NumericAnomaly { global_step: u64, loss: f64 },
}
