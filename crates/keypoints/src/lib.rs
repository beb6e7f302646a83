//! Keypoint dataset I/O for heatmap pose estimation.
//!
//! Provides annotation/image loading, Gaussian heatmap rendering, partition
//! splitting, and a shuffled batch iterator. Tensor-free: the training crate
//! collates samples into framework tensors.

pub mod dataset;
pub mod heatmap;
pub mod loader;
pub mod types;

pub use dataset::{load_coco_annotations, synthetic_partitions, synthetic_samples, DatasetConfig, Partitions};
pub use heatmap::{decode_peak, render_heatmaps};
pub use loader::{batches_per_epoch, BatchIter};
pub use types::{AnnotationRecord, DatasetError, Keypoint, KeypointSample};
