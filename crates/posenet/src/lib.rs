//! Convolutional heatmap regression for keypoint pose estimation.
//!
//! Provides the ResNet-style backbone + deconv head model, the MSE training
//! loop with best-loss checkpointing and interval validation, and forward-only
//! inference with arg-max keypoint decoding.

pub mod inference;
pub mod model;
pub mod training;
pub mod viz;

/// Backend alias (NdArray by default; WGPU if enabled).
#[cfg(feature = "wgpu")]
pub type PoseBackend = burn::backend::Wgpu<f32>;
#[cfg(not(feature = "wgpu"))]
pub type PoseBackend = burn::backend::ndarray::NdArray<f32>;

/// Autodiff wrapper used for training.
pub type PoseAutodiffBackend = burn::backend::Autodiff<PoseBackend>;

/// Whether an accelerator backend was compiled in. The configuration layer
/// rejects `--device gpu` outright when this is false instead of silently
/// downgrading to CPU.
pub const GPU_COMPILED: bool = cfg!(feature = "wgpu");
