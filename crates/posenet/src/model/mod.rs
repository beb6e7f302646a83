//! Model components: residual conv backbone and deconv heatmap head.

pub mod backbone;
pub mod head;

use burn::prelude::*;

use backbone::{Backbone, BackboneConfig};
use head::{HeatmapHead, HeatmapHeadConfig};

/// Overall output stride: input images at (H, W) produce heatmaps at
/// (H / STRIDE, W / STRIDE). Targets are rendered at the same resolution.
pub const HEATMAP_STRIDE: usize = 4;

/// Configuration for the pose network.
///
/// ```text
/// (batch, 3, H, W)
///   → Backbone (stride-2 stem + 2 residual stages, /8)
///   → HeatmapHead (2× upsampling deconv + 1×1 conv, /4)
///   → (batch, K, H/4, W/4)
/// ```
#[derive(Config, Debug)]
pub struct PoseNetConfig {
    /// Heatmap channels (one per keypoint).
    #[config(default = 17)]
    pub num_keypoints: usize,
    /// Stem output channels; stages double from here.
    #[config(default = 32)]
    pub base_channels: usize,
    /// Residual blocks per backbone stage.
    #[config(default = 2)]
    pub blocks_per_stage: usize,
    /// Detach backbone features so only the head trains.
    #[config(default = true)]
    pub freeze_backbone: bool,
}

/// Heatmap regressor: backbone features, optionally detached, into the head.
#[derive(Module, Debug)]
pub struct PoseNet<B: Backend> {
    backbone: Backbone<B>,
    head: HeatmapHead<B>,
    freeze_backbone: bool,
}

impl PoseNetConfig {
    /// Initialize a PoseNet with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PoseNet<B> {
        let backbone = BackboneConfig::new()
            .with_base_channels(self.base_channels)
            .with_blocks_per_stage(self.blocks_per_stage)
            .init(device);
        let head = HeatmapHeadConfig::new(backbone.out_channels(), self.num_keypoints).init(device);
        PoseNet {
            backbone,
            head,
            freeze_backbone: self.freeze_backbone,
        }
    }
}

impl<B: Backend> PoseNet<B> {
    /// Forward pass: images to heatmaps.
    ///
    /// Input shape: `(batch, 3, H, W)` with H and W divisible by 8.
    /// Output shape: `(batch, K, H/4, W/4)`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let features = self.backbone.forward(images);
        let features = if self.freeze_backbone {
            features.detach()
        } else {
            features
        };
        self.head.forward(features)
    }

    /// Parameters the optimizer will actually update.
    pub fn num_trainable_params(&self) -> usize {
        if self.freeze_backbone {
            self.head.num_params()
        } else {
            self.num_params()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model = PoseNetConfig::new()
            .with_num_keypoints(17)
            .with_base_channels(8)
            .with_blocks_per_stage(1)
            .init::<TestBackend>(&device);
        let input =
            Tensor::<TestBackend, 4>::random([2, 3, 64, 48], Distribution::Normal(0.0, 1.0), &device);
        let output = model.forward(input);
        assert_eq!(output.dims(), [2, 17, 16, 12]);
    }

    #[test]
    fn test_frozen_trainable_params_head_only() {
        let device = Default::default();
        let frozen = PoseNetConfig::new()
            .with_base_channels(8)
            .with_blocks_per_stage(1)
            .with_freeze_backbone(true)
            .init::<TestBackend>(&device);
        let full = PoseNetConfig::new()
            .with_base_channels(8)
            .with_blocks_per_stage(1)
            .with_freeze_backbone(false)
            .init::<TestBackend>(&device);

        assert!(frozen.num_trainable_params() < full.num_trainable_params());
        assert_eq!(frozen.num_params(), full.num_params());
    }

    #[test]
    fn test_output_depends_on_input() {
        let device = Default::default();
        let model = PoseNetConfig::new()
            .with_num_keypoints(2)
            .with_base_channels(8)
            .with_blocks_per_stage(1)
            .init::<TestBackend>(&device);

        let a = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);
        let b = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);
        let diff: f32 = (model.forward(a) - model.forward(b)).abs().sum().into_scalar().elem();
        assert!(diff > 1e-6, "different inputs should produce different heatmaps");
    }
}
