//! Deconvolutional heatmap head.

use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Configuration for the heatmap head.
#[derive(Config, Debug)]
pub struct HeatmapHeadConfig {
    /// Feature channels coming from the backbone.
    pub in_channels: usize,
    /// Output heatmap channels (one per keypoint).
    pub num_keypoints: usize,
}

/// 2× upsampling deconv followed by a 1×1 regression conv.
///
/// No output activation: targets are Gaussian maps in [0, 1] and the loss is
/// plain MSE on the raw regression output.
#[derive(Module, Debug)]
pub struct HeatmapHead<B: Backend> {
    deconv: ConvTranspose2d<B>,
    out: Conv2d<B>,
}

impl HeatmapHeadConfig {
    /// Initialize a HeatmapHead with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> HeatmapHead<B> {
        // Kernel 4, stride 2, padding 1: exact 2x spatial upsampling.
        let deconv = ConvTranspose2dConfig::new([self.in_channels, self.in_channels / 2], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);
        let out = Conv2dConfig::new([self.in_channels / 2, self.num_keypoints], [1, 1]).init(device);
        HeatmapHead { deconv, out }
    }
}

impl<B: Backend> HeatmapHead<B> {
    /// Features `(batch, C, h, w)` to heatmaps `(batch, K, 2h, 2w)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.deconv.forward(x));
        self.out.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_head_upsamples_by_two() {
        let device = Default::default();
        let head = HeatmapHeadConfig::new(16, 5).init::<TestBackend>(&device);
        let input =
            Tensor::<TestBackend, 4>::random([2, 16, 8, 6], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(head.forward(input).dims(), [2, 5, 16, 12]);
    }
}
