//! Residual convolutional backbone.
//!
//! A compact ResNet-style feature extractor: a stride-2 stem followed by two
//! stages, each a stride-2 projection plus identity residual blocks. Total
//! stride 8, output channels `4 * base_channels`.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::relu;

/// 3×3 conv + ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Conv2d<B>,
}

impl<B: Backend> ConvBlock<B> {
    fn new(c_in: usize, c_out: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([c_in, c_out], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        Self { conv }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.conv.forward(x))
    }
}

/// Identity residual block: two 3×3 convs with a skip connection.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
}

impl<B: Backend> ResidualBlock<B> {
    fn new(channels: usize, device: &B::Device) -> Self {
        let conv = || {
            Conv2dConfig::new([channels, channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        Self {
            conv1: conv(),
            conv2: conv(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = relu(self.conv1.forward(x.clone()));
        let y = self.conv2.forward(y);
        relu(x + y)
    }
}

/// One backbone stage: stride-2 channel projection then residual blocks.
#[derive(Module, Debug)]
pub struct Stage<B: Backend> {
    down: ConvBlock<B>,
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> Stage<B> {
    fn new(c_in: usize, c_out: usize, num_blocks: usize, device: &B::Device) -> Self {
        Self {
            down: ConvBlock::new(c_in, c_out, 2, device),
            blocks: (0..num_blocks)
                .map(|_| ResidualBlock::new(c_out, device))
                .collect(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.down.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        x
    }
}

/// Configuration for the backbone.
#[derive(Config, Debug)]
pub struct BackboneConfig {
    #[config(default = 32)]
    pub base_channels: usize,
    #[config(default = 2)]
    pub blocks_per_stage: usize,
}

/// Stride-8 feature extractor over RGB input.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    stem: ConvBlock<B>,
    stage1: Stage<B>,
    stage2: Stage<B>,
    out_channels: usize,
}

impl BackboneConfig {
    /// Initialize a Backbone with the given configuration.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        let c = self.base_channels;
        Backbone {
            stem: ConvBlock::new(3, c, 2, device),
            stage1: Stage::new(c, 2 * c, self.blocks_per_stage, device),
            stage2: Stage::new(2 * c, 4 * c, self.blocks_per_stage, device),
            out_channels: 4 * c,
        }
    }
}

impl<B: Backend> Backbone<B> {
    /// Feature channels of the output tensor.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Input `(batch, 3, H, W)` to features `(batch, 4*base, H/8, W/8)`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.stem.forward(x);
        let x = self.stage1.forward(x);
        self.stage2.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_backbone_stride_and_channels() {
        let device = Default::default();
        let backbone = BackboneConfig::new()
            .with_base_channels(8)
            .with_blocks_per_stage(1)
            .init::<TestBackend>(&device);
        let input =
            Tensor::<TestBackend, 4>::random([1, 3, 64, 48], Distribution::Normal(0.0, 1.0), &device);
        let out = backbone.forward(input);
        assert_eq!(out.dims(), [1, 32, 8, 6]);
        assert_eq!(backbone.out_channels(), 32);
    }

    #[test]
    fn test_residual_block_preserves_shape() {
        let device = Default::default();
        let block = ResidualBlock::<TestBackend>::new(4, &device);
        let input =
            Tensor::<TestBackend, 4>::random([2, 4, 8, 8], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(block.forward(input).dims(), [2, 4, 8, 8]);
    }
}
