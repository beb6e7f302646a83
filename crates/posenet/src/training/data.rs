//! Batch collation: samples into input and target tensors.

use burn::prelude::*;
use keypoints::{render_heatmaps, KeypointSample};

/// Stack a batch into an input tensor `(N, 3, H, W)` and a Gaussian target
/// tensor `(N, K, h, w)` rendered at `heatmap_shape` with spread `sigma`.
///
/// All samples in a batch share the image shape and keypoint count; the
/// loaders guarantee this.
pub fn collate<B: Backend>(
    batch: &[&KeypointSample],
    heatmap_shape: (usize, usize),
    sigma: f32,
    device: &B::Device,
) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let n = batch.len();
    let (height, width) = (batch[0].height, batch[0].width);
    let num_keypoints = batch[0].num_keypoints();
    let (map_h, map_w) = heatmap_shape;

    let mut pixels = Vec::with_capacity(n * 3 * height * width);
    let mut maps = Vec::with_capacity(n * num_keypoints * map_h * map_w);
    for sample in batch {
        pixels.extend_from_slice(&sample.pixels);
        maps.extend(render_heatmaps(&sample.keypoints, map_h, map_w, sigma));
    }

    let inputs = Tensor::from_data(TensorData::new(pixels, [n, 3, height, width]), device);
    let targets = Tensor::from_data(
        TensorData::new(maps, [n, num_keypoints, map_h, map_w]),
        device,
    );
    (inputs, targets)
}
