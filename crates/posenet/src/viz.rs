//! Visualization grids written alongside the scalar stream.
//!
//! Every logged namespace gets four grids: colorized ground-truth heatmaps,
//! ground truth overlaid on the input images, and the same pair for
//! predictions. Keypoint channels are collapsed by summation before display.

use burn::prelude::*;
use runlog::{colorize, make_grid, overlay, resize_nearest, PlanarImage, RunWriter};

const GRID_NROW: usize = 4;
const GRID_PADDING: usize = 2;
const GRID_PAD_VALUE: f32 = 1.0;

/// Split a `(N, C, H, W)` tensor into per-sample planar images.
fn to_planar<B: Backend>(t: &Tensor<B, 4>) -> Vec<PlanarImage> {
    let [n, c, h, w] = t.dims();
    let data: Vec<f32> = t.clone().into_data().iter::<f32>().collect();
    (0..n)
        .map(|i| PlanarImage::from_data(c, h, w, data[i * c * h * w..(i + 1) * c * h * w].to_vec()))
        .collect()
}

/// Collapse keypoint channels into one map per sample by summation.
pub fn heatmap_slices<B: Backend>(t: &Tensor<B, 4>) -> Vec<PlanarImage> {
    to_planar(&t.clone().sum_dim(1))
}

fn heat_grid(slices: &[PlanarImage]) -> PlanarImage {
    let colored: Vec<PlanarImage> = slices.iter().map(colorize).collect();
    make_grid(&colored, GRID_NROW, GRID_PADDING, GRID_PAD_VALUE)
}

fn overlay_grid(image_grid: &PlanarImage, slices: &[PlanarImage], h: usize, w: usize) -> PlanarImage {
    let scaled: Vec<PlanarImage> = slices.iter().map(|s| resize_nearest(s, h, w)).collect();
    overlay(image_grid, &make_grid(&scaled, GRID_NROW, GRID_PADDING, GRID_PAD_VALUE))
}

/// Write the four grids `{ns}/gt`, `{ns}/gt_image`, `{ns}/pred`, and
/// `{ns}/pred_image` for one batch.
pub fn log_grids<B: Backend>(
    writer: &mut RunWriter,
    namespace: &str,
    inputs: &Tensor<B, 4>,
    targets: &Tensor<B, 4>,
    outputs: &Tensor<B, 4>,
    step: u64,
) -> anyhow::Result<()> {
    let images = to_planar(inputs);
    if images.is_empty() {
        return Ok(());
    }
    let (h, w) = (images[0].height, images[0].width);
    let target_slices = heatmap_slices(targets);
    let output_slices = heatmap_slices(outputs);
    let image_grid = make_grid(&images, GRID_NROW, GRID_PADDING, GRID_PAD_VALUE);

    writer.add_image(&format!("{namespace}/gt"), &heat_grid(&target_slices), step)?;
    writer.add_image(
        &format!("{namespace}/gt_image"),
        &overlay_grid(&image_grid, &target_slices, h, w),
        step,
    )?;
    writer.add_image(&format!("{namespace}/pred"), &heat_grid(&output_slices), step)?;
    writer.add_image(
        &format!("{namespace}/pred_image"),
        &overlay_grid(&image_grid, &output_slices, h, w),
        step,
    )?;
    Ok(())
}

/// Write ground-truth-only grids, used to preview a batch before training.
pub fn log_sample_grids<B: Backend>(
    writer: &mut RunWriter,
    inputs: &Tensor<B, 4>,
    targets: &Tensor<B, 4>,
) -> anyhow::Result<()> {
    let images = to_planar(inputs);
    if images.is_empty() {
        return Ok(());
    }
    let (h, w) = (images[0].height, images[0].width);
    let target_slices = heatmap_slices(targets);
    let image_grid = make_grid(&images, GRID_NROW, GRID_PADDING, GRID_PAD_VALUE);

    writer.add_image("Sample/gt", &heat_grid(&target_slices), 0)?;
    writer.add_image(
        "Sample/gt_image",
        &overlay_grid(&image_grid, &target_slices, h, w),
        0,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::Distribution;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_heatmap_slices_collapse_channels() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 4>::ones([3, 5, 4, 4], &device);
        let slices = heatmap_slices(&t);
        assert_eq!(slices.len(), 3);
        assert_eq!((slices[0].channels, slices[0].height, slices[0].width), (1, 4, 4));
        // Five all-one channels sum to five everywhere.
        assert!(slices[0].data.iter().all(|&v| (v - 5.0).abs() < 1e-6));
    }

    #[test]
    fn test_log_grids_writes_four_images() {
        let tmp = TempDir::new().unwrap();
        let mut writer = RunWriter::create(tmp.path(), "run").unwrap();
        let device = Default::default();
        let inputs =
            Tensor::<TestBackend, 4>::random([2, 3, 16, 12], Distribution::Uniform(0.0, 1.0), &device);
        let targets =
            Tensor::<TestBackend, 4>::random([2, 4, 4, 3], Distribution::Uniform(0.0, 1.0), &device);
        let outputs = targets.clone();

        log_grids(&mut writer, "Valid", &inputs, &targets, &outputs, 50).unwrap();

        for tag in ["gt", "gt_image", "pred", "pred_image"] {
            let path = tmp.path().join(format!("run/images/Valid_{tag}_50.png"));
            assert!(path.exists(), "missing {tag} grid");
        }
    }

    #[test]
    fn test_log_sample_grids() {
        let tmp = TempDir::new().unwrap();
        let mut writer = RunWriter::create(tmp.path(), "run").unwrap();
        let device = Default::default();
        let inputs = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
        let targets = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);

        log_sample_grids(&mut writer, &inputs, &targets).unwrap();

        assert!(tmp.path().join("run/images/Sample_gt_0.png").exists());
        assert!(tmp.path().join("run/images/Sample_gt_image_0.png").exists());
    }
}
