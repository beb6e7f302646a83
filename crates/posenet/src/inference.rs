//! Forward-only scoring of the test partition.
//!
//! Runs the model over a bounded prefix of the test set in stable order,
//! decodes arg-max keypoint locations from both the target and predicted
//! heatmaps, and reports per-batch reconstruction loss. Nothing here touches
//! weights or optimizer state.

use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::*;
use keypoints::{decode_peak, BatchIter, KeypointSample};
use rand::rngs::StdRng;
use rand::SeedableRng;
use runlog::RunWriter;

use crate::model::PoseNet;
use crate::training::collate;
use crate::viz;

/// Batches scored per prediction run.
pub const PREDICT_BATCH_LIMIT: usize = 9;

/// Decoded result for one test batch.
#[derive(Debug, Clone)]
pub struct BatchPrediction {
    /// Per sample, per channel: arg-max (row, col) of the target heatmap.
    pub target_peaks: Vec<Vec<(usize, usize)>>,
    /// Per sample, per channel: arg-max (row, col) of the predicted heatmap.
    pub predicted_peaks: Vec<Vec<(usize, usize)>>,
    /// Mean MSE between predicted and target heatmaps.
    pub loss: f64,
}

/// Arg-max peaks for every sample and channel of a heatmap tensor.
pub fn decode_batch_peaks<B: Backend>(heatmaps: &Tensor<B, 4>) -> Vec<Vec<(usize, usize)>> {
    let [n, k, h, w] = heatmaps.dims();
    let data: Vec<f32> = heatmaps.clone().into_data().iter::<f32>().collect();
    (0..n)
        .map(|i| {
            (0..k)
                .map(|c| {
                    let start = (i * k + c) * h * w;
                    decode_peak(&data[start..start + h * w], h, w)
                })
                .collect()
        })
        .collect()
}

/// Score up to [`PREDICT_BATCH_LIMIT`] test batches with a frozen model.
///
/// The first batch optionally logs `Test/*` grids through `sink`.
pub fn predict<B: Backend>(
    model: &PoseNet<B>,
    test_set: &[KeypointSample],
    batch_size: usize,
    heatmap_shape: (usize, usize),
    sigma: f32,
    mut sink: Option<(&mut RunWriter, u64)>,
    device: &B::Device,
) -> anyhow::Result<Vec<BatchPrediction>> {
    // Unshuffled, so reruns score the same prefix.
    let mut rng = StdRng::seed_from_u64(0);
    let mse = MseLoss::new();
    let mut results = Vec::new();

    for (batch_index, batch) in BatchIter::new(test_set, batch_size, &mut rng, false)
        .take(PREDICT_BATCH_LIMIT)
        .enumerate()
    {
        let (inputs, targets) = collate::<B>(&batch, heatmap_shape, sigma, device);
        let outputs = model.forward(inputs.clone());
        let loss: f64 = mse
            .forward(outputs.clone(), targets.clone(), Reduction::Mean)
            .into_scalar()
            .elem();

        if batch_index == 0 {
            if let Some((writer, step)) = sink.take() {
                viz::log_grids(writer, "Test", &inputs, &targets, &outputs, step)?;
            }
        }

        tracing::info!(batch = batch_index, loss, "Scored test batch");
        results.push(BatchPrediction {
            target_peaks: decode_batch_peaks(&targets),
            predicted_peaks: decode_batch_peaks(&outputs),
            loss,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PoseNetConfig;
    use burn::backend::ndarray::NdArray;
    use keypoints::synthetic_samples;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn tiny_model(device: &<TestBackend as Backend>::Device) -> PoseNet<TestBackend> {
        PoseNetConfig::new()
            .with_num_keypoints(2)
            .with_base_channels(4)
            .with_blocks_per_stage(1)
            .init(device)
    }

    #[test]
    fn test_predict_respects_batch_limit() {
        let device = Default::default();
        let model = tiny_model(&device);
        // 24 samples at batch 2 is 12 batches; only 9 get scored.
        let samples = synthetic_samples(24, 2, (16, 16), 0);
        let results =
            predict(&model, &samples, 2, (4, 4), 1.0, None, &device).unwrap();
        assert_eq!(results.len(), PREDICT_BATCH_LIMIT);
        for batch in &results {
            assert_eq!(batch.target_peaks.len(), 2);
            assert_eq!(batch.target_peaks[0].len(), 2);
            assert!(batch.loss.is_finite());
        }
    }

    #[test]
    fn test_predict_short_test_set() {
        let device = Default::default();
        let model = tiny_model(&device);
        let samples = synthetic_samples(5, 2, (16, 16), 0);
        let results =
            predict(&model, &samples, 2, (4, 4), 1.0, None, &device).unwrap();
        assert_eq!(results.len(), 3);
        // Final partial batch holds the leftover sample.
        assert_eq!(results[2].predicted_peaks.len(), 1);
    }

    #[test]
    fn test_predict_is_stable_across_runs() {
        let device = Default::default();
        let model = tiny_model(&device);
        let samples = synthetic_samples(8, 2, (16, 16), 0);
        let a = predict(&model, &samples, 4, (4, 4), 1.0, None, &device).unwrap();
        let b = predict(&model, &samples, 4, (4, 4), 1.0, None, &device).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.loss, y.loss);
            assert_eq!(x.predicted_peaks, y.predicted_peaks);
        }
    }

    #[test]
    fn test_first_batch_logs_test_grids() {
        let tmp = TempDir::new().unwrap();
        let mut writer = RunWriter::create(tmp.path(), "run").unwrap();
        let device = Default::default();
        let model = tiny_model(&device);
        let samples = synthetic_samples(4, 2, (16, 16), 0);

        predict(&model, &samples, 2, (4, 4), 1.0, Some((&mut writer, 7)), &device).unwrap();

        assert!(tmp.path().join("run/images/Test_pred_7.png").exists());
        assert!(tmp.path().join("run/images/Test_gt_image_7.png").exists());
    }

    #[test]
    fn test_target_peaks_match_keypoints() {
        let device = Default::default();
        let samples = synthetic_samples(2, 1, (16, 16), 3);
        let batch: Vec<&keypoints::KeypointSample> = samples.iter().collect();
        let (_, targets) = collate::<TestBackend>(&batch, (16, 16), 1.0, &device);
        let peaks = decode_batch_peaks(&targets);
        for (sample, decoded) in samples.iter().zip(&peaks) {
            let kp = sample.keypoints[0];
            let expect = ((kp.y * 15.0).round() as usize, (kp.x * 15.0).round() as usize);
            assert_eq!(decoded[0], expect);
        }
    }
}
