//! MSE training loop with interval validation and best-loss checkpointing.

use anyhow::bail;
use burn::module::AutodiffModule;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::{AdamConfig, GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use keypoints::{batches_per_epoch, BatchIter, KeypointSample};
use rand::rngs::StdRng;
use rand::SeedableRng;
use runlog::RunWriter;

use super::checkpoint::{process_checkpoint, CheckpointHyperparams, CheckpointStore};
use super::data::collate;
use super::progress::{global_step, is_interval_step, TrainingProgress};
use super::TrainError;
use crate::model::PoseNet;
use crate::viz;

/// Optimizer family for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

impl std::fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerKind::Adam => write!(f, "adam"),
            OptimizerKind::Sgd => write!(f, "sgd"),
        }
    }
}

/// Resolved hyperparameters the loop runs with.
#[derive(Debug, Clone)]
pub struct TrainSettings {
    pub epochs: usize,
    pub batch_size: usize,
    /// Steps between validation passes and checkpoint decisions.
    pub log_interval: u64,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    /// Gaussian spread of the rendered targets, in heatmap pixels.
    pub sigma: f32,
    /// Target resolution, image shape over the model stride.
    pub heatmap_shape: (usize, usize),
    pub seed: u64,
}

/// Train the model over the train partition, validating and checkpointing at
/// every interval boundary. Returns the final model and run state.
#[allow(clippy::too_many_arguments)]
pub fn train<B: AutodiffBackend>(
    settings: &TrainSettings,
    model: PoseNet<B>,
    train_set: &[KeypointSample],
    valid_set: &[KeypointSample],
    store: &CheckpointStore,
    restore_from: Option<&CheckpointStore>,
    hyperparams: &CheckpointHyperparams,
    writer: &mut RunWriter,
    device: &B::Device,
) -> anyhow::Result<(PoseNet<B>, TrainingProgress)> {
    match settings.optimizer {
        OptimizerKind::Adam => train_with(
            settings,
            model,
            AdamConfig::new().init::<B, PoseNet<B>>(),
            train_set,
            valid_set,
            store,
            restore_from,
            hyperparams,
            writer,
            device,
        ),
        OptimizerKind::Sgd => train_with(
            settings,
            model,
            SgdConfig::new().init::<B, PoseNet<B>>(),
            train_set,
            valid_set,
            store,
            restore_from,
            hyperparams,
            writer,
            device,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn train_with<B, O>(
    settings: &TrainSettings,
    mut model: PoseNet<B>,
    mut optimizer: O,
    train_set: &[KeypointSample],
    valid_set: &[KeypointSample],
    store: &CheckpointStore,
    restore_from: Option<&CheckpointStore>,
    hyperparams: &CheckpointHyperparams,
    writer: &mut RunWriter,
    device: &B::Device,
) -> anyhow::Result<(PoseNet<B>, TrainingProgress)>
where
    B: AutodiffBackend,
    O: Optimizer<PoseNet<B>, B>,
{
    if train_set.is_empty() {
        bail!("training partition is empty");
    }

    let mut progress = TrainingProgress::new();
    if let Some(source) = restore_from {
        let (restored_model, restored_optimizer, meta) =
            source.restore(model, optimizer, device)?;
        model = restored_model;
        optimizer = restored_optimizer;
        progress.best_loss = meta.best_loss;
        progress.global_step = meta.global_step;
        tracing::info!(
            best_loss = meta.best_loss,
            global_step = meta.global_step,
            dir = %source.dir().display(),
            "Restored checkpoint"
        );
    }

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let batches = batches_per_epoch(train_set.len(), settings.batch_size);
    let mse = MseLoss::new();
    tracing::info!(
        epochs = settings.epochs,
        batches_per_epoch = batches,
        batch_size = settings.batch_size,
        optimizer = %settings.optimizer,
        "Started training"
    );

    for epoch in 0..settings.epochs {
        progress.start_epoch();
        for (batch_index, batch) in
            BatchIter::new(train_set, settings.batch_size, &mut rng, true).enumerate()
        {
            let (inputs, targets) = collate::<B>(&batch, settings.heatmap_shape, settings.sigma, device);
            let outputs = model.forward(inputs.clone());
            let loss = mse.forward(outputs.clone(), targets.clone(), Reduction::Mean);
            let loss_value: f64 = loss.clone().into_scalar().elem();

            let step = global_step(batch_index, epoch, batches);
            if !loss_value.is_finite() {
                tracing::error!(global_step = step, loss = loss_value, "Aborting run");
                return Err(TrainError::NumericAnomaly {
                    global_step: step,
                    loss: loss_value,
                }
                .into());
            }

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optimizer.step(settings.learning_rate, model, grads);
            progress.record_batch(step, loss_value);
            writer.add_scalar("Train/loss", loss_value, step)?;

            if is_interval_step(step, settings.log_interval) {
                let eval_model = model.valid();
                let valid_loss = validate(
                    &eval_model,
                    valid_set,
                    settings.batch_size,
                    settings.heatmap_shape,
                    settings.sigma,
                    &mut rng,
                    Some((&mut *writer, step)),
                    device,
                )?;
                writer.add_scalar("Valid/loss", valid_loss, step)?;
                viz::log_grids(writer, "Train", &inputs, &targets, &outputs, step)?;
                process_checkpoint(
                    loss_value,
                    step,
                    &mut progress,
                    store,
                    &model,
                    &optimizer,
                    hyperparams,
                )?;
                tracing::info!(
                    epoch,
                    batch = batch_index,
                    percent = format!("{:.0}%", 100.0 * (batch_index + 1) as f64 / batches as f64),
                    train_loss = progress.interval_mean(settings.log_interval),
                    valid_loss,
                    "Training status"
                );
                progress.reset_interval();
                writer.flush()?;
            }
        }
        tracing::info!(
            epoch,
            avg_loss = progress.epoch_mean(batches),
            "Epoch complete"
        );
    }

    writer.flush()?;
    tracing::info!(best_loss = progress.best_loss, "Finished training");
    Ok((model, progress))
}

/// Mean MSE over the validation partition. Shuffles so the logged first batch
/// varies between calls; model weights are untouched.
#[allow(clippy::too_many_arguments)]
pub fn validate<B: Backend>(
    model: &PoseNet<B>,
    valid_set: &[KeypointSample],
    batch_size: usize,
    heatmap_shape: (usize, usize),
    sigma: f32,
    rng: &mut StdRng,
    mut sink: Option<(&mut RunWriter, u64)>,
    device: &B::Device,
) -> anyhow::Result<f64> {
    if valid_set.is_empty() {
        tracing::warn!("Validation partition is empty");
        return Ok(0.0);
    }

    let mse = MseLoss::new();
    let mut total = 0.0;
    let mut count = 0usize;
    for batch in BatchIter::new(valid_set, batch_size, rng, true) {
        let (inputs, targets) = collate::<B>(&batch, heatmap_shape, sigma, device);
        let outputs = model.forward(inputs.clone());
        let loss: f64 = mse
            .forward(outputs.clone(), targets.clone(), Reduction::Mean)
            .into_scalar()
            .elem();
        if count == 0 {
            if let Some((writer, step)) = sink.take() {
                viz::log_grids(writer, "Valid", &inputs, &targets, &outputs, step)?;
            }
        }
        total += loss;
        count += 1;
    }
    Ok(total / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PoseNetConfig;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use keypoints::synthetic_partitions;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;
    type InnerBackend = NdArray<f32>;

    fn settings() -> TrainSettings {
        TrainSettings {
            epochs: 1,
            batch_size: 4,
            log_interval: 2,
            learning_rate: 1e-3,
            optimizer: OptimizerKind::Adam,
            sigma: 1.0,
            heatmap_shape: (4, 4),
            seed: 0,
        }
    }

    fn hyperparams() -> CheckpointHyperparams {
        CheckpointHyperparams {
            network: "posture".to_string(),
            dataset: "synthetic".to_string(),
            image_shape: [16, 16],
            num_keypoints: 2,
            sigma: 1.0,
            optimizer: "adam".to_string(),
            learning_rate: 1e-3,
        }
    }

    #[test]
    fn test_train_smoke_writes_scalars_and_checkpoint() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let parts = synthetic_partitions(16, 2, (16, 16), 0.75, 0);
        let model = PoseNetConfig::new()
            .with_num_keypoints(2)
            .with_base_channels(4)
            .with_blocks_per_stage(1)
            .init::<TestBackend>(&device);
        let store = CheckpointStore::new(tmp.path().join("ckpt"), "run");
        let mut writer = RunWriter::create(tmp.path(), "run").unwrap();

        let (_, progress) = train(
            &settings(),
            model,
            &parts.train,
            &parts.valid,
            &store,
            None,
            &hyperparams(),
            &mut writer,
            &device,
        )
        .unwrap();

        // 12 train samples at batch 4: steps 0, 1, 2.
        assert_eq!(progress.global_step, 2);
        assert!(progress.best_loss.is_finite());
        assert!(store.exists(), "interval at step 2 should checkpoint");

        let reader = runlog::RunReader::open(tmp.path(), "run").unwrap();
        assert_eq!(reader.series("Train/loss").len(), 3);
        assert_eq!(reader.series("Valid/loss").len(), 1);
    }

    #[test]
    fn test_resume_carries_best_and_step() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let parts = synthetic_partitions(16, 2, (16, 16), 0.75, 0);
        let config = PoseNetConfig::new()
            .with_num_keypoints(2)
            .with_base_channels(4)
            .with_blocks_per_stage(1);
        let store = CheckpointStore::new(tmp.path().join("ckpt"), "run");
        let mut writer = RunWriter::create(tmp.path(), "run").unwrap();

        let (_, first) = train(
            &settings(),
            config.init::<TestBackend>(&device),
            &parts.train,
            &parts.valid,
            &store,
            None,
            &hyperparams(),
            &mut writer,
            &device,
        )
        .unwrap();

        let (_, resumed) = train(
            &settings(),
            config.init::<TestBackend>(&device),
            &parts.train,
            &parts.valid,
            &store,
            Some(&store),
            &hyperparams(),
            &mut writer,
            &device,
        )
        .unwrap();

        // Resume starts from the stored best rather than +inf.
        assert!(resumed.best_loss <= first.best_loss);
    }

    #[test]
    fn test_empty_train_partition_fails() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let model = PoseNetConfig::new()
            .with_num_keypoints(2)
            .with_base_channels(4)
            .with_blocks_per_stage(1)
            .init::<TestBackend>(&device);
        let store = CheckpointStore::new(tmp.path().join("ckpt"), "run");
        let mut writer = RunWriter::create(tmp.path(), "run").unwrap();

        let result = train(
            &settings(),
            model,
            &[],
            &[],
            &store,
            None,
            &hyperparams(),
            &mut writer,
            &device,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_is_deterministic_given_seed() {
        let device = Default::default();
        let parts = synthetic_partitions(12, 2, (16, 16), 0.5, 0);
        let model = PoseNetConfig::new()
            .with_num_keypoints(2)
            .with_base_channels(4)
            .with_blocks_per_stage(1)
            .init::<InnerBackend>(&device);

        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let a = validate(&model, &parts.valid, 4, (4, 4), 1.0, &mut rng_a, None, &device).unwrap();
        let b = validate(&model, &parts.valid, 4, (4, 4), 1.0, &mut rng_b, None, &device).unwrap();
        assert_eq!(a, b, "same seed and weights give the same loss");
    }
}
