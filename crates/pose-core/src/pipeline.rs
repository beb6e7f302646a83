//! Run drivers: summary, sample plot, prediction, and training.

use burn::module::Module;
use keypoints::{
    load_coco_annotations, synthetic_partitions, BatchIter, DatasetConfig, Partitions,
};
use posenet::model::{PoseNet, PoseNetConfig, HEATMAP_STRIDE};
use posenet::training::{self, CheckpointStore, OptimizerKind, TrainSettings};
use posenet::{inference, viz, PoseAutodiffBackend, PoseBackend};
use rand::rngs::StdRng;
use rand::SeedableRng;
use runlog::RunWriter;

use crate::config::{DatasetChoice, OptimizerChoice, RunConfig};

/// Samples generated when no files back the dataset.
const SYNTHETIC_COUNT: usize = 128;

pub fn run(config: RunConfig) -> anyhow::Result<()> {
    let device = Default::default();
    tracing::info!(
        device = %config.device,
        run = %config.run_name,
        dataset = %config.dataset,
        optimizer = %config.optimizer,
        learning_rate = config.learning_rate,
        batch_size = config.batch_size,
        epochs = config.epochs,
        "Resolved run"
    );

    let model = model_config(&config).init::<PoseAutodiffBackend>(&device);
    tracing::info!(
        total_params = model.num_params(),
        trainable_params = model.num_trainable_params(),
        "Initialized model"
    );

    if config.summary {
        println!("{model}");
        println!("total parameters:     {}", model.num_params());
        println!("trainable parameters: {}", model.num_trainable_params());
        return Ok(());
    }

    let parts = load_partitions(&config)?;
    tracing::info!(
        train = parts.train.len(),
        valid = parts.valid.len(),
        test = parts.test.len(),
        "Partitioned dataset"
    );

    let mut writer = RunWriter::create(&config.log_root, &config.run_name)?;

    if config.plot {
        plot_sample_batch(&config, &parts, &mut writer)?;
    }

    if config.predict {
        return predict(&config, &parts, &mut writer);
    }

    let store = CheckpointStore::new(&config.checkpoint_root, &config.run_name);
    let restore_store = config.checkpoint.as_ref().map(CheckpointStore::at);
    let (_, progress) = training::train(
        &settings(&config),
        model,
        &parts.train,
        &parts.valid,
        &store,
        restore_store.as_ref(),
        &config.hyperparams(),
        &mut writer,
        &device,
    )?;
    tracing::info!(
        best_loss = progress.best_loss,
        global_step = progress.global_step,
        checkpoint = %store.dir().display(),
        "Run complete"
    );
    Ok(())
}

fn model_config(config: &RunConfig) -> PoseNetConfig {
    // One architecture today; the network flag picks within this family.
    PoseNetConfig::new().with_num_keypoints(config.num_keypoints)
}

fn heatmap_shape(config: &RunConfig) -> (usize, usize) {
    (
        config.image_shape.0 / HEATMAP_STRIDE,
        config.image_shape.1 / HEATMAP_STRIDE,
    )
}

fn settings(config: &RunConfig) -> TrainSettings {
    TrainSettings {
        epochs: config.epochs,
        batch_size: config.batch_size,
        log_interval: config.log_interval,
        learning_rate: config.learning_rate,
        optimizer: match config.optimizer {
            OptimizerChoice::Adam => OptimizerKind::Adam,
            OptimizerChoice::Sgd => OptimizerKind::Sgd,
        },
        sigma: config.sigma,
        heatmap_shape: heatmap_shape(config),
        seed: config.seed,
    }
}

fn load_partitions(config: &RunConfig) -> anyhow::Result<Partitions> {
    let parts = match config.dataset {
        DatasetChoice::Coco => load_coco_annotations(&DatasetConfig {
            root: config.data_root.clone(),
            image_shape: config.image_shape,
            num_keypoints: config.num_keypoints,
            train_percentage: config.train_percentage,
            seed: config.seed,
        })?,
        DatasetChoice::Synthetic => synthetic_partitions(
            SYNTHETIC_COUNT,
            config.num_keypoints,
            config.image_shape,
            config.train_percentage,
            config.seed,
        ),
    };
    Ok(parts)
}

/// Log one shuffled training batch with its target overlays under `Sample`.
fn plot_sample_batch(
    config: &RunConfig,
    parts: &Partitions,
    writer: &mut RunWriter,
) -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    if let Some(batch) = BatchIter::new(&parts.train, config.batch_size, &mut rng, true).next() {
        let device = Default::default();
        let (inputs, targets) = training::collate::<PoseBackend>(
            &batch,
            heatmap_shape(config),
            config.sigma,
            &device,
        );
        viz::log_sample_grids(writer, &inputs, &targets)?;
        writer.flush()?;
        tracing::info!(samples = batch.len(), "Logged sample grid");
    }
    Ok(())
}

/// Restore a checkpoint and score the test partition, forward only.
fn predict(config: &RunConfig, parts: &Partitions, writer: &mut RunWriter) -> anyhow::Result<()> {
    let device = Default::default();
    let store = match &config.checkpoint {
        Some(path) => CheckpointStore::at(path),
        None => CheckpointStore::new(&config.checkpoint_root, &config.run_name),
    };
    let fresh: PoseNet<PoseBackend> = model_config(config).init(&device);
    let (model, meta) = store.load_model(fresh, &device)?;
    tracing::info!(
        best_loss = meta.best_loss,
        global_step = meta.global_step,
        dir = %store.dir().display(),
        "Restored checkpoint for inference"
    );

    let results = inference::predict(
        &model,
        &parts.test,
        config.batch_size,
        heatmap_shape(config),
        config.sigma,
        Some((writer, meta.global_step)),
        &device,
    )?;
    let mean_loss = if results.is_empty() {
        f64::NAN
    } else {
        results.iter().map(|b| b.loss).sum::<f64>() / results.len() as f64
    };
    tracing::info!(batches = results.len(), mean_loss, "Finished prediction");
    writer.flush()?;
    Ok(())
}
