//! CLI flags and run configuration.
//!
//! Resolution order: built-in defaults, then the optional TOML file, then
//! explicit CLI flags. When a checkpoint is supplied, the hyperparameters
//! persisted in its `meta.json` override the result so a resumed run keeps
//! the geometry it was trained with. The run name is derived last, from the
//! fully merged values.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use posenet::training::{CheckpointHyperparams, CheckpointStore};
use serde::Deserialize;

/// Configuration resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Image shape must be height and width, both positive multiples of 8
    /// (the backbone stride).
    #[error("--image-shape takes two positive multiples of 8, got {got:?}")]
    InvalidImageShape { got: Vec<usize> },

    #[error("train percentage must be in (0, 1], got {got}")]
    InvalidTrainPercentage { got: f32 },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    /// Requested device was not compiled into this binary.
    #[error("gpu requested but this binary was built without the `wgpu` feature")]
    DeviceUnavailable,

    #[error("failed to read {path}: {message}")]
    File { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceChoice {
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkChoice {
    /// Residual conv backbone with a deconv heatmap head.
    Posture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptimizerChoice {
    Adam,
    Sgd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatasetChoice {
    /// COCO-style keypoint annotations under the data root.
    Coco,
    /// Generated blobs, no files needed. Smoke runs and tests.
    Synthetic,
}

impl std::fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceChoice::Cpu => write!(f, "cpu"),
            DeviceChoice::Gpu => write!(f, "gpu"),
        }
    }
}

impl std::fmt::Display for NetworkChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkChoice::Posture => write!(f, "posture"),
        }
    }
}

impl std::fmt::Display for OptimizerChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptimizerChoice::Adam => write!(f, "adam"),
            OptimizerChoice::Sgd => write!(f, "sgd"),
        }
    }
}

impl std::fmt::Display for DatasetChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetChoice::Coco => write!(f, "coco"),
            DatasetChoice::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// heatpose: heatmap keypoint-regression trainer.
#[derive(Debug, Parser)]
#[command(name = "heatpose", version, about)]
pub struct Cli {
    /// Path to an optional TOML config file with a [training] section.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Fraction of samples used for training; the rest splits valid/test.
    #[arg(long)]
    pub train_percentage: Option<f32>,
    /// Samples per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Global steps between validation passes and checkpoint decisions.
    #[arg(long)]
    pub log_interval: Option<u64>,
    /// Passes over the training partition.
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Compute device.
    #[arg(long, value_enum)]
    pub device: Option<DeviceChoice>,
    /// Network architecture.
    #[arg(long, value_enum)]
    pub network: Option<NetworkChoice>,
    /// Input image shape as height width (e.g. --image-shape 256 192).
    #[arg(long, num_args = 1..)]
    pub image_shape: Option<Vec<usize>>,
    /// Optimizer family.
    #[arg(long, value_enum)]
    pub optimizer: Option<OptimizerChoice>,
    /// Learning rate.
    #[arg(long)]
    pub learning_rate: Option<f64>,
    /// Gaussian spread of rendered target heatmaps, in heatmap pixels.
    #[arg(long)]
    pub sigma: Option<f32>,
    /// Dataset to load.
    #[arg(long, value_enum)]
    pub dataset: Option<DatasetChoice>,
    /// Keypoints per sample.
    #[arg(long)]
    pub num_keypoints: Option<usize>,
    /// Dataset root directory (annotations.jsonl plus images).
    #[arg(long)]
    pub data_root: Option<PathBuf>,
    /// Root directory for run logs.
    #[arg(long)]
    pub log_root: Option<PathBuf>,
    /// Root directory for checkpoints; a run writes under its run name.
    #[arg(long)]
    pub checkpoint_root: Option<PathBuf>,
    /// Checkpoint directory to restore before training or predicting.
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,
    /// Shuffle and split seed.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Score the test partition with a restored checkpoint instead of training.
    #[arg(long)]
    pub predict: bool,
    /// Log a grid of sample images with their target overlays before running.
    #[arg(long)]
    pub plot: bool,
    /// Print the model structure and parameter counts, then exit.
    #[arg(long)]
    pub summary: bool,
}

/// Optional TOML file, `[training]` section only.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub training: TrainingOverrides,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrainingOverrides {
    pub train_percentage: Option<f32>,
    pub batch_size: Option<usize>,
    pub log_interval: Option<u64>,
    pub epochs: Option<usize>,
    pub learning_rate: Option<f64>,
    pub sigma: Option<f32>,
    pub num_keypoints: Option<usize>,
    pub seed: Option<u64>,
}

/// Fully resolved run settings, immutable once built.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub train_percentage: f32,
    pub batch_size: usize,
    pub log_interval: u64,
    pub epochs: usize,
    pub device: DeviceChoice,
    pub network: NetworkChoice,
    pub image_shape: (usize, usize),
    pub optimizer: OptimizerChoice,
    pub learning_rate: f64,
    pub sigma: f32,
    pub num_keypoints: usize,
    pub dataset: DatasetChoice,
    pub data_root: PathBuf,
    pub log_root: PathBuf,
    pub checkpoint_root: PathBuf,
    pub checkpoint: Option<PathBuf>,
    pub seed: u64,
    /// Derived from the merged values, e.g.
    /// `posture_coco_adam_lr0.0001_b16_sg2_256x192`.
    pub run_name: String,
    pub predict: bool,
    pub plot: bool,
    pub summary: bool,
}

impl RunConfig {
    /// Settings persisted into checkpoint metadata.
    pub fn hyperparams(&self) -> CheckpointHyperparams {
        CheckpointHyperparams {
            network: self.network.to_string(),
            dataset: self.dataset.to_string(),
            image_shape: [self.image_shape.0, self.image_shape.1],
            num_keypoints: self.num_keypoints,
            sigma: self.sigma,
            optimizer: self.optimizer.to_string(),
            learning_rate: self.learning_rate,
        }
    }
}

/// Merge defaults, the TOML file, CLI flags, and checkpoint hyperparameters
/// into a validated [`RunConfig`].
pub fn resolve(cli: Cli) -> Result<RunConfig, ConfigError> {
    let file = match &cli.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let parsed: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::File {
                path: path.clone(),
                message: e.to_string(),
            })?;
            tracing::info!(path = %path.display(), "Loaded config file");
            parsed
        }
        None => FileConfig::default(),
    };
    let overrides = file.training;

    let train_percentage = cli
        .train_percentage
        .or(overrides.train_percentage)
        .unwrap_or(0.9);
    let batch_size = cli.batch_size.or(overrides.batch_size).unwrap_or(16);
    let log_interval = cli.log_interval.or(overrides.log_interval).unwrap_or(50);
    let epochs = cli.epochs.or(overrides.epochs).unwrap_or(2);
    let device = cli.device.unwrap_or(DeviceChoice::Cpu);
    let mut network = cli.network.unwrap_or(NetworkChoice::Posture);
    let mut image_shape_raw = cli.image_shape.unwrap_or_else(|| vec![256, 192]);
    let mut optimizer = cli.optimizer.unwrap_or(OptimizerChoice::Adam);
    let mut learning_rate = cli.learning_rate.or(overrides.learning_rate).unwrap_or(1e-4);
    let mut sigma = cli.sigma.or(overrides.sigma).unwrap_or(2.0);
    let dataset = cli.dataset.unwrap_or(DatasetChoice::Coco);
    let mut num_keypoints = cli.num_keypoints.or(overrides.num_keypoints).unwrap_or(17);
    let data_root = cli.data_root.unwrap_or_else(|| PathBuf::from("data"));
    let log_root = cli.log_root.unwrap_or_else(|| PathBuf::from("runs"));
    let checkpoint_root = cli
        .checkpoint_root
        .unwrap_or_else(|| PathBuf::from("checkpoints"));
    let seed = cli.seed.or(overrides.seed).unwrap_or(42);

    // A supplied checkpoint pins the hyperparameters it was trained with.
    if let Some(path) = &cli.checkpoint {
        let meta = CheckpointStore::at(path)
            .read_meta()
            .map_err(|e| ConfigError::File {
                path: path.clone(),
                message: e.to_string(),
            })?;
        if let Some(meta) = meta {
            let hp = meta.hyperparams;
            image_shape_raw = hp.image_shape.to_vec();
            sigma = hp.sigma;
            num_keypoints = hp.num_keypoints;
            learning_rate = hp.learning_rate;
            match hp.network.as_str() {
                "posture" => network = NetworkChoice::Posture,
                other => tracing::warn!(network = other, "Unknown network in checkpoint"),
            }
            match hp.optimizer.as_str() {
                "adam" => optimizer = OptimizerChoice::Adam,
                "sgd" => optimizer = OptimizerChoice::Sgd,
                other => tracing::warn!(optimizer = other, "Unknown optimizer in checkpoint"),
            }
            tracing::info!(dir = %path.display(), "Merged checkpoint hyperparameters");
        }
    }

    if image_shape_raw.len() != 2 || image_shape_raw.iter().any(|&d| d == 0 || d % 8 != 0) {
        return Err(ConfigError::InvalidImageShape {
            got: image_shape_raw,
        });
    }
    let image_shape = (image_shape_raw[0], image_shape_raw[1]);
    if !(0.0..=1.0).contains(&train_percentage) || train_percentage == 0.0 {
        return Err(ConfigError::InvalidTrainPercentage {
            got: train_percentage,
        });
    }
    if batch_size == 0 {
        return Err(ConfigError::InvalidBatchSize);
    }
    if device == DeviceChoice::Gpu && !posenet::GPU_COMPILED {
        return Err(ConfigError::DeviceUnavailable);
    }
    let run_name = format!(
        "{network}_{dataset}_{optimizer}_lr{learning_rate}_b{batch_size}_sg{sigma}_{}x{}",
        image_shape.0, image_shape.1
    );

    Ok(RunConfig {
        train_percentage,
        batch_size,
        log_interval,
        epochs,
        device,
        network,
        image_shape,
        optimizer,
        learning_rate,
        sigma,
        num_keypoints,
        dataset,
        data_root,
        log_root,
        checkpoint_root,
        checkpoint: cli.checkpoint,
        seed,
        run_name,
        predict: cli.predict,
        plot: cli.plot,
        summary: cli.summary,
    })
}
