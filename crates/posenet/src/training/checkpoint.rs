//! Best-loss checkpoint store: model and optimizer records plus metadata.
//!
//! A checkpoint is a directory holding `model.mpk`, `optimizer.mpk`, and
//! `meta.json`. Writes happen only when the policy loss strictly improves on
//! the best seen, so the directory always holds the best state of the run.

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use super::progress::TrainingProgress;
use super::TrainError;
use crate::model::PoseNet;

type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

const META_FILE: &str = "meta.json";
const MODEL_FILE: &str = "model";
const OPTIMIZER_FILE: &str = "optimizer";

/// Run settings frozen into a checkpoint. Restored values override config
/// defaults so a resumed run keeps the geometry it was trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointHyperparams {
    pub network: String,
    pub dataset: String,
    pub image_shape: [usize; 2],
    pub num_keypoints: usize,
    pub sigma: f32,
    pub optimizer: String,
    pub learning_rate: f64,
}

/// Metadata sidecar written next to the records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub best_loss: f64,
    pub global_step: u64,
    pub hyperparams: CheckpointHyperparams,
}

/// A checkpoint directory on disk.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Store under `root/<run_name>/`.
    pub fn new(root: impl AsRef<Path>, run_name: &str) -> Self {
        Self {
            dir: root.as_ref().join(run_name),
        }
    }

    /// Store at an explicit directory, e.g. a `--checkpoint` argument.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a complete checkpoint is present.
    pub fn exists(&self) -> bool {
        self.dir.join(META_FILE).is_file()
    }

    /// Read the metadata sidecar, `None` if no checkpoint was written yet.
    pub fn read_meta(&self) -> Result<Option<CheckpointMeta>, TrainError> {
        let path = self.dir.join(META_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).map_err(|e| self.err(e.to_string()))?;
        let meta = serde_json::from_str(&raw).map_err(|e| self.err(e.to_string()))?;
        Ok(Some(meta))
    }

    /// Write model, optimizer, and metadata, replacing any previous state.
    pub fn save<B, O>(
        &self,
        model: &PoseNet<B>,
        optimizer: &O,
        meta: &CheckpointMeta,
    ) -> Result<(), TrainError>
    where
        B: AutodiffBackend,
        O: Optimizer<PoseNet<B>, B>,
    {
        fs::create_dir_all(&self.dir).map_err(|e| self.err(e.to_string()))?;
        let recorder = CheckpointRecorder::new();
        model
            .clone()
            .save_file(self.dir.join(MODEL_FILE), &recorder)
            .map_err(|e| self.err(e.to_string()))?;
        recorder
            .record(optimizer.to_record(), self.dir.join(OPTIMIZER_FILE))
            .map_err(|e| self.err(e.to_string()))?;
        let json = serde_json::to_string_pretty(meta).map_err(|e| self.err(e.to_string()))?;
        fs::write(self.dir.join(META_FILE), json).map_err(|e| self.err(e.to_string()))?;
        Ok(())
    }

    /// Restore model, optimizer, and metadata for resuming training.
    pub fn restore<B, O>(
        &self,
        model: PoseNet<B>,
        optimizer: O,
        device: &B::Device,
    ) -> Result<(PoseNet<B>, O, CheckpointMeta), TrainError>
    where
        B: AutodiffBackend,
        O: Optimizer<PoseNet<B>, B>,
    {
        let meta = self
            .read_meta()?
            .ok_or_else(|| self.err("missing meta.json".to_string()))?;
        let recorder = CheckpointRecorder::new();
        let model = model
            .load_file(self.dir.join(MODEL_FILE), &recorder, device)
            .map_err(|e| self.err(e.to_string()))?;
        let record = recorder
            .load(self.dir.join(OPTIMIZER_FILE), device)
            .map_err(|e| self.err(e.to_string()))?;
        let optimizer = optimizer.load_record(record);
        Ok((model, optimizer, meta))
    }

    /// Load model weights only, for forward-only inference.
    pub fn load_model<B: Backend>(
        &self,
        model: PoseNet<B>,
        device: &B::Device,
    ) -> Result<(PoseNet<B>, CheckpointMeta), TrainError> {
        let meta = self
            .read_meta()?
            .ok_or_else(|| self.err("missing meta.json".to_string()))?;
        let recorder = CheckpointRecorder::new();
        let model = model
            .load_file(self.dir.join(MODEL_FILE), &recorder, device)
            .map_err(|e| self.err(e.to_string()))?;
        Ok((model, meta))
    }

    fn err(&self, message: String) -> TrainError {
        TrainError::Checkpoint {
            path: self.dir.clone(),
            message,
        }
    }
}

/// Apply the checkpoint policy for one logging boundary: write the bundle and
/// advance `best_loss` iff `loss` strictly improves on it. Returns whether a
/// checkpoint was written.
pub fn process_checkpoint<B, O>(
    loss: f64,
    step: u64,
    progress: &mut TrainingProgress,
    store: &CheckpointStore,
    model: &PoseNet<B>,
    optimizer: &O,
    hyperparams: &CheckpointHyperparams,
) -> Result<bool, TrainError>
where
    B: AutodiffBackend,
    O: Optimizer<PoseNet<B>, B>,
{
    if !progress.improved(loss) {
        return Ok(false);
    }
    let meta = CheckpointMeta {
        best_loss: loss,
        global_step: step,
        hyperparams: hyperparams.clone(),
    };
    store.save(model, optimizer, &meta)?;
    tracing::info!(
        loss,
        previous_best = progress.best_loss,
        global_step = step,
        dir = %store.dir().display(),
        "Saved checkpoint"
    );
    progress.best_loss = loss;
    Ok(true)
}
