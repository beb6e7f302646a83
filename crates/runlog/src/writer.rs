//! Appends scalar events and image grids to a run directory.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::grid::PlanarImage;

/// One scalar data point in the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub value: f64,
    pub step: u64,
}

/// Writes to `<root>/<run_name>/`: `scalars.jsonl` (append-only) and
/// `images/<tag>_<step>.png`.
pub struct RunWriter {
    run_dir: PathBuf,
    scalars: BufWriter<File>,
}

impl RunWriter {
    /// Create (or reopen for append) the run directory under `root`.
    pub fn create(root: &Path, run_name: &str) -> anyhow::Result<Self> {
        let run_dir = root.join(run_name);
        std::fs::create_dir_all(run_dir.join("images"))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(run_dir.join("scalars.jsonl"))?;
        tracing::info!(dir = %run_dir.display(), "Opened run log");
        Ok(Self {
            run_dir,
            scalars: BufWriter::new(file),
        })
    }

    /// Directory this run writes into.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Append one scalar to the event stream.
    pub fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> anyhow::Result<()> {
        let event = ScalarEvent {
            tag: tag.to_string(),
            value,
            step,
        };
        serde_json::to_writer(&mut self.scalars, &event)?;
        self.scalars.write_all(b"\n")?;
        Ok(())
    }

    /// Write an image grid as a PNG named after the tag and step.
    pub fn add_image(&mut self, tag: &str, image: &PlanarImage, step: u64) -> anyhow::Result<()> {
        let name = format!("{}_{step}.png", sanitize(tag));
        let path = self.run_dir.join("images").join(name);
        image.to_rgb8().save(&path)?;
        Ok(())
    }

    /// Flush buffered scalar writes to disk. Called at every interval
    /// boundary so an interrupted run keeps everything logged so far.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.scalars.flush()?;
        Ok(())
    }
}

/// Tag namespaces use `/`; file names replace it.
fn sanitize(tag: &str) -> String {
    tag.replace(['/', '\\'], "_")
}
