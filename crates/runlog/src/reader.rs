//! Reads a run's scalar event stream back for summaries and tests.

use std::io::BufRead;
use std::path::Path;

use crate::writer::ScalarEvent;

/// In-memory view of one run's scalar events.
pub struct RunReader {
    events: Vec<ScalarEvent>,
}

impl RunReader {
    /// Read `<root>/<run_name>/scalars.jsonl` fully.
    pub fn open(root: &Path, run_name: &str) -> anyhow::Result<Self> {
        let path = root.join(run_name).join("scalars.jsonl");
        let file = std::fs::File::open(&path)
            .map_err(|e| anyhow::anyhow!("failed to open scalar stream {}: {e}", path.display()))?;

        let mut events = Vec::new();
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(Self { events })
    }

    /// All events in append order.
    pub fn events(&self) -> &[ScalarEvent] {
        &self.events
    }

    /// (step, value) pairs for one tag, in append order.
    pub fn series(&self, tag: &str) -> Vec<(u64, f64)> {
        self.events
            .iter()
            .filter(|e| e.tag == tag)
            .map(|e| (e.step, e.value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::RunWriter;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_series() {
        let tmp = TempDir::new().unwrap();
        let mut writer = RunWriter::create(tmp.path(), "run").unwrap();
        writer.add_scalar("Train/loss", 0.9, 0).unwrap();
        writer.add_scalar("Valid/loss", 0.8, 0).unwrap();
        writer.add_scalar("Train/loss", 0.7, 1).unwrap();
        writer.flush().unwrap();

        let reader = RunReader::open(tmp.path(), "run").unwrap();
        assert_eq!(reader.events().len(), 3);
        assert_eq!(reader.series("Train/loss"), vec![(0, 0.9), (1, 0.7)]);
        assert_eq!(reader.series("Valid/loss"), vec![(0, 0.8)]);
        assert!(reader.series("missing").is_empty());
    }

    #[test]
    fn test_open_missing_run_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(RunReader::open(tmp.path(), "nope").is_err());
    }
}
