//! Step accounting and loss accumulators for the training loop.

/// Position of a batch in the whole run, counted from zero.
pub fn global_step(batch_index: usize, epoch_index: usize, batches_per_epoch: usize) -> u64 {
    (batch_index + epoch_index * batches_per_epoch) as u64
}

/// Whether `step` lands on a logging boundary. Step zero never fires, so the
/// first interval covers exactly `log_interval` batches.
pub fn is_interval_step(step: u64, log_interval: u64) -> bool {
    log_interval > 0 && step > 0 && step % log_interval == 0
}

/// Running state of a training run: best loss seen, current step, and loss
/// sums for the epoch and the current logging interval.
#[derive(Debug, Clone)]
pub struct TrainingProgress {
    /// Best checkpoint-policy loss so far; starts at +inf so the first
    /// comparison always improves.
    pub best_loss: f64,
    /// Step of the most recent batch.
    pub global_step: u64,
    epoch_loss: f64,
    interval_loss: f64,
}

impl Default for TrainingProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingProgress {
    pub fn new() -> Self {
        Self {
            best_loss: f64::INFINITY,
            global_step: 0,
            epoch_loss: 0.0,
            interval_loss: 0.0,
        }
    }

    /// Reset the per-epoch and per-interval accumulators.
    pub fn start_epoch(&mut self) {
        self.epoch_loss = 0.0;
        self.interval_loss = 0.0;
    }

    /// Fold one batch into the accumulators.
    pub fn record_batch(&mut self, step: u64, loss: f64) {
        self.global_step = step;
        self.epoch_loss += loss;
        self.interval_loss += loss;
    }

    /// Mean training loss over the current interval. Divides by the interval
    /// length, which matches the sum only when the interval was fully seen.
    pub fn interval_mean(&self, log_interval: u64) -> f64 {
        self.interval_loss / log_interval.max(1) as f64
    }

    /// Clear the interval accumulator after a logging boundary.
    pub fn reset_interval(&mut self) {
        self.interval_loss = 0.0;
    }

    /// Mean training loss over the epoch.
    pub fn epoch_mean(&self, batches: usize) -> f64 {
        self.epoch_loss / batches.max(1) as f64
    }

    /// Checkpoint policy: strictly better than the best seen.
    pub fn improved(&self, loss: f64) -> bool {
        loss < self.best_loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_step_formula() {
        // 100 samples at batch 16 gives 7 batches per epoch.
        assert_eq!(global_step(0, 0, 7), 0);
        assert_eq!(global_step(6, 0, 7), 6);
        assert_eq!(global_step(0, 1, 7), 7);
        assert_eq!(global_step(3, 2, 7), 17);
    }

    #[test]
    fn test_interval_predicate() {
        for step in [50, 100, 150] {
            assert!(is_interval_step(step, 50), "step {step} should fire");
        }
        for step in [0, 1, 49, 51, 99] {
            assert!(!is_interval_step(step, 50), "step {step} should not fire");
        }
        assert!(!is_interval_step(100, 0), "zero interval never fires");
    }

    #[test]
    fn test_best_loss_starts_at_infinity() {
        let progress = TrainingProgress::new();
        assert!(progress.improved(1e30));
        assert!(!progress.improved(f64::INFINITY));
    }

    #[test]
    fn test_interval_mean_and_reset() {
        let mut progress = TrainingProgress::new();
        for step in 1..=4 {
            progress.record_batch(step, 0.5);
        }
        assert!((progress.interval_mean(4) - 0.5).abs() < 1e-12);
        progress.reset_interval();
        assert_eq!(progress.interval_mean(4), 0.0);
        // The epoch accumulator survives the interval reset.
        assert!((progress.epoch_mean(4) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_start_epoch_clears_accumulators() {
        let mut progress = TrainingProgress::new();
        progress.best_loss = 0.25;
        progress.record_batch(9, 1.0);
        progress.start_epoch();
        assert_eq!(progress.epoch_mean(1), 0.0);
        assert_eq!(progress.interval_mean(1), 0.0);
        // Best loss and step are run-level state, not epoch-level.
        assert_eq!(progress.best_loss, 0.25);
        assert_eq!(progress.global_step, 9);
    }
}
