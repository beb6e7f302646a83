//! Shuffled batch iteration over a dataset partition.
//!
//! The iterator is finite and restartable: build a fresh one per epoch with
//! the epoch's RNG to reshuffle. Fixed batch size, the final partial batch
//! is kept.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::types::KeypointSample;

/// Number of batches one pass over `n` samples yields at batch size `b`.
pub fn batches_per_epoch(n: usize, b: usize) -> usize {
    debug_assert!(b >= 1);
    n.div_ceil(b)
}

/// Yields `Vec<&KeypointSample>` batches in (optionally shuffled) order.
pub struct BatchIter<'a> {
    samples: &'a [KeypointSample],
    order: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> BatchIter<'a> {
    /// Build an iterator over one epoch. `shuffle` draws a fresh permutation
    /// from `rng`; pass `false` for stable test-partition order.
    pub fn new(
        samples: &'a [KeypointSample],
        batch_size: usize,
        rng: &mut impl Rng,
        shuffle: bool,
    ) -> Self {
        let mut order: Vec<usize> = (0..samples.len()).collect();
        if shuffle {
            order.shuffle(rng);
        }
        Self {
            samples,
            order,
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    /// Total number of batches this iterator will yield.
    pub fn len(&self) -> usize {
        batches_per_epoch(self.samples.len(), self.batch_size)
    }

    /// Whether the partition is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl<'a> Iterator for BatchIter<'a> {
    type Item = Vec<&'a KeypointSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.order[self.cursor..end]
            .iter()
            .map(|&i| &self.samples[i])
            .collect();
        self.cursor = end;
        Some(batch)
    }
}
