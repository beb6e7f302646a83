//! Dataset loading and partition splitting.
//!
//! The on-disk format is a JSONL annotation file (`annotations.jsonl` under
//! the dataset root) whose records point at image files relative to the same
//! root. Images are decoded, resized to the configured shape, and normalized
//! to planar [0, 1] floats. A deterministic shuffled split produces the
//! train/valid/test partitions; the synthetic generator backs tests and
//! smoke runs without any files on disk.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::heatmap::render_channel;
use crate::types::{AnnotationRecord, DatasetError, Keypoint, KeypointSample};

/// Options for loading an on-disk dataset.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Dataset root containing `annotations.jsonl` and image files.
    pub root: PathBuf,
    /// Target (height, width) every image is resized to.
    pub image_shape: (usize, usize),
    /// Keypoints every record must carry.
    pub num_keypoints: usize,
    /// Fraction of samples assigned to the training partition.
    pub train_percentage: f32,
    /// Seed for the split permutation.
    pub seed: u64,
}

/// The three dataset partitions.
#[derive(Debug, Default)]
pub struct Partitions {
    pub train: Vec<KeypointSample>,
    pub valid: Vec<KeypointSample>,
    pub test: Vec<KeypointSample>,
}

impl Partitions {
    /// Total sample count across partitions.
    pub fn len(&self) -> usize {
        self.train.len() + self.valid.len() + self.test.len()
    }

    /// Whether all partitions are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load a COCO-style keypoint dataset and split it into partitions.
pub fn load_coco_annotations(config: &DatasetConfig) -> Result<Partitions, DatasetError> {
    let annotations = config.root.join("annotations.jsonl");
    let file = std::fs::File::open(&annotations).map_err(|source| DatasetError::AnnotationIo {
        path: annotations.clone(),
        source,
    })?;

    let mut samples = Vec::new();
    for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| DatasetError::AnnotationIo {
            path: annotations.clone(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: AnnotationRecord =
            serde_json::from_str(&line).map_err(|source| DatasetError::AnnotationParse {
                path: annotations.clone(),
                line: line_no + 1,
                source,
            })?;
        if record.keypoints.len() != config.num_keypoints {
            return Err(DatasetError::KeypointCountMismatch {
                image: record.image.clone(),
                found: record.keypoints.len(),
                expected: config.num_keypoints,
            });
        }
        samples.push(load_sample(&config.root, &record, config.image_shape)?);
    }

    if samples.is_empty() {
        return Err(DatasetError::Empty { path: annotations });
    }

    tracing::info!(
        samples = samples.len(),
        root = %config.root.display(),
        "Loaded keypoint dataset"
    );

    Ok(split(samples, config.train_percentage, config.seed))
}

/// Decode and resize one annotated image into a sample.
fn load_sample(
    root: &Path,
    record: &AnnotationRecord,
    image_shape: (usize, usize),
) -> Result<KeypointSample, DatasetError> {
    let (height, width) = image_shape;
    let path = root.join(&record.image);
    let img = image::open(&path).map_err(|source| DatasetError::Image {
        path: path.clone(),
        source,
    })?;
    let rgb = image::imageops::resize(
        &img.to_rgb8(),
        width as u32,
        height as u32,
        FilterType::Triangle,
    );

    // HWC u8 to CHW f32 in [0, 1].
    let mut pixels = vec![0.0f32; 3 * height * width];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (row, col) = (y as usize, x as usize);
        for c in 0..3 {
            pixels[c * height * width + row * width + col] = pixel.0[c] as f32 / 255.0;
        }
    }

    Ok(KeypointSample {
        pixels,
        height,
        width,
        keypoints: record.keypoints.clone(),
    })
}

/// Deterministic shuffled split: `train_percentage` to train, the remainder
/// split between valid and test (valid takes the odd sample).
fn split(mut samples: Vec<KeypointSample>, train_percentage: f32, seed: u64) -> Partitions {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let n = samples.len();
    let n_train = ((n as f32) * train_percentage).round() as usize;
    let n_train = n_train.min(n);
    let rest = n - n_train;
    let n_valid = rest.div_ceil(2);

    let test = samples.split_off(n_train + n_valid);
    let valid = samples.split_off(n_train);
    Partitions {
        train: samples,
        valid,
        test,
    }
}

/// Generate synthetic samples: faint Gaussian blobs rendered at random
/// keypoint locations on a mid-gray background, so the input image itself
/// peaks where its keypoints sit.
pub fn synthetic_samples(
    count: usize,
    num_keypoints: usize,
    image_shape: (usize, usize),
    seed: u64,
) -> Vec<KeypointSample> {
    let (height, width) = image_shape;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut channel = vec![0.0f32; height * width];

    (0..count)
        .map(|_| {
            let keypoints: Vec<Keypoint> = (0..num_keypoints)
                .map(|_| Keypoint {
                    x: rng.gen_range(0.0..=1.0),
                    y: rng.gen_range(0.0..=1.0),
                    visible: true,
                })
                .collect();

            let mut pixels = vec![0.25f32; 3 * height * width];
            for kp in &keypoints {
                render_channel(kp, height, width, 2.0, &mut channel);
                for (i, &v) in channel.iter().enumerate() {
                    for c in 0..3 {
                        let slot = &mut pixels[c * height * width + i];
                        *slot = (*slot + 0.5 * v).min(1.0);
                    }
                }
            }

            KeypointSample {
                pixels,
                height,
                width,
                keypoints,
            }
        })
        .collect()
}

/// Synthetic counterpart of [`load_coco_annotations`].
pub fn synthetic_partitions(
    count: usize,
    num_keypoints: usize,
    image_shape: (usize, usize),
    train_percentage: f32,
    seed: u64,
) -> Partitions {
    let samples = synthetic_samples(count, num_keypoints, image_shape, seed);
    split(samples, train_percentage, seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_fractions() {
        let parts = synthetic_partitions(100, 2, (8, 8), 0.9, 0);
        assert_eq!(parts.train.len(), 90);
        assert_eq!(parts.valid.len(), 5);
        assert_eq!(parts.test.len(), 5);
        assert_eq!(parts.len(), 100);
    }

    #[test]
    fn test_split_odd_remainder_goes_to_valid() {
        let parts = synthetic_partitions(11, 1, (4, 4), 0.8, 0);
        // 9 train, 2 remaining: valid gets the ceil.
        assert_eq!(parts.train.len(), 9);
        assert_eq!(parts.valid.len(), 1);
        assert_eq!(parts.test.len(), 1);
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = synthetic_partitions(20, 1, (4, 4), 0.5, 42);
        let b = synthetic_partitions(20, 1, (4, 4), 0.5, 42);
        assert_eq!(a.train[0].pixels, b.train[0].pixels);
        assert_eq!(a.test.len(), b.test.len());
    }

    #[test]
    fn test_synthetic_sample_shape_and_range() {
        let samples = synthetic_samples(3, 4, (16, 12), 1);
        assert_eq!(samples.len(), 3);
        for s in &samples {
            assert_eq!(s.pixels.len(), 3 * 16 * 12);
            assert_eq!(s.keypoints.len(), 4);
            assert!(s.pixels.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn test_synthetic_image_peaks_near_keypoint() {
        let samples = synthetic_samples(1, 1, (32, 32), 5);
        let s = &samples[0];
        let kp = s.keypoints[0];
        let expect_row = (kp.y * 31.0).round() as usize;
        let expect_col = (kp.x * 31.0).round() as usize;
        // Brightest red-channel pixel sits at the rendered blob center.
        let (row, col) = crate::heatmap::decode_peak(&s.pixels[..32 * 32], 32, 32);
        assert!(row.abs_diff(expect_row) <= 1, "row {row} vs {expect_row}");
        assert!(col.abs_diff(expect_col) <= 1, "col {col} vs {expect_col}");
    }
}
